// # Host Backends
//
// Backends that observe and apply bastion resources on a Linux host.
//
// ## Tools
//
// Every backend drives an external tool through a `CommandRunner`; no
// backend shells out directly. Programs are spawned without a shell, so
// configuration values never pass through shell parsing.
//
// | Resource          | Backend                | Tools                  |
// |-------------------|------------------------|------------------------|
// | forwarding        | `SysctlBackend`        | sysctl                 |
// | wireguard         | `WireGuardBackend`     | systemctl, wg-quick    |
// | container-network | `DockerNetworkBackend` | docker                 |
// | stack-definition  | `ComposeBackend`       | docker, systemctl      |
// | stack-unit        | `SystemdUnitBackend`   | systemctl              |
// | firewall          | `IptablesBackend`      | iptables               |
//
// Backends never decide whether to act. They report an `Observation` and
// carry out the `Action` the planner hands them.

pub mod docker;
pub mod files;
pub mod firewall;
pub mod runner;
pub mod sysctl;
pub mod systemd;
pub mod wireguard;

use std::sync::Arc;

use bastion_core::{BackendRegistry, ResourceKind};

pub use docker::{ComposeBackend, DockerNetworkBackend};
pub use firewall::IptablesBackend;
pub use runner::{CommandRunner, RecordingRunner, TokioRunner};
pub use sysctl::SysctlBackend;
pub use systemd::SystemdUnitBackend;
pub use wireguard::{WgKeyGenerator, WireGuardBackend};

/// Register a backend for every resource kind
pub fn register(registry: &BackendRegistry, runner: Arc<dyn CommandRunner>) {
    registry.register(
        ResourceKind::Forwarding,
        Arc::new(SysctlBackend::new(runner.clone())),
    );
    registry.register(
        ResourceKind::WireGuard,
        Arc::new(WireGuardBackend::new(runner.clone())),
    );
    registry.register(
        ResourceKind::ContainerNetwork,
        Arc::new(DockerNetworkBackend::new(runner.clone())),
    );
    registry.register(
        ResourceKind::StackDefinition,
        Arc::new(ComposeBackend::new(runner.clone())),
    );
    registry.register(
        ResourceKind::StackUnit,
        Arc::new(SystemdUnitBackend::new(runner.clone())),
    );
    registry.register(ResourceKind::Firewall, Arc::new(IptablesBackend::new(runner)));

    tracing::debug!("Registered host backends: {:?}", registry.kinds());
}
