//! Managed resources and their desired content
//!
//! Every artifact the provisioner owns is described by a [`DesiredResource`]:
//! what kind it is, where it lives, and the exact content (and therefore
//! fingerprint) it should have for the current [`Configuration`].
//!
//! ## Dependency Order
//!
//! ```text
//! forwarding ─────────────┐
//! wireguard ──────────────┼──► firewall
//! container-network ──┬───┘
//!                     └──► stack-definition ──► stack-unit
//! ```
//!
//! [`ResourceKind::ORDER`] is a fixed topological order of this graph.

pub mod firewall;
pub mod network;
pub mod stack;
pub mod wireguard;

use std::fmt;
use std::path::PathBuf;

use crate::config::{Configuration, HostLayout};
use crate::error::Result;
use crate::fingerprint::Fingerprint;

pub use firewall::{FirewallChain, FirewallRule};

/// First line of every generated file
pub(crate) const MANAGED_BANNER: &str = "# Managed by bastion-provision; local edits are overwritten.";

/// Kinds of managed resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    /// Kernel IPv4 forwarding (sysctl drop-in)
    Forwarding,
    /// WireGuard interface configuration + wg-quick service
    WireGuard,
    /// Container bridge network
    ContainerNetwork,
    /// Compose definition for the proxy + database pair
    StackDefinition,
    /// Supervising systemd unit for the stack
    StackUnit,
    /// Firewall forwarding and NAT rules
    Firewall,
}

impl ResourceKind {
    /// Application order (dependencies first)
    pub const ORDER: [ResourceKind; 6] = [
        ResourceKind::Forwarding,
        ResourceKind::WireGuard,
        ResourceKind::ContainerNetwork,
        ResourceKind::StackDefinition,
        ResourceKind::StackUnit,
        ResourceKind::Firewall,
    ];

    /// Stable resource name, used in logs and as the ledger key
    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::Forwarding => "forwarding",
            ResourceKind::WireGuard => "wireguard",
            ResourceKind::ContainerNetwork => "container-network",
            ResourceKind::StackDefinition => "stack-definition",
            ResourceKind::StackUnit => "stack-unit",
            ResourceKind::Firewall => "firewall",
        }
    }

    /// Resources that must be in place before this one is applied
    pub fn depends_on(&self) -> &'static [ResourceKind] {
        match self {
            ResourceKind::Forwarding | ResourceKind::WireGuard | ResourceKind::ContainerNetwork => {
                &[]
            }
            ResourceKind::StackDefinition => &[ResourceKind::ContainerNetwork],
            ResourceKind::StackUnit => &[ResourceKind::StackDefinition],
            ResourceKind::Firewall => &[
                ResourceKind::Forwarding,
                ResourceKind::WireGuard,
                ResourceKind::ContainerNetwork,
            ],
        }
    }

    /// Index in [`ResourceKind::ORDER`]
    pub fn position(&self) -> usize {
        Self::ORDER
            .iter()
            .position(|kind| kind == self)
            .unwrap_or(Self::ORDER.len())
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where and how a resource materializes on the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// A file with the given permission bits
    File {
        path: PathBuf,
        mode: u32,
    },

    /// A container network
    Network {
        name: String,
        subnet: String,
        bridge: String,
    },

    /// Dedicated firewall chains and the rules inside them
    Firewall {
        chains: Vec<FirewallChain>,
        rules: Vec<FirewallRule>,
    },
}

/// A resource as it should exist for the current configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredResource {
    kind: ResourceKind,
    artifact: Artifact,
    content: String,
    fingerprint: Fingerprint,
}

impl DesiredResource {
    pub fn new(kind: ResourceKind, artifact: Artifact, content: impl Into<String>) -> Self {
        let content = content.into();
        let fingerprint = Fingerprint::of(&content);
        Self {
            kind,
            artifact,
            content,
            fingerprint,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    /// Rendered desired content
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }
}

/// Render every managed resource, in [`ResourceKind::ORDER`]
///
/// Requires the private key to be resolved.
pub fn desired_resources(config: &Configuration, layout: &HostLayout) -> Result<Vec<DesiredResource>> {
    let resources = vec![
        network::forwarding_resource(layout),
        wireguard::wireguard_resource(config, layout)?,
        network::container_network_resource(&config.stack),
        stack::stack_definition_resource(&config.stack, layout)?,
        stack::stack_unit_resource(config, layout),
        firewall::firewall_resource(config),
    ];

    debug_assert!(
        resources
            .iter()
            .map(DesiredResource::kind)
            .eq(ResourceKind::ORDER.iter().copied())
    );

    Ok(resources)
}
