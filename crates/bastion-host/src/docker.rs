//! Container network and compose definition backends

use std::sync::Arc;

use async_trait::async_trait;
use bastion_core::resources::Artifact;
use bastion_core::resources::network::render_network;
use bastion_core::resources::stack::STACK_UNIT_NAME;
use bastion_core::traits::Observation;
use bastion_core::{Action, DesiredResource, Error, ResourceBackend, Result};

use crate::files::{file_artifact, read_if_exists, write_atomic};
use crate::runner::CommandRunner;
use crate::systemd::Systemctl;

const BRIDGE_NAME_OPTION: &str = "com.docker.network.bridge.name";

/// Go template printing `<subnet> <bridge>` for `docker network inspect`
const INSPECT_FORMAT: &str =
    "{{range .IPAM.Config}}{{.Subnet}}{{end}} {{index .Options \"com.docker.network.bridge.name\"}}";

/// Manages the user-defined bridge network the stack attaches to
pub struct DockerNetworkBackend {
    runner: Arc<dyn CommandRunner>,
}

impl DockerNetworkBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    fn network(desired: &DesiredResource) -> Result<(&str, &str, &str)> {
        match desired.artifact() {
            Artifact::Network {
                name,
                subnet,
                bridge,
            } => Ok((name.as_str(), subnet.as_str(), bridge.as_str())),
            other => Err(Error::resource_apply(
                desired.kind().name(),
                format!("expected a network artifact, got {:?}", other),
            )),
        }
    }

    async fn create(&self, name: &str, subnet: &str, bridge: &str) -> Result<()> {
        let bridge_opt = format!("{}={}", BRIDGE_NAME_OPTION, bridge);
        self.runner
            .run(
                "docker",
                &[
                    "network", "create", "--driver", "bridge", "--subnet", subnet, "--opt",
                    bridge_opt.as_str(), name,
                ],
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ResourceBackend for DockerNetworkBackend {
    fn required_tools(&self) -> &'static [&'static str] {
        &["docker"]
    }

    async fn observe(&self, desired: &DesiredResource) -> Result<Observation> {
        let (name, _, _) = Self::network(desired)?;

        let output = match self
            .runner
            .run("docker", &["network", "inspect", "--format", INSPECT_FORMAT, name])
            .await
        {
            Ok(output) => output,
            Err(e) => {
                tracing::debug!("Network {} not inspectable, treating as absent: {}", name, e);
                return Ok(Observation::absent());
            }
        };

        let mut fields = output.split_whitespace();
        let subnet = fields.next().unwrap_or_default();
        let bridge = fields.next().unwrap_or_default();
        Ok(Observation::with_content(render_network(name, subnet, bridge)))
    }

    async fn apply(&self, desired: &DesiredResource, action: Action) -> Result<()> {
        let (name, subnet, bridge) = Self::network(desired)?;

        // Subnet and bridge are fixed at creation time
        if action == Action::Update {
            tracing::info!("Recreating network {}", name);
            self.runner.run("docker", &["network", "rm", name]).await?;
        }
        self.create(name, subnet, bridge).await
    }
}

/// Manages the compose file describing the proxy and its database
///
/// The stack unit owns the running containers; a changed definition only
/// restarts them if the unit is already up.
pub struct ComposeBackend {
    systemctl: Systemctl,
}

impl ComposeBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            systemctl: Systemctl::new(runner),
        }
    }
}

#[async_trait]
impl ResourceBackend for ComposeBackend {
    fn required_tools(&self) -> &'static [&'static str] {
        &["docker", "systemctl"]
    }

    async fn observe(&self, desired: &DesiredResource) -> Result<Observation> {
        let (path, _) = file_artifact(desired)?;
        Ok(match read_if_exists(path).await? {
            Some(content) => Observation::with_content(content),
            None => Observation::absent(),
        })
    }

    async fn apply(&self, desired: &DesiredResource, action: Action) -> Result<()> {
        let (path, mode) = file_artifact(desired)?;
        write_atomic(path, desired.content(), mode).await?;

        if action == Action::Update {
            self.systemctl.try_restart(STACK_UNIT_NAME).await?;
        }
        Ok(())
    }
}
