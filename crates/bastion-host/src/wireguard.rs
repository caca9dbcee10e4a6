//! WireGuard interface via wg-quick, and key material via `wg`

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bastion_core::resources::wireguard::service_name;
use bastion_core::traits::Observation;
use bastion_core::{
    Action, DesiredResource, Error, KeyGenerator, ResourceBackend, Result, Secret,
};

use crate::files::{file_artifact, write_atomic};
use crate::runner::CommandRunner;
use crate::systemd::{Systemctl, observe_with_service};

/// Manages `<iface>.conf` and the matching `wg-quick@<iface>` service
pub struct WireGuardBackend {
    systemctl: Systemctl,
}

impl WireGuardBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            systemctl: Systemctl::new(runner),
        }
    }

    /// The interface is named after the config file
    fn service_for(path: &Path) -> Result<String> {
        path.file_stem()
            .map(|stem| service_name(&stem.to_string_lossy()))
            .ok_or_else(|| {
                Error::config(format!(
                    "wireguard config path has no file name: {}",
                    path.display()
                ))
            })
    }
}

#[async_trait]
impl ResourceBackend for WireGuardBackend {
    fn required_tools(&self) -> &'static [&'static str] {
        &["systemctl", "wg-quick"]
    }

    async fn observe(&self, desired: &DesiredResource) -> Result<Observation> {
        let (path, _) = file_artifact(desired)?;
        observe_with_service(path, &self.systemctl, &Self::service_for(path)?).await
    }

    async fn apply(&self, desired: &DesiredResource, action: Action) -> Result<()> {
        let (path, mode) = file_artifact(desired)?;
        let service = Self::service_for(path)?;

        write_atomic(path, desired.content(), mode).await?;
        self.systemctl.activate(&service, action).await
    }
}

/// Key generation through the `wg` tool
pub struct WgKeyGenerator {
    runner: Arc<dyn CommandRunner>,
}

impl WgKeyGenerator {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl KeyGenerator for WgKeyGenerator {
    fn tool(&self) -> &'static str {
        "wg"
    }

    async fn generate_private_key(&self) -> Result<Secret> {
        let output = self.runner.run("wg", &["genkey"]).await?;
        Ok(Secret::new(output.trim()))
    }

    async fn public_key(&self, private_key: &Secret) -> Result<String> {
        let output = self
            .runner
            .run_with_input("wg", &["pubkey"], private_key.expose())
            .await?;
        Ok(output.trim().to_string())
    }
}
