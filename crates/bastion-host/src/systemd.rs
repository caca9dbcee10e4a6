//! systemd service helpers and the stack unit backend

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bastion_core::traits::Observation;
use bastion_core::{Action, DesiredResource, Error, ResourceBackend, Result};

use crate::files::{file_artifact, read_if_exists, write_atomic};
use crate::runner::CommandRunner;

/// Thin wrapper over `systemctl`
#[derive(Clone)]
pub struct Systemctl {
    runner: Arc<dyn CommandRunner>,
}

impl Systemctl {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    pub async fn is_active(&self, service: &str) -> bool {
        self.runner
            .succeeds("systemctl", &["is-active", "--quiet", service])
            .await
    }

    pub async fn daemon_reload(&self) -> Result<()> {
        self.runner.run("systemctl", &["daemon-reload"]).await?;
        Ok(())
    }

    /// Start a service for the first time, or restart it after a change
    ///
    /// Both enable the service so it comes back after a reboot.
    pub async fn activate(&self, service: &str, action: Action) -> Result<()> {
        match action {
            Action::Create => {
                self.runner
                    .run("systemctl", &["enable", "--now", service])
                    .await?;
            }
            Action::Update => {
                self.runner.run("systemctl", &["enable", service]).await?;
                self.runner.run("systemctl", &["restart", service]).await?;
            }
            Action::Skip => {}
        }
        Ok(())
    }

    /// Restart a service only if it is already running
    pub async fn try_restart(&self, service: &str) -> Result<()> {
        self.runner
            .run("systemctl", &["try-restart", service])
            .await?;
        Ok(())
    }
}

/// Observe a config file together with the service it drives
pub(crate) async fn observe_with_service(
    path: &Path,
    systemctl: &Systemctl,
    service: &str,
) -> Result<Observation> {
    Ok(match read_if_exists(path).await? {
        Some(content) => {
            Observation::with_content(content).service(systemctl.is_active(service).await)
        }
        None => Observation::absent(),
    })
}

/// Manages the unit file that supervises the proxy stack
pub struct SystemdUnitBackend {
    systemctl: Systemctl,
}

impl SystemdUnitBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            systemctl: Systemctl::new(runner),
        }
    }

    fn unit_name(path: &Path) -> Result<String> {
        path.file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .ok_or_else(|| Error::config(format!("unit path has no file name: {}", path.display())))
    }
}

#[async_trait]
impl ResourceBackend for SystemdUnitBackend {
    fn required_tools(&self) -> &'static [&'static str] {
        &["systemctl"]
    }

    async fn observe(&self, desired: &DesiredResource) -> Result<Observation> {
        let (path, _) = file_artifact(desired)?;
        observe_with_service(path, &self.systemctl, &Self::unit_name(path)?).await
    }

    async fn apply(&self, desired: &DesiredResource, action: Action) -> Result<()> {
        let (path, mode) = file_artifact(desired)?;
        let unit = Self::unit_name(path)?;

        write_atomic(path, desired.content(), mode).await?;
        self.systemctl.daemon_reload().await?;
        self.systemctl.activate(&unit, action).await
    }
}
