//! Kernel forwarding via a sysctl drop-in

use std::sync::Arc;

use async_trait::async_trait;
use bastion_core::traits::Observation;
use bastion_core::{Action, DesiredResource, ResourceBackend, Result};

use crate::files::{file_artifact, read_if_exists, write_atomic};
use crate::runner::CommandRunner;

/// Writes the drop-in and loads it with `sysctl -p`
pub struct SysctlBackend {
    runner: Arc<dyn CommandRunner>,
}

impl SysctlBackend {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl ResourceBackend for SysctlBackend {
    fn required_tools(&self) -> &'static [&'static str] {
        &["sysctl"]
    }

    async fn observe(&self, desired: &DesiredResource) -> Result<Observation> {
        let (path, _) = file_artifact(desired)?;
        Ok(match read_if_exists(path).await? {
            Some(content) => Observation::with_content(content),
            None => Observation::absent(),
        })
    }

    async fn apply(&self, desired: &DesiredResource, _action: Action) -> Result<()> {
        let (path, mode) = file_artifact(desired)?;
        write_atomic(path, desired.content(), mode).await?;

        let path = path.to_string_lossy();
        self.runner.run("sysctl", &["-p", path.as_ref()]).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use bastion_core::resources::Artifact;
    use bastion_core::ResourceKind;
    use tempfile::tempdir;

    #[tokio::test]
    async fn apply_writes_and_loads_drop_in() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("99-bastion-forwarding.conf");
        let desired = DesiredResource::new(
            ResourceKind::Forwarding,
            Artifact::File {
                path: path.clone(),
                mode: 0o644,
            },
            "net.ipv4.ip_forward = 1\n",
        );

        let runner = Arc::new(RecordingRunner::new());
        let backend = SysctlBackend::new(runner.clone());

        assert_eq!(backend.observe(&desired).await.unwrap(), Observation::absent());

        backend.apply(&desired, Action::Create).await.unwrap();
        assert_eq!(
            runner.commands(),
            vec![format!("sysctl -p {}", path.display())]
        );
        assert_eq!(
            backend.observe(&desired).await.unwrap(),
            Observation::with_content("net.ipv4.ip_forward = 1\n")
        );
    }
}
