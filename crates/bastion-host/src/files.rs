//! Managed file helpers

use std::path::{Path, PathBuf};

use bastion_core::resources::Artifact;
use bastion_core::{DesiredResource, Error, Result};
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// Path and mode of a file-backed resource
pub fn file_artifact(desired: &DesiredResource) -> Result<(&Path, u32)> {
    match desired.artifact() {
        Artifact::File { path, mode } => Ok((path.as_path(), *mode)),
        other => Err(Error::resource_apply(
            desired.kind().name(),
            format!("expected a file artifact, got {:?}", other),
        )),
    }
}

/// Read a file, `None` if it does not exist
pub async fn read_if_exists(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Write a file atomically with the given permission bits
///
/// The content never exists on disk with wider permissions than `mode`.
pub async fn write_atomic(path: &Path, content: &str, mode: u32) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).await?;
        }
    }

    let temp_path = temp_path(path);
    {
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(mode);

        let mut file = options.open(&temp_path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to create temp file {}: {}",
                temp_path.display(),
                e
            ))
        })?;
        file.write_all(content.as_bytes()).await?;
        file.flush().await?;
    }

    // The umask may have narrowed the mode, and an existing temp file keeps its own
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&temp_path, std::fs::Permissions::from_mode(mode)).await?;
    }

    fs::rename(&temp_path, path).await.map_err(|e| {
        Error::state_store(format!(
            "Failed to rename {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        ))
    })?;

    tracing::debug!("Wrote {} ({:o})", path.display(), mode);
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".bastion-tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn writes_with_mode_and_creates_parents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("etc/wireguard/wg0.conf");

        write_atomic(&path, "[Interface]\n", 0o600).await.unwrap();

        assert_eq!(
            read_if_exists(&path).await.unwrap().as_deref(),
            Some("[Interface]\n")
        );
        assert!(!temp_path(&path).exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        assert_eq!(read_if_exists(&dir.path().join("absent")).await.unwrap(), None);
    }
}
