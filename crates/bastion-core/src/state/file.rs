// # File Ledger
//
// File-based implementation of FingerprintStore with crash recovery.
//
// ## Crash Recovery
//
// - Atomic writes: write-then-rename
// - Backup: the previous good ledger is kept as `.backup`
// - Corruption: a ledger that fails to parse falls back to the backup, then
//   to an empty ledger (which only costs a re-apply of opaque resources)
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "resources": {
//     "container-network": {
//       "fingerprint": "sha256:…",
//       "applied_at": "2026-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::fingerprint::Fingerprint;
use crate::traits::ledger::{FingerprintStore, LedgerRecord};

/// Ledger file format version
const LEDGER_FILE_VERSION: &str = "1.0";

/// File-based fingerprint ledger
///
/// Unlike a write-through store, records are buffered and written by
/// [`FingerprintStore::flush`]; the planner flushes once per run.
#[derive(Debug)]
pub struct FileLedger {
    path: PathBuf,
    state: Arc<RwLock<LedgerState>>,
}

#[derive(Debug)]
struct LedgerState {
    resources: BTreeMap<String, LedgerRecord>,
    dirty: bool,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct LedgerFileFormat {
    version: String,
    resources: BTreeMap<String, LedgerRecord>,
}

impl FileLedger {
    /// Open or create a ledger
    ///
    /// Creates the parent directory if needed.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    Error::state_store(format!(
                        "Failed to create ledger directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let resources = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(LedgerState {
                resources,
                dirty: false,
            })),
        })
    }

    async fn load_with_recovery(path: &Path) -> Result<BTreeMap<String, LedgerRecord>, Error> {
        let content = match Self::read(path).await? {
            Some(content) => content,
            None => {
                tracing::debug!("Ledger does not exist yet: {}", path.display());
                return Ok(BTreeMap::new());
            }
        };

        match Self::parse(&content) {
            Ok(resources) => {
                tracing::debug!("Loaded ledger: {} resource(s)", resources.len());
                Ok(resources)
            }
            Err(e) => {
                tracing::warn!(
                    "Ledger {} appears corrupted: {}. Attempting recovery from backup.",
                    path.display(),
                    e
                );

                let backup_path = Self::backup_path(path);
                let backup = match Self::read(&backup_path).await {
                    Ok(Some(backup)) => backup,
                    _ => {
                        tracing::warn!("No usable backup ledger. Starting empty.");
                        return Ok(BTreeMap::new());
                    }
                };

                match Self::parse(&backup) {
                    Ok(resources) => {
                        tracing::info!("Recovered ledger from backup: {} resource(s)", resources.len());
                        if let Err(restore_err) = fs::copy(&backup_path, path).await {
                            tracing::error!("Failed to restore ledger from backup: {}", restore_err);
                        }
                        Ok(resources)
                    }
                    Err(backup_err) => {
                        tracing::error!(
                            "Backup ledger also corrupted: {}. Starting empty.",
                            backup_err
                        );
                        Ok(BTreeMap::new())
                    }
                }
            }
        }
    }

    async fn read(path: &Path) -> Result<Option<String>, Error> {
        match fs::read_to_string(path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(Error::state_store(format!(
                "Failed to read ledger {}: {}",
                path.display(),
                e
            ))),
        }
    }

    fn parse(content: &str) -> Result<BTreeMap<String, LedgerRecord>, Error> {
        let ledger: LedgerFileFormat = serde_json::from_str(content)?;

        if ledger.version != LEDGER_FILE_VERSION {
            tracing::warn!(
                "Ledger version mismatch: expected {}, got {}. Attempting to load anyway.",
                LEDGER_FILE_VERSION,
                ledger.version
            );
        }

        Ok(ledger.resources)
    }

    async fn write(&self) -> Result<(), Error> {
        let mut state = self.state.write().await;

        let ledger = LedgerFileFormat {
            version: LEDGER_FILE_VERSION.to_string(),
            resources: state.resources.clone(),
        };
        let json = serde_json::to_string_pretty(&ledger)?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::state_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await?;
            file.flush().await?;
        }

        if self.path.exists() {
            if let Err(e) = fs::copy(&self.path, Self::backup_path(&self.path)).await {
                tracing::warn!("Failed to back up ledger: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::state_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        state.dirty = false;
        tracing::trace!("Ledger written: {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl FingerprintStore for FileLedger {
    async fn get(&self, resource: &str) -> Result<Option<LedgerRecord>, Error> {
        Ok(self.state.read().await.resources.get(resource).cloned())
    }

    async fn record(&self, resource: &str, fingerprint: &Fingerprint) -> Result<(), Error> {
        let mut state = self.state.write().await;
        state
            .resources
            .insert(resource.to_string(), LedgerRecord::new(fingerprint.clone()));
        state.dirty = true;
        Ok(())
    }

    async fn forget(&self, resource: &str) -> Result<(), Error> {
        let mut state = self.state.write().await;
        if state.resources.remove(resource).is_some() {
            state.dirty = true;
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self.state.read().await.resources.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        if self.state.read().await.dirty {
            self.write().await
        } else {
            Ok(())
        }
    }
}
