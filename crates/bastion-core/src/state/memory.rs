// # Memory Ledger
//
// In-memory implementation of FingerprintStore. Nothing survives the
// process, so every opaque resource is re-applied on the next run.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::fingerprint::Fingerprint;
use crate::traits::ledger::{FingerprintStore, LedgerRecord};

/// In-memory fingerprint ledger
///
/// Clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
    inner: Arc<RwLock<BTreeMap<String, LedgerRecord>>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[async_trait]
impl FingerprintStore for MemoryLedger {
    async fn get(&self, resource: &str) -> Result<Option<LedgerRecord>, Error> {
        Ok(self.inner.read().await.get(resource).cloned())
    }

    async fn record(&self, resource: &str, fingerprint: &Fingerprint) -> Result<(), Error> {
        self.inner
            .write()
            .await
            .insert(resource.to_string(), LedgerRecord::new(fingerprint.clone()));
        Ok(())
    }

    async fn forget(&self, resource: &str) -> Result<(), Error> {
        self.inner.write().await.remove(resource);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, Error> {
        Ok(self.inner.read().await.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}
