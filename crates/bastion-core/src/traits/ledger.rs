// # Fingerprint Store Trait
//
// Defines the ledger of last-applied desired state.
//
// ## Purpose
//
// Some artifacts cannot be read back in a form comparable with what was
// rendered (a container network, a firewall chain). For those the planner
// compares the desired fingerprint against the one recorded after the last
// successful apply.
//
// ## Implementations
//
// - File-based: JSON with atomic writes and a backup copy
// - In-memory: tests and dry runs

use async_trait::async_trait;

use crate::fingerprint::Fingerprint;

/// Ledger entry for one resource
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LedgerRecord {
    /// Fingerprint of the content last applied
    pub fingerprint: Fingerprint,
    /// When it was applied
    pub applied_at: chrono::DateTime<chrono::Utc>,
}

impl LedgerRecord {
    pub(crate) fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            applied_at: chrono::Utc::now(),
        }
    }
}

/// Trait for fingerprint ledgers
///
/// Keys are resource names (see `ResourceKind::name`).
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    /// Fingerprint last applied for a resource
    async fn get(&self, resource: &str) -> Result<Option<LedgerRecord>, crate::Error>;

    /// Record a successful apply
    async fn record(&self, resource: &str, fingerprint: &Fingerprint)
    -> Result<(), crate::Error>;

    /// Drop a resource from the ledger
    async fn forget(&self, resource: &str) -> Result<(), crate::Error>;

    /// All resource names in the ledger
    async fn list(&self) -> Result<Vec<String>, crate::Error>;

    /// Persist any pending changes
    async fn flush(&self) -> Result<(), crate::Error>;
}
