//! Core traits for the bastion system
//!
//! Every side effect the provisioner performs goes through one of these seams.
//!
//! - [`ResourceBackend`]: Observe and apply one kind of host artifact
//! - [`FingerprintStore`]: Ledger of last-applied fingerprints
//! - [`KeyGenerator`]: WireGuard key material
//! - [`AdminApi`]: The reverse proxy's admin API

pub mod admin_api;
pub mod backend;
pub mod keygen;
pub mod ledger;

pub use admin_api::{AdminApi, CredentialUpdate};
pub use backend::{Observation, ResourceBackend};
pub use keygen::KeyGenerator;
pub use ledger::{FingerprintStore, LedgerRecord};
