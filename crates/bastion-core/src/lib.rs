// # bastion-core
//
// Core library for the bastion provisioning system.
//
// ## Architecture Overview
//
// This library owns every decision the provisioner makes; the host crates
// only execute them:
// - **Configuration**: Immutable settings gathered once from the key=value store
// - **ResourceBackend**: Trait for observing and applying one kind of host artifact
// - **FingerprintStore**: Ledger of the last-applied desired state (idempotency)
// - **Planner**: Classifies every managed resource and applies the delta in dependency order
// - **BackendRegistry**: Maps resource kinds to the backend that manages them
// - **HandshakeAgent**: Background task that bootstraps the proxy's admin credentials
//
// ## Design Principles
//
// 1. **Fail Fast**: Configuration and preconditions are validated before any mutation
// 2. **Convergence**: Only the delta between desired and observed state is applied
// 3. **Capability Seams**: Every external tool sits behind a trait, so the core is testable
// 4. **Library-First**: The binary is a thin wiring layer over `Provisioner`

pub mod config;
pub mod env_file;
pub mod error;
pub mod fingerprint;
pub mod handshake;
pub mod planner;
pub mod preflight;
pub mod provision;
pub mod registry;
pub mod resources;
pub mod secrets;
pub mod state;
pub mod traits;

// Re-export core types for convenience
pub use config::{Configuration, HostLayout, Secret};
pub use env_file::EnvFile;
pub use error::{Error, Result};
pub use fingerprint::Fingerprint;
pub use handshake::{HandshakeAgent, HandshakeEvent, HandshakeHandle, HandshakeOutcome, HandshakeState};
pub use planner::{
    Action, ApplyReport, CurrentState, ManagedResource, Plan, Planner, ResourceOutcome,
};
pub use preflight::Preflight;
pub use provision::{ProvisionSummary, Provisioner};
pub use registry::BackendRegistry;
pub use resources::{DesiredResource, ResourceKind};
pub use state::{FileLedger, MemoryLedger};
pub use traits::{
    AdminApi, CredentialUpdate, FingerprintStore, KeyGenerator, Observation, ResourceBackend,
};
