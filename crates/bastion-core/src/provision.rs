//! One provisioning run
//!
//! ```text
//! store ──► Configuration ──► preflight ──► private key ──► desired resources
//!                                                               │
//!                                      ApplyReport ◄── Planner ◄┘
//! ```
//!
//! Everything up to and including the preflight is read-only. The first
//! write is the generated private key, if one is needed.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::{Configuration, HostLayout};
use crate::env_file::EnvFile;
use crate::error::{Error, Result};
use crate::planner::{ApplyReport, Planner, ResourceOutcome};
use crate::preflight::Preflight;
use crate::resources::{self, ResourceKind};
use crate::secrets;
use crate::traits::KeyGenerator;

/// Result of a provisioning run
#[derive(Debug)]
pub struct ProvisionSummary {
    /// Configuration the run converged to, with the resolved private key
    pub config: Configuration,
    pub report: ApplyReport,
}

impl ProvisionSummary {
    pub fn is_success(&self) -> bool {
        self.report.is_success()
    }

    /// Whether the proxy stack was started for the first time in this run
    ///
    /// The factory-default admin credentials only exist on a fresh stack, so
    /// that is the only time the handshake is started automatically.
    pub fn should_bootstrap_credentials(&self) -> bool {
        self.report.outcome(ResourceKind::StackUnit) == Some(&ResourceOutcome::Created)
    }
}

/// Drives a complete provisioning run
pub struct Provisioner {
    planner: Planner,
    keygen: Arc<dyn KeyGenerator>,
    layout: HostLayout,
    preflight: Preflight,
}

impl Provisioner {
    pub fn new(
        planner: Planner,
        keygen: Arc<dyn KeyGenerator>,
        layout: HostLayout,
        preflight: Preflight,
    ) -> Self {
        Self {
            planner,
            keygen,
            layout,
            preflight,
        }
    }

    /// Run the provisioning flow against the configuration store
    ///
    /// Precondition failures are returned before anything is mutated.
    /// Per-resource failures are reported in the summary, not as an error.
    pub async fn run(&self, store: &mut EnvFile) -> Result<ProvisionSummary> {
        let config = Configuration::from_store(store)?;

        let registry = self.planner.registry();
        let unmanaged: Vec<&str> = ResourceKind::ORDER
            .iter()
            .filter(|kind| !registry.has_backend(**kind))
            .map(|kind| kind.name())
            .collect();
        if !unmanaged.is_empty() {
            return Err(Error::config(format!(
                "no backend registered for: {}",
                unmanaged.join(", ")
            )));
        }

        let mut tools = registry.required_tools();
        tools.insert(self.keygen.tool());
        self.preflight.check(tools.iter().copied())?;

        let private_key = secrets::ensure_private_key(store, self.keygen.as_ref()).await?;
        let config = config.with_private_key(private_key);

        match self.keygen.public_key(config.private_key()?).await {
            Ok(public_key) => info!("Bastion WireGuard public key: {}", public_key.trim()),
            Err(e) => warn!("Could not derive the bastion public key: {}", e),
        }

        let desired = resources::desired_resources(&config, &self.layout)?;
        let report = self.planner.converge(&desired).await?;

        Ok(ProvisionSummary { config, report })
    }
}
