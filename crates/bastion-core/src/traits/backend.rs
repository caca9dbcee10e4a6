// # Resource Backend Trait
//
// Defines how one kind of host artifact is observed and applied.
//
// ## Purpose
//
// Backends are the only code that touches the host. They report what they
// see as an `Observation` and carry out whatever `Action` the planner
// decided; they never decide anything themselves.
//
// ## Implementations
//
// - Host backends (bastion-host): files, sysctl, wg-quick, docker, systemd, iptables
// - Test fakes: in-memory hosts with call counters

use async_trait::async_trait;

use crate::planner::Action;
use crate::resources::DesiredResource;

/// What a backend found on the host
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// Whether the artifact exists at all
    pub exists: bool,

    /// Canonical content, when the artifact can be read back
    ///
    /// `None` for opaque artifacts whose state cannot be reproduced
    /// byte-for-byte; those are compared through the fingerprint ledger.
    pub content: Option<String>,

    /// Whether the service backing the artifact is running, if it has one
    pub service_active: Option<bool>,
}

impl Observation {
    /// Nothing there
    pub fn absent() -> Self {
        Self::default()
    }

    /// Present with readable content
    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            exists: true,
            content: Some(content.into()),
            service_active: None,
        }
    }

    /// Present, but content cannot be read back
    pub fn opaque() -> Self {
        Self {
            exists: true,
            content: None,
            service_active: None,
        }
    }

    /// Attach the state of the backing service
    pub fn service(mut self, active: bool) -> Self {
        self.service_active = Some(active);
        self
    }
}

/// Trait for resource backends
///
/// # Contract
///
/// - `observe` must not mutate the host
/// - `apply` receives only `Create` or `Update`; it must leave the artifact
///   in the desired state or return an error
/// - Implementations must be thread-safe
#[async_trait]
pub trait ResourceBackend: Send + Sync {
    /// External tools this backend invokes, checked before any mutation
    fn required_tools(&self) -> &'static [&'static str];

    /// Report the current state of the artifact
    async fn observe(&self, desired: &DesiredResource) -> Result<Observation, crate::Error>;

    /// Bring the artifact to its desired state
    async fn apply(&self, desired: &DesiredResource, action: Action) -> Result<(), crate::Error>;
}
