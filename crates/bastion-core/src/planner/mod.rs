//! Convergence planner
//!
//! The planner observes every managed resource, classifies it against its
//! desired content, and applies only the delta, in dependency order.
//!
//! ## Architecture
//!
//! ```text
//!  DesiredResource ──► observe ──► classify ──► ManagedResource (frozen)
//!                         │            ▲
//!                         │            │ opaque artifacts
//!                         ▼            │
//!               ┌─────────────────┐  ┌──────────────────┐
//!               │ ResourceBackend │  │ FingerprintStore │
//!               └─────────────────┘  └──────────────────┘
//!                         ▲            │
//!                         │ apply      │ record
//!                         └── Plan ────┘──► ApplyReport
//! ```
//!
//! ## Classification
//!
//! 1. Artifact absent: create
//! 2. Backing service inactive: update
//! 3. Readable content: fingerprint of observed content vs desired
//! 4. Opaque artifact: ledger fingerprint vs desired
//!
//! A failed resource blocks everything that depends on it, directly or
//! transitively. Independent resources still run. Nothing is retried or
//! rolled back.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::fingerprint::Fingerprint;
use crate::registry::BackendRegistry;
use crate::resources::{DesiredResource, ResourceKind};
use crate::traits::{FingerprintStore, LedgerRecord, Observation};

/// Observed state of a resource relative to its desired content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CurrentState {
    Absent,
    PresentStale,
    PresentCurrent,
}

impl fmt::Display for CurrentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CurrentState::Absent => "absent",
            CurrentState::PresentStale => "present-stale",
            CurrentState::PresentCurrent => "present-current",
        })
    }
}

/// What the planner will do with a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Skip,
    Create,
    Update,
}

impl Action {
    /// The action for a classified state
    pub fn for_state(state: CurrentState) -> Self {
        match state {
            CurrentState::Absent => Action::Create,
            CurrentState::PresentStale => Action::Update,
            CurrentState::PresentCurrent => Action::Skip,
        }
    }

    /// Whether the action touches the host
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Action::Skip)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Action::Skip => "skip",
            Action::Create => "create",
            Action::Update => "update",
        })
    }
}

/// Classify an observation
///
/// `recorded` is the ledger entry for the resource; it is only consulted
/// when the observed artifact is opaque.
pub fn classify(
    desired: &DesiredResource,
    observation: &Observation,
    recorded: Option<&LedgerRecord>,
) -> CurrentState {
    if !observation.exists {
        return CurrentState::Absent;
    }

    if observation.service_active == Some(false) {
        return CurrentState::PresentStale;
    }

    let current = match &observation.content {
        Some(content) => Fingerprint::of(content) == *desired.fingerprint(),
        None => recorded.is_some_and(|record| record.fingerprint == *desired.fingerprint()),
    };

    if current {
        CurrentState::PresentCurrent
    } else {
        CurrentState::PresentStale
    }
}

/// A classified resource
///
/// Immutable once planned: the action is derived from the desired content
/// and the observed state, and is acted upon at most once.
#[derive(Debug, Clone)]
pub struct ManagedResource {
    desired: DesiredResource,
    current_state: CurrentState,
    action: Action,
}

impl ManagedResource {
    pub fn new(desired: DesiredResource, current_state: CurrentState) -> Self {
        Self {
            desired,
            current_state,
            action: Action::for_state(current_state),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.desired.kind()
    }

    pub fn name(&self) -> &'static str {
        self.desired.kind().name()
    }

    pub fn desired(&self) -> &DesiredResource {
        &self.desired
    }

    pub fn current_state(&self) -> CurrentState {
        self.current_state
    }

    pub fn action(&self) -> Action {
        self.action
    }
}

/// Classified resources in application order
#[derive(Debug, Clone, Default)]
pub struct Plan {
    resources: Vec<ManagedResource>,
}

impl Plan {
    /// Build a plan, ordering resources by [`ResourceKind::ORDER`]
    pub fn new(mut resources: Vec<ManagedResource>) -> Self {
        resources.sort_by_key(|resource| resource.kind().position());
        Self { resources }
    }

    pub fn resources(&self) -> &[ManagedResource] {
        &self.resources
    }

    pub fn get(&self, kind: ResourceKind) -> Option<&ManagedResource> {
        self.resources.iter().find(|resource| resource.kind() == kind)
    }

    /// Number of resources that will be created or updated
    pub fn mutation_count(&self) -> usize {
        self.resources
            .iter()
            .filter(|resource| resource.action().is_mutation())
            .count()
    }

    /// Whether applying the plan changes nothing
    pub fn is_noop(&self) -> bool {
        self.mutation_count() == 0
    }
}

/// Result of applying one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceOutcome {
    Skipped,
    Created,
    Updated,
    /// The apply step failed
    Failed { error: String },
    /// Not attempted because a dependency failed
    Blocked { by: ResourceKind },
}

impl ResourceOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ResourceOutcome::Failed { .. } | ResourceOutcome::Blocked { .. }
        )
    }
}

/// Outcome of applying a plan
#[derive(Debug, Clone, Default)]
pub struct ApplyReport {
    outcomes: Vec<(ResourceKind, ResourceOutcome)>,
}

impl ApplyReport {
    pub fn outcomes(&self) -> &[(ResourceKind, ResourceOutcome)] {
        &self.outcomes
    }

    pub fn outcome(&self, kind: ResourceKind) -> Option<&ResourceOutcome> {
        self.outcomes
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, outcome)| outcome)
    }

    /// Whether every resource ended up converged
    pub fn is_success(&self) -> bool {
        !self.outcomes.iter().any(|(_, outcome)| outcome.is_failure())
    }

    /// Resources whose apply step failed, with the error
    pub fn failed(&self) -> Vec<(ResourceKind, &str)> {
        self.outcomes
            .iter()
            .filter_map(|(kind, outcome)| match outcome {
                ResourceOutcome::Failed { error } => Some((*kind, error.as_str())),
                _ => None,
            })
            .collect()
    }

    /// Resources not attempted, with the failed dependency that blocked them
    pub fn blocked(&self) -> Vec<(ResourceKind, ResourceKind)> {
        self.outcomes
            .iter()
            .filter_map(|(kind, outcome)| match outcome {
                ResourceOutcome::Blocked { by } => Some((*kind, *by)),
                _ => None,
            })
            .collect()
    }

    fn count(&self, wanted: &ResourceOutcome) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome == wanted)
            .count()
    }

    /// One-line summary suitable for the final log line
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} resource(s): {} created, {} updated, {} unchanged",
            self.outcomes.len(),
            self.count(&ResourceOutcome::Created),
            self.count(&ResourceOutcome::Updated),
            self.count(&ResourceOutcome::Skipped),
        );

        let failed = self.failed();
        if !failed.is_empty() {
            let names: Vec<String> = failed
                .iter()
                .map(|(kind, error)| format!("{} ({})", kind, error))
                .collect();
            summary.push_str(&format!("; failed: {}", names.join(", ")));
        }

        let blocked = self.blocked();
        if !blocked.is_empty() {
            let names: Vec<String> = blocked
                .iter()
                .map(|(kind, by)| format!("{} (by {})", kind, by))
                .collect();
            summary.push_str(&format!("; blocked: {}", names.join(", ")));
        }

        summary
    }
}

/// Convergence planner
///
/// ## Lifecycle
///
/// 1. Create with [`Planner::new`]
/// 2. [`Planner::plan`] observes and classifies (read-only)
/// 3. [`Planner::apply`] acts on the plan once, in order
///
/// [`Planner::converge`] does both.
pub struct Planner {
    registry: Arc<BackendRegistry>,
    ledger: Box<dyn FingerprintStore>,
}

impl Planner {
    pub fn new(registry: Arc<BackendRegistry>, ledger: Box<dyn FingerprintStore>) -> Self {
        Self { registry, ledger }
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    /// Observe and classify every resource
    ///
    /// Read-only. An observation failure aborts planning with the
    /// resource's identity.
    pub async fn plan(&self, desired: &[DesiredResource]) -> Result<Plan> {
        let mut resources = Vec::with_capacity(desired.len());

        for resource in desired {
            let kind = resource.kind();
            let backend = self.registry.backend_for(kind)?;

            let observation = backend
                .observe(resource)
                .await
                .map_err(|e| Error::resource_apply(kind.name(), format!("observe failed: {}", e)))?;

            let recorded = if observation.exists && observation.content.is_none() {
                self.ledger.get(kind.name()).await?
            } else {
                None
            };

            let state = classify(resource, &observation, recorded.as_ref());
            debug!(
                "{}: {} (desired {})",
                kind,
                state,
                resource.fingerprint().short()
            );

            resources.push(ManagedResource::new(resource.clone(), state));
        }

        let plan = Plan::new(resources);
        info!(
            "Plan: {} of {} resource(s) need changes",
            plan.mutation_count(),
            plan.resources().len()
        );
        Ok(plan)
    }

    /// Apply a plan in order
    ///
    /// Never fails as a whole; per-resource results are in the report.
    /// Ledger entries for resource kinds that are no longer managed are
    /// dropped before the ledger is flushed.
    pub async fn apply(&self, plan: &Plan) -> ApplyReport {
        let mut report = ApplyReport::default();
        // Failed or blocked kind -> the failed resource at the root
        let mut broken: HashMap<ResourceKind, ResourceKind> = HashMap::new();

        for resource in plan.resources() {
            let kind = resource.kind();

            let blocker = kind
                .depends_on()
                .iter()
                .find_map(|dependency| broken.get(dependency).copied());
            if let Some(root) = blocker {
                warn!("{}: not applied, blocked by failed {}", kind, root);
                broken.insert(kind, root);
                report
                    .outcomes
                    .push((kind, ResourceOutcome::Blocked { by: root }));
                continue;
            }

            let outcome = match resource.action() {
                Action::Skip => {
                    debug!("{}: up to date", kind);
                    self.sync_ledger(resource).await;
                    ResourceOutcome::Skipped
                }
                action => match self.apply_one(resource, action).await {
                    Ok(()) => {
                        info!(
                            "{}: {} complete ({})",
                            kind,
                            action,
                            resource.desired().fingerprint().short()
                        );
                        if action == Action::Create {
                            ResourceOutcome::Created
                        } else {
                            ResourceOutcome::Updated
                        }
                    }
                    Err(e) => {
                        error!("{}", e);
                        broken.insert(kind, kind);
                        ResourceOutcome::Failed {
                            error: match e {
                                Error::ResourceApply { message, .. } => message,
                                other => other.to_string(),
                            },
                        }
                    }
                },
            };

            report.outcomes.push((kind, outcome));
        }

        self.prune_ledger().await;
        if let Err(e) = self.ledger.flush().await {
            warn!("Failed to persist fingerprint ledger: {}", e);
        }

        report
    }

    /// Plan and apply
    pub async fn converge(&self, desired: &[DesiredResource]) -> Result<ApplyReport> {
        let plan = self.plan(desired).await?;
        Ok(self.apply(&plan).await)
    }

    async fn apply_one(&self, resource: &ManagedResource, action: Action) -> Result<()> {
        let kind = resource.kind();
        info!("{}: {} ({})", kind, action, resource.current_state());

        let backend = self.registry.backend_for(kind)?;
        backend
            .apply(resource.desired(), action)
            .await
            .map_err(|e| Error::resource_apply(kind.name(), e.to_string()))?;

        if let Err(e) = self
            .ledger
            .record(kind.name(), resource.desired().fingerprint())
            .await
        {
            warn!("{}: failed to record fingerprint: {}", kind, e);
        }

        Ok(())
    }

    /// Drop ledger entries that no longer name a managed resource kind
    async fn prune_ledger(&self) {
        let recorded = match self.ledger.list().await {
            Ok(names) => names,
            Err(e) => {
                warn!("Failed to list fingerprint ledger: {}", e);
                return;
            }
        };

        for name in recorded {
            if ResourceKind::ORDER.iter().any(|kind| kind.name() == name) {
                continue;
            }
            match self.ledger.forget(&name).await {
                Ok(()) => info!("{}: no longer managed, dropped from the ledger", name),
                Err(e) => warn!("{}: failed to drop from the ledger: {}", name, e),
            }
        }
    }

    async fn sync_ledger(&self, resource: &ManagedResource) {
        let name = resource.name();
        let desired = resource.desired().fingerprint();

        let in_sync = match self.ledger.get(name).await {
            Ok(Some(record)) => record.fingerprint == *desired,
            Ok(None) => false,
            Err(e) => {
                warn!("{}: failed to read ledger: {}", name, e);
                return;
            }
        };

        if !in_sync {
            if let Err(e) = self.ledger.record(name, desired).await {
                warn!("{}: failed to record fingerprint: {}", name, e);
            }
        }
    }
}
