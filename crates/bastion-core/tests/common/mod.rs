//! Test doubles and common utilities for contract tests
//!
//! The fakes model a host in memory so the planner, provisioner and
//! handshake agent can be exercised without touching the machine.

#![allow(dead_code)]

use async_trait::async_trait;
use bastion_core::error::{Error, Result};
use bastion_core::traits::{AdminApi, CredentialUpdate, KeyGenerator, Observation, ResourceBackend};
use bastion_core::{
    Action, BackendRegistry, Configuration, DesiredResource, EnvFile, HostLayout, MemoryLedger,
    Planner, Preflight, Provisioner, ResourceKind, Secret,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// The example configuration store, private key unset
pub const SCENARIO_STORE: &str = "\
DOMAIN=example.com
ADMIN_EMAIL=a@b.com
ADMIN_PASSWORD=secret123
DB_PASSWORD=dbpass
WG_PEER_PUBLIC_KEY=ABC
WG_CLIENT_IP=10.0.0.2
WG_ALLOWED_IPS=10.0.0.0/24
WG_PRIVATE_KEY=
";

pub fn scenario_store() -> EnvFile {
    EnvFile::parse(SCENARIO_STORE)
}

/// Scenario configuration with a fixed private key
pub fn scenario_config() -> Configuration {
    Configuration::from_store(&scenario_store())
        .unwrap()
        .with_private_key(Secret::new("fixed-private-key"))
}

/// One artifact on the fake host
#[derive(Debug, Clone)]
pub struct HostArtifact {
    pub content: String,
    pub service_active: Option<bool>,
}

#[derive(Default)]
struct HostState {
    artifacts: HashMap<ResourceKind, HostArtifact>,
    failing: HashSet<ResourceKind>,
    applied: Vec<(ResourceKind, Action)>,
    observe_count: usize,
}

/// In-memory host shared by all fake backends
#[derive(Clone, Default)]
pub struct FakeHost {
    state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self, kind: ResourceKind) -> Option<String> {
        let state = self.state.lock().unwrap();
        state.artifacts.get(&kind).map(|a| a.content.clone())
    }

    /// Overwrite an artifact behind the provisioner's back
    pub fn set_content(&self, kind: ResourceKind, content: &str) {
        let mut state = self.state.lock().unwrap();
        let artifact = state.artifacts.entry(kind).or_insert(HostArtifact {
            content: String::new(),
            service_active: None,
        });
        artifact.content = content.to_string();
    }

    /// Stop or start an artifact's service
    pub fn set_service_active(&self, kind: ResourceKind, active: bool) {
        let mut state = self.state.lock().unwrap();
        if let Some(artifact) = state.artifacts.get_mut(&kind) {
            artifact.service_active = Some(active);
        }
    }

    /// Make every apply of `kind` fail
    pub fn fail_on(&self, kind: ResourceKind) {
        self.state.lock().unwrap().failing.insert(kind);
    }

    /// Every apply performed, in order
    pub fn applied(&self) -> Vec<(ResourceKind, Action)> {
        self.state.lock().unwrap().applied.clone()
    }

    pub fn apply_count(&self) -> usize {
        self.state.lock().unwrap().applied.len()
    }

    pub fn observe_count(&self) -> usize {
        self.state.lock().unwrap().observe_count
    }

    pub fn clear_history(&self) {
        self.state.lock().unwrap().applied.clear();
    }
}

/// Backend over the fake host
pub struct FakeBackend {
    host: FakeHost,
    /// Content cannot be read back (ledger comparison)
    opaque: bool,
    /// Artifact has a service that apply starts
    has_service: bool,
    tools: &'static [&'static str],
}

impl FakeBackend {
    pub fn new(host: &FakeHost, opaque: bool, has_service: bool, tools: &'static [&'static str]) -> Self {
        Self {
            host: host.clone(),
            opaque,
            has_service,
            tools,
        }
    }
}

#[async_trait]
impl ResourceBackend for FakeBackend {
    fn required_tools(&self) -> &'static [&'static str] {
        self.tools
    }

    async fn observe(&self, desired: &DesiredResource) -> Result<Observation> {
        let mut state = self.host.state.lock().unwrap();
        state.observe_count += 1;

        let Some(artifact) = state.artifacts.get(&desired.kind()) else {
            return Ok(Observation::absent());
        };

        let mut observation = if self.opaque {
            Observation::opaque()
        } else {
            Observation::with_content(artifact.content.clone())
        };
        observation.service_active = artifact.service_active;
        Ok(observation)
    }

    async fn apply(&self, desired: &DesiredResource, action: Action) -> Result<()> {
        let mut state = self.host.state.lock().unwrap();
        let kind = desired.kind();
        state.applied.push((kind, action));

        if state.failing.contains(&kind) {
            return Err(Error::backend(self.tools[0], format!("{} refused", kind)));
        }

        state.artifacts.insert(
            kind,
            HostArtifact {
                content: desired.content().to_string(),
                service_active: self.has_service.then_some(true),
            },
        );
        Ok(())
    }
}

/// Registry with a fake backend for every resource kind
pub fn fake_registry(host: &FakeHost) -> BackendRegistry {
    let registry = BackendRegistry::new();
    registry.register(
        ResourceKind::Forwarding,
        Arc::new(FakeBackend::new(host, false, false, &["sysctl"])),
    );
    registry.register(
        ResourceKind::WireGuard,
        Arc::new(FakeBackend::new(host, false, true, &["systemctl"])),
    );
    registry.register(
        ResourceKind::ContainerNetwork,
        Arc::new(FakeBackend::new(host, true, false, &["docker"])),
    );
    registry.register(
        ResourceKind::StackDefinition,
        Arc::new(FakeBackend::new(host, false, false, &["docker"])),
    );
    registry.register(
        ResourceKind::StackUnit,
        Arc::new(FakeBackend::new(host, false, true, &["systemctl"])),
    );
    registry.register(
        ResourceKind::Firewall,
        Arc::new(FakeBackend::new(host, true, false, &["iptables"])),
    );
    registry
}

pub fn fake_planner(host: &FakeHost, ledger: &MemoryLedger) -> Planner {
    Planner::new(Arc::new(fake_registry(host)), Box::new(ledger.clone()))
}

/// Key generator that counts calls and never repeats a key
#[derive(Default)]
pub struct CountingKeygen {
    generated: Arc<AtomicUsize>,
}

impl CountingKeygen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generated_count(&self) -> usize {
        self.generated.load(Ordering::SeqCst)
    }

    pub fn sharing_counters_with(other: &Self) -> Self {
        Self {
            generated: Arc::clone(&other.generated),
        }
    }
}

#[async_trait]
impl KeyGenerator for CountingKeygen {
    fn tool(&self) -> &'static str {
        "wg"
    }

    async fn generate_private_key(&self) -> Result<Secret> {
        let n = self.generated.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Secret::new(format!("generated-private-key-{}=", n)))
    }

    async fn public_key(&self, private_key: &Secret) -> Result<String> {
        Ok(format!("public-of-{}", private_key.expose().len()))
    }
}

/// Provisioner over the fake host, running as root with every tool present
pub fn fake_provisioner(
    host: &FakeHost,
    ledger: &MemoryLedger,
    keygen: &Arc<CountingKeygen>,
) -> Provisioner {
    Provisioner::new(
        fake_planner(host, ledger),
        keygen.clone(),
        HostLayout::under("/stage"),
        Preflight::new(true, |_| true),
    )
}

/// Admin API with a scripted readiness and response
pub struct ScriptedAdminApi {
    /// Probe number (1-based) that first succeeds; `None` never does
    ready_at: Option<usize>,
    response: std::result::Result<serde_json::Value, String>,
    probe_count: Arc<AtomicUsize>,
    mutation_count: Arc<AtomicUsize>,
    last_update: Arc<Mutex<Option<CredentialUpdate>>>,
}

impl ScriptedAdminApi {
    pub fn ready_at(probe: usize) -> Self {
        Self::new(Some(probe))
    }

    pub fn never_ready() -> Self {
        Self::new(None)
    }

    fn new(ready_at: Option<usize>) -> Self {
        Self {
            ready_at,
            response: Ok(serde_json::json!({"id": 1, "email": "a@b.com"})),
            probe_count: Arc::new(AtomicUsize::new(0)),
            mutation_count: Arc::new(AtomicUsize::new(0)),
            last_update: Arc::new(Mutex::new(None)),
        }
    }

    pub fn responding(mut self, body: serde_json::Value) -> Self {
        self.response = Ok(body);
        self
    }

    pub fn rejecting(mut self, message: &str) -> Self {
        self.response = Err(message.to_string());
        self
    }

    pub fn probe_count(&self) -> usize {
        self.probe_count.load(Ordering::SeqCst)
    }

    pub fn mutation_count(&self) -> usize {
        self.mutation_count.load(Ordering::SeqCst)
    }

    pub fn last_update(&self) -> Option<CredentialUpdate> {
        self.last_update.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdminApi for ScriptedAdminApi {
    async fn probe(&self) -> Result<()> {
        let n = self.probe_count.fetch_add(1, Ordering::SeqCst) + 1;
        match self.ready_at {
            Some(ready_at) if n >= ready_at => Ok(()),
            _ => Err(Error::http("connection refused")),
        }
    }

    async fn replace_credentials(&self, update: &CredentialUpdate) -> Result<serde_json::Value> {
        self.mutation_count.fetch_add(1, Ordering::SeqCst);
        *self.last_update.lock().unwrap() = Some(update.clone());
        self.response.clone().map_err(Error::http)
    }
}
