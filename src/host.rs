//! File-backed host adapter
//!
//! A YAML document stands in for the host: it carries the leadership flag,
//! configuration, peer store, relation bags and the workload container's
//! state. The CLI loads it, runs a pass against it and writes back what the
//! pass applied (layer, published relation data, status, workload version).
//!
//! The peer store is the application bag of the peer relation entry; it is
//! unavailable while that entry is missing.
//!
//! ```yaml
//! model: identity
//! leader: true
//! config:
//!   log_level: debug
//! relations:
//!   - name: identity-platform-login-ui
//!   - name: hydra-endpoint-info
//!     remote_app: hydra
//!     app_data:
//!       admin_endpoint: http://hydra-admin:4445
//! container:
//!   can_connect: true
//!   version_output: "App Version: 1.42.0"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CharmConfig;
use crate::controller::{Action, Context, ReconcileOutcome, UnitStatus};
use crate::layer::Layer;
use crate::relation::{PeerStore, RelationData, Relations};
use crate::workload::Supervisor;
use crate::{Error, Result, APPLICATION_NAME, PEER_RELATION_NAME, WORKLOAD_CONTAINER_NAME};

/// Everything the host knows about this unit
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostState {
    /// Model the application is deployed in
    pub model: String,
    /// Application name
    pub app: String,
    /// Whether this unit holds leadership
    pub leader: bool,
    /// Operator configuration
    pub config: CharmConfig,
    /// Established relations
    pub relations: Vec<RelationEntry>,
    /// Workload container
    pub container: ContainerState,
    /// Result of the last pass
    pub applied: AppliedState,
}

impl Default for HostState {
    fn default() -> Self {
        Self {
            model: "default".to_string(),
            app: APPLICATION_NAME.to_string(),
            leader: false,
            config: CharmConfig::default(),
            relations: Vec::new(),
            container: ContainerState::default(),
            applied: AppliedState::default(),
        }
    }
}

/// One established relation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelationEntry {
    /// Relation (endpoint) name
    pub name: String,
    /// Remote application; `None` until it has joined
    pub remote_app: Option<String>,
    /// Remote application data bag
    pub app_data: RelationData,
    /// Remote unit data bags, keyed by unit name
    pub units: BTreeMap<String, RelationData>,
    /// Our application data bag
    pub local_app_data: RelationData,
}

/// Workload container as seen through its supervisor
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerState {
    /// Whether the supervisor API answers
    pub can_connect: bool,
    /// Whether the workload service is running
    pub running: bool,
    /// Output of the version command
    pub version_output: Option<String>,
    /// Make start and replan fail
    pub fail_plan: bool,
    /// Layers added so far, keyed by label
    pub layers: BTreeMap<String, Layer>,
}

impl Default for ContainerState {
    fn default() -> Self {
        Self {
            can_connect: true,
            running: false,
            version_output: None,
            fail_plan: false,
            layers: BTreeMap::new(),
        }
    }
}

/// What the last pass reported
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppliedState {
    /// Unit status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<UnitStatus>,
    /// Whether the host should re-run the pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    /// Workload version
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workload_version: Option<String>,
    /// Container resource limits
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_limits: BTreeMap<String, String>,
}

impl HostState {
    /// Read a host document
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::io(path.display().to_string(), e))?;
        Self::from_yaml(&raw)
    }

    /// Parse a host document
    pub fn from_yaml(raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw)
            .map_err(|e| Error::serialization_for_kind("HostState", e.to_string()))
    }

    /// Write the host document back
    pub fn save(&self, path: &Path) -> Result<()> {
        let raw = serde_yaml::to_string(self)?;
        std::fs::write(path, raw).map_err(|e| Error::io(path.display().to_string(), e))
    }

    /// The first relation with this name
    ///
    /// When several remote applications share a relation name, only the
    /// first one listed is consulted.
    pub fn relation(&self, name: &str) -> Option<&RelationEntry> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Peer store contents, if the peer relation exists
    pub fn peer_data(&self) -> Option<&RelationData> {
        self.relation(PEER_RELATION_NAME).map(|r| &r.local_app_data)
    }
}

/// Host adapter implementing every collaborator trait over a [`HostState`]
#[derive(Debug, Default)]
pub struct Host {
    state: RwLock<HostState>,
}

impl Host {
    /// Wrap a host document
    pub fn new(state: HostState) -> Arc<Self> {
        Arc::new(Self {
            state: RwLock::new(state),
        })
    }

    /// Build a reconciliation context backed by this host
    pub fn context(self: &Arc<Self>) -> Context {
        let state = self.state.read();
        Context::builder(self.clone(), self.clone(), self.clone())
            .config(state.config.clone())
            .leader(state.leader)
            .model(state.model.clone())
            .app(state.app.clone())
            .build()
    }

    /// Record the outcome of a pass
    pub fn record(&self, outcome: &ReconcileOutcome) {
        let mut state = self.state.write();
        state.applied = AppliedState {
            status: Some(outcome.status.clone()),
            action: Some(outcome.action),
            workload_version: outcome.workload_version.clone(),
            resource_limits: outcome.resource_limits.clone(),
        };
    }

    /// Copy of the current document
    pub fn snapshot(&self) -> HostState {
        self.state.read().clone()
    }
}

impl Relations for Host {
    fn is_established(&self, relation: &str) -> bool {
        self.state.read().relation(relation).is_some()
    }

    fn remote_app_data(&self, relation: &str) -> Option<RelationData> {
        let state = self.state.read();
        let entry = state.relation(relation)?;
        entry.remote_app.as_ref()?;
        Some(entry.app_data.clone())
    }

    fn update_app_data(&self, relation: &str, data: &RelationData) -> Result<()> {
        let mut state = self.state.write();
        if !state.leader {
            return Err(Error::validation(
                relation,
                "only the leader may write application data",
            ));
        }
        for entry in state.relations.iter_mut().filter(|r| r.name == relation) {
            entry
                .local_app_data
                .extend(data.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        Ok(())
    }
}

impl PeerStore for Host {
    fn is_available(&self) -> bool {
        self.state.read().peer_data().is_some()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.state.read().peer_data()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.write();
        if !state.leader {
            return Err(Error::validation(
                PEER_RELATION_NAME,
                "only the leader may write the peer store",
            ));
        }
        let peer = state
            .relations
            .iter_mut()
            .find(|r| r.name == PEER_RELATION_NAME)
            .ok_or_else(|| Error::peer_store_unavailable(PEER_RELATION_NAME))?;
        peer.local_app_data
            .insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl Supervisor for Host {
    async fn can_connect(&self) -> bool {
        self.state.read().container.can_connect
    }

    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<()> {
        let mut state = self.state.write();
        if !state.container.can_connect {
            return Err(Error::container_unavailable(WORKLOAD_CONTAINER_NAME));
        }

        let layers = &mut state.container.layers;
        match layers.get_mut(label) {
            Some(existing) if combine => {
                existing.summary = layer.summary.clone();
                existing.description = layer.description.clone();
                existing.services.extend(layer.services.clone());
                existing.checks.extend(layer.checks.clone());
            }
            Some(_) => {
                return Err(Error::supervisor(
                    "add_layer",
                    format!("layer '{label}' already exists"),
                ))
            }
            None => {
                layers.insert(label.to_string(), layer.clone());
            }
        }
        debug!(label, "layer added");
        Ok(())
    }

    async fn is_running(&self, _service: &str) -> Result<bool> {
        let state = self.state.read();
        if !state.container.can_connect {
            return Err(Error::container_unavailable(WORKLOAD_CONTAINER_NAME));
        }
        Ok(state.container.running)
    }

    async fn start(&self, service: &str) -> Result<()> {
        self.converge("start", service)
    }

    async fn replan(&self) -> Result<()> {
        self.converge("replan", WORKLOAD_CONTAINER_NAME)
    }

    async fn exec(&self, command: &[String]) -> Result<String> {
        self.state
            .read()
            .container
            .version_output
            .clone()
            .ok_or_else(|| {
                Error::supervisor("exec", format!("no output for {}", command.join(" ")))
            })
    }
}

impl Host {
    fn converge(&self, operation: &str, service: &str) -> Result<()> {
        let mut state = self.state.write();
        if state.container.fail_plan {
            state.container.running = false;
            return Err(Error::supervisor(
                operation,
                format!("service '{service}' failed to start"),
            ));
        }
        state.container.running = true;
        Ok(())
    }
}
