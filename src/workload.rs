//! Process supervisor seam
//!
//! The workload container runs Pebble. The operator never manages the
//! process directly: it hands Pebble a layer, asks it to converge, and reads
//! the workload version through an exec.

use async_trait::async_trait;
use tracing::{debug, info, warn};

#[cfg(test)]
use mockall::automock;

use crate::layer::Layer;
use crate::{Error, APPLICATION_NAME, WORKLOAD_CONTAINER_NAME};

/// Operations the operator needs from the process supervisor
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Supervisor: Send + Sync {
    /// Whether the supervisor API in the workload container answers
    async fn can_connect(&self) -> bool;

    /// Add a layer under `label`, combining with an existing one of that label
    async fn add_layer(&self, label: &str, layer: &Layer, combine: bool) -> Result<(), Error>;

    /// Whether the named service is currently running
    async fn is_running(&self, service: &str) -> Result<bool, Error>;

    /// Start the named service
    async fn start(&self, service: &str) -> Result<(), Error>;

    /// Converge running services onto the current plan
    async fn replan(&self) -> Result<(), Error>;

    /// Run a command in the workload container and return its stdout
    async fn exec(&self, command: &[String]) -> Result<String, Error>;
}

/// Apply a layer and converge the workload service onto it
///
/// A stopped service is started; a running one is replanned so it only
/// restarts when its definition changed.
pub async fn plan_layer(supervisor: &dyn Supervisor, layer: &Layer) -> Result<(), Error> {
    apply(supervisor, layer).await.map_err(|e| match e {
        Error::Supervisor { .. } => e,
        other => Error::supervisor("replan", other.to_string()),
    })
}

async fn apply(supervisor: &dyn Supervisor, layer: &Layer) -> Result<(), Error> {
    supervisor
        .add_layer(WORKLOAD_CONTAINER_NAME, layer, true)
        .await?;

    if supervisor.is_running(WORKLOAD_CONTAINER_NAME).await? {
        debug!(service = WORKLOAD_CONTAINER_NAME, "replanning workload service");
        supervisor.replan().await
    } else {
        info!(service = WORKLOAD_CONTAINER_NAME, "starting workload service");
        supervisor.start(WORKLOAD_CONTAINER_NAME).await
    }
}

/// Read the workload version, if the binary reports one
pub async fn workload_version(supervisor: &dyn Supervisor) -> Option<String> {
    let command = [APPLICATION_NAME.to_string(), "version".to_string()];
    match supervisor.exec(&command).await {
        Ok(stdout) => parse_version(&stdout),
        Err(e) => {
            warn!(error = %e, "failed to read workload version");
            None
        }
    }
}

/// Extract the version from `App Version: <version>` output
pub fn parse_version(stdout: &str) -> Option<String> {
    stdout
        .lines()
        .find_map(|line| line.split_once("App Version:"))
        .map(|(_, version)| version.trim().to_string())
        .filter(|version| !version.is_empty())
}
