//! Tracing collector snapshot

use serde::Deserialize;
use tracing::{info, warn};

use crate::relation::{RelationState, Relations};
use crate::TRACING_RELATION_NAME;

const OTLP_HTTP: &str = "otlp_http";
const OTLP_GRPC: &str = "otlp_grpc";

/// One receiver entry of the `receivers` list
#[derive(Debug, Deserialize)]
struct Receiver {
    protocol: Protocol,
    url: String,
}

#[derive(Debug, Deserialize)]
struct Protocol {
    name: String,
}

/// The data published on the `tracing` relation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TracingData {
    /// Whether the collector published any receiver
    pub ready: bool,
    /// OTLP/HTTP receiver URL, empty when not offered
    pub http_endpoint: String,
    /// OTLP/gRPC receiver URL, empty when not offered
    pub grpc_endpoint: String,
}

impl TracingData {
    /// Load the snapshot from the current relation data
    pub fn load(relations: &dyn Relations) -> Self {
        Self::from_state(RelationState::observe(relations, TRACING_RELATION_NAME))
    }

    fn from_state(state: RelationState) -> Self {
        let data = match state {
            RelationState::NotEstablished => {
                info!(relation = TRACING_RELATION_NAME, "no relation found");
                return Self::default();
            }
            RelationState::Established(data) => data,
        };
        let Some(raw) = data.get("receivers") else {
            info!(relation = TRACING_RELATION_NAME, "no receivers published yet");
            return Self::default();
        };

        let receivers: Vec<Receiver> = match serde_json::from_str(raw) {
            Ok(receivers) => receivers,
            Err(e) => {
                warn!(
                    relation = TRACING_RELATION_NAME,
                    error = %e,
                    "ignoring malformed receivers"
                );
                return Self::default();
            }
        };
        if receivers.is_empty() {
            return Self::default();
        }

        let endpoint = |protocol: &str| {
            receivers
                .iter()
                .find(|r| r.protocol.name == protocol)
                .map(|r| r.url.clone())
                .unwrap_or_default()
        };

        Self {
            ready: true,
            http_endpoint: endpoint(OTLP_HTTP),
            grpc_endpoint: endpoint(OTLP_GRPC),
        }
    }
}
