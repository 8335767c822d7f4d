//! Hydra admin endpoint snapshot

use tracing::info;

use crate::relation::{RelationState, Relations};
use crate::HYDRA_RELATION_NAME;

/// The data published on the `hydra-endpoint-info` relation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdentityAdminData {
    /// Whether the relation carries an admin endpoint
    pub ready: bool,
    /// URL of the Hydra admin API
    pub admin_endpoint: String,
}

impl IdentityAdminData {
    /// Load the snapshot from the current relation data
    pub fn load(relations: &dyn Relations) -> Self {
        Self::from_state(RelationState::observe(relations, HYDRA_RELATION_NAME))
    }

    fn from_state(state: RelationState) -> Self {
        let data = match state {
            RelationState::NotEstablished => {
                info!(relation = HYDRA_RELATION_NAME, "no relation found");
                return Self::default();
            }
            RelationState::Established(data) => data,
        };

        match data.get("admin_endpoint").filter(|v| !v.is_empty()) {
            Some(endpoint) => Self {
                ready: true,
                admin_endpoint: endpoint.clone(),
            },
            None => {
                info!(relation = HYDRA_RELATION_NAME, "no relation data found");
                Self::default()
            }
        }
    }
}
