//! Kratos snapshot
//!
//! `public_endpoint` and `admin_endpoint` are required; without both the
//! snapshot is not ready. The feature switches are optional enrichment: a
//! missing or malformed value falls back to its default and leaves the
//! snapshot ready.

use tracing::{info, warn};

use super::{parse_bool, parse_list};
use crate::relation::{RelationData, RelationState, Relations};
use crate::KRATOS_RELATION_NAME;

/// The data published on the `kratos-info` relation
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthProviderData {
    /// Whether the relation carries both endpoints
    pub ready: bool,
    /// Kratos public API URL
    pub public_endpoint: String,
    /// Kratos admin API URL
    pub admin_endpoint: String,
    /// Whether multi-factor authentication is enforced
    pub mfa_enabled: bool,
    /// Whether OIDC login is followed by a webauthn step
    pub oidc_webauthn_sequencing_enabled: bool,
    /// Enabled login methods, in published order
    pub feature_flags: Vec<String>,
}

impl AuthProviderData {
    /// Load the snapshot from the current relation data
    pub fn load(relations: &dyn Relations) -> Self {
        Self::from_state(RelationState::observe(relations, KRATOS_RELATION_NAME))
    }

    fn from_state(state: RelationState) -> Self {
        let data = match state {
            RelationState::NotEstablished => {
                info!(relation = KRATOS_RELATION_NAME, "no relation found");
                return Self::default();
            }
            RelationState::Established(data) => data,
        };

        let required = |key: &str| data.get(key).filter(|v| !v.is_empty()).cloned();
        let (Some(public_endpoint), Some(admin_endpoint)) =
            (required("public_endpoint"), required("admin_endpoint"))
        else {
            info!(relation = KRATOS_RELATION_NAME, "no relation data found");
            return Self::default();
        };

        let feature_flags = match data.get("feature_flags") {
            None => Vec::new(),
            Some(raw) => parse_list(raw).unwrap_or_else(|| {
                warn!(
                    relation = KRATOS_RELATION_NAME,
                    value = %raw,
                    "ignoring malformed feature_flags"
                );
                Vec::new()
            }),
        };

        Self {
            ready: true,
            public_endpoint,
            admin_endpoint,
            mfa_enabled: flag(&data, "mfa_enabled"),
            oidc_webauthn_sequencing_enabled: flag(&data, "oidc_webauthn_sequencing_enabled"),
            feature_flags,
        }
    }
}

fn flag(data: &RelationData, key: &str) -> bool {
    let Some(raw) = data.get(key) else {
        return false;
    };
    parse_bool(raw).unwrap_or_else(|| {
        warn!(
            relation = KRATOS_RELATION_NAME,
            key,
            value = %raw,
            "ignoring malformed boolean"
        );
        false
    })
}
