//! Dependency snapshots
//!
//! Each integration turns the raw bag of one relation into an immutable,
//! fully-defaulted snapshot. Loading never fails: a missing relation, a
//! missing key or an unparseable value all resolve to defaults, and the
//! renderer only ever branches on `ready`.

mod hydra;
mod kratos;
mod public_route;
mod tracing_endpoint;

pub use hydra::IdentityAdminData;
pub use kratos::AuthProviderData;
pub use public_route::{normalise_url, PublicRouteData};
pub use tracing_endpoint::TracingData;

use crate::relation::Relations;

/// Snapshots of every dependency, taken once per reconciliation pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Hydra admin endpoint
    pub identity_admin: IdentityAdminData,
    /// Kratos endpoints and feature switches
    pub auth_provider: AuthProviderData,
    /// Tracing collector endpoints
    pub tracing: TracingData,
    /// Externally visible address
    pub public_route: PublicRouteData,
}

impl Dependencies {
    /// Load every snapshot from the currently visible relation data
    pub fn load(relations: &dyn Relations) -> Self {
        Self {
            identity_admin: IdentityAdminData::load(relations),
            auth_provider: AuthProviderData::load(relations),
            tracing: TracingData::load(relations),
            public_route: PublicRouteData::load(relations),
        }
    }
}

/// Parse a boolean in its canonical textual encoding ("True"/"False")
pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Parse a list given either as a JSON array or as comma-separated text
pub(crate) fn parse_list(raw: &str) -> Option<Vec<String>> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).ok();
    }
    Some(
        trimmed
            .split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Run `f` and return everything it logged at info and above
#[cfg(test)]
pub(crate) fn captured_logs(f: impl FnOnce()) -> String {
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    let buffer = Buffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().clone();
    String::from_utf8_lossy(&bytes).into_owned()
}
