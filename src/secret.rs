//! Cookie encryption key provisioning
//!
//! The key lives in the peer store and is written exactly once, by the
//! leader, the first time a pass runs after the peer relation exists. It is
//! never rotated. Non-leaders only read; until the leader has written the
//! key they report [`Error::SecretPending`] so the pass is retried.
//!
//! The host serializes peer store writes through the leader, so a
//! check-then-write is enough here.

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{debug, info};

use crate::relation::PeerStore;
use crate::{Error, COOKIES_KEY, PEER_RELATION_NAME};

/// Number of random bytes in a cookie key
pub const COOKIE_KEY_BYTES: usize = 16;

/// Where the key came from on this pass
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CookieKey {
    /// Already present in the peer store
    Existing(String),
    /// Generated and written on this pass
    Created(String),
}

impl CookieKey {
    /// The hex-encoded key
    pub fn value(&self) -> &str {
        match self {
            CookieKey::Existing(v) | CookieKey::Created(v) => v,
        }
    }
}

/// Generate a fresh hex-encoded key
pub fn generate_cookie_key() -> String {
    let mut raw = [0u8; COOKIE_KEY_BYTES];
    OsRng.fill_bytes(&mut raw);
    hex::encode(raw)
}

/// Ensure the cookie key exists in the peer store
///
/// # Errors
///
/// - [`Error::PeerStoreUnavailable`] when the peer relation is not established
/// - [`Error::SecretPending`] when the key is absent and this unit is not the leader
/// - any error from writing the store
pub fn ensure_cookie_key(store: &dyn PeerStore, is_leader: bool) -> Result<CookieKey, Error> {
    if !store.is_available() {
        return Err(Error::peer_store_unavailable(PEER_RELATION_NAME));
    }

    if let Some(existing) = store.get(COOKIES_KEY).filter(|v| !v.is_empty()) {
        debug!("cookie key already provisioned");
        return Ok(CookieKey::Existing(existing));
    }

    if !is_leader {
        debug!("waiting for the leader to provision the cookie key");
        return Err(Error::secret_pending(COOKIES_KEY));
    }

    let key = generate_cookie_key();
    store.set(COOKIES_KEY, &key)?;
    info!("provisioned cookie key in peer store");
    Ok(CookieKey::Created(key))
}
