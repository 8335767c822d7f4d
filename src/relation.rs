//! Relation and peer store access
//!
//! The host materializes relation data before the operator runs; these traits
//! expose it as flat string maps. Only application-level data is
//! authoritative: unit-level bags are never consulted, and when several
//! remote applications share a relation name the first one wins.

use std::collections::BTreeMap;

#[cfg(test)]
use mockall::automock;

use crate::Result;

/// A relation data bag
pub type RelationData = BTreeMap<String, String>;

/// Read/write access to relation data bags
#[cfg_attr(test, automock)]
pub trait Relations: Send + Sync {
    /// Whether at least one relation with this name is established
    fn is_established(&self, relation: &str) -> bool;

    /// Application data published by the first remote application
    ///
    /// Returns `None` when the relation is not established or the remote
    /// application has not joined yet.
    fn remote_app_data(&self, relation: &str) -> Option<RelationData>;

    /// Merge `data` into our application bag on every relation with this name
    ///
    /// Only the leader may write application data.
    fn update_app_data(&self, relation: &str, data: &RelationData) -> Result<()>;
}

/// The peer-wide shared key-value store
#[cfg_attr(test, automock)]
pub trait PeerStore: Send + Sync {
    /// Whether the peer relation backing the store is established
    fn is_available(&self) -> bool;

    /// Read a key from the store
    fn get(&self, key: &str) -> Option<String>;

    /// Write a key to the store (leader only)
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// What a loader can see of one relation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelationState {
    /// No relation with this name exists
    NotEstablished,
    /// The relation exists; the bag may still be empty
    Established(RelationData),
}

impl RelationState {
    /// Observe the named relation
    pub fn observe(relations: &dyn Relations, relation: &str) -> Self {
        if !relations.is_established(relation) {
            return Self::NotEstablished;
        }
        Self::Established(relations.remote_app_data(relation).unwrap_or_default())
    }
}
