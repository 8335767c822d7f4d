//! Error types for the login UI operator
//!
//! Expected absence (a relation that is not joined yet, a missing key) is not
//! an error: the snapshot loaders resolve it to defaults. The variants here
//! cover the conditions the reconciliation driver has to report outward,
//! either as a retry or as a blocked unit.

use thiserror::Error;

/// Main error type for operator operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Invalid operator configuration
    #[error("validation error for {field}: {message}")]
    Validation {
        /// Configuration option that failed validation
        field: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
        /// What was being (de)serialized, if known
        kind: Option<String>,
    },

    /// Template rendering error
    #[error("template error [{template}]: {message}")]
    Template {
        /// Name of the template that failed
        template: String,
        /// Description of what failed
        message: String,
    },

    /// A URL published by a dependency cannot be parsed or served over https
    #[error("invalid url '{url}': {message}")]
    InvalidUrl {
        /// The offending URL
        url: String,
        /// Description of what's invalid
        message: String,
    },

    /// The peer relation backing the shared store is not established yet
    #[error("peer store unavailable: {relation}")]
    PeerStoreUnavailable {
        /// Name of the peer relation
        relation: String,
    },

    /// The shared secret has not been written by the leader yet
    #[error("secret '{key}' not yet provisioned by the leader")]
    SecretPending {
        /// Peer store key the secret lives under
        key: String,
    },

    /// The workload container cannot be reached
    #[error("container '{container}' is not reachable")]
    ContainerUnavailable {
        /// Name of the workload container
        container: String,
    },

    /// The process supervisor rejected or failed to apply the plan
    #[error("supervisor error [{operation}]: {message}")]
    Supervisor {
        /// Supervisor operation that failed (add_layer, start, replan, ...)
        operation: String,
        /// Description of what failed
        message: String,
    },

    /// Filesystem error while reading or writing host state
    #[error("io error for {path}: {source}")]
    Io {
        /// Path being accessed
        path: String,
        /// The underlying io error
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a validation error for a configuration option
    pub fn validation(field: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: None,
        }
    }

    /// Create a serialization error with document kind context
    pub fn serialization_for_kind(kind: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
            kind: Some(kind.into()),
        }
    }

    /// Create a template error
    pub fn template(template: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Template {
            template: template.into(),
            message: msg.into(),
        }
    }

    /// Create an invalid url error
    pub fn invalid_url(url: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.into(),
            message: msg.into(),
        }
    }

    /// Create a peer store unavailable error
    pub fn peer_store_unavailable(relation: impl Into<String>) -> Self {
        Self::PeerStoreUnavailable {
            relation: relation.into(),
        }
    }

    /// Create a pending secret error
    pub fn secret_pending(key: impl Into<String>) -> Self {
        Self::SecretPending { key: key.into() }
    }

    /// Create a container unavailable error
    pub fn container_unavailable(container: impl Into<String>) -> Self {
        Self::ContainerUnavailable {
            container: container.into(),
        }
    }

    /// Create a supervisor error for the given operation
    pub fn supervisor(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Supervisor {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create an io error for a path
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if this error is retryable
    ///
    /// Retryable errors describe a dependency that is not ready yet; the
    /// driver defers the pass and the next event re-runs it. Everything else
    /// needs operator attention.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::PeerStoreUnavailable { .. } => true,
            Error::SecretPending { .. } => true,
            Error::ContainerUnavailable { .. } => true,
            Error::Validation { .. } => false,
            Error::Serialization { .. } => false,
            Error::Template { .. } => false,
            Error::InvalidUrl { .. } => false,
            Error::Supervisor { .. } => false,
            Error::Io { .. } => false,
        }
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Self::serialization_for_kind("yaml", err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization_for_kind("json", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: a unit waiting on its peers or its container retries on the
    /// next event instead of blocking
    #[test]
    fn story_waiting_conditions_are_retryable() {
        assert!(Error::peer_store_unavailable("identity-platform-login-ui").is_retryable());
        assert!(Error::secret_pending("cookies_key").is_retryable());
        assert!(Error::container_unavailable("login-ui").is_retryable());
    }

    /// Story: a rejected plan or a bad config needs a human
    #[test]
    fn story_fatal_conditions_are_not_retryable() {
        assert!(!Error::supervisor("replan", "service failed to start").is_retryable());
        assert!(!Error::validation("log_level", "unknown level").is_retryable());
        assert!(!Error::serialization("bad yaml").is_retryable());
        assert!(!Error::template("public-route", "undefined value").is_retryable());
        assert!(!Error::invalid_url("http://exa mple", "invalid domain character").is_retryable());
    }

    #[test]
    fn test_messages_carry_context() {
        let err = Error::supervisor("replan", "exit code 1");
        assert!(err.to_string().contains("replan"));
        assert!(err.to_string().contains("exit code 1"));

        let err = Error::validation("support_email", "must contain '@'");
        assert!(err.to_string().contains("support_email"));

        match Error::serialization_for_kind("host-state", "missing field") {
            Error::Serialization { kind, .. } => assert_eq!(kind.as_deref(), Some("host-state")),
            _ => panic!("Expected Serialization variant"),
        }
    }

    #[test]
    fn test_yaml_errors_convert() {
        let parsed: std::result::Result<Vec<String>, _> = serde_yaml::from_str("{not: a list");
        let err: Error = parsed.unwrap_err().into();
        assert!(matches!(err, Error::Serialization { .. }));
    }
}
