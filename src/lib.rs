//! Login UI Operator - reconciliation core for the identity platform login UI
//!
//! The operator keeps one containerized workload configured from the facts
//! its neighbours publish over relations (Hydra, Kratos, tracing, public
//! route) plus its own configuration. Every pass is a pure derivation of a
//! Pebble layer from a fresh snapshot of those inputs.
//!
//! # Modules
//!
//! - [`config`] - Operator configuration (log level, support email, limits)
//! - [`relation`] - Relation and peer store access traits
//! - [`integrations`] - Typed, fully-defaulted dependency snapshots
//! - [`layer`] - Pebble layer types and the layer renderer
//! - [`secret`] - One-time cookie key provisioning over the peer store
//! - [`workload`] - Process supervisor seam and workload version parsing
//! - [`controller`] - The reconciliation driver
//! - [`host`] - File-backed host adapter used by the CLI
//! - [`telemetry`] - Logging setup
//! - [`error`] - Error types for the operator

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod error;
pub mod host;
pub mod integrations;
pub mod layer;
pub mod relation;
pub mod secret;
pub mod telemetry;
pub mod workload;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

// =============================================================================
// Workload Constants
// =============================================================================

/// Name of the workload container managed by Pebble
pub const WORKLOAD_CONTAINER_NAME: &str = "login-ui";

/// Application name, also the name of the peer relation
pub const APPLICATION_NAME: &str = "identity-platform-login-ui";

/// Port the login UI listens on
pub const APPLICATION_PORT: u16 = 8080;

/// Command Pebble runs for the workload service
pub const WORKLOAD_RUN_COMMAND: &str = "/usr/bin/identity-platform-login-ui serve";

/// Peer store key holding the cookie encryption key
pub const COOKIES_KEY: &str = "cookies_key";

// =============================================================================
// Relation Names
// =============================================================================

/// Peer relation backing the shared store
pub const PEER_RELATION_NAME: &str = APPLICATION_NAME;

/// Relation providing the Hydra admin endpoint
pub const HYDRA_RELATION_NAME: &str = "hydra-endpoint-info";

/// Relation providing Kratos endpoints and feature switches
pub const KRATOS_RELATION_NAME: &str = "kratos-info";

/// Relation providing tracing collector endpoints
pub const TRACING_RELATION_NAME: &str = "tracing";

/// Relation providing the public route (Traefik)
pub const PUBLIC_ROUTE_RELATION_NAME: &str = "public-route";

/// Relation on which this operator publishes its own endpoint
pub const LOGIN_UI_ENDPOINT_RELATION_NAME: &str = "ui-endpoint-info";
