//! Pebble layer types and the layer renderer
//!
//! [`render_layer`] is a pure function of its inputs: no clock, no
//! randomness, no I/O. Maps are `BTreeMap`s so the serialized layer is
//! byte-identical across passes and the supervisor only replans on real
//! changes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::CharmConfig;
use crate::integrations::Dependencies;
use crate::{Error, APPLICATION_PORT, WORKLOAD_CONTAINER_NAME, WORKLOAD_RUN_COMMAND};

/// Name of the liveness check in the layer
pub const LIVENESS_CHECK_NAME: &str = "login-ui-alive";

/// Status endpoint polled by the liveness check
pub const LIVENESS_CHECK_PATH: &str = "/api/v0/status";

/// Pebble layer: the declarative description of the workload service
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    /// One-line summary
    pub summary: String,
    /// Longer description
    pub description: String,
    /// Services keyed by name
    pub services: BTreeMap<String, Service>,
    /// Health checks keyed by name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub checks: BTreeMap<String, Check>,
}

impl Layer {
    /// The workload service entry
    pub fn workload(&self) -> Option<&Service> {
        self.services.get(WORKLOAD_CONTAINER_NAME)
    }

    /// Serialize to the YAML document Pebble accepts
    pub fn to_yaml(&self) -> Result<String, Error> {
        serde_yaml::to_string(self).map_err(|e| Error::serialization_for_kind("layer", e.to_string()))
    }
}

/// How a layer entry combines with earlier layers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Override {
    /// Replace the earlier definition entirely
    Replace,
    /// Merge field by field into the earlier definition
    Merge,
}

/// Whether Pebble starts the service automatically
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Startup {
    /// Started on replan
    Enabled,
    /// Only started explicitly
    Disabled,
}

/// Environment variable value
///
/// The workload reads booleans as `true`/`false`, so they stay typed here
/// instead of being stringified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EnvValue {
    /// A boolean switch
    Bool(bool),
    /// Any other value
    Str(String),
}

impl From<bool> for EnvValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<String> for EnvValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<&str> for EnvValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

/// A Pebble service definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Service {
    /// Combination mode
    #[serde(rename = "override")]
    pub override_: Override,
    /// One-line summary
    pub summary: String,
    /// Command line
    pub command: String,
    /// Startup policy
    pub startup: Startup,
    /// Environment variables
    pub environment: BTreeMap<String, EnvValue>,
}

/// A Pebble health check
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Check {
    /// Combination mode
    #[serde(rename = "override")]
    pub override_: Override,
    /// HTTP probe
    pub http: HttpCheck,
}

/// HTTP probe of a health check
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HttpCheck {
    /// URL that must answer 2xx
    pub url: String,
}

/// Everything the renderer needs for one pass
#[derive(Clone, Copy, Debug)]
pub struct LayerInputs<'a> {
    /// Operator configuration
    pub config: &'a CharmConfig,
    /// Cookie encryption key from the peer store
    pub cookie_key: &'a str,
    /// Dependency snapshots
    pub dependencies: &'a Dependencies,
}

/// Render the Pebble layer for the workload
pub fn render_layer(inputs: LayerInputs<'_>) -> Layer {
    let LayerInputs {
        config,
        cookie_key,
        dependencies: deps,
    } = inputs;

    let mut env: BTreeMap<String, EnvValue> = BTreeMap::new();
    let mut set = |key: &str, value: EnvValue| {
        env.insert(key.to_string(), value);
    };

    set("PORT", APPLICATION_PORT.to_string().into());
    set("BASE_URL", deps.public_route.domain_url().into());
    set("LOG_LEVEL", config.log_level.as_str().into());
    set("SUPPORT_EMAIL", config.support_email.as_str().into());
    set("COOKIES_ENCRYPTION_KEY", cookie_key.into());
    set("DEBUG", config.log_level.is_debug().into());
    set("AUTHORIZATION_ENABLED", false.into());
    set("TRACING_ENABLED", false.into());

    set(
        "HYDRA_ADMIN_URL",
        deps.identity_admin.admin_endpoint.as_str().into(),
    );

    let kratos = &deps.auth_provider;
    set("KRATOS_PUBLIC_URL", kratos.public_endpoint.as_str().into());
    set("KRATOS_ADMIN_URL", kratos.admin_endpoint.as_str().into());
    if kratos.ready {
        set("MFA_ENABLED", kratos.mfa_enabled.into());
        set(
            "OIDC_WEBAUTHN_SEQUENCING_ENABLED",
            kratos.oidc_webauthn_sequencing_enabled.into(),
        );
        set("FEATURE_FLAGS", kratos.feature_flags.join(",").into());
    }

    let tracing = &deps.tracing;
    if tracing.ready {
        set("OTEL_HTTP_ENDPOINT", tracing.http_endpoint.as_str().into());
        set("OTEL_GRPC_ENDPOINT", tracing.grpc_endpoint.as_str().into());
        set("TRACING_ENABLED", true.into());
    }

    let service = Service {
        override_: Override::Replace,
        summary: "identity platform login ui".to_string(),
        command: WORKLOAD_RUN_COMMAND.to_string(),
        startup: Startup::Enabled,
        environment: env,
    };

    let check = Check {
        override_: Override::Replace,
        http: HttpCheck {
            url: format!("http://localhost:{APPLICATION_PORT}{LIVENESS_CHECK_PATH}"),
        },
    };

    Layer {
        summary: "login_ui layer".to_string(),
        description: "pebble config layer for identity platform login ui".to_string(),
        services: BTreeMap::from([(WORKLOAD_CONTAINER_NAME.to_string(), service)]),
        checks: BTreeMap::from([(LIVENESS_CHECK_NAME.to_string(), check)]),
    }
}
