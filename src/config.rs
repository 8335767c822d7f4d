//! Operator configuration
//!
//! Configuration is supplied by the host and is read-only for the duration of
//! a reconciliation pass. Unknown options are ignored so newer hosts can add
//! options without breaking older operators.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Workload log level
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Informational messages (default)
    #[default]
    Info,
    /// Verbose output, also turns on the workload's debug mode
    Debug,
    /// Warnings only
    Warning,
    /// Errors only
    Error,
    /// Critical failures only
    Critical,
}

impl LogLevel {
    /// Canonical lowercase name, as passed to the workload
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Critical => "critical",
        }
    }

    /// Whether the workload should run in debug mode
    pub fn is_debug(&self) -> bool {
        matches!(self, LogLevel::Debug)
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration options of the operator
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CharmConfig {
    /// Workload log level
    pub log_level: LogLevel,
    /// Support address shown on error pages
    pub support_email: String,
    /// CPU limit for the workload container (e.g. "500m")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    /// Memory limit for the workload container (e.g. "512Mi")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
}

impl CharmConfig {
    /// Validate option values
    pub fn validate(&self) -> Result<(), Error> {
        if !self.support_email.is_empty() && !self.support_email.contains('@') {
            return Err(Error::validation(
                "support_email",
                format!("'{}' is not an email address", self.support_email),
            ));
        }

        for (field, value) in [("cpu", &self.cpu), ("memory", &self.memory)] {
            if let Some(quantity) = value {
                if quantity.trim().is_empty() {
                    return Err(Error::validation(field, "resource limit cannot be empty"));
                }
            }
        }

        Ok(())
    }

    /// Resource limits to hand to the resource patcher, keyed by resource name
    pub fn resource_limits(&self) -> BTreeMap<String, String> {
        let mut limits = BTreeMap::new();
        if let Some(cpu) = &self.cpu {
            limits.insert("cpu".to_string(), cpu.clone());
        }
        if let Some(memory) = &self.memory {
            limits.insert("memory".to_string(), memory.clone());
        }
        limits
    }
}
