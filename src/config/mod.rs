//! Configuration management for script-sandbox
//!
//! Handles loading the sandbox configuration from TOML and turning it into
//! the policy set, cache options and script contract the gate runs with.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::module::api::contract::ScriptContract;
use crate::module::security::PolicySet;
use crate::module::traits::ScriptError;

/// Security policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Seed the policy with the built-in rule set
    #[serde(default = "default_true")]
    pub use_default_rules: bool,

    /// Additional namespace prefixes to block
    #[serde(default)]
    pub blocked_namespaces: Vec<String>,

    /// Additional exact type full names to block
    #[serde(default)]
    pub blocked_types: Vec<String>,

    /// Exact type full names allowed despite a namespace block
    #[serde(default)]
    pub allowed_types: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            use_default_rules: true,
            blocked_namespaces: Vec::new(),
            blocked_types: Vec::new(),
            allowed_types: Vec::new(),
        }
    }
}

impl PolicyConfig {
    /// Build the policy set described by this configuration
    pub fn build(&self) -> PolicySet {
        let policy = if self.use_default_rules {
            PolicySet::with_defaults()
        } else {
            PolicySet::new()
        };

        for prefix in &self.blocked_namespaces {
            if !policy.add_blocked_namespace(prefix) {
                debug!("Ignoring duplicate or empty blocked namespace '{}'", prefix);
            }
        }
        for name in &self.blocked_types {
            if !policy.add_blocked_type(name) {
                debug!("Ignoring duplicate or empty blocked type '{}'", name);
            }
        }
        for name in &self.allowed_types {
            if !policy.add_allowed_type(name) {
                debug!("Ignoring duplicate or empty allowed type '{}'", name);
            }
        }
        policy
    }
}

/// Module cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Recompute supplied content digests and reject mismatches
    #[serde(default)]
    pub verify_precomputed_hash: bool,
}

/// Script contract configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Marker interface a script type may implement
    #[serde(default = "default_marker_interface")]
    pub marker_interface: String,

    /// Base types a script type may derive from
    #[serde(default = "default_base_types")]
    pub base_types: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_marker_interface() -> String {
    "Sandbox.IScript".to_string()
}

fn default_base_types() -> Vec<String> {
    vec!["Sandbox.ScriptBehaviour".to_string()]
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            marker_interface: default_marker_interface(),
            base_types: default_base_types(),
        }
    }
}

impl ContractConfig {
    pub fn build(&self) -> ScriptContract {
        let mut contract = ScriptContract::new();
        if !self.marker_interface.is_empty() {
            contract = contract.with_marker_interface(&self.marker_interface);
        }
        for base in &self.base_types {
            contract = contract.with_base_type(base);
        }
        contract
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "script_sandbox=debug"); RUST_LOG takes precedence
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Sandbox configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default)]
    pub policy: PolicyConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub contract: ContractConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SandboxConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ScriptError> {
        Ok(toml::from_str(content)?)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScriptError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            ScriptError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml_str(&content)?;
        config.warn_on_suspicious_entries();
        Ok(config)
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String, ScriptError> {
        toml::to_string_pretty(self).map_err(|e| ScriptError::Config(e.to_string()))
    }

    fn warn_on_suspicious_entries(&self) {
        if !self.policy.use_default_rules && self.policy.blocked_namespaces.is_empty() {
            warn!("Default policy rules disabled and no namespaces blocked");
        }
        for name in &self.policy.allowed_types {
            if !name.contains('.') {
                warn!(
                    "Allowed type '{}' has no namespace; allow entries match exact full names only",
                    name
                );
            }
        }
    }
}
