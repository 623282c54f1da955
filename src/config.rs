//! Configuration for the registry.
//!
//! Loaded with precedence: overrides > env vars > config file > defaults.
//!
//! # Example config file (va-registry.toml)
//! ```toml
//! identity_fields = ["Id10017", "Id10018", "Id10019", "Id10021", "Id10023"]
//! unknown_location_name = "Unknown"
//!
//! [reconcile]
//! max_lock_attempts = 3
//! lock_timeout_ms = 200
//! ```

use crate::error::RegistryError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Main configuration for the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Ordered identity-field names for duplicate detection. Empty disables
    /// the feature entirely.
    pub identity_fields: Vec<String>,
    /// Name of the sentinel location anchoring unresolvable records.
    pub unknown_location_name: String,
    /// Group-lock tuning for the reconciliation engine.
    pub reconcile: ReconcileConfig,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            identity_fields: Vec::new(),
            unknown_location_name: "Unknown".to_string(),
            reconcile: ReconcileConfig::default(),
        }
    }
}

impl RegistryConfig {
    /// Load configuration with precedence: overrides > env > file > defaults.
    ///
    /// Environment variables use the `VA_REGISTRY_` prefix with `__`
    /// separating nested keys, e.g. `VA_REGISTRY_RECONCILE__LOCK_TIMEOUT_MS`.
    pub fn load(
        config_path: Option<&str>,
        overrides: ConfigOverrides,
    ) -> Result<Self, RegistryError> {
        let mut figment = Figment::new().merge(Serialized::defaults(RegistryConfig::default()));

        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("VA_REGISTRY_").split("__"));
        figment = figment.merge(Serialized::defaults(overrides));

        figment
            .extract()
            .map_err(|e| RegistryError::Configuration(e.to_string()))
    }

    /// Load from environment and optional config file only (no overrides).
    pub fn from_env(config_path: Option<&str>) -> Result<Self, RegistryError> {
        Self::load(config_path, ConfigOverrides::default())
    }
}

/// Reconciliation lock tuning.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    /// Lock stripes in the group lock table.
    pub lock_stripes: usize,
    /// Attempts to acquire a group's stripes before surfacing a race error.
    pub max_lock_attempts: u32,
    /// Per-attempt acquisition timeout in milliseconds.
    pub lock_timeout_ms: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            lock_stripes: 64,
            max_lock_attempts: 3,
            lock_timeout_ms: 200,
        }
    }
}

/// Caller overrides that take precedence over file and env config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unknown_location_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert!(config.identity_fields.is_empty());
        assert_eq!(config.unknown_location_name, "Unknown");
        assert_eq!(config.reconcile.lock_stripes, 64);
        assert_eq!(config.reconcile.max_lock_attempts, 3);
    }

    #[test]
    fn test_overrides_win() {
        let overrides = ConfigOverrides {
            identity_fields: Some(vec!["Id10017".to_string()]),
            unknown_location_name: Some("Unresolved".to_string()),
        };
        let config = RegistryConfig::load(None, overrides).unwrap();
        assert_eq!(config.identity_fields, vec!["Id10017"]);
        assert_eq!(config.unknown_location_name, "Unresolved");
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = RegistryConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: RegistryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.identity_fields, config.identity_fields);
        assert_eq!(back.reconcile.lock_timeout_ms, config.reconcile.lock_timeout_ms);
    }
}
