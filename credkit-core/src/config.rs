//! Constructor-injected configuration for backend arbitration.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::ConfigError;

/// First platform API level that ships the credential-manager API.
pub const CREDENTIAL_MANAGER_MIN_API_LEVEL: u32 = 34;

/// How a single status is chosen when every awaited backend failed.
///
/// Only one status can reach the caller, so this is a deliberate information-loss point.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
    uniffi::Enum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FailureTieBreak {
    /// A cancelled source yields an abort; otherwise the legacy backend's status wins.
    ///
    /// The outcome depends only on the final source states, not on arrival order.
    #[default]
    PreferLegacyPlatform,
    /// The status of the source whose report resolved the barrier wins.
    LastCompleted,
}

/// A device family allowed to use the credential-manager path in app-scoped mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct DeviceAllowEntry {
    /// Manufacturer name, compared case-insensitively.
    pub manufacturer: String,
    /// Minimum platform API level for this manufacturer.
    pub min_api_level: u32,
}

/// Tunables of the arbitration policy and completion barrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
#[serde(default)]
pub struct ArbitrationConfig {
    /// Platform API level below which the credential-manager path is never used.
    pub min_credential_manager_api_level: u32,
    /// Minimum GMS-core version able to enumerate credentials for an allow-list.
    pub min_gms_core_version_for_enumeration: u64,
    /// Devices allowed to use the credential-manager path for app-scoped requests.
    pub app_scoped_allow_list: Vec<DeviceAllowEntry>,
    /// Status selection when every awaited backend failed.
    pub failure_tie_break: FailureTieBreak,
}

impl Default for ArbitrationConfig {
    fn default() -> Self {
        Self {
            min_credential_manager_api_level: CREDENTIAL_MANAGER_MIN_API_LEVEL,
            min_gms_core_version_for_enumeration: 0,
            app_scoped_allow_list: Vec::new(),
            failure_tie_break: FailureTieBreak::default(),
        }
    }
}

impl ArbitrationConfig {
    /// Parses a configuration document. Missing fields take their default value.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidConfig`] if `json` is not a valid configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::InvalidConfig(e.to_string()))
    }

    /// Returns `true` if `manufacturer` at `api_level` is on the app-scoped allow-list.
    #[must_use]
    pub fn allows_app_scoped(&self, manufacturer: &str, api_level: u32) -> bool {
        self.app_scoped_allow_list.iter().any(|entry| {
            entry.manufacturer.eq_ignore_ascii_case(manufacturer)
                && api_level >= entry.min_api_level
        })
    }
}

/// Parses an [`ArbitrationConfig`] from JSON for foreign callers.
///
/// # Errors
/// Returns [`ConfigError::InvalidConfig`] if `json` is not a valid configuration.
#[uniffi::export]
pub fn arbitration_config_from_json(json: &str) -> Result<ArbitrationConfig, ConfigError> {
    ArbitrationConfig::from_json(json)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_yields_defaults() {
        let config = ArbitrationConfig::from_json("{}").unwrap();
        assert_eq!(config, ArbitrationConfig::default());
        assert_eq!(config.min_credential_manager_api_level, 34);
        assert_eq!(config.failure_tie_break, FailureTieBreak::PreferLegacyPlatform);
    }

    #[test]
    fn test_parses_allow_list_and_tie_break() {
        let config = ArbitrationConfig::from_json(
            r#"{
                "app_scoped_allow_list": [{"manufacturer": "Google", "min_api_level": 34}],
                "failure_tie_break": "last_completed"
            }"#,
        )
        .unwrap();
        assert_eq!(config.failure_tie_break, FailureTieBreak::LastCompleted);
        assert!(config.allows_app_scoped("google", 35));
        assert!(!config.allows_app_scoped("google", 33));
        assert!(!config.allows_app_scoped("samsung", 35));
    }

    #[test]
    fn test_rejects_malformed_config() {
        let result = ArbitrationConfig::from_json(r#"{"failure_tie_break": "coin_flip"}"#);
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }
}
