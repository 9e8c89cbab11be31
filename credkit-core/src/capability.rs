//! Read-only device and feature signals captured when a request arrives.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// How the embedder exposes WebAuthn.
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
pub enum WebauthnMode {
    /// A browser acting on behalf of arbitrary origins.
    #[default]
    Browser,
    /// An app making requests for its own relying party only.
    AppScoped,
}

/// Identity of the device the request runs on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct DeviceProfile {
    /// Device manufacturer, as reported by the platform.
    pub manufacturer: String,
    /// Device model, as reported by the platform.
    pub model: String,
}

/// Immutable snapshot of every external signal the arbitration policy consults.
///
/// The host builds one snapshot per request attempt. Nothing in this crate caches or
/// mutates these values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct BackendCapabilitySnapshot {
    /// The credential-manager feature flag.
    pub credential_manager_enabled: bool,
    /// Whether Google Password Manager is reachable through credential manager.
    pub gpm_in_credential_manager: bool,
    /// Platform API level.
    pub platform_api_level: u32,
    /// Device identity, used by the app-scoped allow-list.
    pub device: DeviceProfile,
    /// Vendor support for the credential-manager API on this device.
    pub device_supports_credential_manager: bool,
    /// Installed GMS-core version. `None` when play services are unavailable.
    pub gms_core_version: Option<u64>,
    /// The request arrived over a cross-device transport.
    pub hybrid_request: bool,
    /// Embedding mode.
    pub webauthn_mode: WebauthnMode,
}

impl BackendCapabilitySnapshot {
    /// Returns `true` when the legacy backend can be reached at all.
    #[must_use]
    pub const fn legacy_available(&self) -> bool {
        self.gms_core_version.is_some()
    }
}

impl Default for BackendCapabilitySnapshot {
    fn default() -> Self {
        Self {
            credential_manager_enabled: true,
            gpm_in_credential_manager: true,
            platform_api_level: crate::config::CREDENTIAL_MANAGER_MIN_API_LEVEL,
            device: DeviceProfile::default(),
            device_supports_credential_manager: true,
            gms_core_version: Some(0),
            hybrid_request: false,
            webauthn_mode: WebauthnMode::default(),
        }
    }
}
