use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

use crate::barrier::Source;

/// Status taxonomy shared with the caller.
///
/// Every failure that leaves the crate, whether it was produced by a backend, by the
/// completion barrier or by a cancellation, is expressed as one of these statuses.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    Serialize,
    Deserialize,
    uniffi::Enum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AuthenticatorStatus {
    /// The request was denied, typically because the user dismissed the prompt.
    NotAllowedError,
    /// Catch-all for platform failures without a more specific mapping.
    UnknownError,
    /// The caller cancelled a conditional request while it was still pending.
    AbortError,
    /// The relying party id or app id failed validation.
    InvalidDomain,
    /// The platform requires a non-empty allow-list for this request.
    EmptyAllowCredentials,
    /// Request parameters are not supported on this device.
    AndroidNotSupportedError,
    /// The device has no screen lock, so user verification is impossible.
    UserVerificationUnsupported,
    /// One of the excluded credentials already exists on the device.
    CredentialExcluded,
    /// None of the requested public key algorithms is supported.
    AlgorithmUnsupported,
    /// Another request is already being served.
    PendingRequest,
}

/// Error outputs of a credential request, as seen by the caller.
#[derive(Debug, Error, uniffi::Error)]
pub enum CredentialRequestError {
    /// The winning (or only) backend rejected the request.
    ///
    /// When both backends were invoked and both failed, only one status survives; see
    /// [`crate::FailureTieBreak`] for how it is chosen.
    ///
    /// `backend` names the source slot that failed, not always the backend that produced
    /// the status. When credential manager has no credentials and the legacy fallback
    /// then fails, the error names [`Source::CredentialManagerBackend`] and carries the
    /// legacy status, while a successful fallback response names
    /// [`Source::LegacyPlatformBackend`].
    #[error("backend_failure: {status} from {backend}")]
    BackendFailure {
        /// Source slot whose status was surfaced.
        backend: Source,
        /// Status reported by that backend.
        status: AuthenticatorStatus,
    },
    /// The caller cancelled the request before any backend succeeded.
    #[error("aborted")]
    Aborted,
    /// The origin and relying party checks rejected the request before dispatch.
    #[error("security_check_failed: {status}")]
    SecurityCheckFailed {
        /// Status returned by the security checker.
        status: AuthenticatorStatus,
    },
    /// A request is already in flight on this orchestrator.
    #[error("pending_request")]
    PendingRequest,
    /// The presented input is not valid for the requested operation.
    #[error("invalid_input: {attribute}: {reason}")]
    InvalidInput {
        /// Name of the offending field.
        attribute: String,
        /// Why it was rejected.
        reason: String,
    },
    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl CredentialRequestError {
    /// Returns the status code this error surfaces to the caller.
    #[must_use]
    pub const fn status(&self) -> AuthenticatorStatus {
        match self {
            Self::BackendFailure { status, .. } | Self::SecurityCheckFailed { status } => {
                *status
            }
            Self::Aborted => AuthenticatorStatus::AbortError,
            Self::PendingRequest => AuthenticatorStatus::PendingRequest,
            Self::InvalidInput { .. } => AuthenticatorStatus::NotAllowedError,
            Self::UnexpectedUniFFICallbackError(_) => AuthenticatorStatus::UnknownError,
        }
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for CredentialRequestError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

/// Errors returned by the platform backend adapters.
///
/// Adapters report the raw platform failure; conversion into an [`AuthenticatorStatus`]
/// happens on the Rust side through [`BackendError::status`].
#[derive(Debug, Error, uniffi::Error)]
pub enum BackendError {
    /// The legacy play-services API rejected the call with its own error code.
    #[error("legacy api error {code}: {message:?}")]
    LegacyApi {
        /// Raw error code from the legacy API.
        code: i32,
        /// Optional error message accompanying the code.
        message: Option<String>,
    },
    /// The credential-manager API threw an exception.
    #[error("credential manager error {error_type}: {message:?}")]
    CredentialManager {
        /// Fully qualified exception type reported by the platform.
        error_type: String,
        /// Optional exception message.
        message: Option<String>,
    },
    /// The backend is not available on this device.
    #[error("backend unavailable")]
    Unavailable,
    /// The adapter already knows the caller-facing status.
    #[error("status: {status}")]
    Status {
        /// Status to surface as-is.
        status: AuthenticatorStatus,
    },
    /// Unexpected `UniFFI` callback error.
    #[error("unexpected uniffi callback error: {0}")]
    UnexpectedUniFFICallbackError(String),
}

impl BackendError {
    /// Converts the platform failure into the shared status taxonomy.
    #[must_use]
    pub fn status(&self) -> AuthenticatorStatus {
        match self {
            Self::LegacyApi { code, message } => {
                crate::backend::convert_legacy_error(*code, message.as_deref())
            }
            Self::CredentialManager { error_type, .. } => {
                crate::backend::convert_credential_manager_error(error_type)
            }
            Self::Status { status } => *status,
            Self::Unavailable | Self::UnexpectedUniFFICallbackError(_) => {
                AuthenticatorStatus::UnknownError
            }
        }
    }
}

impl From<uniffi::UnexpectedUniFFICallbackError> for BackendError {
    fn from(error: uniffi::UnexpectedUniFFICallbackError) -> Self {
        Self::UnexpectedUniFFICallbackError(error.reason)
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum ConfigError {
    /// The configuration document is not valid JSON for [`crate::ArbitrationConfig`].
    #[error("invalid_config: {0}")]
    InvalidConfig(String),
}
