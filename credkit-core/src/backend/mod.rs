//! Platform interfaces implemented by the host application.
//!
//! The adapters own everything platform specific: building platform payloads, talking
//! to system services and parsing intent results. This crate only decides which of them
//! run and joins what they report.

use async_trait::async_trait;

use crate::error::BackendError;
use crate::request::{
    AuthenticatorResponse, CandidateCredential, CredentialManagerResult, PreparedCredentials,
    RequestContext, RequestKind,
};

mod matching;
mod status;

pub use matching::matching_credential_ids;
pub(crate) use status::{convert_credential_manager_error, convert_legacy_error};
pub use status::legacy_error_code;

/// The legacy play-services FIDO2 backend.
#[uniffi::export(with_foreign)]
#[async_trait]
pub trait LegacyPlatformAdapter: Send + Sync {
    /// Runs the full ceremony described by `request`.
    ///
    /// # Errors
    ///
    /// Returns the raw platform failure, including user cancellation.
    async fn invoke(
        &self,
        request: RequestContext,
    ) -> Result<AuthenticatorResponse, BackendError>;

    /// Lists the credentials stored on the device for `relying_party_id`.
    ///
    /// This is a capability query; it never shows UI.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential list cannot be obtained.
    async fn enumerate_candidates(
        &self,
        relying_party_id: String,
    ) -> Result<Vec<CandidateCredential>, BackendError>;

    /// Reports whether a user-verifying platform authenticator is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform cannot answer.
    async fn is_user_verifying_platform_authenticator_available(
        &self,
    ) -> Result<bool, BackendError>;
}

/// The platform credential-manager backend.
#[uniffi::export(with_foreign)]
#[async_trait]
pub trait CredentialManagerAdapter: Send + Sync {
    /// Runs the user-facing credential-manager ceremony.
    ///
    /// # Errors
    ///
    /// Returns the platform exception, including user cancellation.
    async fn invoke(
        &self,
        request: RequestContext,
    ) -> Result<CredentialManagerResult, BackendError>;

    /// Prepares an assertion without showing UI.
    ///
    /// # Errors
    ///
    /// Returns an error if the platform refuses to prepare the request.
    async fn prepare(
        &self,
        request: RequestContext,
    ) -> Result<PreparedCredentials, BackendError>;
}

/// Origin and relying party validation performed before any backend is invoked.
#[uniffi::export(with_foreign)]
#[async_trait]
pub trait SecurityChecker: Send + Sync {
    /// Validates `origin` against `relying_party_id` for a `kind` ceremony.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Status`] carrying the rejection status.
    async fn check(
        &self,
        kind: RequestKind,
        relying_party_id: String,
        origin: String,
        is_payment: bool,
    ) -> Result<(), BackendError>;
}
