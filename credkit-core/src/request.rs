//! Request and response shapes exchanged with the caller and the backend adapters.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::barrier::Source;
use crate::error::CredentialRequestError;

/// The WebAuthn ceremony being performed.
#[derive(
    Debug,
    Clone,
    Copy,
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
pub enum RequestKind {
    /// Credential creation (registration).
    MakeCredential,
    /// Assertion (sign-in).
    GetAssertion,
}

/// Resident key requirement of a creation request.
#[derive(
    Debug,
    Clone,
    Copy,
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
pub enum ResidentKeyRequirement {
    /// A server-side credential is preferred.
    Discouraged,
    /// A discoverable credential is preferred.
    Preferred,
    /// A discoverable credential is required.
    Required,
}

/// Everything the orchestrator and the policy know about one incoming request.
///
/// `request_json` is forwarded to the adapters untouched; the other fields are the
/// request shape the arbitration policy decides on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct RequestContext {
    /// Ceremony kind.
    pub kind: RequestKind,
    /// Relying party id.
    pub relying_party_id: String,
    /// Serialized caller origin.
    pub origin: String,
    /// Opaque request payload for the backend adapters.
    #[serde(default)]
    pub request_json: String,
    /// Resident key requirement. Only meaningful for creation requests.
    #[serde(default)]
    pub resident_key: Option<ResidentKeyRequirement>,
    /// Client-data hash supplied by the caller. Present for cross-device requests.
    #[serde(default)]
    pub client_data_hash: Option<Vec<u8>>,
    /// Payment credential creation, or secure payment confirmation for assertions.
    #[serde(default)]
    pub is_payment: bool,
    /// The PRF extension was requested.
    #[serde(default)]
    pub prf_requested: bool,
    /// Credential ids the relying party accepts. Empty means any discoverable credential.
    #[serde(default)]
    pub allow_credentials: Vec<Vec<u8>>,
    /// Background (conditional) assertion that the caller may cancel.
    #[serde(default)]
    pub is_conditional: bool,
}

impl RequestContext {
    /// Returns `true` when the caller supplied its own client-data hash.
    #[must_use]
    pub const fn has_client_data_hash(&self) -> bool {
        self.client_data_hash.is_some()
    }

    /// Returns `true` when the request carries a non-empty allow-list.
    #[must_use]
    pub fn has_allow_credentials(&self) -> bool {
        !self.allow_credentials.is_empty()
    }

    pub(crate) fn validate(&self) -> Result<(), CredentialRequestError> {
        if self.relying_party_id.trim().is_empty() {
            return Err(CredentialRequestError::InvalidInput {
                attribute: "relying_party_id".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        if self.is_conditional && self.kind != RequestKind::GetAssertion {
            return Err(CredentialRequestError::InvalidInput {
                attribute: "is_conditional".to_string(),
                reason: "only assertions can be conditional".to_string(),
            });
        }
        if self.allow_credentials.iter().any(Vec::is_empty) {
            return Err(CredentialRequestError::InvalidInput {
                attribute: "allow_credentials".to_string(),
                reason: "credential ids must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// A credential stored on the device, as enumerated by the legacy backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct CandidateCredential {
    /// Credential id.
    pub credential_id: Vec<u8>,
    /// The credential is discoverable (a passkey).
    pub is_discoverable: bool,
    /// The credential was created for secure payment confirmation.
    pub is_payment: bool,
}

/// Successful authenticator output, opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct AuthenticatorResponse {
    /// Ceremony that produced the response.
    pub kind: RequestKind,
    /// Id of the created or asserted credential.
    pub credential_id: Vec<u8>,
    /// Serialized response for the caller.
    pub response_json: String,
}

/// What the caller receives on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct CredentialResponse {
    /// The authenticator output.
    pub response: AuthenticatorResponse,
    /// Backend that produced the response.
    pub backend: Source,
}

/// Result of a user-facing credential-manager call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case", tag = "result")]
pub enum CredentialManagerResult {
    /// The user picked a credential and the ceremony completed.
    Credential {
        /// The authenticator output.
        response: AuthenticatorResponse,
    },
    /// Credential manager has nothing to offer for this request.
    ///
    /// This is not a failure: the orchestrator falls back to the legacy backend.
    NoCredentials,
}

/// Result of the credential-manager prefetch step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct PreparedCredentials {
    /// Passkeys are available.
    pub has_public_key_credentials: bool,
    /// Passwords are available.
    pub has_password_credentials: bool,
    /// Credentials from other devices may be offered.
    pub has_remote_results: bool,
}

impl PreparedCredentials {
    /// Returns `true` when completing the request could offer anything to the user.
    #[must_use]
    pub const fn has_any(&self) -> bool {
        self.has_public_key_credentials
            || self.has_password_credentials
            || self.has_remote_results
    }
}
