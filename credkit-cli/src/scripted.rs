//! Backend adapters that replay a JSON scenario instead of calling platform services.

use std::time::Duration;

use async_trait::async_trait;
use credkit_core::backend::{CredentialManagerAdapter, LegacyPlatformAdapter, SecurityChecker};
use credkit_core::{
    AuthenticatorResponse, AuthenticatorStatus, BackendError, CandidateCredential,
    CredentialManagerResult, PreparedCredentials, RequestContext, RequestKind,
};
use serde::Deserialize;

/// A platform failure, as written in a scenario file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ScriptedFailure {
    LegacyApi {
        code: i32,
        #[serde(default)]
        message: Option<String>,
    },
    CredentialManager {
        error_type: String,
        #[serde(default)]
        message: Option<String>,
    },
    Unavailable,
    Status {
        status: AuthenticatorStatus,
    },
}

impl From<ScriptedFailure> for BackendError {
    fn from(failure: ScriptedFailure) -> Self {
        match failure {
            ScriptedFailure::LegacyApi { code, message } => Self::LegacyApi { code, message },
            ScriptedFailure::CredentialManager {
                error_type,
                message,
            } => Self::CredentialManager {
                error_type,
                message,
            },
            ScriptedFailure::Unavailable => Self::Unavailable,
            ScriptedFailure::Status { status } => Self::Status { status },
        }
    }
}

/// One scripted backend answer: `ok` or `error`, after `delay_ms`.
#[derive(Debug, Clone, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Step<T> {
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub ok: Option<T>,
    #[serde(default)]
    pub error: Option<ScriptedFailure>,
}

impl<T: Clone> Step<T> {
    async fn play(step: Option<&Self>, name: &str) -> Result<T, BackendError> {
        let Some(step) = step else {
            tracing::warn!("{name} is not scripted, reporting the backend as unavailable");
            return Err(BackendError::Unavailable);
        };
        if step.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(step.delay_ms)).await;
        }
        match (&step.error, &step.ok) {
            (Some(failure), _) => {
                tracing::debug!("{name} fails with {failure:?}");
                Err(failure.clone().into())
            }
            (None, Some(ok)) => {
                tracing::debug!("{name} succeeds");
                Ok(ok.clone())
            }
            (None, None) => Err(BackendError::Unavailable),
        }
    }
}

/// How every backend behaves during one simulated request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Scenario {
    /// Rejects the request before dispatch when set.
    pub security_failure: Option<ScriptedFailure>,
    pub legacy_invoke: Option<Step<AuthenticatorResponse>>,
    pub legacy_enumerate: Option<Step<Vec<CandidateCredential>>>,
    pub legacy_platform_authenticator: Option<Step<bool>>,
    pub credential_manager_invoke: Option<Step<CredentialManagerResult>>,
    pub credential_manager_prepare: Option<Step<PreparedCredentials>>,
    /// Cancels the request this many milliseconds after it started.
    pub cancel_after_ms: Option<u64>,
}

pub struct ScriptedLegacy(pub Scenario);

#[async_trait]
impl LegacyPlatformAdapter for ScriptedLegacy {
    async fn invoke(
        &self,
        _request: RequestContext,
    ) -> Result<AuthenticatorResponse, BackendError> {
        Step::play(self.0.legacy_invoke.as_ref(), "legacy invoke").await
    }

    async fn enumerate_candidates(
        &self,
        relying_party_id: String,
    ) -> Result<Vec<CandidateCredential>, BackendError> {
        tracing::debug!("enumerating candidates for {relying_party_id}");
        Step::play(self.0.legacy_enumerate.as_ref(), "legacy enumerate").await
    }

    async fn is_user_verifying_platform_authenticator_available(
        &self,
    ) -> Result<bool, BackendError> {
        Step::play(
            self.0.legacy_platform_authenticator.as_ref(),
            "legacy platform authenticator query",
        )
        .await
    }
}

pub struct ScriptedCredentialManager(pub Scenario);

#[async_trait]
impl CredentialManagerAdapter for ScriptedCredentialManager {
    async fn invoke(
        &self,
        _request: RequestContext,
    ) -> Result<CredentialManagerResult, BackendError> {
        Step::play(
            self.0.credential_manager_invoke.as_ref(),
            "credential manager invoke",
        )
        .await
    }

    async fn prepare(
        &self,
        _request: RequestContext,
    ) -> Result<PreparedCredentials, BackendError> {
        Step::play(
            self.0.credential_manager_prepare.as_ref(),
            "credential manager prepare",
        )
        .await
    }
}

pub struct ScriptedSecurityChecker(pub Option<ScriptedFailure>);

#[async_trait]
impl SecurityChecker for ScriptedSecurityChecker {
    async fn check(
        &self,
        kind: RequestKind,
        relying_party_id: String,
        origin: String,
        _is_payment: bool,
    ) -> Result<(), BackendError> {
        tracing::debug!("security check: {kind} for {relying_party_id} from {origin}");
        self.0.clone().map_or(Ok(()), |failure| Err(failure.into()))
    }
}
