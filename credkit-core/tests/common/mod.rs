//! Scripted in-memory backends shared across integration tests.
//!
//! Every adapter method pops its next [`Reply`] from a [`Script`]. Tests decide when a
//! backend answers by scripting [`Reply::Wait`] and sending on the returned channel.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use credkit_core::backend::{CredentialManagerAdapter, LegacyPlatformAdapter, SecurityChecker};
use credkit_core::{
    ArbitrationConfig, AuthenticatorResponse, BackendError, CandidateCredential,
    CredentialManagerResult, CredentialRequestOrchestrator, PreparedCredentials,
    RequestContext, RequestKind,
};
use tokio::sync::{oneshot, Notify};

pub type Answer<T> = Result<T, BackendError>;

pub enum Reply<T> {
    /// Answer immediately.
    Now(Answer<T>),
    /// Answer once the test sends on the paired sender.
    Wait(oneshot::Receiver<Answer<T>>),
    /// Never answer.
    Never,
}

impl<T> Reply<T> {
    pub fn wait() -> (oneshot::Sender<Answer<T>>, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, Self::Wait(receiver))
    }
}

pub struct Script<T> {
    replies: Mutex<VecDeque<Reply<T>>>,
    calls: AtomicUsize,
    called: Notify,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            called: Notify::new(),
        }
    }
}

impl<T> Script<T> {
    pub fn push(&self, reply: Reply<T>) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Resolves once the scripted method was called at least `count` times.
    pub async fn called(&self, count: usize) {
        loop {
            let notified = self.called.notified();
            if self.calls() >= count {
                return;
            }
            notified.await;
        }
    }

    async fn next_or(&self, fallback: impl FnOnce() -> Answer<T>) -> Answer<T> {
        let reply = self.replies.lock().unwrap().pop_front();
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.called.notify_waiters();
        match reply {
            Some(Reply::Now(answer)) => answer,
            Some(Reply::Wait(receiver)) => receiver
                .await
                .unwrap_or(Err(BackendError::Unavailable)),
            Some(Reply::Never) => std::future::pending().await,
            None => fallback(),
        }
    }

    async fn next(&self) -> Answer<T> {
        self.next_or(|| Err(BackendError::Unavailable)).await
    }
}

#[derive(Default)]
pub struct FakeLegacy {
    pub invoke: Script<AuthenticatorResponse>,
    pub enumerate: Script<Vec<CandidateCredential>>,
    pub platform_authenticator: Script<bool>,
}

#[async_trait]
impl LegacyPlatformAdapter for FakeLegacy {
    async fn invoke(&self, _request: RequestContext) -> Answer<AuthenticatorResponse> {
        self.invoke.next().await
    }

    async fn enumerate_candidates(
        &self,
        _relying_party_id: String,
    ) -> Answer<Vec<CandidateCredential>> {
        self.enumerate.next().await
    }

    async fn is_user_verifying_platform_authenticator_available(&self) -> Answer<bool> {
        self.platform_authenticator.next().await
    }
}

#[derive(Default)]
pub struct FakeCredentialManager {
    pub invoke: Script<CredentialManagerResult>,
    pub prepare: Script<PreparedCredentials>,
}

#[async_trait]
impl CredentialManagerAdapter for FakeCredentialManager {
    async fn invoke(&self, _request: RequestContext) -> Answer<CredentialManagerResult> {
        self.invoke.next().await
    }

    async fn prepare(&self, _request: RequestContext) -> Answer<PreparedCredentials> {
        self.prepare.next().await
    }
}

/// Passes every request unless a reply was scripted.
#[derive(Default)]
pub struct FakeSecurityChecker {
    pub check: Script<()>,
}

#[async_trait]
impl SecurityChecker for FakeSecurityChecker {
    async fn check(
        &self,
        _kind: RequestKind,
        _relying_party_id: String,
        _origin: String,
        _is_payment: bool,
    ) -> Answer<()> {
        self.check.next_or(|| Ok(())).await
    }
}

pub struct Harness {
    pub legacy: Arc<FakeLegacy>,
    pub credential_manager: Arc<FakeCredentialManager>,
    pub security: Arc<FakeSecurityChecker>,
    pub orchestrator: Arc<CredentialRequestOrchestrator>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(ArbitrationConfig::default())
    }

    pub fn with_config(config: ArbitrationConfig) -> Self {
        let legacy = Arc::new(FakeLegacy::default());
        let credential_manager = Arc::new(FakeCredentialManager::default());
        let security = Arc::new(FakeSecurityChecker::default());
        let orchestrator = Arc::new(CredentialRequestOrchestrator::new(
            legacy.clone(),
            credential_manager.clone(),
            security.clone(),
            config,
        ));
        Self {
            legacy,
            credential_manager,
            security,
            orchestrator,
        }
    }
}

pub fn assertion() -> RequestContext {
    RequestContext {
        kind: RequestKind::GetAssertion,
        relying_party_id: "example.com".to_string(),
        origin: "https://example.com".to_string(),
        request_json: "{}".to_string(),
        resident_key: None,
        client_data_hash: None,
        is_payment: false,
        prf_requested: false,
        allow_credentials: Vec::new(),
        is_conditional: false,
    }
}

pub fn response(credential_id: &[u8]) -> AuthenticatorResponse {
    AuthenticatorResponse {
        kind: RequestKind::GetAssertion,
        credential_id: credential_id.to_vec(),
        response_json: format!("{{\"id\":\"{}\"}}", hex::encode(credential_id)),
    }
}

pub fn candidate(credential_id: &[u8]) -> CandidateCredential {
    CandidateCredential {
        credential_id: credential_id.to_vec(),
        is_discoverable: true,
        is_payment: false,
    }
}
