//! Drives one credential request from policy evaluation to the caller-facing result.
//!
//! For every request the orchestrator
//!
//! - runs the foreign [`SecurityChecker`],
//! - asks the [`ArbitrationPolicy`] for a plan, enumerating the legacy backend's
//!   credentials first when the policy needs them,
//! - resets the [`CompletionBarrier`] to the plan's mode and spawns one task per backend,
//! - waits for the barrier outcome and turns it into a [`CredentialResponse`] or a
//!   [`CredentialRequestError`].
//!
//! Backend tasks report into the barrier under the cycle's generation; whichever report
//! resolves it hands the outcome to the waiting caller over a `oneshot` channel. Reports
//! that arrive after the caller went away are discarded by the barrier.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use uuid::Uuid;

use crate::backend::{
    matching_credential_ids, CredentialManagerAdapter, LegacyPlatformAdapter, SecurityChecker,
};
use crate::barrier::{BarrierOutcome, CompletionBarrier, JoinMode, Source};
use crate::capability::BackendCapabilitySnapshot;
use crate::config::ArbitrationConfig;
use crate::error::{AuthenticatorStatus, BackendError, CredentialRequestError};
use crate::policy::{
    ArbitrationPolicy, BackendInvocationPlan, EnumerationOutcome, PolicyDecision,
};
use crate::request::{
    AuthenticatorResponse, CredentialManagerResult, CredentialResponse, PreparedCredentials,
    RequestContext,
};

mod cancellation;

use cancellation::{CancelAction, CancellationGate, Cancelled};

/// What a backend task reports into the barrier.
enum SourceResult {
    /// A finished ceremony.
    Response(CredentialResponse),
    /// The credential-manager prefetch of a [`JoinMode::Both`] attempt.
    Prepared(PreparedCredentials),
}

type Outcome = BarrierOutcome<SourceResult>;

struct PendingDelivery {
    generation: u64,
    sender: oneshot::Sender<Outcome>,
}

struct Inner {
    legacy: Arc<dyn LegacyPlatformAdapter>,
    credential_manager: Arc<dyn CredentialManagerAdapter>,
    security_checker: Arc<dyn SecurityChecker>,
    policy: ArbitrationPolicy,
    barrier: CompletionBarrier<SourceResult>,
    gate: CancellationGate,
    in_flight: AtomicBool,
    delivery: Mutex<Option<PendingDelivery>>,
}

/// Serves credential requests by arbitrating between the two platform backends.
///
/// One request may be in flight at a time. Conditional assertions can be cancelled with
/// [`cancel`](Self::cancel) while they are pending.
#[derive(uniffi::Object)]
pub struct CredentialRequestOrchestrator {
    inner: Arc<Inner>,
}

#[uniffi::export(async_runtime = "tokio")]
impl CredentialRequestOrchestrator {
    /// Creates an orchestrator over the given backend adapters.
    #[uniffi::constructor]
    #[must_use]
    pub fn new(
        legacy: Arc<dyn LegacyPlatformAdapter>,
        credential_manager: Arc<dyn CredentialManagerAdapter>,
        security_checker: Arc<dyn SecurityChecker>,
        config: ArbitrationConfig,
    ) -> Self {
        let barrier = CompletionBarrier::new(config.failure_tie_break);
        Self {
            inner: Arc::new(Inner {
                legacy,
                credential_manager,
                security_checker,
                policy: ArbitrationPolicy::new(config),
                barrier,
                gate: CancellationGate::new(),
                in_flight: AtomicBool::new(false),
                delivery: Mutex::new(None),
            }),
        }
    }

    /// Serves one credential request.
    ///
    /// `capabilities` must be captured by the host when the request arrives; it is used
    /// for this attempt only.
    ///
    /// # Errors
    ///
    /// - [`CredentialRequestError::InvalidInput`] if `context` is malformed.
    /// - [`CredentialRequestError::PendingRequest`] if another request is in flight.
    /// - [`CredentialRequestError::SecurityCheckFailed`] if the origin checks reject it.
    /// - [`CredentialRequestError::Aborted`] if the caller cancelled it.
    /// - [`CredentialRequestError::BackendFailure`] if the backend(s) failed. When both
    ///   backends failed only one status survives.
    pub async fn handle_request(
        &self,
        context: RequestContext,
        capabilities: BackendCapabilitySnapshot,
    ) -> Result<CredentialResponse, CredentialRequestError> {
        context.validate()?;
        let _guard = AttemptGuard::acquire(&self.inner)?;
        let attempt = Uuid::new_v4();
        log::info!(
            "attempt {attempt}: {} for {} (conditional: {})",
            context.kind,
            context.relying_party_id,
            context.is_conditional
        );
        self.inner.gate.begin(context.is_conditional);
        self.inner.run(attempt, context, capabilities).await
    }

    /// Cancels the in-flight conditional request.
    ///
    /// Returns `true` when the cancel was recorded against the request. The request then
    /// ends as [`CredentialRequestError::Aborted`] unless the barrier had already resolved:
    /// a completed backend response is still returned, and so is a backend failure that
    /// settled before the cancel arrived. Cancelling a non-conditional request, or when nothing
    /// is in flight, does nothing and returns `false`.
    pub fn cancel(&self) -> bool {
        match self.inner.gate.request_cancel() {
            CancelAction::Ignored => {
                log::debug!("cancel ignored: no cancellable request in flight");
                false
            }
            CancelAction::Deferred => {
                log::debug!("cancel deferred until the running step returns");
                true
            }
            CancelAction::ApplyNow(generation) => {
                log::debug!("cancelling pending backends of cycle {generation}");
                if let Some(outcome) = self.inner.barrier.cancel_pending_for(generation) {
                    self.inner.deliver(generation, outcome);
                }
                true
            }
        }
    }

    /// Returns the entries of `allow_credentials` stored on the device for
    /// `relying_party_id`, as seen by the legacy backend.
    ///
    /// Ids come back in the order the legacy backend enumerated them, not in allow-list
    /// order. With `require_third_party_payment` only payment credentials match.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialRequestError::BackendFailure`] if the legacy backend is not
    /// available or cannot enumerate credentials.
    pub async fn get_matching_credential_ids(
        &self,
        relying_party_id: String,
        allow_credentials: Vec<Vec<u8>>,
        require_third_party_payment: bool,
        capabilities: BackendCapabilitySnapshot,
    ) -> Result<Vec<Vec<u8>>, CredentialRequestError> {
        if !capabilities.legacy_available() {
            log::error!("cannot match credentials: legacy backend unavailable");
            return Err(CredentialRequestError::BackendFailure {
                backend: Source::LegacyPlatformBackend,
                status: AuthenticatorStatus::UnknownError,
            });
        }
        let candidates = self
            .inner
            .legacy
            .enumerate_candidates(relying_party_id)
            .await
            .map_err(|error| CredentialRequestError::BackendFailure {
                backend: Source::LegacyPlatformBackend,
                status: error.status(),
            })?;
        Ok(matching_credential_ids(
            &candidates,
            &allow_credentials,
            require_third_party_payment,
        ))
    }

    /// Reports whether a user-verifying platform authenticator is available.
    ///
    /// Always `true` when the credential-manager path is usable. Otherwise the legacy
    /// backend decides, and any failure counts as unavailable.
    pub async fn is_user_verifying_platform_authenticator_available(
        &self,
        capabilities: BackendCapabilitySnapshot,
    ) -> bool {
        if self.inner.policy.credential_manager_available(&capabilities) {
            return true;
        }
        if !capabilities.legacy_available() {
            return false;
        }
        match self
            .inner
            .legacy
            .is_user_verifying_platform_authenticator_available()
            .await
        {
            Ok(available) => available,
            Err(error) => {
                log::warn!("platform authenticator query failed: {error}");
                false
            }
        }
    }
}

/// Marks the orchestrator busy for the lifetime of one attempt.
struct AttemptGuard<'a> {
    inner: &'a Inner,
}

impl<'a> AttemptGuard<'a> {
    fn acquire(inner: &'a Inner) -> Result<Self, CredentialRequestError> {
        if inner
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            log::warn!("rejecting request: another request is in flight");
            return Err(CredentialRequestError::PendingRequest);
        }
        Ok(Self { inner })
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.inner.gate.end();
        self.inner.lock_delivery().take();
        self.inner.in_flight.store(false, Ordering::Release);
    }
}

fn aborted(attempt: Uuid) -> CredentialRequestError {
    log::info!("attempt {attempt}: aborted by caller");
    CredentialRequestError::Aborted
}

fn backend_status(attempt: Uuid, source: Source, error: &BackendError) -> AuthenticatorStatus {
    let status = error.status();
    log::warn!("attempt {attempt}: {source} failed with {status}: {error}");
    status
}

impl Inner {
    fn lock_delivery(&self) -> MutexGuard<'_, Option<PendingDelivery>> {
        self.delivery.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(
        self: &Arc<Self>,
        attempt: Uuid,
        context: RequestContext,
        capabilities: BackendCapabilitySnapshot,
    ) -> Result<CredentialResponse, CredentialRequestError> {
        self.security_check(attempt, &context).await?;
        let plan = self.plan(attempt, &context, &capabilities).await?;
        log::info!(
            "attempt {attempt}: invoking {} (rule {})",
            plan.mode,
            plan.rule
        );

        let (sender, receiver) = oneshot::channel();
        let generation = self.barrier.reset(plan.mode);
        *self.lock_delivery() = Some(PendingDelivery { generation, sender });
        self.gate
            .await_backends(generation)
            .map_err(|Cancelled| aborted(attempt))?;

        for &source in &plan.sources {
            self.spawn_source(
                attempt,
                generation,
                source,
                plan.mode,
                context.clone(),
                capabilities.clone(),
            );
        }

        let outcome = receiver.await.map_err(|_| {
            log::warn!("attempt {attempt}: barrier cycle {generation} dropped its outcome");
            CredentialRequestError::Aborted
        })?;
        self.finish(attempt, &context, outcome).await
    }

    async fn security_check(
        &self,
        attempt: Uuid,
        context: &RequestContext,
    ) -> Result<(), CredentialRequestError> {
        self.gate.commit().map_err(|Cancelled| aborted(attempt))?;
        let result = self
            .security_checker
            .check(
                context.kind,
                context.relying_party_id.clone(),
                context.origin.clone(),
                context.is_payment,
            )
            .await;
        // A cancel recorded during the check wins over its result.
        self.gate.finish_step().map_err(|Cancelled| aborted(attempt))?;
        result.map_err(|error| {
            let status = error.status();
            log::warn!("attempt {attempt}: security check failed with {status}: {error}");
            CredentialRequestError::SecurityCheckFailed { status }
        })
    }

    async fn plan(
        &self,
        attempt: Uuid,
        context: &RequestContext,
        capabilities: &BackendCapabilitySnapshot,
    ) -> Result<BackendInvocationPlan, CredentialRequestError> {
        let allow_list = match self.policy.evaluate(context, capabilities) {
            PolicyDecision::Plan { plan } => return Ok(plan),
            PolicyDecision::EnumerateThenDecide { allow_list } => allow_list,
        };

        self.gate.commit().map_err(|Cancelled| aborted(attempt))?;
        let outcome = match self
            .legacy
            .enumerate_candidates(context.relying_party_id.clone())
            .await
        {
            Ok(candidates) => EnumerationOutcome::from_candidates(&candidates, &allow_list),
            Err(error) => EnumerationOutcome::Failed {
                status: backend_status(attempt, Source::LegacyPlatformBackend, &error),
            },
        };
        self.gate.finish_step().map_err(|Cancelled| aborted(attempt))?;
        log::debug!("attempt {attempt}: allow-list enumeration {outcome:?}");
        Ok(self.policy.decide_after_enumeration(outcome))
    }

    fn spawn_source(
        self: &Arc<Self>,
        attempt: Uuid,
        generation: u64,
        source: Source,
        mode: JoinMode,
        context: RequestContext,
        capabilities: BackendCapabilitySnapshot,
    ) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let report = inner
                .run_source(attempt, source, mode, context, &capabilities)
                .await;
            let outcome = match report {
                Ok(result) => inner.barrier.report_success_for(generation, source, result),
                Err(status) => inner.barrier.report_failure_for(generation, source, status),
            };
            if let Some(outcome) = outcome {
                inner.deliver(generation, outcome);
            }
        });
    }

    async fn run_source(
        &self,
        attempt: Uuid,
        source: Source,
        mode: JoinMode,
        context: RequestContext,
        capabilities: &BackendCapabilitySnapshot,
    ) -> Result<SourceResult, AuthenticatorStatus> {
        match (source, mode) {
            (Source::LegacyPlatformBackend, _) => self
                .invoke_legacy(attempt, context, capabilities)
                .await
                .map(|response| {
                    SourceResult::Response(CredentialResponse {
                        response,
                        backend: Source::LegacyPlatformBackend,
                    })
                }),
            (Source::CredentialManagerBackend, JoinMode::Both) => self
                .credential_manager
                .prepare(context)
                .await
                .map(SourceResult::Prepared)
                .map_err(|error| backend_status(attempt, source, &error)),
            (Source::CredentialManagerBackend, _) => self
                .invoke_credential_manager(attempt, context, capabilities)
                .await
                .map(SourceResult::Response),
        }
    }

    async fn invoke_legacy(
        &self,
        attempt: Uuid,
        context: RequestContext,
        capabilities: &BackendCapabilitySnapshot,
    ) -> Result<AuthenticatorResponse, AuthenticatorStatus> {
        if !capabilities.legacy_available() {
            log::error!("attempt {attempt}: legacy backend unavailable, play services missing");
            return Err(AuthenticatorStatus::UnknownError);
        }
        self.legacy
            .invoke(context)
            .await
            .map_err(|error| backend_status(attempt, Source::LegacyPlatformBackend, &error))
    }

    async fn invoke_credential_manager(
        &self,
        attempt: Uuid,
        context: RequestContext,
        capabilities: &BackendCapabilitySnapshot,
    ) -> Result<CredentialResponse, AuthenticatorStatus> {
        match self.credential_manager.invoke(context.clone()).await {
            Ok(CredentialManagerResult::Credential { response }) => Ok(CredentialResponse {
                response,
                backend: Source::CredentialManagerBackend,
            }),
            Ok(CredentialManagerResult::NoCredentials) => {
                log::info!(
                    "attempt {attempt}: credential manager has no credentials, \
                     falling back to the legacy backend"
                );
                let response = self.invoke_legacy(attempt, context, capabilities).await?;
                Ok(CredentialResponse {
                    response,
                    backend: Source::LegacyPlatformBackend,
                })
            }
            Err(error) => Err(backend_status(
                attempt,
                Source::CredentialManagerBackend,
                &error,
            )),
        }
    }

    fn deliver(&self, generation: u64, outcome: Outcome) {
        let pending = {
            let mut slot = self.lock_delivery();
            if slot
                .as_ref()
                .is_some_and(|pending| pending.generation == generation)
            {
                slot.take()
            } else {
                None
            }
        };
        match pending {
            Some(pending) => {
                if pending.sender.send(outcome).is_err() {
                    log::debug!("caller stopped waiting for cycle {generation}");
                }
            }
            None => log::warn!("no caller waiting for cycle {generation}, outcome dropped"),
        }
    }

    async fn finish(
        &self,
        attempt: Uuid,
        context: &RequestContext,
        outcome: Outcome,
    ) -> Result<CredentialResponse, CredentialRequestError> {
        let results = match outcome {
            BarrierOutcome::Failed {
                status: AuthenticatorStatus::AbortError,
                ..
            } => return Err(aborted(attempt)),
            BarrierOutcome::Failed { source, status } => {
                log::info!("attempt {attempt}: failed with {status} from {source}");
                return Err(CredentialRequestError::BackendFailure {
                    backend: source,
                    status,
                });
            }
            BarrierOutcome::Succeeded(results) => results,
        };

        // A finished ceremony finalizes; a prefetch still needs the user-facing call.
        let mut prepared = None;
        for (_, result) in results {
            match result {
                SourceResult::Response(response) => {
                    log::info!("attempt {attempt}: completed by {}", response.backend);
                    return Ok(response);
                }
                SourceResult::Prepared(credentials) => prepared = Some(credentials),
            }
        }
        self.complete_prepared(attempt, context, prepared.unwrap_or_default())
            .await
    }

    async fn complete_prepared(
        &self,
        attempt: Uuid,
        context: &RequestContext,
        prepared: PreparedCredentials,
    ) -> Result<CredentialResponse, CredentialRequestError> {
        let not_allowed = CredentialRequestError::BackendFailure {
            backend: Source::CredentialManagerBackend,
            status: AuthenticatorStatus::NotAllowedError,
        };
        if !prepared.has_any() {
            log::info!("attempt {attempt}: nothing prepared by credential manager");
            return Err(not_allowed);
        }

        self.gate.commit().map_err(|Cancelled| aborted(attempt))?;
        let result = self.credential_manager.invoke(context.clone()).await;
        self.gate.finish_step().map_err(|Cancelled| aborted(attempt))?;

        match result {
            Ok(CredentialManagerResult::Credential { response }) => {
                log::info!("attempt {attempt}: completed by credential manager");
                Ok(CredentialResponse {
                    response,
                    backend: Source::CredentialManagerBackend,
                })
            }
            Ok(CredentialManagerResult::NoCredentials) => Err(not_allowed),
            Err(error) => Err(CredentialRequestError::BackendFailure {
                backend: Source::CredentialManagerBackend,
                status: backend_status(attempt, Source::CredentialManagerBackend, &error),
            }),
        }
    }
}
