//! Backend arbitration: which backend(s) serve a request, and how their results are joined.
//!
//! [`ArbitrationPolicy`] is a pure function of the [`RequestContext`], the
//! [`BackendCapabilitySnapshot`] and its constructor-injected [`ArbitrationConfig`]. Rules
//! are evaluated in priority order and the first match wins:
//!
//! 1. payment requests go to the legacy backend;
//! 2. app-scoped requests go to the legacy backend unless the device is allow-listed;
//! 3. PRF over a cross-device request goes to the legacy backend;
//! 4. a discouraged resident key over a cross-device request goes to the legacy backend;
//! 5. a device that cannot host credential manager sends everything to the legacy backend;
//! 6. with the credential-manager flag off, hybrid requests still use credential manager
//!    and all others go to the legacy backend;
//! 7. assertions with an allow-list enumerate the legacy backend's credentials first;
//! 8. assertions race both backends while GPM is not reachable through credential manager;
//! 9. everything else uses credential manager alone.
//!
//! The allow-list rule needs an asynchronous query, so [`ArbitrationPolicy::evaluate`]
//! stops there with [`PolicyDecision::EnumerateThenDecide`] and the caller finishes with
//! [`ArbitrationPolicy::decide_after_enumeration`].

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::backend::matching_credential_ids;
use crate::barrier::{JoinMode, Source};
use crate::capability::{BackendCapabilitySnapshot, WebauthnMode};
use crate::config::ArbitrationConfig;
use crate::error::AuthenticatorStatus;
use crate::request::{CandidateCredential, RequestContext, RequestKind, ResidentKeyRequirement};

/// The rule that selected a [`BackendInvocationPlan`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize, uniffi::Enum,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DecisionRule {
    /// Payment credential creation or secure payment confirmation.
    PaymentRequest,
    /// App-scoped mode on a device that is not allow-listed for credential manager.
    AppScopedMode,
    /// PRF requested together with a caller-supplied client-data hash.
    PrfOverHybrid,
    /// Discouraged resident key together with a caller-supplied client-data hash.
    DiscouragedResidentKeyOverHybrid,
    /// The device or its API level cannot run credential manager.
    PlatformLacksCredentialManager,
    /// The credential-manager flag is off and the request is not hybrid.
    CredentialManagerUnavailable,
    /// The credential-manager flag is off, but hybrid transport needs it.
    HybridRequiresCredentialManager,
    /// An allow-list entry exists on the device.
    AllowListMatched,
    /// No allow-list entry exists on the device, or enumeration failed.
    AllowListNotMatched,
    /// GPM is not reachable through credential manager, so both backends race.
    GpmOutsideCredentialManager,
    /// No other rule applied.
    Default,
}

/// Which backends to invoke for one request attempt and how to join them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Record)]
pub struct BackendInvocationPlan {
    /// Barrier mode for the attempt.
    pub mode: JoinMode,
    /// Backends to invoke, in barrier order.
    pub sources: Vec<Source>,
    /// Rule that produced the plan.
    pub rule: DecisionRule,
}

impl BackendInvocationPlan {
    /// Creates a plan for `mode`, selected by `rule`.
    #[must_use]
    pub fn new(mode: JoinMode, rule: DecisionRule) -> Self {
        Self {
            mode,
            sources: mode.awaited().to_vec(),
            rule,
        }
    }

    /// Returns `true` when the plan invokes `source`.
    #[must_use]
    pub fn invokes(&self, source: Source) -> bool {
        self.mode.awaits(source)
    }
}

/// Result of the first policy evaluation step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case", tag = "decision")]
pub enum PolicyDecision {
    /// The plan is final.
    Plan {
        /// Selected plan.
        plan: BackendInvocationPlan,
    },
    /// Enumerate the legacy backend's credentials for `allow_list`, then call
    /// [`ArbitrationPolicy::decide_after_enumeration`].
    EnumerateThenDecide {
        /// Credential ids to look for.
        allow_list: Vec<Vec<u8>>,
    },
}

/// Result of the allow-list enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum EnumerationOutcome {
    /// At least one allow-list entry exists on the device.
    Matched,
    /// Enumeration succeeded without a match.
    NoMatch,
    /// Enumeration could not be performed.
    Failed {
        /// Why enumeration failed.
        status: AuthenticatorStatus,
    },
}

impl EnumerationOutcome {
    /// Classifies enumerated `candidates` against `allow_list`.
    #[must_use]
    pub fn from_candidates(candidates: &[CandidateCredential], allow_list: &[Vec<u8>]) -> Self {
        if matching_credential_ids(candidates, allow_list, false).is_empty() {
            Self::NoMatch
        } else {
            Self::Matched
        }
    }
}

/// Pure backend arbitration policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArbitrationPolicy {
    config: ArbitrationConfig,
}

impl ArbitrationPolicy {
    /// Creates a policy with the given configuration.
    #[must_use]
    pub const fn new(config: ArbitrationConfig) -> Self {
        Self { config }
    }

    /// Returns the configuration the policy was created with.
    #[must_use]
    pub const fn config(&self) -> &ArbitrationConfig {
        &self.config
    }

    /// Returns `true` when the device and its API level can run credential manager,
    /// whatever the feature flag says.
    #[must_use]
    pub const fn platform_supports_credential_manager(
        &self,
        caps: &BackendCapabilitySnapshot,
    ) -> bool {
        caps.device_supports_credential_manager
            && caps.platform_api_level >= self.config.min_credential_manager_api_level
    }

    /// Returns `true` when the credential-manager path can be used at all.
    #[must_use]
    pub const fn credential_manager_available(&self, caps: &BackendCapabilitySnapshot) -> bool {
        caps.credential_manager_enabled && self.platform_supports_credential_manager(caps)
    }

    /// Returns `true` when the request arrived over a cross-device transport.
    #[must_use]
    pub const fn is_hybrid(context: &RequestContext, caps: &BackendCapabilitySnapshot) -> bool {
        caps.hybrid_request || context.has_client_data_hash()
    }

    /// Runs the rules in order up to the first match.
    ///
    /// Returns [`PolicyDecision::EnumerateThenDecide`] when the allow-list rule needs the
    /// legacy backend's credential list to decide.
    #[must_use]
    pub fn evaluate(
        &self,
        context: &RequestContext,
        caps: &BackendCapabilitySnapshot,
    ) -> PolicyDecision {
        let plan = |mode, rule| PolicyDecision::Plan {
            plan: BackendInvocationPlan::new(mode, rule),
        };
        let hash = context.has_client_data_hash();

        if context.is_payment {
            return plan(JoinMode::OnlyLegacyPlatform, DecisionRule::PaymentRequest);
        }
        if caps.webauthn_mode == WebauthnMode::AppScoped
            && !self
                .config
                .allows_app_scoped(&caps.device.manufacturer, caps.platform_api_level)
        {
            return plan(JoinMode::OnlyLegacyPlatform, DecisionRule::AppScopedMode);
        }
        if context.prf_requested && hash {
            return plan(JoinMode::OnlyLegacyPlatform, DecisionRule::PrfOverHybrid);
        }
        if context.resident_key == Some(ResidentKeyRequirement::Discouraged) && hash {
            return plan(
                JoinMode::OnlyLegacyPlatform,
                DecisionRule::DiscouragedResidentKeyOverHybrid,
            );
        }
        if !self.platform_supports_credential_manager(caps) {
            return plan(
                JoinMode::OnlyLegacyPlatform,
                DecisionRule::PlatformLacksCredentialManager,
            );
        }
        if !caps.credential_manager_enabled {
            return if Self::is_hybrid(context, caps) {
                plan(
                    JoinMode::OnlyCredentialManager,
                    DecisionRule::HybridRequiresCredentialManager,
                )
            } else {
                plan(
                    JoinMode::OnlyLegacyPlatform,
                    DecisionRule::CredentialManagerUnavailable,
                )
            };
        }

        let is_assertion = context.kind == RequestKind::GetAssertion;
        if is_assertion && context.has_allow_credentials() {
            if !self.can_enumerate(caps) {
                log::debug!("legacy enumeration unavailable, treating allow-list as unmatched");
                return PolicyDecision::Plan {
                    plan: self.decide_after_enumeration(EnumerationOutcome::Failed {
                        status: AuthenticatorStatus::AndroidNotSupportedError,
                    }),
                };
            }
            return PolicyDecision::EnumerateThenDecide {
                allow_list: context.allow_credentials.clone(),
            };
        }
        if is_assertion && !caps.gpm_in_credential_manager {
            return plan(JoinMode::Both, DecisionRule::GpmOutsideCredentialManager);
        }
        plan(JoinMode::OnlyCredentialManager, DecisionRule::Default)
    }

    /// Completes the allow-list rule once the allow-list enumeration finished.
    #[must_use]
    pub fn decide_after_enumeration(&self, outcome: EnumerationOutcome) -> BackendInvocationPlan {
        match outcome {
            EnumerationOutcome::Matched => BackendInvocationPlan::new(
                JoinMode::OnlyLegacyPlatform,
                DecisionRule::AllowListMatched,
            ),
            EnumerationOutcome::NoMatch => BackendInvocationPlan::new(
                JoinMode::OnlyCredentialManager,
                DecisionRule::AllowListNotMatched,
            ),
            EnumerationOutcome::Failed { status } => {
                log::debug!("allow-list enumeration failed with {status}");
                BackendInvocationPlan::new(
                    JoinMode::OnlyCredentialManager,
                    DecisionRule::AllowListNotMatched,
                )
            }
        }
    }

    fn can_enumerate(&self, caps: &BackendCapabilitySnapshot) -> bool {
        caps.gms_core_version
            .is_some_and(|version| version >= self.config.min_gms_core_version_for_enumeration)
    }
}
