//! Completion barrier joining the asynchronous results of the credential backends.
//!
//! A [`CompletionBarrier`] is long-lived and reset before every request attempt. The
//! reset fixes the [`JoinMode`], which decides the set of awaited [`Source`]s. Each
//! awaited source moves from pending to exactly one terminal state; once every awaited
//! source is terminal the barrier resolves and the resolving report call returns the
//! [`BarrierOutcome`]. Every other report call, including all calls made after
//! resolution, returns `None`, so an outcome can be observed at most once per cycle.
//!
//! Backend callbacks may arrive from different threads, so the read-modify-check path
//! runs under a single mutex.

use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use strum::Display;

use crate::config::FailureTieBreak;
use crate::error::AuthenticatorStatus;

/// One of the two backends able to serve a credential request.
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
pub enum Source {
    /// The platform credential-manager API.
    CredentialManagerBackend,
    /// The legacy play-services FIDO2 API.
    LegacyPlatformBackend,
}

/// Which sources the barrier waits for during one attempt.
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
pub enum JoinMode {
    /// Only the credential-manager backend is invoked.
    OnlyCredentialManager,
    /// Only the legacy backend is invoked.
    OnlyLegacyPlatform,
    /// Both backends are invoked and race.
    Both,
}

impl JoinMode {
    /// Returns the awaited sources in declaration order.
    ///
    /// Success continuations are delivered in this order, never in arrival order.
    #[must_use]
    pub const fn awaited(self) -> &'static [Source] {
        match self {
            Self::OnlyCredentialManager => &[Source::CredentialManagerBackend],
            Self::OnlyLegacyPlatform => &[Source::LegacyPlatformBackend],
            Self::Both => &[Source::CredentialManagerBackend, Source::LegacyPlatformBackend],
        }
    }

    /// Returns `true` when `source` takes part in this mode.
    #[must_use]
    pub fn awaits(self, source: Source) -> bool {
        self.awaited().contains(&source)
    }
}

/// Diagnostic view of one source during the current cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, uniffi::Enum)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum SourceStatus {
    /// The source is not part of the current mode, or the barrier was never reset.
    NotAwaited,
    /// No report yet.
    Pending,
    /// The source reported a result.
    Succeeded,
    /// The source reported a failure.
    Failed {
        /// Reported status.
        status: AuthenticatorStatus,
    },
    /// The source was cancelled while still pending.
    Cancelled,
}

impl SourceStatus {
    const fn is_pending(self) -> bool {
        matches!(self, Self::Pending)
    }

    const fn failure_status(self) -> Option<AuthenticatorStatus> {
        match self {
            Self::Failed { status } => Some(status),
            Self::Cancelled => Some(AuthenticatorStatus::AbortError),
            Self::NotAwaited | Self::Pending | Self::Succeeded => None,
        }
    }
}

/// Terminal result of one barrier cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BarrierOutcome<T> {
    /// At least one source succeeded. Results are in [`JoinMode::awaited`] order.
    Succeeded(Vec<(Source, T)>),
    /// No source succeeded; a single status survives.
    Failed {
        /// Source whose status was selected.
        source: Source,
        /// Selected status. Cancelled sources contribute [`AuthenticatorStatus::AbortError`].
        status: AuthenticatorStatus,
    },
}

impl<T> BarrierOutcome<T> {
    /// Runs the success continuation once per succeeded source, in declaration order,
    /// or the error continuation exactly once when nothing succeeded.
    pub fn deliver<S, E>(self, mut on_success: S, on_error: E)
    where
        S: FnMut(Source, T),
        E: FnOnce(Source, AuthenticatorStatus),
    {
        match self {
            Self::Succeeded(results) => {
                for (source, result) in results {
                    on_success(source, result);
                }
            }
            Self::Failed { source, status } => on_error(source, status),
        }
    }

    /// Returns `true` when at least one source succeeded.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

#[derive(Debug)]
struct Slot<T> {
    source: Source,
    status: SourceStatus,
    result: Option<T>,
}

#[derive(Debug)]
struct Cycle<T> {
    generation: u64,
    mode: Option<JoinMode>,
    slots: Vec<Slot<T>>,
    last_completed: Option<Source>,
    resolved: bool,
}

impl<T> Cycle<T> {
    const fn idle() -> Self {
        Self {
            generation: 0,
            mode: None,
            slots: Vec::new(),
            last_completed: None,
            resolved: false,
        }
    }

    fn slot_mut(&mut self, source: Source) -> Option<&mut Slot<T>> {
        self.slots.iter_mut().find(|slot| slot.source == source)
    }

    fn all_terminal(&self) -> bool {
        !self.slots.iter().any(|slot| slot.status.is_pending())
    }

    fn take_outcome(&mut self, tie_break: FailureTieBreak) -> Option<BarrierOutcome<T>> {
        let results: Vec<(Source, T)> = self
            .slots
            .iter_mut()
            .filter_map(|slot| slot.result.take().map(|result| (slot.source, result)))
            .collect();
        if !results.is_empty() {
            return Some(BarrierOutcome::Succeeded(results));
        }

        let (source, status) = match tie_break {
            FailureTieBreak::LastCompleted => self.last_completed.and_then(|source| {
                self.slots
                    .iter()
                    .find(|slot| slot.source == source)
                    .and_then(|slot| slot.status.failure_status())
                    .map(|status| (source, status))
            }),
            FailureTieBreak::PreferLegacyPlatform => self
                .slots
                .iter()
                .find(|slot| matches!(slot.status, SourceStatus::Cancelled))
                .or_else(|| {
                    self.slots
                        .iter()
                        .find(|slot| slot.source == Source::LegacyPlatformBackend)
                })
                .or_else(|| self.slots.first())
                .and_then(|slot| slot.status.failure_status().map(|status| (slot.source, status))),
        }?;
        if self.slots.len() > 1 {
            log::debug!("every source failed, surfacing {status} from {source} ({tie_break})");
        }
        Some(BarrierOutcome::Failed { source, status })
    }
}

/// Join primitive over the two credential backends.
///
/// `T` is the opaque success token carried by a succeeded source.
#[derive(Debug)]
pub struct CompletionBarrier<T> {
    tie_break: FailureTieBreak,
    cycle: Mutex<Cycle<T>>,
}

impl<T> Default for CompletionBarrier<T> {
    fn default() -> Self {
        Self::new(FailureTieBreak::default())
    }
}

impl<T> CompletionBarrier<T> {
    /// Creates an idle barrier. Until the first [`reset`](Self::reset) every report is
    /// ignored.
    #[must_use]
    pub const fn new(tie_break: FailureTieBreak) -> Self {
        Self {
            tie_break,
            cycle: Mutex::new(Cycle::idle()),
        }
    }

    // The cycle is only mutated after every check has passed, so a panic in a caller
    // holding the guard cannot leave it half-updated.
    fn lock(&self) -> MutexGuard<'_, Cycle<T>> {
        self.cycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a new cycle awaiting the sources implied by `mode`.
    ///
    /// Any result still held from the previous cycle is dropped. Returns the generation
    /// of the new cycle, which [`report_success_for`](Self::report_success_for) and
    /// friends use to discard reports that belong to an earlier cycle.
    pub fn reset(&self, mode: JoinMode) -> u64 {
        let mut cycle = self.lock();
        cycle.generation = cycle.generation.wrapping_add(1);
        cycle.mode = Some(mode);
        cycle.slots = mode
            .awaited()
            .iter()
            .map(|&source| Slot {
                source,
                status: SourceStatus::Pending,
                result: None,
            })
            .collect();
        cycle.last_completed = None;
        cycle.resolved = false;
        log::debug!("barrier cycle {} awaiting {mode}", cycle.generation);
        cycle.generation
    }

    /// Records a success for `source` in the current cycle.
    pub fn report_success(&self, source: Source, result: T) -> Option<BarrierOutcome<T>> {
        self.record(None, source, SourceStatus::Succeeded, Some(result))
    }

    /// Records a failure for `source` in the current cycle.
    pub fn report_failure(
        &self,
        source: Source,
        status: AuthenticatorStatus,
    ) -> Option<BarrierOutcome<T>> {
        self.record(None, source, SourceStatus::Failed { status }, None)
    }

    /// Records `source` as cancelled in the current cycle.
    pub fn report_cancelled(&self, source: Source) -> Option<BarrierOutcome<T>> {
        self.record(None, source, SourceStatus::Cancelled, None)
    }

    /// Like [`report_success`](Self::report_success), but ignored unless `generation`
    /// is the current cycle.
    pub fn report_success_for(
        &self,
        generation: u64,
        source: Source,
        result: T,
    ) -> Option<BarrierOutcome<T>> {
        self.record(Some(generation), source, SourceStatus::Succeeded, Some(result))
    }

    /// Like [`report_failure`](Self::report_failure), but ignored unless `generation`
    /// is the current cycle.
    pub fn report_failure_for(
        &self,
        generation: u64,
        source: Source,
        status: AuthenticatorStatus,
    ) -> Option<BarrierOutcome<T>> {
        self.record(Some(generation), source, SourceStatus::Failed { status }, None)
    }

    /// Marks every still-pending source of cycle `generation` as cancelled.
    ///
    /// Resolution is checked once, after all pending sources have been marked.
    pub fn cancel_pending_for(&self, generation: u64) -> Option<BarrierOutcome<T>> {
        let mut guard = self.lock();
        let cycle = &mut *guard;
        if cycle.generation != generation || cycle.resolved || cycle.mode.is_none() {
            return None;
        }
        for slot in cycle.slots.iter_mut().filter(|slot| slot.status.is_pending()) {
            slot.status = SourceStatus::Cancelled;
            cycle.last_completed = Some(slot.source);
        }
        self.resolve_if_complete(cycle)
    }

    fn record(
        &self,
        generation: Option<u64>,
        source: Source,
        status: SourceStatus,
        result: Option<T>,
    ) -> Option<BarrierOutcome<T>> {
        let mut cycle = self.lock();
        if let Some(generation) = generation {
            if generation != cycle.generation {
                log::warn!(
                    "discarding {source} report from stale cycle {generation} (current {})",
                    cycle.generation
                );
                return None;
            }
        }
        if cycle.resolved {
            log::warn!(
                "discarding {source} report after cycle {} resolved",
                cycle.generation
            );
            return None;
        }
        let Some(slot) = cycle.slot_mut(source) else {
            log::debug!("ignoring {source} report: not awaited in this cycle");
            return None;
        };
        if !slot.status.is_pending() {
            log::warn!(
                "discarding duplicate {source} report: already {:?}",
                slot.status
            );
            return None;
        }
        slot.status = status;
        slot.result = result;
        cycle.last_completed = Some(source);
        self.resolve_if_complete(&mut cycle)
    }

    fn resolve_if_complete(&self, cycle: &mut Cycle<T>) -> Option<BarrierOutcome<T>> {
        if !cycle.all_terminal() {
            return None;
        }
        cycle.resolved = true;
        cycle.take_outcome(self.tie_break)
    }

    /// Returns the generation of the current cycle. Zero before the first reset.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Returns the mode of the current cycle, if the barrier was ever reset.
    pub fn mode(&self) -> Option<JoinMode> {
        self.lock().mode
    }

    /// Returns `true` once the current cycle delivered its outcome.
    pub fn is_resolved(&self) -> bool {
        self.lock().resolved
    }

    /// Returns the state of `source` in the current cycle.
    pub fn status(&self, source: Source) -> SourceStatus {
        self.lock()
            .slots
            .iter()
            .find(|slot| slot.source == source)
            .map_or(SourceStatus::NotAwaited, |slot| slot.status)
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    use super::Source::{CredentialManagerBackend as CredMan, LegacyPlatformBackend as Legacy};
    use crate::error::AuthenticatorStatus::{NotAllowedError, UnknownError};

    #[derive(Debug, Clone, Copy)]
    enum Report {
        Ok(Source, u8),
        Err(Source, AuthenticatorStatus),
        Cancel(Source),
    }

    fn apply(barrier: &CompletionBarrier<u8>, report: Report) -> Option<BarrierOutcome<u8>> {
        match report {
            Report::Ok(source, token) => barrier.report_success(source, token),
            Report::Err(source, status) => barrier.report_failure(source, status),
            Report::Cancel(source) => barrier.report_cancelled(source),
        }
    }

    /// Applies every report and returns all outcomes that were produced.
    fn run(
        tie_break: FailureTieBreak,
        mode: JoinMode,
        reports: &[Report],
    ) -> Vec<BarrierOutcome<u8>> {
        let barrier = CompletionBarrier::new(tie_break);
        barrier.reset(mode);
        reports
            .iter()
            .filter_map(|&report| apply(&barrier, report))
            .collect()
    }

    #[test]
    fn test_both_succeed_runs_both_continuations() {
        let barrier = CompletionBarrier::default();
        barrier.reset(JoinMode::Both);
        assert!(barrier.report_success(Legacy, 1).is_none());
        let outcome = barrier.report_success(CredMan, 2).unwrap();

        let mut seen = Vec::new();
        let mut errors = 0;
        outcome.deliver(|source, token| seen.push((source, token)), |_, _| errors += 1);
        assert_eq!(seen, vec![(CredMan, 2), (Legacy, 1)]);
        assert_eq!(errors, 0);
    }

    #[test]
    fn test_legacy_success_then_credman_failure() {
        let outcomes = run(
            FailureTieBreak::default(),
            JoinMode::Both,
            &[Report::Ok(Legacy, 7), Report::Err(CredMan, UnknownError)],
        );
        assert_eq!(outcomes, vec![BarrierOutcome::Succeeded(vec![(Legacy, 7)])]);
    }

    #[test]
    fn test_nothing_fires_while_a_source_is_pending() {
        let barrier = CompletionBarrier::default();
        barrier.reset(JoinMode::Both);
        assert!(barrier.report_success(Legacy, 1).is_none());
        assert!(!barrier.is_resolved());
        assert_eq!(barrier.status(Legacy), SourceStatus::Succeeded);
        assert_eq!(barrier.status(CredMan), SourceStatus::Pending);
    }

    #[test]
    fn test_both_fail_fires_error_once() {
        let outcomes = run(
            FailureTieBreak::default(),
            JoinMode::Both,
            &[
                Report::Err(Legacy, NotAllowedError),
                Report::Err(CredMan, UnknownError),
                Report::Err(CredMan, UnknownError),
                Report::Ok(Legacy, 3),
            ],
        );
        assert_eq!(
            outcomes,
            vec![BarrierOutcome::Failed {
                source: Legacy,
                status: NotAllowedError
            }]
        );
    }

    #[test]
    fn test_only_credman_ignores_legacy_reports() {
        let barrier = CompletionBarrier::default();
        barrier.reset(JoinMode::OnlyCredentialManager);
        assert!(barrier.report_success(Legacy, 1).is_none());
        assert_eq!(barrier.status(Legacy), SourceStatus::NotAwaited);
        let outcome = barrier.report_failure(CredMan, NotAllowedError).unwrap();
        assert_eq!(
            outcome,
            BarrierOutcome::Failed {
                source: CredMan,
                status: NotAllowedError
            }
        );
        assert!(barrier.report_success(Legacy, 2).is_none());
    }

    #[test]
    fn test_only_legacy_success() {
        let outcomes = run(
            FailureTieBreak::default(),
            JoinMode::OnlyLegacyPlatform,
            &[Report::Err(CredMan, UnknownError), Report::Ok(Legacy, 9)],
        );
        assert_eq!(outcomes, vec![BarrierOutcome::Succeeded(vec![(Legacy, 9)])]);
    }

    #[test]
    fn test_reports_before_first_reset_are_ignored() {
        let barrier = CompletionBarrier::<u8>::default();
        assert!(barrier.report_success(CredMan, 1).is_none());
        assert!(barrier.report_failure(Legacy, UnknownError).is_none());
        assert_eq!(barrier.mode(), None);
        assert_eq!(barrier.generation(), 0);
    }

    #[test]
    fn test_reset_starts_a_fresh_cycle() {
        let barrier = CompletionBarrier::default();
        let first = barrier.reset(JoinMode::OnlyCredentialManager);
        assert!(barrier.report_success(CredMan, 1).is_some());
        assert!(barrier.is_resolved());

        let second = barrier.reset(JoinMode::OnlyCredentialManager);
        assert_ne!(first, second);
        assert!(!barrier.is_resolved());
        assert_eq!(barrier.status(CredMan), SourceStatus::Pending);

        // Late answer from the first attempt.
        assert!(barrier.report_success_for(first, CredMan, 5).is_none());
        assert_eq!(barrier.status(CredMan), SourceStatus::Pending);

        let outcome = barrier.report_success_for(second, CredMan, 6).unwrap();
        assert_eq!(outcome, BarrierOutcome::Succeeded(vec![(CredMan, 6)]));
    }

    #[test]
    fn test_cancelled_counts_as_failure_with_abort_status() {
        let outcomes = run(
            FailureTieBreak::default(),
            JoinMode::OnlyLegacyPlatform,
            &[Report::Cancel(Legacy), Report::Ok(Legacy, 1)],
        );
        assert_eq!(
            outcomes,
            vec![BarrierOutcome::Failed {
                source: Legacy,
                status: AuthenticatorStatus::AbortError
            }]
        );
    }

    #[test]
    fn test_cancel_pending_keeps_existing_success() {
        let barrier = CompletionBarrier::default();
        let generation = barrier.reset(JoinMode::Both);
        assert!(barrier.report_success(Legacy, 4).is_none());
        let outcome = barrier.cancel_pending_for(generation).unwrap();
        assert_eq!(outcome, BarrierOutcome::Succeeded(vec![(Legacy, 4)]));
        assert_eq!(barrier.status(CredMan), SourceStatus::Cancelled);
        assert!(barrier.cancel_pending_for(generation).is_none());
    }

    #[test]
    fn test_cancel_pending_ignores_other_generations() {
        let barrier = CompletionBarrier::<u8>::default();
        let generation = barrier.reset(JoinMode::Both);
        assert!(barrier.cancel_pending_for(generation + 1).is_none());
        assert_eq!(barrier.status(CredMan), SourceStatus::Pending);
    }

    #[test_case(JoinMode::Both, &[Report::Ok(Legacy, 1), Report::Ok(CredMan, 2)] ; "two successes")]
    #[test_case(JoinMode::Both, &[Report::Ok(Legacy, 1), Report::Err(CredMan, UnknownError)] ; "success and failure")]
    #[test_case(JoinMode::Both, &[Report::Err(Legacy, NotAllowedError), Report::Err(CredMan, UnknownError)] ; "two failures")]
    #[test_case(JoinMode::Both, &[Report::Cancel(Legacy), Report::Err(CredMan, UnknownError)] ; "cancel and failure")]
    #[test_case(JoinMode::Both, &[Report::Cancel(CredMan), Report::Ok(Legacy, 3)] ; "cancel and success")]
    fn test_outcome_is_independent_of_arrival_order(mode: JoinMode, reports: &[Report]) {
        let forward = run(FailureTieBreak::PreferLegacyPlatform, mode, reports);
        let reversed: Vec<Report> = reports.iter().rev().copied().collect();
        let backward = run(FailureTieBreak::PreferLegacyPlatform, mode, &reversed);
        assert_eq!(forward.len(), 1);
        assert_eq!(forward, backward);
    }

    #[test]
    fn test_last_completed_tie_break_follows_arrival() {
        let forward = run(
            FailureTieBreak::LastCompleted,
            JoinMode::Both,
            &[Report::Err(Legacy, NotAllowedError), Report::Err(CredMan, UnknownError)],
        );
        assert_eq!(
            forward,
            vec![BarrierOutcome::Failed {
                source: CredMan,
                status: UnknownError
            }]
        );

        let backward = run(
            FailureTieBreak::LastCompleted,
            JoinMode::Both,
            &[Report::Err(CredMan, UnknownError), Report::Err(Legacy, NotAllowedError)],
        );
        assert_eq!(
            backward,
            vec![BarrierOutcome::Failed {
                source: Legacy,
                status: NotAllowedError
            }]
        );
    }

    #[test]
    fn test_prefer_legacy_tie_break_lets_abort_win() {
        let outcomes = run(
            FailureTieBreak::PreferLegacyPlatform,
            JoinMode::Both,
            &[Report::Err(Legacy, NotAllowedError), Report::Cancel(CredMan)],
        );
        assert_eq!(
            outcomes,
            vec![BarrierOutcome::Failed {
                source: CredMan,
                status: AuthenticatorStatus::AbortError
            }]
        );
    }

    #[test]
    fn test_concurrent_reports_resolve_once() {
        use std::sync::Arc;

        for _ in 0..64 {
            let barrier = Arc::new(CompletionBarrier::<u8>::default());
            barrier.reset(JoinMode::Both);
            let handles: Vec<_> = [CredMan, Legacy]
                .into_iter()
                .map(|source| {
                    let barrier = Arc::clone(&barrier);
                    std::thread::spawn(move || barrier.report_success(source, 1).is_some())
                })
                .collect();
            let resolved = handles
                .into_iter()
                .map(|handle| handle.join().unwrap())
                .filter(|resolved| *resolved)
                .count();
            assert_eq!(resolved, 1);
        }
    }
}
