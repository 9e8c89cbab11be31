//! Cancellation bookkeeping for conditional requests.
//!
//! Some steps of a request cannot be interrupted once started: the security check, the
//! allow-list enumeration and the user-facing finalize call. A cancel that arrives during
//! one of them is recorded and applied as soon as the step returns; from then on the
//! attempt can only end as aborted.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Where the current conditional attempt stands with respect to cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConditionalState {
    /// No cancellable attempt is running.
    Idle,
    /// A conditional attempt is running outside of any committed step.
    Preparing,
    /// A step that cannot be interrupted is in flight.
    Committed,
    /// The barrier for `generation` awaits backend reports.
    AwaitingBackends { generation: u64 },
    /// A cancel was requested; the attempt aborts at its next checkpoint.
    CancelPending,
}

/// What [`CancellationGate::request_cancel`] asks the orchestrator to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelAction {
    /// Nothing to cancel.
    Ignored,
    /// Recorded; the running step aborts when it returns.
    Deferred,
    /// Cancel the pending sources of barrier cycle `generation` now.
    ApplyNow(u64),
}

/// The attempt was cancelled and must end as aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Cancelled;

#[derive(Debug)]
pub(crate) struct CancellationGate {
    state: Mutex<ConditionalState>,
}

impl CancellationGate {
    pub(crate) const fn new() -> Self {
        Self {
            state: Mutex::new(ConditionalState::Idle),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConditionalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ConditionalState {
        *self.lock()
    }

    /// Opens a new attempt. Non-conditional attempts cannot be cancelled.
    pub(crate) fn begin(&self, conditional: bool) {
        *self.lock() = if conditional {
            ConditionalState::Preparing
        } else {
            ConditionalState::Idle
        };
    }

    /// Closes the attempt.
    pub(crate) fn end(&self) {
        *self.lock() = ConditionalState::Idle;
    }

    /// Enters a committed step, unless a cancel is already pending.
    pub(crate) fn commit(&self) -> Result<(), Cancelled> {
        let mut state = self.lock();
        match *state {
            ConditionalState::CancelPending => Err(Cancelled),
            ConditionalState::Idle => Ok(()),
            ConditionalState::Preparing
            | ConditionalState::Committed
            | ConditionalState::AwaitingBackends { .. } => {
                *state = ConditionalState::Committed;
                Ok(())
            }
        }
    }

    /// Leaves a committed step. Fails if a cancel arrived while it ran.
    pub(crate) fn finish_step(&self) -> Result<(), Cancelled> {
        let mut state = self.lock();
        match *state {
            ConditionalState::CancelPending => Err(Cancelled),
            ConditionalState::Committed => {
                *state = ConditionalState::Preparing;
                Ok(())
            }
            ConditionalState::Idle
            | ConditionalState::Preparing
            | ConditionalState::AwaitingBackends { .. } => Ok(()),
        }
    }

    /// Hands cancellation over to the barrier cycle `generation`.
    pub(crate) fn await_backends(&self, generation: u64) -> Result<(), Cancelled> {
        let mut state = self.lock();
        match *state {
            ConditionalState::CancelPending => Err(Cancelled),
            ConditionalState::Idle => Ok(()),
            ConditionalState::Preparing
            | ConditionalState::Committed
            | ConditionalState::AwaitingBackends { .. } => {
                *state = ConditionalState::AwaitingBackends { generation };
                Ok(())
            }
        }
    }

    pub(crate) fn request_cancel(&self) -> CancelAction {
        let mut state = self.lock();
        match *state {
            ConditionalState::Idle | ConditionalState::CancelPending => CancelAction::Ignored,
            ConditionalState::Preparing | ConditionalState::Committed => {
                *state = ConditionalState::CancelPending;
                CancelAction::Deferred
            }
            ConditionalState::AwaitingBackends { generation } => {
                *state = ConditionalState::CancelPending;
                CancelAction::ApplyNow(generation)
            }
        }
    }
}
