use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Token for cooperative cancellation, checked between files.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns Ok(()) to continue, Err if cancelled.
    pub fn check(&self) -> Result<(), CancelledError> {
        if self.is_cancelled() {
            Err(CancelledError)
        } else {
            Ok(())
        }
    }
}

/// Error indicating the operation was cancelled.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Operation cancelled")]
pub struct CancelledError;

#[derive(Debug, Default)]
struct SlotState {
    token: Option<CancellationToken>,
    stop_requested: bool,
}

/// Holds the token of the one phase allowed to run at a time.
///
/// A job is a run of phases started by [`JobSlot::begin`]. A stop requested
/// while the job is between phases carries over into its next phase.
#[derive(Debug, Default)]
pub struct JobSlot {
    state: Mutex<SlotState>,
}

impl JobSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new job: cancel whatever is running, forget earlier stop requests.
    pub fn begin(&self) -> CancellationToken {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.stop_requested = false;
        Self::replace(&mut state)
    }

    /// Hand out the token for the next phase of the current job.
    ///
    /// Returned already cancelled if a stop was requested during the job.
    pub fn next_phase(&self) -> CancellationToken {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        Self::replace(&mut state)
    }

    /// Cancel the running phase and any later phase of the same job.
    pub fn cancel(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.stop_requested = true;
        if let Some(token) = state.token.as_ref() {
            token.cancel();
        }
    }

    fn replace(state: &mut SlotState) -> CancellationToken {
        if let Some(previous) = state.token.take() {
            previous.cancel();
        }
        let token = CancellationToken::new();
        if state.stop_requested {
            token.cancel();
        }
        state.token = Some(token.clone());
        token
    }
}
