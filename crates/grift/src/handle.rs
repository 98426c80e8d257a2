use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::AbortError;
use crate::state::TransactionState;

/// Run bookkeeping shared between a transaction and its handles.
#[derive(Debug, Default)]
pub(crate) struct RunStatus {
    pub(crate) state: TransactionState,
    pub(crate) abort_requested: bool,
    pub(crate) pending: usize,
    pub(crate) started_at: Option<Instant>,
    pub(crate) run_time: Option<Duration>,
}

impl RunStatus {
    fn running_time(&self) -> Option<Duration> {
        if self.state.is_active() {
            self.started_at.map(|started| started.elapsed())
        } else {
            self.run_time
        }
    }

    fn try_abort(&mut self) -> Result<(), AbortError> {
        if self.state != TransactionState::Running {
            return Err(AbortError::NotRunning);
        }
        if self.pending == 0 {
            return Err(AbortError::NoPendingSteps);
        }
        self.abort_requested = true;
        Ok(())
    }
}

/// Cloneable handle for observing and aborting a transaction while
/// [`Transaction::execute`](crate::Transaction::execute) holds it borrowed.
///
/// Handles stay attached across [`Transaction::reset`](crate::Transaction::reset).
#[derive(Debug, Clone, Default)]
pub struct TransactionHandle {
    status: Arc<Mutex<RunStatus>>,
}

impl TransactionHandle {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, RunStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current lifecycle phase of the transaction.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.lock().state
    }

    /// Whether an abort has been accepted for the current run.
    #[must_use]
    pub fn abort_requested(&self) -> bool {
        self.lock().abort_requested
    }

    /// `None` before the first run, time elapsed so far while running, and the
    /// total run time once completed.
    #[must_use]
    pub fn running_time(&self) -> Option<Duration> {
        self.lock().running_time()
    }

    /// Asks the transaction to stop before starting its next step.
    ///
    /// The step currently in flight is not interrupted. Once it settles, the
    /// remaining steps are skipped and compensations run for every step that
    /// succeeded.
    ///
    /// # Errors
    ///
    /// Returns [`AbortError::NotRunning`] outside the forward phase and
    /// [`AbortError::NoPendingSteps`] when nothing is left to skip.
    pub fn try_abort(&self) -> Result<(), AbortError> {
        let mut status = self.lock();
        status.try_abort()?;
        debug!(pending = status.pending, "abort requested");
        Ok(())
    }

    /// Like [`try_abort`](Self::try_abort), returning whether the request was accepted.
    pub fn abort(&self) -> bool {
        self.try_abort().is_ok()
    }
}
