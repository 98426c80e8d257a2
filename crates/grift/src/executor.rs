use std::time::Instant;

use tracing::{debug, trace, warn};

use crate::state::TransactionState;
use crate::step::{PendingCompensation, Step};
use crate::transaction::Transaction;

impl<T, E> Transaction<T, E> {
    /// Moves an idle transaction into `Running`. Returns `false` if it had
    /// already been started.
    pub(crate) fn begin(&mut self) -> bool {
        let mut status = self.handle.lock();
        if status.state != TransactionState::Idle {
            debug!(state = %status.state, "transaction already started; ignoring execute");
            return false;
        }
        status.state = TransactionState::Running;
        status.abort_requested = false;
        status.pending = self.steps.len();
        status.started_at = Some(Instant::now());
        status.run_time = None;
        debug!(steps = self.steps.len(), "executing transaction");
        true
    }

    /// Drains the step queue one step at a time, diverting to rollback on the
    /// first failure or an accepted abort.
    pub(crate) async fn run(&mut self) {
        let mut rollback_stack: Vec<PendingCompensation<T, E>> = Vec::new();

        loop {
            if self.handle.abort_requested() || !self.failures.is_empty() {
                self.rollback(rollback_stack).await;
                break;
            }

            let Some(Step {
                tag,
                action,
                compensation,
            }) = self.steps.pop_front()
            else {
                break;
            };
            self.handle.lock().pending = self.steps.len();

            let audit_index = self.audit.record_start(&tag);
            let outcome = action(&self.context).await;

            match outcome {
                Ok(value) => {
                    debug!(tag = %tag, "step succeeded");
                    self.audit.record_success(audit_index);
                    self.context.record(&tag, value);
                    self.succeeded.push(tag.clone());
                    rollback_stack.push(PendingCompensation {
                        tag,
                        audit_index,
                        compensation,
                    });
                }
                Err(error) => {
                    warn!(tag = %tag, "step failed");
                    self.audit.record_failure(audit_index);
                    self.failures.push((tag, error));
                }
            }

            // One executor tick between steps keeps long chains from
            // monopolising the thread.
            tokio::task::yield_now().await;
        }

        self.complete();
    }

    /// Runs compensations for every succeeded step, most recent first.
    async fn rollback(&mut self, mut stack: Vec<PendingCompensation<T, E>>) {
        let aborted = {
            let mut status = self.handle.lock();
            status.state = TransactionState::RollingBack;
            status.abort_requested
        };
        self.outcome = Some(self.failures.is_empty());
        debug!(
            compensations = stack.len(),
            aborted,
            failures = self.failures.len(),
            "rolling back transaction"
        );

        while let Some(pending) = stack.pop() {
            debug!(tag = %pending.tag, "running compensation");
            let audit_index = pending.audit_index;
            if let Some(settled_ok) = pending.run(&self.context).await {
                self.audit.record_compensated(audit_index);
                trace!(settled_ok, "compensation settled");
            }
        }
    }

    fn complete(&mut self) {
        let success = *self.outcome.get_or_insert(self.failures.is_empty());
        let skipped = self.steps.len();
        self.steps.clear();

        let mut status = self.handle.lock();
        let run_time = status
            .started_at
            .map(|started| started.elapsed())
            .unwrap_or_default();
        status.state = TransactionState::Completed;
        status.pending = 0;
        status.run_time = Some(run_time);

        debug!(
            success,
            succeeded = self.succeeded.len(),
            failed = self.failures.len(),
            skipped,
            ?run_time,
            "transaction completed"
        );
    }
}
