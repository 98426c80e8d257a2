use std::collections::VecDeque;
use std::fmt::{self, Debug};
use std::time::Duration;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tracing::{debug, warn};

use crate::audit::AuditLog;
use crate::config::TransactionConfig;
use crate::context::Context;
use crate::error::{AbortError, TransactionError};
use crate::handle::TransactionHandle;
use crate::state::TransactionState;
use crate::step::{Action, Compensation, Step};

/// An ordered list of asynchronous steps run as one unit.
///
/// Steps run strictly one after another in the order they were added. When a
/// step fails, or an abort is accepted, no further step is started and the
/// compensations of the steps that succeeded run in reverse completion order.
/// A transaction runs at most once; [`reset`](Self::reset) makes it reusable.
///
/// `T` is the type every step resolves to and `E` the type every step fails
/// with. Use an enum or `serde_json::Value` for heterogeneous results.
pub struct Transaction<T, E> {
    pub(crate) config: TransactionConfig,
    pub(crate) steps: VecDeque<Step<T, E>>,
    pub(crate) context: Context<T>,
    pub(crate) succeeded: Vec<String>,
    pub(crate) failures: Vec<(String, E)>,
    pub(crate) audit: AuditLog,
    pub(crate) outcome: Option<bool>,
    pub(crate) handle: TransactionHandle,
}

impl<T, E> Default for Transaction<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Transaction<T, E> {
    /// Creates an idle transaction with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(TransactionConfig::default())
    }

    /// Creates an idle transaction with `config`.
    #[must_use]
    pub fn with_config(config: TransactionConfig) -> Self {
        let context = Context::new(&config);
        Self {
            config,
            steps: VecDeque::new(),
            context,
            succeeded: Vec::new(),
            failures: Vec::new(),
            audit: AuditLog::new(),
            outcome: None,
            handle: TransactionHandle::new(),
        }
    }

    /// Creates a context-injecting transaction seeded with `initial`.
    ///
    /// Seeded values are read with [`Context::seed`] and never appear among
    /// step results.
    #[must_use]
    pub fn with_initial_context<K, I>(initial: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        Self::with_config_and_context(TransactionConfig::injecting(), initial)
    }

    /// Creates a transaction with `config`, seeded with `initial` if the
    /// configuration injects context. Seeds are discarded otherwise.
    #[must_use]
    pub fn with_config_and_context<K, I>(config: TransactionConfig, initial: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        let mut txn = Self::with_config(config);
        let context = Context::with_seeds(&txn.config, initial);
        if txn.config.inject_context() {
            txn.context = context;
        } else if context.seeds().next().is_some() {
            warn!("initial context ignored: context injection is disabled");
        }
        txn
    }

    /// Appends a step without compensation.
    ///
    /// Ignored once the transaction has started.
    #[must_use]
    pub fn add<F>(self, tag: impl Into<String>, action: F) -> Self
    where
        F: for<'a> FnOnce(&'a Context<T>) -> BoxFuture<'a, Result<T, E>> + Send + 'static,
    {
        self.push(tag.into(), Box::new(action), None)
    }

    /// Appends a step whose effects `compensation` undoes during rollback.
    ///
    /// Ignored once the transaction has started.
    #[must_use]
    pub fn add_with_compensation<F, C>(
        self,
        tag: impl Into<String>,
        action: F,
        compensation: C,
    ) -> Self
    where
        F: for<'a> FnOnce(&'a Context<T>) -> BoxFuture<'a, Result<T, E>> + Send + 'static,
        C: for<'a> FnOnce(&'a Context<T>) -> BoxFuture<'a, Result<(), E>> + Send + 'static,
    {
        self.push(tag.into(), Box::new(action), Some(Box::new(compensation)))
    }

    fn push(
        mut self,
        tag: String,
        action: Action<T, E>,
        compensation: Option<Compensation<T, E>>,
    ) -> Self {
        let state = self.handle.state();
        if state == TransactionState::Idle {
            self.steps.push_back(Step::new(tag, action, compensation));
        } else {
            debug!(tag = %tag, %state, "ignoring step added after execution started");
        }
        self
    }

    /// Runs the transaction and returns it settled.
    ///
    /// Never fails: inspect [`success`](Self::success), [`errors_all`](Self::errors_all)
    /// and friends afterwards. Calling it again on a started or completed
    /// transaction runs nothing and returns immediately.
    ///
    /// Dropping the returned future abandons the run; the step in flight is
    /// dropped with it and the transaction stays `Running` until
    /// [`reset`](Self::reset).
    pub async fn execute(&mut self) -> &Self {
        if self.begin() {
            self.run().await;
        }
        self
    }

    /// Handle for aborting or observing the transaction while it runs.
    #[must_use]
    pub fn handle(&self) -> TransactionHandle {
        self.handle.clone()
    }

    /// See [`TransactionHandle::abort`].
    pub fn abort(&self) -> bool {
        self.handle.abort()
    }

    /// See [`TransactionHandle::try_abort`].
    ///
    /// # Errors
    ///
    /// Returns the reason the abort was refused.
    pub fn try_abort(&self) -> Result<(), AbortError> {
        self.handle.try_abort()
    }

    /// Returns the transaction to `Idle`, dropping its steps, results, logs
    /// and seeded context. The configuration and existing handles are kept.
    pub fn reset(&mut self) -> &mut Self {
        self.steps.clear();
        self.context.clear();
        self.succeeded.clear();
        self.failures.clear();
        self.audit.clear();
        self.outcome = None;

        let mut status = self.handle.lock();
        status.state = TransactionState::Idle;
        status.abort_requested = false;
        status.pending = 0;
        status.started_at = None;
        status.run_time = None;
        drop(status);

        self
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.handle.state()
    }

    /// Configuration the transaction was built with.
    #[must_use]
    pub fn config(&self) -> &TransactionConfig {
        &self.config
    }

    /// Accumulated context. Its enumeration hides reserved-prefixed tags the
    /// same way [`results_all`](Self::results_all) does.
    #[must_use]
    pub fn context(&self) -> &Context<T> {
        &self.context
    }

    /// Audit trail of the current or last run.
    #[must_use]
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Number of queued steps that have not been started.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.steps.len()
    }

    /// Result of step `tag`, if it succeeded.
    ///
    /// With context injection on, tags starting with the reserved prefix always
    /// yield `None`.
    #[must_use]
    pub fn results_from(&self, tag: &str) -> Option<&T> {
        if self.config.is_reserved(tag) {
            return None;
        }
        self.context.get(tag)
    }

    /// Snapshot of every step result, in first-success order.
    #[must_use]
    pub fn results_all(&self) -> IndexMap<String, T>
    where
        T: Clone,
    {
        self.context
            .iter()
            .map(|(tag, value)| (tag.to_string(), value.clone()))
            .collect()
    }

    /// Whether step `tag` resolved successfully.
    #[must_use]
    pub fn step_succeeded(&self, tag: &str) -> bool {
        self.succeeded.iter().any(|t| t == tag)
    }

    /// Whether step `tag` resolved with an error.
    #[must_use]
    pub fn step_failed(&self, tag: &str) -> bool {
        self.failures.iter().any(|(t, _)| t == tag)
    }

    /// Neither succeeded nor failed: never reached, or unknown.
    #[must_use]
    pub fn step_skipped(&self, tag: &str) -> bool {
        !self.step_succeeded(tag) && !self.step_failed(tag)
    }

    /// Tags of succeeded steps, in completion order.
    #[must_use]
    pub fn succeeded_steps(&self) -> &[String] {
        &self.succeeded
    }

    /// Recorded failures, in the order they happened.
    pub fn failures(&self) -> impl Iterator<Item = (&str, &E)> {
        self.failures.iter().map(|(tag, error)| (tag.as_str(), error))
    }

    /// Error step `tag` failed with, if it failed.
    #[must_use]
    pub fn error_from(&self, tag: &str) -> Option<&E> {
        self.failures
            .iter()
            .rev()
            .find(|(t, _)| t == tag)
            .map(|(_, error)| error)
    }

    /// Every recorded error keyed by step tag.
    #[must_use]
    pub fn errors_all(&self) -> IndexMap<String, E>
    where
        E: Clone,
    {
        self.failures
            .iter()
            .map(|(tag, error)| (tag.clone(), error.clone()))
            .collect()
    }

    /// Completed without any step failing.
    ///
    /// An aborted transaction in which nothing failed counts as a success; see
    /// [`was_aborted`](Self::was_aborted).
    #[must_use]
    pub fn success(&self) -> bool {
        self.settled_outcome() == Some(true)
    }

    /// Completed with a step failure.
    #[must_use]
    pub fn failed(&self) -> bool {
        self.settled_outcome() == Some(false)
    }

    /// Whether an abort was accepted during the last run.
    #[must_use]
    pub fn was_aborted(&self) -> bool {
        self.handle.abort_requested()
    }

    /// `None` before the first run, time elapsed so far while running, and the
    /// total run time once completed.
    #[must_use]
    pub fn running_time(&self) -> Option<Duration> {
        self.handle.running_time()
    }

    fn settled_outcome(&self) -> Option<bool> {
        if self.state() == TransactionState::Completed {
            self.outcome
        } else {
            None
        }
    }

    /// Converts the settled transaction into its step results.
    ///
    /// # Errors
    ///
    /// Returns [`TransactionError::StepFailed`] carrying the first failure if
    /// the transaction failed, and [`TransactionError::NotCompleted`] if it
    /// has not run to completion.
    pub fn into_outcome(self) -> Result<IndexMap<String, T>, TransactionError<E>>
    where
        E: Debug,
    {
        match self.settled_outcome() {
            None => Err(TransactionError::NotCompleted),
            Some(false) => {
                let (step, source) = self
                    .failures
                    .into_iter()
                    .next()
                    .ok_or(TransactionError::NotCompleted)?;
                Err(TransactionError::StepFailed { step, source })
            }
            Some(true) => {
                let config = self.config;
                Ok(self
                    .context
                    .into_results()
                    .into_iter()
                    .filter(|(tag, _)| !config.is_reserved(tag))
                    .collect())
            }
        }
    }
}

impl<T: Debug, E: Debug> Debug for Transaction<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("steps", &self.steps)
            .field("context", &self.context)
            .field("succeeded", &self.succeeded)
            .field("failures", &self.failures)
            .field("outcome", &self.outcome)
            .finish_non_exhaustive()
    }
}
