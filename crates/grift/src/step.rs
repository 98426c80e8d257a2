use std::fmt;

use futures::future::BoxFuture;

use crate::context::Context;

/// Forward work of a step.
///
/// Receives the accumulated context and resolves to the step's result. The
/// returned future may borrow the context for as long as it runs.
pub type Action<T, E> =
    Box<dyn for<'a> FnOnce(&'a Context<T>) -> BoxFuture<'a, Result<T, E>> + Send>;

/// Undo work of a step, run only during rollback and only if the step's
/// action succeeded. Errors are discarded.
pub type Compensation<T, E> =
    Box<dyn for<'a> FnOnce(&'a Context<T>) -> BoxFuture<'a, Result<(), E>> + Send>;

pub(crate) struct Step<T, E> {
    pub(crate) tag: String,
    pub(crate) action: Action<T, E>,
    pub(crate) compensation: Option<Compensation<T, E>>,
}

impl<T, E> Step<T, E> {
    pub(crate) fn new(
        tag: String,
        action: Action<T, E>,
        compensation: Option<Compensation<T, E>>,
    ) -> Self {
        Self {
            tag,
            action,
            compensation,
        }
    }
}

impl<T, E> fmt::Debug for Step<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("tag", &self.tag)
            .field("has_compensation", &self.compensation.is_some())
            .finish_non_exhaustive()
    }
}

/// Compensation waiting on the rollback stack, tagged with the step it undoes.
pub(crate) struct PendingCompensation<T, E> {
    pub(crate) tag: String,
    pub(crate) audit_index: usize,
    pub(crate) compensation: Option<Compensation<T, E>>,
}

impl<T, E> PendingCompensation<T, E> {
    /// Runs the compensation, or does nothing for steps registered without one.
    ///
    /// Returns `None` if there was nothing to run, otherwise whether the
    /// compensation resolved to `Ok`.
    pub(crate) async fn run(self, ctx: &Context<T>) -> Option<bool> {
        let compensation = self.compensation?;
        Some(compensation(ctx).await.is_ok())
    }
}
