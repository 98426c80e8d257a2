use std::fmt::Debug;

use thiserror::Error;

/// Error form of a settled, failed transaction.
///
/// Produced by [`Transaction::into_outcome`](crate::Transaction::into_outcome).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransactionError<E: Debug> {
    /// A step failed. Compensations for earlier steps have already run.
    #[error("step '{step}' failed")]
    StepFailed {
        /// Tag of the first step that failed.
        step: String,
        /// The error the step resolved with.
        #[source]
        source: E,
    },

    /// The transaction has not finished running.
    #[error("transaction has not completed")]
    NotCompleted,
}

/// Reason an abort request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AbortError {
    /// The transaction is outside its forward phase.
    #[error("transaction is not running")]
    NotRunning,

    /// The step in flight is the last one; nothing is left to skip.
    #[error("no steps are left to skip")]
    NoPendingSteps,
}

/// Error building a [`TransactionConfig`](crate::TransactionConfig).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The TOML input is malformed or a value has the wrong type.
    #[error("invalid transaction config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The reserved prefix was set to an empty string.
    #[error("reserved prefix must not be empty")]
    EmptyReservedPrefix,
}
