use std::fmt;

/// Lifecycle phase of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionState {
    /// Accepting steps; not started.
    #[default]
    Idle,
    /// Draining the step queue.
    Running,
    /// Running compensations after a failure or abort.
    RollingBack,
    /// Settled. The outcome no longer changes.
    Completed,
}

impl TransactionState {
    /// Whether a run is in progress (forward or compensating).
    #[must_use]
    pub fn is_active(self) -> bool {
        matches!(self, Self::Running | Self::RollingBack)
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::RollingBack => "rolling back",
            Self::Completed => "completed",
        };
        f.write_str(name)
    }
}
