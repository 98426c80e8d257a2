use std::time::{Duration, Instant};

/// Status of a step in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum StepStatus {
    /// Action started but has not settled.
    Started,
    /// Action resolved successfully.
    Succeeded,
    /// Action resolved with an error.
    Failed,
    /// Step succeeded and its compensation has since run. Steps registered
    /// without a compensation stay `Succeeded`. The compensation's own outcome
    /// is not inspected.
    Compensated,
}

/// Record of one step's passage through a transaction.
#[derive(Debug, Clone)]
pub struct StepRecord {
    /// Tag of the step.
    pub tag: String,
    /// Current status.
    pub status: StepStatus,
    /// When the action was invoked.
    pub started_at: Instant,
    /// When the action settled.
    pub finished_at: Option<Instant>,
    /// When the compensation settled, if it ran.
    pub compensated_at: Option<Instant>,
}

impl StepRecord {
    /// Time the action took to settle.
    #[must_use]
    pub fn duration(&self) -> Option<Duration> {
        self.finished_at
            .map(|finished| finished.saturating_duration_since(self.started_at))
    }
}

/// Ordered trail of every step a transaction started, in start order.
#[derive(Debug, Clone, Default)]
pub struct AuditLog {
    records: Vec<StepRecord>,
}

impl AuditLog {
    /// Create a new empty audit log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an action being invoked. Returns the index of the new record.
    pub(crate) fn record_start(&mut self, tag: &str) -> usize {
        self.records.push(StepRecord {
            tag: tag.to_string(),
            status: StepStatus::Started,
            started_at: Instant::now(),
            finished_at: None,
            compensated_at: None,
        });
        self.records.len() - 1
    }

    pub(crate) fn record_success(&mut self, index: usize) {
        self.settle(index, StepStatus::Succeeded);
    }

    pub(crate) fn record_failure(&mut self, index: usize) {
        self.settle(index, StepStatus::Failed);
    }

    pub(crate) fn record_compensated(&mut self, index: usize) {
        if let Some(record) = self.records.get_mut(index) {
            record.status = StepStatus::Compensated;
            record.compensated_at = Some(Instant::now());
        }
    }

    fn settle(&mut self, index: usize, status: StepStatus) {
        if let Some(record) = self.records.get_mut(index) {
            record.status = status;
            record.finished_at = Some(Instant::now());
        }
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }

    /// All records, in start order.
    #[must_use]
    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    /// Whether no step has been started.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// One line per record, for display.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut lines = Vec::new();
        for record in &self.records {
            let status = match record.status {
                StepStatus::Started => "…",
                StepStatus::Succeeded => "✓",
                StepStatus::Failed => "✗",
                StepStatus::Compensated => "↩",
            };
            lines.push(format!("{status} {}", record.tag));
        }
        lines.join("\n")
    }
}
