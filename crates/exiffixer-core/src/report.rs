use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};

use crate::apply::FixOutcome;

/// Default character budget of the activity log
pub const DEFAULT_LOG_BUDGET: usize = 5000;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: u64,
    pub processed: u64,
    pub fixed: u64,
    pub already_correct: u64,
    pub skipped: u64,
    pub failed: u64,
    pub cancelled: bool,
}

impl BatchSummary {
    /// Files whose modification time was changed.
    pub fn success(&self) -> u64 {
        self.fixed
    }

    pub fn record(&mut self, outcome: &FixOutcome) {
        match outcome {
            FixOutcome::AlreadyCorrect => self.already_correct += 1,
            FixOutcome::Fixed { .. } => self.fixed += 1,
            FixOutcome::Skipped { .. } => self.skipped += 1,
            FixOutcome::Failed { .. } => self.failed += 1,
        }
        self.processed += 1;
    }
}

/// Everything the fix phase tells the display layer, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchEvent {
    Started { total: u64 },
    Outcome { name: String, outcome: FixOutcome },
    Log(String),
    Progress { processed: u64, total: u64 },
    Finished(BatchSummary),
}

/// Sending half of the event stream. A vanished receiver is ignored.
#[derive(Debug, Clone, Default)]
pub struct Reporter {
    tx: Option<Sender<BatchEvent>>,
}

impl Reporter {
    pub fn new(tx: Sender<BatchEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A reporter that drops every event.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn send(&self, event: BatchEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn log(&self, line: impl Into<String>) {
        self.send(BatchEvent::Log(line.into()));
    }
}

/// Newest-first text log capped at a character budget.
#[derive(Debug, Clone)]
pub struct ActivityLog {
    text: String,
    budget: usize,
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_BUDGET)
    }
}

impl ActivityLog {
    pub fn new(budget: usize) -> Self {
        Self {
            text: String::new(),
            budget,
        }
    }

    /// Prepend a line; past the budget the oldest text is cut and `...` appended.
    pub fn push(&mut self, line: &str) {
        let combined = format!("{}\n{}", line, self.text);
        self.text = if combined.chars().count() > self.budget {
            let mut kept: String = combined.chars().take(self.budget).collect();
            kept.push_str("...");
            kept
        } else {
            combined
        };
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apply::{SkipReason, Strategy};
    use std::sync::mpsc;

    #[test]
    fn test_summary_counts() {
        let mut summary = BatchSummary { total: 4, ..Default::default() };
        summary.record(&FixOutcome::Fixed { strategy: Strategy::Fallback, new_time: 1 });
        summary.record(&FixOutcome::AlreadyCorrect);
        summary.record(&FixOutcome::Skipped { reason: SkipReason::NoMetadata });
        summary.record(&FixOutcome::Failed { reason: "x".to_string() });
        assert_eq!(summary.processed, 4);
        assert_eq!(summary.success(), 1);
        assert_eq!(summary.already_correct, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn test_log_newest_first() {
        let mut log = ActivityLog::default();
        log.push("first");
        log.push("second");
        assert_eq!(log.text(), "second\nfirst\n");
    }

    #[test]
    fn test_log_budget_truncates_oldest() {
        let mut log = ActivityLog::new(10);
        log.push("aaaa");
        log.push("bbbb");
        log.push("cccc");
        assert_eq!(log.text(), "cccc\nbbbb\n...");
        assert_eq!(log.text().chars().count(), 13);
    }

    #[test]
    fn test_reporter_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        let reporter = Reporter::new(tx);
        reporter.log("hello");
        assert_eq!(rx.recv().unwrap(), BatchEvent::Log("hello".to_string()));
        drop(rx);
        reporter.log("nobody listening");
        Reporter::silent().log("ignored");
    }
}
