//! Import progress events and reporters
//!
//! The importer emits the same event sequence whatever the delivery mode.
//! A reporter decides where the events go: the log (synchronous imports),
//! a channel feeding an event stream, or memory for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// `status` value carried by `progress` events
pub const STATUS_PROCESSING: &str = "processing";

/// Cumulative row counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counts {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// A row that was skipped or failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportFailure {
    pub file: String,
    pub error: String,
}

/// A row that was imported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportedPaper {
    pub code: String,
    pub title: String,
}

/// Final result of an import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: Vec<ImportFailure>,
    pub successful_papers: Vec<ImportedPaper>,
}

impl ImportSummary {
    pub fn counts(&self) -> Counts {
        Counts {
            success: self.success,
            failed: self.failed,
            skipped: self.skipped,
        }
    }

    pub fn record_success(&mut self, code: &str, title: &str) {
        self.success += 1;
        self.successful_papers.push(ImportedPaper {
            code: code.to_string(),
            title: title.to_string(),
        });
    }

    pub fn record_skip(&mut self, file: &str, reason: &str) {
        self.skipped += 1;
        self.errors.push(ImportFailure {
            file: file.to_string(),
            error: reason.to_string(),
        });
    }

    pub fn record_failure(&mut self, file: &str, message: &str) {
        self.failed += 1;
        self.errors.push(ImportFailure {
            file: file.to_string(),
            error: message.to_string(),
        });
    }

    /// Number of rows with a recorded outcome
    pub fn processed(&self) -> usize {
        self.success + self.failed + self.skipped
    }
}

/// One progress event, serialized as a JSON object tagged by `type`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ImportEvent {
    Status {
        message: String,
    },
    Progress {
        current: usize,
        total: usize,
        file: String,
        status: String,
        counts: Counts,
    },
    Success {
        current: usize,
        total: usize,
        file: String,
        counts: Counts,
    },
    Skip {
        current: usize,
        total: usize,
        file: String,
        error: String,
        counts: Counts,
    },
    /// A failed row when the row fields are present, otherwise a fatal error
    Error {
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        total: Option<usize>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        file: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        counts: Option<Counts>,
    },
    Complete {
        counts: Counts,
        errors: Vec<ImportFailure>,
        #[serde(rename = "successfulPapers")]
        successful_papers: Vec<ImportedPaper>,
    },
}

impl ImportEvent {
    pub fn status(message: impl Into<String>) -> Self {
        ImportEvent::Status {
            message: message.into(),
        }
    }

    /// Run-level error; ends the event stream
    pub fn fatal(error: impl Into<String>) -> Self {
        ImportEvent::Error {
            error: error.into(),
            current: None,
            total: None,
            file: None,
            counts: None,
        }
    }

    pub fn complete(summary: &ImportSummary) -> Self {
        ImportEvent::Complete {
            counts: summary.counts(),
            errors: summary.errors.clone(),
            successful_papers: summary.successful_papers.clone(),
        }
    }

    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        match self {
            ImportEvent::Complete { .. } => true,
            ImportEvent::Error { current, .. } => current.is_none(),
            _ => false,
        }
    }
}

/// Receives the events of one import run
#[async_trait]
pub trait ProgressReporter: Send + Sync {
    async fn report(&self, event: ImportEvent);

    /// True once nobody is listening any more; the importer stops before the next row
    fn is_closed(&self) -> bool {
        false
    }
}

/// Writes events to the log; used when the caller only wants the summary
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

#[async_trait]
impl ProgressReporter for TracingReporter {
    async fn report(&self, event: ImportEvent) {
        match &event {
            ImportEvent::Status { message } => info!(%message, "Import status"),
            ImportEvent::Progress { .. } => {}
            ImportEvent::Success { current, total, file, .. } => {
                info!(current, total, %file, "Paper imported")
            }
            ImportEvent::Skip { current, total, file, error, .. } => {
                warn!(current, total, %file, reason = %error, "Paper skipped")
            }
            ImportEvent::Error { error, file: Some(file), .. } => {
                error!(%file, %error, "Paper import failed")
            }
            ImportEvent::Error { error, .. } => error!(%error, "Import aborted"),
            ImportEvent::Complete { counts, .. } => info!(
                success = counts.success,
                failed = counts.failed,
                skipped = counts.skipped,
                "Import complete"
            ),
        }
    }
}

/// Forwards events into a bounded channel; the receiver feeds an event stream
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::Sender<ImportEvent>,
}

impl ChannelReporter {
    pub fn new(tx: mpsc::Sender<ImportEvent>) -> Self {
        Self { tx }
    }

    /// Reporter and the receiving half of a fresh channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ImportEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl ProgressReporter for ChannelReporter {
    async fn report(&self, event: ImportEvent) {
        if self.tx.send(event).await.is_err() {
            tracing::debug!("Progress receiver dropped, event discarded");
        }
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<ImportEvent>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ImportEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ProgressReporter for CollectingReporter {
    async fn report(&self, event: ImportEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_wire_format() {
        let event = ImportEvent::Skip {
            current: 2,
            total: 3,
            file: "133751 - Programming".into(),
            error: "Document not found".into(),
            counts: Counts { success: 1, failed: 0, skipped: 1 },
        };

        assert_eq!(
            serde_json::to_value(&event).unwrap(),
            json!({
                "type": "skip",
                "current": 2,
                "total": 3,
                "file": "133751 - Programming",
                "error": "Document not found",
                "counts": { "success": 1, "failed": 0, "skipped": 1 }
            })
        );
    }

    #[test]
    fn test_fatal_error_omits_row_fields() {
        let value = serde_json::to_value(ImportEvent::fatal("No CSV file found in ZIP archive")).unwrap();
        assert_eq!(value, json!({ "type": "error", "error": "No CSV file found in ZIP archive" }));
        assert!(ImportEvent::fatal("x").is_terminal());
    }

    #[test]
    fn test_summary_and_complete_shape() {
        let mut summary = ImportSummary::default();
        summary.record_success("133750", "Marketing");
        summary.record_skip("133751 - Programming", "Document not found");
        summary.record_failure("133752 - Taxation", "disk full");

        assert_eq!(summary.processed(), 3);

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["successfulPapers"], json!([{ "code": "133750", "title": "Marketing" }]));
        assert_eq!(value["errors"].as_array().unwrap().len(), 2);

        let complete = serde_json::to_value(ImportEvent::complete(&summary)).unwrap();
        assert_eq!(complete["type"], "complete");
        assert_eq!(complete["counts"], json!({ "success": 1, "failed": 1, "skipped": 1 }));
        assert!(complete.get("successfulPapers").is_some());
    }

    #[tokio::test]
    async fn test_channel_reporter_detects_disconnect() {
        let (reporter, mut rx) = ChannelReporter::channel(4);

        reporter.report(ImportEvent::status("Extracting ZIP file...")).await;
        assert_eq!(rx.recv().await, Some(ImportEvent::status("Extracting ZIP file...")));
        assert!(!reporter.is_closed());

        drop(rx);
        assert!(reporter.is_closed());
        reporter.report(ImportEvent::status("ignored")).await;
    }
}
