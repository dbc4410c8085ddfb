//! Progress, status and completion events flowing from a job to its caller.
//!
//! Events travel over an unbounded channel: the job never waits on the
//! caller, delivery order is emission order, and nothing is dropped while
//! the receiving side is alive.

use tokio::sync::mpsc;
use tracing::info;

/// How a job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Cancelled,
    Failed(String),
}

impl JobOutcome {
    pub fn as_str(&self) -> &str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Cancelled => "cancelled",
            JobOutcome::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Running total of deleted messages
    Progress { deleted: u64 },
    /// Human-readable status line
    Status { message: String },
    /// Emitted exactly once, last
    Finished {
        total_deleted: u64,
        outcome: JobOutcome,
    },
}

impl EngineEvent {
    pub fn is_finished(&self) -> bool {
        matches!(self, EngineEvent::Finished { .. })
    }
}

pub type EventStream = mpsc::UnboundedReceiver<EngineEvent>;

/// Sending half handed to the job.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, EventStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn progress(&self, deleted: u64) {
        self.emit(EngineEvent::Progress { deleted });
    }

    pub fn status(&self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.emit(EngineEvent::Status { message });
    }

    pub fn finished(&self, total_deleted: u64, outcome: JobOutcome) {
        self.emit(EngineEvent::Finished {
            total_deleted,
            outcome,
        });
    }

    fn emit(&self, event: EngineEvent) {
        // A caller that stopped listening does not stop the job
        let _ = self.tx.send(event);
    }
}
