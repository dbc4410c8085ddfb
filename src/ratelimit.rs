//! Rate-limit interpretation and request pacing for deletes.

use crate::api::DeleteResponse;
use crate::cancel::CancellationToken;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Used when a 429 carries no usable retry-after
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Upper bound on a single backoff
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Pause after every delete attempt
pub const DEFAULT_PACING: Duration = Duration::from_millis(250);

/// Interpreted result of one delete attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    Deleted,
    RateLimited { retry_after: Duration },
    Failed { status: u16 },
}

/// Handling of the message that provoked a 429
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitPolicy {
    /// Move on; the next full pass picks it up again
    DeferToRescan,
    /// Retry the same message, up to `max_attempts` deletes in total
    RetryInPlace { max_attempts: u32 },
}

/// Abstraction over sleeping so tests can record delays instead of waiting.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Real-time sleeper backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

pub struct RateLimitGovernor {
    pacing: Duration,
    sleeper: Arc<dyn Sleeper>,
}

impl RateLimitGovernor {
    pub fn new(pacing: Duration, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { pacing, sleeper }
    }

    pub fn classify(&self, response: &DeleteResponse) -> DeleteOutcome {
        match response.status {
            200..=299 => DeleteOutcome::Deleted,
            429 => DeleteOutcome::RateLimited {
                retry_after: retry_after_duration(response.retry_after),
            },
            status => DeleteOutcome::Failed { status },
        }
    }

    /// Fixed delay applied after every delete attempt.
    pub async fn pace(&self) {
        if !self.pacing.is_zero() {
            self.sleeper.sleep(self.pacing).await;
        }
    }

    /// Wait out a rate limit. A stop request ends the wait early.
    pub async fn back_off(&self, retry_after: Duration, cancel: &CancellationToken) {
        tokio::select! {
            _ = self.sleeper.sleep(retry_after) => {}
            _ = cancel.cancelled() => {}
        }
    }
}

/// Convert a service-supplied retry-after (seconds) into a bounded delay.
pub fn retry_after_duration(seconds: Option<f64>) -> Duration {
    match seconds {
        Some(s) if s.is_finite() && s >= 0.0 => {
            Duration::from_secs_f64(s.min(MAX_RETRY_AFTER.as_secs_f64()))
        }
        _ => DEFAULT_RETRY_AFTER,
    }
}
