//! Per-channel deletion loop.
//!
//! The loop is an explicit state machine:
//!
//! ```text
//! Idle ──► ScanningPage ──► Deleting ──► ScanningPage ...
//!               │              │
//!               │              └──► BackingOff ──► ScanningPage
//!               ▼
//!          PassComplete ──► Idle (messages were found: full re-scan)
//!               │
//!               └──► ChannelDone (a clean pass found nothing)
//! ```
//!
//! A single backward sweep can miss messages while deletions and new posts
//! shift the history, so the channel is only considered purged after one
//! complete pass that matches nothing. `Stopped` is entered as soon as the
//! cancellation token is seen, at the top of `ScanningPage` and after every
//! delete attempt.

use crate::api::{Message, Snowflake};
use crate::error::ApiError;
use crate::job::JobContext;
use crate::pagination::{Page, PageFetcher};
use crate::ratelimit::{DeleteOutcome, RateLimitPolicy};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, trace};

/// How a channel's deletion ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// A full pass found none of the user's messages
    Purged,
    /// The credential cannot read the channel
    Skipped,
    /// A page fetch failed with this status
    Aborted { status: u16 },
    /// Cancellation was observed
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
enum LoopState {
    Idle,
    ScanningPage,
    Deleting {
        message: Snowflake,
        attempt: u32,
    },
    BackingOff {
        retry_after: Duration,
        retry: Option<(Snowflake, u32)>,
    },
    PassComplete,
    ChannelDone(ChannelOutcome),
    Stopped,
}

pub struct DeletionLoop<'a> {
    ctx: &'a mut JobContext,
    channel_id: Snowflake,
    label: String,
    cursor: Option<Snowflake>,
    page: VecDeque<Message>,
    more_pages: bool,
    found_my_messages: bool,
    passes: u32,
}

impl<'a> DeletionLoop<'a> {
    /// `label` names the channel in status lines.
    pub fn new(ctx: &'a mut JobContext, channel_id: Snowflake, label: impl Into<String>) -> Self {
        Self {
            ctx,
            channel_id,
            label: label.into(),
            cursor: None,
            page: VecDeque::new(),
            more_pages: true,
            found_my_messages: false,
            passes: 0,
        }
    }

    /// Drive the channel to a terminal state.
    ///
    /// Only transport-level faults are returned as errors; every status the
    /// service answers with is handled inside the loop.
    pub async fn run(mut self) -> Result<ChannelOutcome, ApiError> {
        let mut state = LoopState::Idle;

        loop {
            let next = match state {
                LoopState::Idle => {
                    self.begin_pass();
                    LoopState::ScanningPage
                }
                LoopState::ScanningPage => self.scan().await?,
                LoopState::Deleting { message, attempt } => self.delete(message, attempt).await?,
                LoopState::BackingOff { retry_after, retry } => {
                    self.back_off(retry_after, retry).await
                }
                LoopState::PassComplete => self.complete_pass(),
                LoopState::ChannelDone(outcome) => {
                    debug!(
                        channel = %self.channel_id,
                        passes = self.passes,
                        ?outcome,
                        "channel done"
                    );
                    return Ok(outcome);
                }
                LoopState::Stopped => {
                    debug!(channel = %self.channel_id, "stopped");
                    return Ok(ChannelOutcome::Stopped);
                }
            };
            trace!(channel = %self.channel_id, state = ?next, "transition");
            state = next;
        }
    }

    fn begin_pass(&mut self) {
        self.cursor = None;
        self.page.clear();
        self.more_pages = true;
        self.found_my_messages = false;
        self.passes += 1;
        debug!(channel = %self.channel_id, pass = self.passes, "starting pass");
    }

    async fn scan(&mut self) -> Result<LoopState, ApiError> {
        if self.ctx.cancel.is_cancelled() {
            return Ok(LoopState::Stopped);
        }

        while let Some(message) = self.page.pop_front() {
            self.cursor = Some(message.id);
            if self.ctx.filter.matches(&message) {
                self.found_my_messages = true;
                return Ok(LoopState::Deleting {
                    message: message.id,
                    attempt: 1,
                });
            }
        }

        if !self.more_pages {
            return Ok(LoopState::PassComplete);
        }

        let page = PageFetcher::new(self.ctx.api.as_ref(), self.channel_id)
            .fetch_page(self.cursor)
            .await?;

        match page {
            Page::Empty => Ok(LoopState::PassComplete),
            Page::AccessDenied => {
                self.ctx
                    .events
                    .status(format!("Skipping {}: No access (403)", self.label));
                Ok(LoopState::ChannelDone(ChannelOutcome::Skipped))
            }
            Page::Failed { status } => {
                self.ctx.events.status(format!(
                    "Failed to fetch messages in {}: {}",
                    self.label, status
                ));
                Ok(LoopState::ChannelDone(ChannelOutcome::Aborted { status }))
            }
            page @ Page::Messages(_) => {
                self.more_pages = page.is_full();
                if let Page::Messages(messages) = page {
                    self.page = messages.into();
                }
                Ok(LoopState::ScanningPage)
            }
        }
    }

    async fn delete(&mut self, message: Snowflake, attempt: u32) -> Result<LoopState, ApiError> {
        let response = self.ctx.api.delete_message(self.channel_id, message).await?;

        let next = match self.ctx.governor.classify(&response) {
            DeleteOutcome::Deleted => {
                let total = self.ctx.record_deletion();
                self.ctx
                    .events
                    .status(format!("Deleted message {} in {}", message, self.label));
                self.ctx.events.progress(total);
                LoopState::ScanningPage
            }
            DeleteOutcome::RateLimited { retry_after } => {
                self.ctx.events.status(format!(
                    "Rate limited, sleeping {}s...",
                    retry_after.as_secs_f64()
                ));
                let retry = match self.ctx.policy {
                    RateLimitPolicy::RetryInPlace { max_attempts } if attempt < max_attempts => {
                        Some((message, attempt + 1))
                    }
                    _ => None,
                };
                LoopState::BackingOff { retry_after, retry }
            }
            DeleteOutcome::Failed { status } => {
                self.ctx
                    .events
                    .status(format!("Failed to delete {} ({})", message, status));
                LoopState::ScanningPage
            }
        };

        self.ctx.governor.pace().await;

        if self.ctx.cancel.is_cancelled() {
            return Ok(LoopState::Stopped);
        }
        Ok(next)
    }

    async fn back_off(&mut self, retry_after: Duration, retry: Option<(Snowflake, u32)>) -> LoopState {
        self.ctx
            .governor
            .back_off(retry_after, &self.ctx.cancel)
            .await;

        match retry {
            _ if self.ctx.cancel.is_cancelled() => LoopState::Stopped,
            Some((message, attempt)) => LoopState::Deleting { message, attempt },
            None => LoopState::ScanningPage,
        }
    }

    fn complete_pass(&mut self) -> LoopState {
        if self.found_my_messages {
            LoopState::Idle
        } else {
            LoopState::ChannelDone(ChannelOutcome::Purged)
        }
    }
}
