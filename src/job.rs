//! Per-job state shared by the orchestration layers.

use crate::api::{DiscordApi, Snowflake};
use crate::cancel::CancellationToken;
use crate::events::EventSink;
use crate::filter::AuthorFilter;
use crate::ratelimit::{RateLimitGovernor, RateLimitPolicy};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// What a job deletes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// One channel
    Channel(Snowflake),
    /// Every text channel of a guild
    Guild(Snowflake),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Channel(id) => write!(f, "channel {}", id),
            Scope::Guild(id) => write!(f, "guild {}", id),
        }
    }
}

/// Identity of a running job
#[derive(Debug, Clone)]
pub struct DeletionJob {
    pub id: Uuid,
    pub scope: Scope,
    pub user_id: Snowflake,
}

impl DeletionJob {
    pub fn new(scope: Scope, user_id: Snowflake) -> Self {
        Self {
            id: Uuid::new_v4(),
            scope,
            user_id,
        }
    }
}

/// Collaborators and counters threaded through one job
pub struct JobContext {
    pub api: Arc<dyn DiscordApi>,
    pub governor: RateLimitGovernor,
    pub filter: AuthorFilter,
    pub events: EventSink,
    pub cancel: CancellationToken,
    pub policy: RateLimitPolicy,
    deleted: u64,
}

impl JobContext {
    pub fn new(
        api: Arc<dyn DiscordApi>,
        governor: RateLimitGovernor,
        filter: AuthorFilter,
        events: EventSink,
        cancel: CancellationToken,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            api,
            governor,
            filter,
            events,
            cancel,
            policy,
            deleted: 0,
        }
    }

    /// Messages deleted so far in this job
    pub fn deleted(&self) -> u64 {
        self.deleted
    }

    /// Count one successful delete and return the new total.
    pub(crate) fn record_deletion(&mut self) -> u64 {
        self.deleted += 1;
        self.deleted
    }
}
