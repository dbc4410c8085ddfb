use crate::api::{
    Author, Channel, ChannelKind, CurrentUser, DeleteResponse, DiscordApi, Guild, Message,
    Snowflake,
};
use crate::cancel::CancellationToken;
use crate::error::ApiError;
use crate::events::{EngineEvent, EventSink, EventStream};
use crate::filter::AuthorFilter;
use crate::job::JobContext;
use crate::ratelimit::{RateLimitGovernor, RateLimitPolicy, Sleeper, DEFAULT_PACING};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub fn message(id: u64, author: u64) -> Message {
    Message {
        id: Snowflake::new(id),
        author: Author {
            id: Snowflake::new(author),
            username: format!("user{}", author),
            discriminator: "0".to_string(),
        },
        content: format!("message {}", id),
    }
}

/// `count` messages by `author`, newest first, ids `first_id..first_id + count`.
pub fn messages(author: u64, count: u64, first_id: u64) -> Vec<Message> {
    (first_id..first_id + count)
        .rev()
        .map(|id| message(id, author))
        .collect()
}

pub fn channel(id: u64, name: &str, kind: ChannelKind) -> Channel {
    Channel {
        id: Snowflake::new(id),
        name: name.to_string(),
        kind,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockRequest {
    CurrentUser,
    Guilds,
    ListChannels {
        guild: Snowflake,
    },
    Fetch {
        channel: Snowflake,
        before: Option<Snowflake>,
    },
    Delete {
        channel: Snowflake,
        message: Snowflake,
    },
}

#[derive(Default)]
struct MockState {
    channels: HashMap<u64, Vec<Message>>,
    forbidden: HashSet<u64>,
    failing: HashMap<u64, u16>,
    faulty: HashSet<u64>,
    panicking: HashSet<u64>,
    guilds: Vec<(Guild, Vec<Channel>)>,
    failing_guilds: HashMap<u64, u16>,
    delete_responses: VecDeque<DeleteResponse>,
    requests: Vec<MockRequest>,
    deleted: Vec<u64>,
    delete_calls: usize,
    cancel_on_delete: Option<(usize, CancellationToken)>,
}

/// Scripted in-memory service.
///
/// Channels hold newest-first histories; a successful delete removes the
/// message, so re-scans see the shrinking history like the real service.
pub struct MockDiscord {
    user_id: Snowflake,
    ignore_cursor: bool,
    state: Mutex<MockState>,
}

impl MockDiscord {
    pub fn new(user_id: u64) -> Self {
        Self {
            user_id: Snowflake::new(user_id),
            ignore_cursor: false,
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock")
    }

    pub fn with_channel(self, id: u64, mut history: Vec<Message>) -> Self {
        history.sort_by(|a, b| b.id.cmp(&a.id));
        self.state().channels.insert(id, history);
        self
    }

    pub fn with_forbidden_channel(self, id: u64) -> Self {
        self.state().forbidden.insert(id);
        self
    }

    pub fn with_failing_channel(self, id: u64, status: u16) -> Self {
        self.state().failing.insert(id, status);
        self
    }

    /// Reads of this channel fail at the transport level.
    pub fn with_faulty_channel(self, id: u64) -> Self {
        self.state().faulty.insert(id);
        self
    }

    /// Reads of this channel panic.
    pub fn with_panicking_channel(self, id: u64) -> Self {
        self.state().panicking.insert(id);
        self
    }

    pub fn with_guild(self, id: u64, channels: Vec<Channel>) -> Self {
        let guild = Guild {
            id: Snowflake::new(id),
            name: format!("guild {}", id),
        };
        self.state().guilds.push((guild, channels));
        self
    }

    pub fn with_failing_guild(self, id: u64, status: u16) -> Self {
        self.state().failing_guilds.insert(id, status);
        self
    }

    /// Responses for the next deletes; afterwards every delete succeeds.
    pub fn with_delete_responses(self, responses: Vec<DeleteResponse>) -> Self {
        self.state().delete_responses = responses.into();
        self
    }

    /// Return whole histories regardless of `before`.
    pub fn ignoring_cursor(mut self) -> Self {
        self.ignore_cursor = true;
        self
    }

    /// Cancel `token` while the `n`-th delete is in flight.
    pub fn cancel_on_delete(&self, n: usize, token: CancellationToken) {
        self.state().cancel_on_delete = Some((n, token));
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.state().requests.clone()
    }

    pub fn remaining(&self, channel: u64) -> Vec<Message> {
        self.state()
            .channels
            .get(&channel)
            .cloned()
            .unwrap_or_default()
    }

    /// Ids actually removed, in order.
    pub fn deleted_ids(&self) -> Vec<u64> {
        self.state().deleted.clone()
    }
}

#[async_trait]
impl DiscordApi for MockDiscord {
    async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        self.state().requests.push(MockRequest::CurrentUser);
        Ok(Author {
            id: self.user_id,
            username: "me".to_string(),
            discriminator: "0".to_string(),
        })
    }

    async fn guilds(&self) -> Result<Vec<Guild>, ApiError> {
        let mut state = self.state();
        state.requests.push(MockRequest::Guilds);
        Ok(state.guilds.iter().map(|(g, _)| g.clone()).collect())
    }

    async fn guild_channels(&self, guild_id: Snowflake) -> Result<Vec<Channel>, ApiError> {
        let mut state = self.state();
        state
            .requests
            .push(MockRequest::ListChannels { guild: guild_id });
        if let Some(status) = state.failing_guilds.get(&guild_id.get()) {
            return Err(ApiError::status(*status, "scripted failure"));
        }
        state
            .guilds
            .iter()
            .find(|(g, _)| g.id == guild_id)
            .map(|(_, channels)| channels.clone())
            .ok_or_else(|| ApiError::status(404, "Unknown Guild"))
    }

    async fn channel_messages(
        &self,
        channel_id: Snowflake,
        before: Option<Snowflake>,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        let mut state = self.state();
        state.requests.push(MockRequest::Fetch {
            channel: channel_id,
            before,
        });

        let id = channel_id.get();
        if state.panicking.contains(&id) {
            drop(state);
            panic!("scripted panic reading channel {}", id);
        }
        if state.faulty.contains(&id) {
            return Err(ApiError::Network {
                attempts: 4,
                message: "operation timed out".to_string(),
            });
        }
        if state.forbidden.contains(&id) {
            return Err(ApiError::Forbidden);
        }
        if let Some(status) = state.failing.get(&id) {
            return Err(ApiError::status(*status, "scripted failure"));
        }

        let history = state.channels.get(&id).cloned().unwrap_or_default();
        Ok(history
            .into_iter()
            .filter(|m| self.ignore_cursor || before.map_or(true, |b| m.id < b))
            .take(limit)
            .collect())
    }

    async fn delete_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<DeleteResponse, ApiError> {
        let mut guard = self.state();
        let state = &mut *guard;
        state.requests.push(MockRequest::Delete {
            channel: channel_id,
            message: message_id,
        });
        state.delete_calls += 1;

        let response = state
            .delete_responses
            .pop_front()
            .unwrap_or_else(DeleteResponse::ok);

        if (200..300).contains(&response.status) {
            if let Some(history) = state.channels.get_mut(&channel_id.get()) {
                if let Some(pos) = history.iter().position(|m| m.id == message_id) {
                    history.remove(pos);
                    state.deleted.push(message_id.get());
                }
            }
        }

        if let Some((n, token)) = &state.cancel_on_delete {
            if state.delete_calls == *n {
                token.cancel();
            }
        }

        Ok(response)
    }
}

/// Records requested delays and returns after a yield.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().expect("sleeps lock").clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().expect("sleeps lock").push(duration);
        tokio::task::yield_now().await;
    }
}

pub fn job_context(
    api: Arc<MockDiscord>,
    user: u64,
    policy: RateLimitPolicy,
) -> (JobContext, EventStream, Arc<RecordingSleeper>) {
    let sleeper = Arc::new(RecordingSleeper::default());
    let (events, rx) = EventSink::channel();
    let ctx = JobContext::new(
        api,
        RateLimitGovernor::new(DEFAULT_PACING, sleeper.clone()),
        AuthorFilter::new(Snowflake::new(user)),
        events,
        CancellationToken::new(),
        policy,
    );
    (ctx, rx, sleeper)
}

/// Everything queued on the stream right now.
pub fn drain(rx: &mut EventStream) -> Vec<EngineEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}
