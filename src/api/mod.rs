//! REST API access for the chat service.
//!
//! The engine only talks to the service through [`DiscordApi`], so the
//! pagination walk and rate-limit handling can be exercised against a
//! scripted implementation in tests.

pub mod http;
pub mod types;

pub use http::HttpClient;
pub use types::{
    Author, Channel, ChannelKind, CurrentUser, DeleteResponse, Guild, Message, Snowflake,
};

use crate::error::ApiError;
use async_trait::async_trait;

/// Default REST base path.
pub const DISCORD_API_BASE: &str = "https://discord.com/api/v9";

/// Read and delete operations the engine and CLI need from the service.
///
/// Non-success statuses on reads map to [`ApiError::Forbidden`] (403) or
/// [`ApiError::Status`]. Deletes return the raw status instead, because a
/// failed delete is an expected, non-fatal outcome.
#[async_trait]
pub trait DiscordApi: Send + Sync {
    async fn current_user(&self) -> Result<CurrentUser, ApiError>;

    async fn guilds(&self) -> Result<Vec<Guild>, ApiError>;

    async fn guild_channels(&self, guild_id: Snowflake) -> Result<Vec<Channel>, ApiError>;

    /// Up to `limit` messages older than `before`, newest first.
    async fn channel_messages(
        &self,
        channel_id: Snowflake,
        before: Option<Snowflake>,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError>;

    async fn delete_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<DeleteResponse, ApiError>;
}
