//! Cursor-based backward walk through a channel's history.

use crate::api::{DiscordApi, Message, Snowflake};
use crate::error::ApiError;
use tracing::warn;

/// Largest page the service returns
pub const PAGE_LIMIT: usize = 100;

/// One page request, classified for the deletion loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Page {
    /// Newest-first, non-empty, every id below the cursor
    Messages(Vec<Message>),
    /// Nothing older than the cursor
    Empty,
    /// 403: skip the channel
    AccessDenied,
    /// Any other non-success status: abandon this channel
    Failed { status: u16 },
}

impl Page {
    /// Whether the service may have more history after this page.
    pub fn is_full(&self) -> bool {
        matches!(self, Page::Messages(m) if m.len() >= PAGE_LIMIT)
    }
}

pub struct PageFetcher<'a> {
    api: &'a dyn DiscordApi,
    channel_id: Snowflake,
}

impl<'a> PageFetcher<'a> {
    pub fn new(api: &'a dyn DiscordApi, channel_id: Snowflake) -> Self {
        Self { api, channel_id }
    }

    /// Fetch up to [`PAGE_LIMIT`] messages older than `cursor`.
    ///
    /// Transport and decode failures are returned as errors; status codes
    /// are folded into [`Page`].
    pub async fn fetch_page(&self, cursor: Option<Snowflake>) -> Result<Page, ApiError> {
        let messages = match self
            .api
            .channel_messages(self.channel_id, cursor, PAGE_LIMIT)
            .await
        {
            Ok(messages) => messages,
            Err(ApiError::Forbidden) => return Ok(Page::AccessDenied),
            Err(ApiError::Status { status, .. }) => return Ok(Page::Failed { status }),
            Err(e) => return Err(e),
        };

        if messages.is_empty() {
            return Ok(Page::Empty);
        }

        // The cursor must move strictly backwards; anything at or above it
        // would make the walk revisit the same history forever.
        let Some(cursor) = cursor else {
            return Ok(Page::Messages(messages));
        };
        let received = messages.len();
        let older: Vec<Message> = messages.into_iter().filter(|m| m.id < cursor).collect();
        if older.len() != received {
            warn!(
                channel = %self.channel_id,
                %cursor,
                dropped = received - older.len(),
                "page contained messages at or above the cursor"
            );
        }

        if older.is_empty() {
            Ok(Page::Empty)
        } else {
            Ok(Page::Messages(older))
        }
    }
}
