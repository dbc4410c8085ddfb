//! Read-only look at a channel's recent history.

use crate::api::{DiscordApi, Message, Snowflake};
use crate::error::ApiError;
use crate::filter::AuthorFilter;
use crate::pagination::{Page, PageFetcher};
use chrono::{DateTime, Utc};
use std::fmt;

/// Most messages scanned for one preview
pub const MAX_PREVIEW_MESSAGES: usize = 500;

/// Characters of content shown per line
pub const PREVIEW_CHARS: usize = 70;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewLine {
    pub message_id: Snowflake,
    pub author: String,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl PreviewLine {
    pub fn from_message(message: &Message) -> Self {
        Self {
            message_id: message.id,
            author: message.author.display_name(),
            text: preview_text(&message.content),
            created_at: message.id.created_at(),
        }
    }
}

impl fmt::Display for PreviewLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.author, self.text)
    }
}

/// First [`PREVIEW_CHARS`] characters, flattened to one line.
pub fn preview_text(content: &str) -> String {
    content
        .chars()
        .take(PREVIEW_CHARS)
        .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
        .collect()
}

/// Walk back from the newest message until `max` messages have been scanned
/// or the history ends, then apply `filter`.
///
/// Unlike deletion, a denied or failing channel is an error here: there is
/// nothing to skip to.
pub async fn load_preview(
    api: &dyn DiscordApi,
    channel_id: Snowflake,
    filter: Option<AuthorFilter>,
    max: usize,
) -> Result<Vec<PreviewLine>, ApiError> {
    let fetcher = PageFetcher::new(api, channel_id);
    let mut scanned: Vec<Message> = Vec::new();
    let mut cursor = None;

    while scanned.len() < max {
        let page = fetcher.fetch_page(cursor).await?;
        let full = page.is_full();
        let messages = match page {
            Page::Messages(messages) => messages,
            Page::Empty => break,
            Page::AccessDenied => return Err(ApiError::Forbidden),
            Page::Failed { status } => {
                return Err(ApiError::status(status, "failed to fetch messages"))
            }
        };

        cursor = messages.last().map(|m| m.id);
        scanned.extend(messages);
        if !full {
            break;
        }
    }
    scanned.truncate(max);

    Ok(scanned
        .iter()
        .filter(|m| filter.map_or(true, |f| f.matches(m)))
        .map(PreviewLine::from_message)
        .collect())
}
