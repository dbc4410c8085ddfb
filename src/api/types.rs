//! Wire types returned by the REST API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Milliseconds between the Unix epoch and the service epoch (2015-01-01).
const SERVICE_EPOCH_MS: u64 = 1_420_070_400_000;

/// 64-bit service identifier.
///
/// Ids sort by creation time, which is what makes them usable as
/// pagination cursors. The API sends them as decimal strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Snowflake(u64);

impl Snowflake {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// Creation time encoded in the upper 42 bits.
    pub fn created_at(self) -> Option<DateTime<Utc>> {
        let ms = (self.0 >> 22) + SERVICE_EPOCH_MS;
        DateTime::from_timestamp_millis(i64::try_from(ms).ok()?)
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Snowflake {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse::<u64>().map(Self)
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(Self(n)),
        }
    }
}

/// Channel type. Only `Text` channels are ever purged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub enum ChannelKind {
    Text,
    Voice,
    Category,
    Announcement,
    Forum,
    Other(u64),
}

impl From<u64> for ChannelKind {
    fn from(raw: u64) -> Self {
        match raw {
            0 => ChannelKind::Text,
            2 => ChannelKind::Voice,
            4 => ChannelKind::Category,
            5 => ChannelKind::Announcement,
            15 => ChannelKind::Forum,
            other => ChannelKind::Other(other),
        }
    }
}

impl From<ChannelKind> for u64 {
    fn from(kind: ChannelKind) -> Self {
        match kind {
            ChannelKind::Text => 0,
            ChannelKind::Voice => 2,
            ChannelKind::Category => 4,
            ChannelKind::Announcement => 5,
            ChannelKind::Forum => 15,
            ChannelKind::Other(raw) => raw,
        }
    }
}

/// A guild channel as listed by `GET /guilds/{id}/channels`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ChannelKind,
}

impl Channel {
    pub fn is_text(&self) -> bool {
        self.kind == ChannelKind::Text
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: Snowflake,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub discriminator: String,
}

impl Author {
    /// `name#1234`, or just the name for accounts without a discriminator.
    pub fn display_name(&self) -> String {
        if self.discriminator.is_empty() || self.discriminator == "0" {
            self.username.clone()
        } else {
            format!("{}#{}", self.username, self.discriminator)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: Snowflake,
    pub author: Author,
    #[serde(default)]
    pub content: String,
}

/// The account behind the credential (`GET /users/@me`).
pub type CurrentUser = Author;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guild {
    pub id: Snowflake,
    #[serde(default)]
    pub name: String,
}

/// Raw result of a delete request, before rate-limit interpretation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeleteResponse {
    pub status: u16,
    /// Retry-after in seconds, when the service supplied one
    pub retry_after: Option<f64>,
}

impl DeleteResponse {
    pub fn ok() -> Self {
        Self {
            status: 204,
            retry_after: None,
        }
    }

    pub fn rate_limited(retry_after: Option<f64>) -> Self {
        Self {
            status: 429,
            retry_after,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            retry_after: None,
        }
    }
}
