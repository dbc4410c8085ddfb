//! Author predicate.

use crate::api::{Message, Snowflake};

/// Selects messages written by one account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorFilter {
    author: Snowflake,
}

impl AuthorFilter {
    pub fn new(author: Snowflake) -> Self {
        Self { author }
    }

    pub fn author(&self) -> Snowflake {
        self.author
    }

    pub fn matches(&self, message: &Message) -> bool {
        message.author.id == self.author
    }
}
