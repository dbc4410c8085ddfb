//! msgpurge - bulk deletion of your own messages over the chat service's REST API.
//!
//! The [`engine`] runs one job at a time on a spawned task. A job walks each
//! channel's history backwards page by page, deletes the messages written by
//! the target account, and repeats full passes until one finds nothing.
//! Progress and status flow back over an event channel; a
//! [`cancel::CancellationToken`] stops the job at the next safe point.

pub mod api;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod deletion;
pub mod engine;
pub mod enumerator;
pub mod error;
pub mod events;
pub mod filter;
pub mod job;
pub mod pagination;
pub mod preview;
pub mod ratelimit;

#[cfg(test)]
mod test_utils;

pub use cli::Args;
pub use engine::{Engine, JobHandle, JobSummary};
pub use job::Scope;
