//! Guild-wide deletion: list text channels and purge them one by one.

use crate::api::{Channel, DiscordApi, Snowflake};
use crate::deletion::{ChannelOutcome, DeletionLoop};
use crate::error::ApiError;
use crate::events::JobOutcome;
use crate::job::JobContext;
use tracing::debug;

/// Text channels of a guild, in listing order.
pub async fn text_channels(
    api: &dyn DiscordApi,
    guild_id: Snowflake,
) -> Result<Vec<Channel>, ApiError> {
    let channels = api.guild_channels(guild_id).await?;
    Ok(channels.into_iter().filter(Channel::is_text).collect())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct GuildTally {
    pub purged: usize,
    pub skipped: usize,
    pub aborted: usize,
}

pub struct ChannelEnumerator {
    guild_id: Snowflake,
}

impl ChannelEnumerator {
    pub fn new(guild_id: Snowflake) -> Self {
        Self { guild_id }
    }

    /// Purge every text channel serially.
    ///
    /// Channels that are denied or fail to page are reported and passed
    /// over; only a stop request or a transport fault ends the walk early.
    pub async fn run(&self, ctx: &mut JobContext) -> Result<JobOutcome, ApiError> {
        let channels = match text_channels(ctx.api.as_ref(), self.guild_id).await {
            Ok(channels) => channels,
            Err(e @ (ApiError::Forbidden | ApiError::Status { .. })) => {
                let status = e.http_status().unwrap_or_default();
                ctx.events
                    .status(format!("Failed to fetch guild channels: {}", status));
                return Ok(JobOutcome::Failed(format!(
                    "failed to fetch guild channels: {}",
                    status
                )));
            }
            Err(e) => return Err(e),
        };

        if channels.is_empty() {
            ctx.events.status("No text channels to process");
            return Ok(JobOutcome::Completed);
        }

        let total = channels.len();
        let mut tally = GuildTally::default();

        for (index, channel) in channels.iter().enumerate() {
            if ctx.cancel.is_cancelled() {
                return Ok(JobOutcome::Cancelled);
            }

            ctx.events.status(format!(
                "Deleting messages in channel: {} ({}/{})",
                channel.name,
                index + 1,
                total
            ));

            let label = format!("#{}", channel.name);
            match DeletionLoop::new(ctx, channel.id, label).run().await? {
                ChannelOutcome::Purged => tally.purged += 1,
                ChannelOutcome::Skipped => tally.skipped += 1,
                ChannelOutcome::Aborted { .. } => tally.aborted += 1,
                ChannelOutcome::Stopped => return Ok(JobOutcome::Cancelled),
            }
            debug!(guild = %self.guild_id, channel = %channel.id, ?tally, "channel finished");
        }

        ctx.events.status(format!(
            "Processed {} channel(s): {} purged, {} skipped, {} failed",
            total, tally.purged, tally.skipped, tally.aborted
        ));
        Ok(JobOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ChannelKind;
    use crate::events::EngineEvent;
    use crate::ratelimit::RateLimitPolicy;
    use crate::test_utils::{channel, drain, job_context, messages, MockDiscord, MockRequest};
    use std::sync::Arc;

    const ME: u64 = 7;
    const GUILD: u64 = 1000;

    #[tokio::test]
    async fn test_only_text_channels_listed() {
        let api = MockDiscord::new(ME).with_guild(
            GUILD,
            vec![
                channel(1, "general", ChannelKind::Text),
                channel(2, "Voice", ChannelKind::Voice),
                channel(3, "Info", ChannelKind::Category),
                channel(4, "memes", ChannelKind::Text),
            ],
        );
        let names: Vec<String> = text_channels(&api, Snowflake::new(GUILD))
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["general", "memes"]);
    }

    #[tokio::test]
    async fn test_access_denied_channel_does_not_stop_walk() {
        let api = Arc::new(
            MockDiscord::new(ME)
                .with_guild(
                    GUILD,
                    vec![
                        channel(1, "general", ChannelKind::Text),
                        channel(2, "staff", ChannelKind::Text),
                        channel(3, "memes", ChannelKind::Text),
                    ],
                )
                .with_channel(1, messages(ME, 3, 1))
                .with_forbidden_channel(2)
                .with_channel(3, messages(ME, 2, 100)),
        );
        let (mut ctx, mut rx, _sleeper) = job_context(api.clone(), ME, RateLimitPolicy::DeferToRescan);

        let outcome = ChannelEnumerator::new(Snowflake::new(GUILD))
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(outcome, JobOutcome::Completed);
        assert_eq!(ctx.deleted(), 5);
        assert!(api.remaining(1).is_empty());
        assert!(api.remaining(3).is_empty());

        let statuses: Vec<String> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::Status { message } => Some(message),
                _ => None,
            })
            .collect();
        assert!(statuses.contains(&"Deleting messages in channel: staff (2/3)".to_string()));
        assert!(statuses.contains(&"Skipping #staff: No access (403)".to_string()));
        assert_eq!(
            statuses.last().map(String::as_str),
            Some("Processed 3 channel(s): 2 purged, 1 skipped, 0 failed")
        );
    }

    #[tokio::test]
    async fn test_channels_processed_in_listing_order() {
        let api = Arc::new(
            MockDiscord::new(ME)
                .with_guild(
                    GUILD,
                    vec![
                        channel(30, "c", ChannelKind::Text),
                        channel(10, "a", ChannelKind::Text),
                    ],
                )
                .with_channel(30, messages(ME, 1, 1))
                .with_channel(10, messages(ME, 1, 2)),
        );
        let (mut ctx, _rx, _sleeper) = job_context(api.clone(), ME, RateLimitPolicy::DeferToRescan);

        ChannelEnumerator::new(Snowflake::new(GUILD))
            .run(&mut ctx)
            .await
            .unwrap();

        let touched: Vec<u64> = api
            .requests()
            .iter()
            .filter_map(|r| match r {
                MockRequest::Fetch { channel, .. } => Some(channel.get()),
                _ => None,
            })
            .collect();
        let first_of_10 = touched.iter().position(|c| *c == 10).unwrap();
        assert!(touched[..first_of_10].iter().all(|c| *c == 30));
    }

    #[tokio::test]
    async fn test_listing_failure_ends_job() {
        let api = Arc::new(MockDiscord::new(ME).with_failing_guild(GUILD, 500));
        let (mut ctx, mut rx, _sleeper) = job_context(api, ME, RateLimitPolicy::DeferToRescan);

        let outcome = ChannelEnumerator::new(Snowflake::new(GUILD))
            .run(&mut ctx)
            .await
            .unwrap();

        assert!(matches!(outcome, JobOutcome::Failed(_)));
        assert_eq!(
            drain(&mut rx),
            vec![EngineEvent::Status {
                message: "Failed to fetch guild channels: 500".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_cancel_checked_before_each_channel() {
        let api = Arc::new(
            MockDiscord::new(ME)
                .with_guild(
                    GUILD,
                    vec![
                        channel(1, "general", ChannelKind::Text),
                        channel(2, "memes", ChannelKind::Text),
                    ],
                )
                .with_channel(1, messages(ME, 2, 1))
                .with_channel(2, messages(ME, 2, 10)),
        );
        let (mut ctx, _rx, _sleeper) = job_context(api.clone(), ME, RateLimitPolicy::DeferToRescan);
        ctx.cancel.cancel();

        let outcome = ChannelEnumerator::new(Snowflake::new(GUILD))
            .run(&mut ctx)
            .await
            .unwrap();

        assert_eq!(outcome, JobOutcome::Cancelled);
        assert_eq!(
            api.requests(),
            vec![MockRequest::ListChannels {
                guild: Snowflake::new(GUILD)
            }]
        );
    }
}
