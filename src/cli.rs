//! Command-line front end over the engine and the read-only API calls.

use crate::api::{DiscordApi, HttpClient, Snowflake};
use crate::config::{Config, RateLimitMode};
use crate::engine::Engine;
use crate::enumerator::text_channels;
use crate::events::{EngineEvent, JobOutcome};
use crate::filter::AuthorFilter;
use crate::job::Scope;
use crate::preview::{load_preview, MAX_PREVIEW_MESSAGES};
use anyhow::{bail, Context as _, Result};
use clap::{ArgGroup, Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

/// Bulk-delete your own messages from a channel or a whole server
#[derive(Parser, Debug)]
#[command(name = "msgpurge", version, about)]
pub struct Args {
    #[arg(long, env = "DISCORD_TOKEN", hide_env_values = true, global = true, help = "Account token")]
    pub token: Option<String>,

    #[arg(long, global = true, help = "Config file (default: ~/.msgpurge/config.toml)")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Override the REST base URL")]
    pub base_url: Option<String>,

    #[arg(long, global = true, help = "Retry a rate-limited message instead of deferring it")]
    pub retry_in_place: bool,

    #[arg(long, global = true, help = "Verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Debug output")]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the account behind the token
    Whoami,
    /// List the servers the account belongs to
    Guilds,
    /// List a server's text channels
    Channels { guild: Snowflake },
    /// Show recent messages in a channel
    Preview {
        channel: Snowflake,

        #[arg(long, help = "Include messages by other authors")]
        all_authors: bool,

        #[arg(long, value_name = "N", default_value_t = MAX_PREVIEW_MESSAGES, help = "Messages to scan")]
        limit: usize,
    },
    /// Delete your messages
    #[command(group(ArgGroup::new("target").required(true).args(["channel", "guild"])))]
    Purge {
        #[arg(long, help = "Delete in one channel")]
        channel: Option<Snowflake>,

        #[arg(long, help = "Delete in every text channel of a server")]
        guild: Option<Snowflake>,

        #[arg(long, help = "Author id (default: the token's account)")]
        user: Option<Snowflake>,
    },
}

impl Command {
    fn scope(&self) -> Option<Scope> {
        match self {
            Command::Purge {
                channel: Some(id), ..
            } => Some(Scope::Channel(*id)),
            Command::Purge { guild: Some(id), .. } => Some(Scope::Guild(*id)),
            _ => None,
        }
    }
}

/// Merge config file, environment and flags.
pub fn load_config(args: &Args) -> Result<Config> {
    let mut cfg = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(token) = &args.token {
        cfg.token = Some(token.clone());
    }
    if let Some(url) = &args.base_url {
        cfg.api.base_url = url.clone();
    }
    if args.retry_in_place {
        cfg.engine.on_rate_limit = RateLimitMode::RetryInPlace;
    }
    Ok(cfg)
}

fn client(cfg: &Config) -> Result<HttpClient> {
    let token = cfg.resolve_token()?;
    Ok(HttpClient::new(&cfg.api, token)?)
}

pub async fn run(args: Args) -> Result<()> {
    let cfg = load_config(&args)?;
    debug!(base_url = %cfg.api.base_url, "configuration loaded");

    match &args.command {
        Command::Whoami => {
            let me = client(&cfg)?
                .current_user()
                .await
                .context("Login failed")?;
            println!("Logged in as {} (ID: {})", me.display_name(), me.id);
        }
        Command::Guilds => {
            let guilds = client(&cfg)?.guilds().await.context("Failed to fetch guilds")?;
            for guild in guilds {
                println!("{}  {}", guild.id, guild.name);
            }
        }
        Command::Channels { guild } => {
            let api = client(&cfg)?;
            let channels = text_channels(&api, *guild)
                .await
                .context("Failed to fetch guild channels")?;
            for channel in channels {
                println!("{}  #{}", channel.id, channel.name);
            }
        }
        Command::Preview {
            channel,
            all_authors,
            limit,
        } => {
            let api = client(&cfg)?;
            let filter = if *all_authors {
                None
            } else {
                let me = api.current_user().await.context("Login failed")?;
                Some(AuthorFilter::new(me.id))
            };
            let lines = load_preview(&api, *channel, filter, *limit)
                .await
                .context("Failed to fetch messages")?;
            for line in &lines {
                println!("{}", line);
            }
            println!("Loaded {} messages from channel.", lines.len());
        }
        Command::Purge { user, .. } => {
            let Some(scope) = args.command.scope() else {
                bail!("purge needs --channel or --guild");
            };
            let user_id = match user {
                Some(id) => *id,
                None => client(&cfg)?
                    .current_user()
                    .await
                    .context("Login failed")?
                    .id,
            };
            purge(&cfg, scope, user_id).await?;
        }
    }

    Ok(())
}

async fn purge(cfg: &Config, scope: Scope, user_id: Snowflake) -> Result<()> {
    let engine = Engine::new(cfg);
    let mut handle = engine.start(scope, user_id, cfg.resolve_token()?)?;
    println!("Starting deletion in {} for user {}", scope, user_id);

    let cancel = handle.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Stop requested, waiting for current operation to finish...");
            cancel.cancel();
        }
    });

    while let Some(event) = handle.next_event().await {
        match event {
            EngineEvent::Status { message } => println!("{}", message),
            EngineEvent::Progress { deleted } => debug!(deleted, "progress"),
            EngineEvent::Finished {
                total_deleted,
                outcome,
            } => {
                println!(
                    "Deletion finished. Total messages deleted: {}",
                    total_deleted
                );
                if let JobOutcome::Failed(reason) = outcome {
                    bail!("deletion failed: {}", reason);
                }
            }
        }
    }

    handle.wait().await?;
    Ok(())
}
