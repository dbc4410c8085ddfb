//! Configuration loading.
//!
//! Sources, lowest to highest precedence: built-in defaults,
//! `~/.msgpurge/config.toml`, environment variables, CLI flags (applied by
//! the binary).

use crate::api::DISCORD_API_BASE;
use crate::error::ConfigError;
use crate::ratelimit::RateLimitPolicy;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Credential (or env var reference like ${DISCORD_TOKEN})
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

/// HTTP client settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Extra attempts after a timeout or connection failure
    #[serde(default = "default_network_retries")]
    pub network_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    DISCORD_API_BASE.to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_network_retries() -> u32 {
    3
}

fn default_user_agent() -> String {
    format!(
        "DiscordBot (https://github.com/msgpurge/msgpurge, v{})",
        env!("CARGO_PKG_VERSION")
    )
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            request_timeout_secs: default_request_timeout(),
            network_retries: default_network_retries(),
            user_agent: default_user_agent(),
        }
    }
}

/// What to do with a message whose delete was rate limited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitMode {
    /// Leave it for the next full pass
    #[default]
    Defer,
    /// Retry the same message after the backoff
    RetryInPlace,
}

/// Deletion loop settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Delay after every delete attempt
    #[serde(default = "default_pacing_ms")]
    pub pacing_ms: u64,

    #[serde(default)]
    pub on_rate_limit: RateLimitMode,

    /// Attempts per message in `retry_in_place` mode
    #[serde(default = "default_rate_limit_retries")]
    pub rate_limit_retries: u32,
}

fn default_pacing_ms() -> u64 {
    250
}

fn default_rate_limit_retries() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pacing_ms: default_pacing_ms(),
            on_rate_limit: RateLimitMode::default(),
            rate_limit_retries: default_rate_limit_retries(),
        }
    }
}

impl EngineConfig {
    pub fn rate_limit_policy(&self) -> RateLimitPolicy {
        match self.on_rate_limit {
            RateLimitMode::Defer => RateLimitPolicy::DeferToRescan,
            RateLimitMode::RetryInPlace => RateLimitPolicy::RetryInPlace {
                max_attempts: self.rate_limit_retries.max(1),
            },
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".msgpurge")
            .join("config.toml")
    }

    /// Load the default config file if present, then apply env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        let mut cfg = if path.exists() {
            Self::read_file(&path)?
        } else {
            Self::default()
        };
        cfg.apply_env();
        Ok(cfg)
    }

    /// Load an explicit config file (must exist), then apply env overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let mut cfg = Self::read_file(path)?;
        cfg.apply_env();
        Ok(cfg)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("MSGPURGE_BASE_URL") {
            if !url.trim().is_empty() {
                self.api.base_url = url;
            }
        }
        if self.token.is_none() {
            if let Ok(token) = std::env::var("DISCORD_TOKEN") {
                if !token.trim().is_empty() {
                    self.token = Some(token);
                }
            }
        }
    }

    /// Resolve the credential, expanding a `${VAR}` reference.
    pub fn resolve_token(&self) -> Result<SecretString, ConfigError> {
        let token = self.token.as_deref().ok_or(ConfigError::MissingToken)?;
        let token = token.trim();

        let resolved = if token.starts_with("${") && token.ends_with('}') {
            let env_var = &token[2..token.len() - 1];
            std::env::var(env_var).map_err(|_| ConfigError::UnsetTokenVar(env_var.to_string()))?
        } else {
            token.to_string()
        };

        if resolved.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        Ok(SecretString::from(resolved))
    }
}
