//! Error types for the REST client, the deletion engine and configuration.

use thiserror::Error;

/// Failure talking to the chat service.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 403: the credential cannot see this resource
    #[error("no access (403)")]
    Forbidden,

    /// Any other non-success status
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Transport-level failure (timeout, connection refused/reset) after retries
    #[error("network error after {attempts} attempt(s): {message}")]
    Network { attempts: u32, message: String },

    /// A success response whose body did not match the expected shape
    #[error("invalid response body: {0}")]
    Decode(String),

    /// The HTTP client could not be constructed
    #[error("client setup failed: {0}")]
    Setup(String),
}

impl ApiError {
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// HTTP status carried by this error, if the service answered at all.
    pub fn http_status(&self) -> Option<u16> {
        match self {
            Self::Forbidden => Some(403),
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Failure starting or running a deletion job.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("a deletion job is already running")]
    JobActive,

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("job task failed: {0}")]
    Join(String),
}

/// Failure loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("no token configured (use --token, DISCORD_TOKEN, or `token` in the config file)")]
    MissingToken,

    #[error("token references unset environment variable {0}")]
    UnsetTokenVar(String),
}
