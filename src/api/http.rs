//! `reqwest`-backed implementation of [`DiscordApi`].

use super::types::{Channel, CurrentUser, DeleteResponse, Guild, Message, Snowflake};
use super::DiscordApi;
use crate::config::ApiConfig;
use crate::error::ApiError;
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, RETRY_AFTER};
use reqwest::{Method, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

// Backoff for transport failures (timeouts, refused/reset connections)
const INITIAL_BACKOFF_MS: u64 = 1000;
const MAX_BACKOFF_MS: u64 = 60000;

/// Longest error body kept in [`ApiError::Status`]
const MAX_ERROR_BODY: usize = 200;

pub struct HttpClient {
    base_url: String,
    token: SecretString,
    network_retries: u32,
    http: reqwest::Client,
}

impl HttpClient {
    pub fn new(config: &ApiConfig, token: SecretString) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| ApiError::Setup(e.to_string()))?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            network_retries: config.network_retries,
            http,
        })
    }

    /// Send a request, retrying transport failures with exponential backoff.
    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Response, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            attempt += 1;

            let result = self
                .http
                .request(method.clone(), &url)
                .header(AUTHORIZATION, self.token.expose_secret())
                .header(CONTENT_TYPE, "application/json")
                .query(query)
                .send()
                .await;

            match result {
                Ok(resp) => {
                    debug!(%method, path, status = resp.status().as_u16(), "request complete");
                    return Ok(resp);
                }
                Err(e) if is_retryable_transport(&e) && attempt <= self.network_retries => {
                    warn!(
                        %method,
                        path,
                        attempt,
                        wait_ms = backoff_ms,
                        "transport error, retrying: {}",
                        e
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
                }
                Err(e) => {
                    return Err(ApiError::Network {
                        attempts: attempt,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let resp = self.send(Method::GET, path, query).await?;
        let status = resp.status();

        if status == StatusCode::FORBIDDEN {
            return Err(ApiError::Forbidden);
        }
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ApiError::status(
                status.as_u16(),
                truncate_body(&body, MAX_ERROR_BODY),
            ));
        }

        resp.json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl DiscordApi for HttpClient {
    async fn current_user(&self) -> Result<CurrentUser, ApiError> {
        self.get_json("/users/@me", &[]).await
    }

    async fn guilds(&self) -> Result<Vec<Guild>, ApiError> {
        self.get_json("/users/@me/guilds", &[]).await
    }

    async fn guild_channels(&self, guild_id: Snowflake) -> Result<Vec<Channel>, ApiError> {
        self.get_json(&format!("/guilds/{}/channels", guild_id), &[])
            .await
    }

    async fn channel_messages(
        &self,
        channel_id: Snowflake,
        before: Option<Snowflake>,
        limit: usize,
    ) -> Result<Vec<Message>, ApiError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(cursor) = before {
            query.push(("before", cursor.to_string()));
        }
        self.get_json(&format!("/channels/{}/messages", channel_id), &query)
            .await
    }

    async fn delete_message(
        &self,
        channel_id: Snowflake,
        message_id: Snowflake,
    ) -> Result<DeleteResponse, ApiError> {
        let path = format!("/channels/{}/messages/{}", channel_id, message_id);
        let resp = self.send(Method::DELETE, &path, &[]).await?;
        let status = resp.status();

        if status != StatusCode::TOO_MANY_REQUESTS {
            return Ok(DeleteResponse::status(status.as_u16()));
        }

        let header_secs = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<f64>().ok());
        let body = resp.text().await.unwrap_or_default();

        Ok(DeleteResponse::rate_limited(
            retry_after_from_body(&body).or(header_secs),
        ))
    }
}

/// Timeouts and connection failures are worth another attempt; request
/// construction errors (bad header value, bad URL) are not.
fn is_retryable_transport(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect()
}

/// Extract `retry_after` (seconds, possibly fractional) from a 429 body.
pub fn retry_after_from_body(body: &str) -> Option<f64> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()?
        .get("retry_after")?
        .as_f64()
}

fn truncate_body(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
