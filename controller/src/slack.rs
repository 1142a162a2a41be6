use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use thiserror::Error;

use busylight_common::{DndPayload, PresencePayload, ProfilePayload};

pub const SLACK_API_BASE: &str = "https://slack.com/api";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{method} request failed: {source}")]
    Transport {
        method: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{method} returned HTTP {status}")]
    Status {
        method: &'static str,
        status: StatusCode,
    },
    #[error("{method} rejected by api: {code}")]
    Api { method: &'static str, code: String },
    #[error("{method} payload could not be decoded: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Upstream presence data. Every call may fail.
#[async_trait]
pub trait PresenceSource: Send + Sync {
    async fn presence(&self) -> Result<PresencePayload, UpstreamError>;
    async fn profile(&self) -> Result<ProfilePayload, UpstreamError>;
    async fn dnd_info(&self) -> Result<DndPayload, UpstreamError>;
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl SlackClient {
    pub fn new(token: impl Into<String>) -> reqwest::Result<Self> {
        Self::with_base_url(token, SLACK_API_BASE)
    }

    pub fn with_base_url(
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &'static str) -> Result<T, UpstreamError> {
        let url = format!("{}/{method}", self.base_url);
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|source| UpstreamError::Transport { method, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status { method, status });
        }

        let raw = response
            .bytes()
            .await
            .map_err(|source| UpstreamError::Transport { method, source })?;

        let envelope: Envelope = serde_json::from_slice(&raw)
            .map_err(|source| UpstreamError::Decode { method, source })?;
        if !envelope.ok {
            return Err(UpstreamError::Api {
                method,
                code: envelope.error.unwrap_or_else(|| "unknown_error".to_string()),
            });
        }

        serde_json::from_slice(&raw).map_err(|source| UpstreamError::Decode { method, source })
    }
}

#[async_trait]
impl PresenceSource for SlackClient {
    async fn presence(&self) -> Result<PresencePayload, UpstreamError> {
        self.call("users.getPresence").await
    }

    async fn profile(&self) -> Result<ProfilePayload, UpstreamError> {
        self.call("users.profile.get").await
    }

    async fn dnd_info(&self) -> Result<DndPayload, UpstreamError> {
        self.call("dnd.info").await
    }
}
