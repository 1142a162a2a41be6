use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use busylight_common::Rgb;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum LightError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: StatusCode },
}

/// The physical busy light. Calls are best effort.
#[async_trait]
pub trait LightSink: Send + Sync {
    async fn set_color(&self, color: Rgb) -> Result<(), LightError>;
    async fn turn_off(&self) -> Result<(), LightError>;
}

/// Busy light driven by two HTTP endpoints. An endpoint left unconfigured
/// turns the matching call into a no-op.
pub struct HttpLightSink {
    http: reqwest::Client,
    set_color_url: Option<String>,
    off_url: Option<String>,
}

impl HttpLightSink {
    pub fn new(set_color_url: Option<String>, off_url: Option<String>) -> reqwest::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;

        Ok(Self {
            http,
            set_color_url,
            off_url,
        })
    }

    async fn send(url: &str, request: reqwest::RequestBuilder) -> Result<(), LightError> {
        let response = request.send().await.map_err(|source| LightError::Transport {
            url: url.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LightError::Status {
                url: url.to_string(),
                status,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LightSink for HttpLightSink {
    async fn set_color(&self, color: Rgb) -> Result<(), LightError> {
        let Some(url) = self.set_color_url.as_deref() else {
            return Ok(());
        };
        Self::send(url, self.http.post(url).json(&color)).await
    }

    async fn turn_off(&self) -> Result<(), LightError> {
        let Some(url) = self.off_url.as_deref() else {
            return Ok(());
        };
        Self::send(url, self.http.get(url)).await
    }
}
