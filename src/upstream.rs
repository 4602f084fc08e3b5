//! The client for the external inference service. One call per request,
//! no retries.

use crate::config::Settings;
use crate::prompt::UpstreamPayload;
use crate::server::RelayError;
use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Something that can answer an `UpstreamPayload`
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Send `payload` and return the decoded reply. A non-success status is
    /// reported as `RelayError::Upstream` carrying the raw body.
    async fn respond(&self, payload: &UpstreamPayload) -> Result<Value, RelayError>;
}

/// Talks to an OpenAI-style `/v1/responses` endpoint over HTTPS
pub struct OpenAiClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    timeout: Option<Duration>,
}

impl std::fmt::Debug for OpenAiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "OpenAiClient {{ endpoint: {:?}, api_key: {}, timeout: {:?} }}",
            self.endpoint,
            if self.api_key.is_some() { "<set>" } else { "<unset>" },
            self.timeout
        )
    }
}

impl OpenAiClient {
    pub fn new(
        endpoint: String,
        api_key: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<Self, RelayError> {
        Ok(OpenAiClient {
            client: Client::builder().build()?,
            endpoint,
            api_key,
            timeout,
        })
    }

    pub fn from_settings(settings: &Settings, api_key: Option<String>) -> Result<Self, RelayError> {
        Self::new(
            settings.endpoint.clone(),
            api_key,
            settings.upstream_timeout(),
        )
    }

    async fn send(&self, payload: &UpstreamPayload) -> Result<Value, RelayError> {
        let mut req = self.client.post(&self.endpoint).json(payload);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }

        let res = req.send().await?;
        let status = res.status();
        debug!("upstream answered {status}");

        if !status.is_success() {
            let body = res.text().await?;
            return Err(RelayError::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = res.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Upstream for OpenAiClient {
    #[instrument(skip_all, fields(endpoint = %self.endpoint, model = %payload.model))]
    async fn respond(&self, payload: &UpstreamPayload) -> Result<Value, RelayError> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.send(payload))
                .await
                .map_err(|_| anyhow!("upstream did not answer within {limit:?}"))?,
            None => self.send(payload).await,
        }
    }
}
