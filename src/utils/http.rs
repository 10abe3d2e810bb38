//! HTTP client utilities.
//!
//! [`ProviderClient`] is the single place where adapters touch the network:
//! every attempt passes the provider's [`RateGate`], and failures are
//! classified into transient and permanent [`SourceError`]s for [`with_retry`].

use reqwest::{Client, StatusCode};
use std::sync::Arc;
use std::time::Duration;

use super::rate_limit::RateGate;
use super::retry::{with_retry, RetryConfig};
use crate::models::SourceKind;
use crate::sources::SourceError;

/// Connection settings shared by all providers
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Rate-limited, retrying HTTP client bound to one provider
#[derive(Debug, Clone)]
pub struct ProviderClient {
    provider: SourceKind,
    client: Client,
    gate: Arc<RateGate>,
    retry: RetryConfig,
}

impl ProviderClient {
    /// Create a client for `provider` using its own rate gate
    pub fn new(
        provider: SourceKind,
        settings: &HttpSettings,
        gate: Arc<RateGate>,
        retry: RetryConfig,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| SourceError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            provider,
            client,
            gate,
            retry,
        })
    }

    /// GET `url` with query parameters and return the body as text
    pub async fn get_text(&self, url: &str, params: &[(&str, String)]) -> Result<String, SourceError> {
        with_retry(self.retry, || self.attempt(url, params)).await
    }

    async fn attempt(&self, url: &str, params: &[(&str, String)]) -> Result<String, SourceError> {
        self.gate.acquire().await;
        tracing::debug!("{} GET {}", self.provider, url);

        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(&response);
            let message = response.text().await.unwrap_or_default();
            return Err(classify_status(status, retry_after, message));
        }

        response.text().await.map_err(classify_reqwest_error)
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::Timeout
    } else if err.is_decode() {
        SourceError::Parse(err.to_string())
    } else {
        SourceError::Network(err.to_string())
    }
}

/// Map a non-success status to a transient or permanent error
pub(crate) fn classify_status(
    status: StatusCode,
    retry_after: Option<Duration>,
    message: String,
) -> SourceError {
    let message: String = message.chars().take(200).collect();
    if status == StatusCode::TOO_MANY_REQUESTS {
        SourceError::RateLimit { retry_after }
    } else if status.is_server_error() {
        SourceError::Server {
            status: status.as_u16(),
            message,
        }
    } else {
        SourceError::Api {
            status: status.as_u16(),
            message,
        }
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
