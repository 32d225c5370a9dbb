use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Voice provider analytics could not be obtained
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("metrics source is not configured")]
    NotConfigured,

    #[error("metrics request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metrics endpoint returned status {0}")]
    Status(u16),

    #[error("metrics fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// Loosely-typed analytics for one call as reported by the voice provider
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderMetrics {
    pub status: Option<String>,
    pub call_duration_secs: Option<u64>,

    /// Full response body
    pub raw: Value,
}

impl ProviderMetrics {
    pub fn from_json(raw: Value) -> Self {
        let status = raw
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_string);
        let call_duration_secs = raw
            .pointer("/metadata/call_duration_secs")
            .and_then(Value::as_u64);

        Self {
            status,
            call_duration_secs,
            raw,
        }
    }
}

/// Source of provider-side call analytics
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(&self, call_id: &str) -> Result<ProviderMetrics, MetricsError>;
}

/// Metrics source for deployments without provider credentials
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetrics;

#[async_trait]
impl MetricsSource for NoMetrics {
    async fn fetch(&self, _call_id: &str) -> Result<ProviderMetrics, MetricsError> {
        Err(MetricsError::NotConfigured)
    }
}

/// Fetches conversation analytics over the provider's REST API
#[derive(Clone)]
pub struct HttpMetricsSource {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpMetricsSource {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, MetricsError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn conversation_url(&self, call_id: &str) -> String {
        format!("{}/v1/convai/conversations/{}", self.base_url, call_id)
    }
}

#[async_trait]
impl MetricsSource for HttpMetricsSource {
    async fn fetch(&self, call_id: &str) -> Result<ProviderMetrics, MetricsError> {
        let url = self.conversation_url(call_id);
        debug!("Fetching provider metrics from {}", url);

        let response = self
            .client
            .get(&url)
            .header("xi-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MetricsError::Status(status.as_u16()));
        }

        let body: Value = response.json().await?;
        Ok(ProviderMetrics::from_json(body))
    }
}
