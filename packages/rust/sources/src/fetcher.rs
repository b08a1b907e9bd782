//! HTTP client with a minimum spacing between requests.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument};

use sellerreport_shared::{ReportError, Result, SourceSettings};

/// Issues GET requests no closer together than `min_interval`.
///
/// The interval runs from the moment the previous response body was fully
/// read to the moment the next request is sent. The gate is held for the
/// whole request, so concurrent callers sharing one fetcher queue up behind
/// it instead of racing.
pub struct PacedFetcher {
    client: Client,
    min_interval: Duration,
    last_done: Mutex<Option<Instant>>,
}

impl PacedFetcher {
    /// Build a fetcher with the configured timeout, User-Agent and interval.
    pub fn new(settings: &SourceSettings) -> Result<Self> {
        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ReportError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self::with_client(client, settings.min_interval))
    }

    pub fn with_client(client: Client, min_interval: Duration) -> Self {
        Self {
            client,
            min_interval,
            last_done: Mutex::new(None),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// GET `url` with query parameters and decode the body as JSON.
    #[instrument(skip(self, query), fields(url = %url))]
    pub async fn get_json(&self, url: &str, query: &[(&str, String)]) -> Result<Value> {
        let body = self.fetch(url, self.client.get(url).query(query)).await?;
        serde_json::from_str(&body)
            .map_err(|e| ReportError::parse(format!("{url}: response is not JSON: {e}")))
    }

    /// GET `url` and return the body as text.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn get_text(&self, url: &str) -> Result<String> {
        self.fetch(url, self.client.get(url)).await
    }

    async fn fetch(&self, url: &str, request: RequestBuilder) -> Result<String> {
        let mut last_done = self.last_done.lock().await;
        if let Some(last) = *last_done {
            tokio::time::sleep_until(last + self.min_interval).await;
        }

        let result = send(url, request).await;
        *last_done = Some(Instant::now());
        result
    }
}

async fn send(url: &str, request: RequestBuilder) -> Result<String> {
    let response = request
        .send()
        .await
        .map_err(|e| ReportError::Network(format!("{url}: {e}")))?;

    let status = response.status();
    debug!(%url, status = status.as_u16(), "response received");
    if !status.is_success() {
        return Err(ReportError::Upstream {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    response
        .text()
        .await
        .map_err(|e| ReportError::Network(format!("{url}: body read failed: {e}")))
}
