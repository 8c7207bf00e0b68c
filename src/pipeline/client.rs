use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::json;
use url::Url;

use super::models::BillingEvent;

/// Result of one delivery attempt. Ordinary failures (non-2xx, transport
/// errors, timeouts) are data, not errors; retry policy lives entirely in the
/// dispatcher and queue store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

// key: billing-client -> single-attempt adapter for the billing API
pub struct BillingClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
}

impl BillingClient {
    /// The only fatal path: an unparseable base URL or a client that cannot
    /// be built is misconfiguration, surfaced at startup.
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .with_context(|| format!("invalid billing API base URL: {base_url}"))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build billing HTTP client")?;
        Ok(Self {
            http,
            base_url,
            api_key,
        })
    }

    /// Performs exactly one network call. Never retries internally.
    pub async fn deliver(&self, event: &BillingEvent) -> DeliveryOutcome {
        let url = match self.base_url.join("api/v1/events") {
            Ok(url) => url,
            Err(err) => return DeliveryOutcome::Failed(format!("invalid events URL: {err}")),
        };

        let mut request = self.http.post(url).json(&json!({ "event": event }));
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => DeliveryOutcome::Delivered,
            Ok(response) => {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                DeliveryOutcome::Failed(format!("billing API returned {status}: {body}"))
            }
            Err(err) => DeliveryOutcome::Failed(format!("billing API request failed: {err}")),
        }
    }

    /// Reachability probe used by the health endpoint.
    pub async fn health(&self) -> bool {
        let Ok(url) = self.base_url.join("health") else {
            return false;
        };
        match self.http.get(url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
