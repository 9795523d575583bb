use std::{sync::Arc, time::Duration};

use anyhow::{Context as _, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

use super::WatchdogEvent;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Serialize)]
pub(crate) struct WebhookPayload {
    #[serde(flatten)]
    pub(crate) event: WatchdogEvent,
    pub(crate) timestamp: String,
}

impl WebhookPayload {
    pub(crate) fn new(event: WatchdogEvent) -> Self {
        #[cfg(test)]
        let timestamp = "2024-01-01T00:00:00Z".to_string();
        #[cfg(not(test))]
        let timestamp = chrono::Utc::now().to_rfc3339();

        Self { event, timestamp }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct WebhookPlugin {
    webhook_url: String,
    client: Arc<reqwest::Client>,
}

impl WebhookPlugin {
    pub fn new(webhook_config: WebhookConfig) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(token) = &webhook_config.bearer_token {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&format!("Bearer {token}"))
                    .context("webhook bearer token is not a valid header value")?,
            );
        }
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .context("failed to build webhook HTTP client")?;

        Ok(Self {
            webhook_url: webhook_config.url,
            client: Arc::new(client),
        })
    }

    /// Outside of tests delivery happens on a background task so a slow
    /// receiver never stalls a sweep.
    pub(crate) async fn send_event(&self, event: &WatchdogEvent) -> Result<()> {
        let payload = WebhookPayload::new(event.clone());
        let webhook_url = self.webhook_url.clone();
        let client = self.client.clone();

        #[cfg(not(test))]
        {
            tokio::spawn(async move {
                if let Err(e) = post(&client, &webhook_url, &payload).await {
                    error!("Failed to send webhook to {webhook_url}: {e:#}");
                }
            });
            Ok(())
        }

        #[cfg(test)]
        {
            post(&client, &webhook_url, &payload).await.map_err(|e| {
                error!("Failed to send webhook to {webhook_url}: {e:#}");
                e
            })
        }
    }
}

async fn post(client: &reqwest::Client, webhook_url: &str, payload: &WebhookPayload) -> Result<()> {
    client
        .post(webhook_url)
        .json(payload)
        .send()
        .await?
        .error_for_status()?;
    debug!("Webhook to {webhook_url} triggered successfully");
    Ok(())
}
