//! Generic webhook notification sink.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header::HeaderMap};
use serde_json::json;
use tracing::{debug, warn};

use super::NotificationSink;
use super::events::NotificationEvent;
use crate::utils::http_client::install_rustls_provider;
use crate::{Error, Result};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// POSTs a JSON payload for every event.
pub struct WebhookSink {
    url: String,
    headers: Vec<(String, String)>,
    client: Client,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, headers: Vec<(String, String)>) -> Self {
        install_rustls_provider();
        let client = Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            url: url.into(),
            headers,
            client,
        }
    }

    fn build_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<reqwest::header::HeaderName>(),
                value.parse::<reqwest::header::HeaderValue>(),
            ) {
                headers.insert(name, value);
            } else {
                warn!(header = %name, "Skipping invalid webhook header");
            }
        }
        headers
    }

    fn build_payload(&self, event: &NotificationEvent) -> serde_json::Value {
        json!({
            "event_type": event.event_type(),
            "title": event.title(),
            "description": event.description(),
            "timestamp": event.timestamp().to_rfc3339(),
            "creator_id": event.creator_id(),
            "creator_name": event.creator_name(),
            "data": event
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn send(&self, event: &NotificationEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .headers(self.build_headers())
            .json(&self.build_payload(event))
            .send()
            .await
            .map_err(|e| Error::Other(format!("Webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Other(format!(
                "Webhook failed: {} - {}",
                status, body
            )));
        }

        debug!("Webhook notification sent: {}", event.event_type());
        Ok(())
    }
}
