//! Authenticated client for the platform API.

use async_trait::async_trait;
use reqwest::{Client, header};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use super::models::{Account, ApiEnvelope, LiveStatus, StreamingChannel};
use crate::config::AppConfig;
use crate::utils::http_client::build_api_client;
use crate::{Error, Result};

/// Answers "is this creator broadcasting right now".
///
/// One network round-trip per call and no internal retry; callers decide
/// how to treat errors.
#[async_trait]
pub trait LiveProber: Send + Sync {
    async fn check_live(&self, creator_id: &str) -> Result<LiveStatus>;
}

/// Platform API client carrying the account token.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl ApiClient {
    pub fn new(client: Client, base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let client = build_api_client(
            &config.account.user_agent,
            std::time::Duration::from_secs(config.api.request_timeout_secs),
            config.api.proxy_url.as_deref(),
        );
        Self::new(client, &config.api.api_base_url, &config.account.token)
    }

    fn channel_url(&self, creator_id: &str) -> String {
        format!("{}/streaming/channel/{}", self.base_url, creator_id)
    }

    fn account_url(&self) -> String {
        format!("{}/account", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<ApiEnvelope<T>> {
        let response = self
            .client
            .get(url)
            .query(query)
            .header(header::AUTHORIZATION, &self.token)
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::api(format!(
                "GET {} failed: HTTP {} {}",
                url,
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        let body = response.text().await?;
        trace!(url = %url, body = %body, "API response");
        Ok(serde_json::from_str(&body)?)
    }

    /// Fetch the channel payload for a creator.
    pub async fn streaming_channel(&self, creator_id: &str) -> Result<Option<StreamingChannel>> {
        let envelope: ApiEnvelope<StreamingChannel> =
            self.get_json(&self.channel_url(creator_id), &[]).await?;
        if !envelope.success {
            debug!(creator_id = %creator_id, "Channel lookup returned success=false");
            return Ok(None);
        }
        Ok(envelope.response)
    }

    /// Resolve a username to its account.
    pub async fn account_by_username(&self, username: &str) -> Result<Account> {
        let username = username.trim().trim_start_matches('@');
        let envelope: ApiEnvelope<Vec<Account>> = self
            .get_json(&self.account_url(), &[("usernames", username)])
            .await?;

        envelope
            .response
            .unwrap_or_default()
            .into_iter()
            .find(|account| account.username.eq_ignore_ascii_case(username))
            .ok_or_else(|| Error::api(format!("no account found for username '{username}'")))
    }
}

#[async_trait]
impl LiveProber for ApiClient {
    async fn check_live(&self, creator_id: &str) -> Result<LiveStatus> {
        let status = match self.streaming_channel(creator_id).await? {
            Some(channel) => LiveStatus::from_channel(&channel),
            None => LiveStatus::offline(),
        };
        debug!(creator_id = %creator_id, is_live = status.is_live, "Probed liveness");
        Ok(status)
    }
}
