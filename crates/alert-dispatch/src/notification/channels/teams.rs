//! Team-chat incoming webhook channel (MessageCard payloads).

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::http::{build_client, check_response, request_error};
use super::{DeliveryReceipt, NotificationChannel};
use crate::notification::events::Notification;
use crate::notification::format::format_teams_message;
use crate::notification::routing::{Channel, ChannelKind};
use crate::{Error, Result};

/// Team-chat channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TeamsConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Incoming webhook URL.
    pub webhook_url: String,
    /// Base URL for "View in Dashboard" links.
    pub dashboard_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TeamsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            webhook_url: String::new(),
            dashboard_url: "https://monitoring.example.com".to_string(),
            timeout_secs: 8,
        }
    }
}

/// Team-chat notification channel.
pub struct TeamsChannel {
    config: TeamsConfig,
    client: Client,
}

impl TeamsChannel {
    pub fn new(config: TeamsConfig) -> Self {
        let client = build_client(config.timeout_secs);
        Self { config, client }
    }
}

#[async_trait]
impl NotificationChannel for TeamsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::TeamChat
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.webhook_url.is_empty()
    }

    async fn deliver(
        &self,
        channel: &Channel,
        notification: &Notification,
    ) -> Result<DeliveryReceipt> {
        if self.config.webhook_url.is_empty() {
            return Err(Error::config("Teams webhook URL not configured"));
        }

        let card = format_teams_message(notification, &self.config.dashboard_url);
        let response = self
            .client
            .post(&self.config.webhook_url)
            .json(&card)
            .send()
            .await
            .map_err(|e| request_error(ChannelKind::TeamChat, e))?;
        let response = check_response(ChannelKind::TeamChat, response).await?;

        debug!(
            "Teams notification {} sent to {} ({})",
            notification.id,
            channel.target,
            response.status()
        );
        Ok(DeliveryReceipt::default())
    }
}
