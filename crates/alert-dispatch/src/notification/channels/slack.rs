//! Slack Web API chat channel.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::http::{build_client, check_response, request_error};
use super::{DeliveryReceipt, NotificationChannel};
use crate::notification::events::Notification;
use crate::notification::format::format_chat_message;
use crate::notification::routing::{Channel, ChannelKind};
use crate::{Error, Result};

/// Slack API errors that retrying cannot fix.
const PERMANENT_API_ERRORS: &[&str] = &[
    "invalid_auth",
    "not_authed",
    "account_inactive",
    "token_revoked",
    "channel_not_found",
    "not_in_channel",
    "is_archived",
    "missing_scope",
];

/// Classify the `error` code of an `ok: false` Web API response.
fn api_error(code: &str) -> Error {
    match code {
        "ratelimited" => Error::rate_limited(ChannelKind::Chat.as_str()),
        c if PERMANENT_API_ERRORS.contains(&c) => Error::config(format!("Slack API error: {c}")),
        c => Error::transport(ChannelKind::Chat.as_str(), format!("Slack API error: {c}")),
    }
}

/// Slack channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SlackConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Bot token (`xoxb-...`).
    pub bot_token: String,
    /// Display name for posted messages.
    pub username: String,
    /// Emoji avatar for posted messages.
    pub icon_emoji: String,
    /// Web API base URL.
    pub api_base_url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            username: "Error Monitor Bot".to_string(),
            icon_emoji: ":warning:".to_string(),
            api_base_url: "https://slack.com/api".to_string(),
            timeout_secs: 8,
        }
    }
}

/// Slack notification channel.
pub struct SlackChannel {
    config: SlackConfig,
    client: Client,
}

impl SlackChannel {
    pub fn new(config: SlackConfig) -> Self {
        let client = build_client(config.timeout_secs);
        Self { config, client }
    }

    fn build_payload(&self, target: &str, notification: &Notification) -> Value {
        let mut payload = format_chat_message(notification);
        payload["channel"] = Value::from(target);
        payload["username"] = Value::from(self.config.username.as_str());
        payload["icon_emoji"] = Value::from(self.config.icon_emoji.as_str());
        payload
    }
}

#[async_trait]
impl NotificationChannel for SlackChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Chat
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && !self.config.bot_token.is_empty()
    }

    async fn deliver(
        &self,
        channel: &Channel,
        notification: &Notification,
    ) -> Result<DeliveryReceipt> {
        if self.config.bot_token.is_empty() {
            return Err(Error::config("Slack bot token not configured"));
        }

        let url = format!(
            "{}/chat.postMessage",
            self.config.api_base_url.trim_end_matches('/')
        );
        let payload = self.build_payload(&channel.target, notification);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.bot_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| request_error(ChannelKind::Chat, e))?;
        let response = check_response(ChannelKind::Chat, response).await?;
        let body: Value = response.json().await?;

        // The Web API reports failures in the body with HTTP 200.
        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            let code = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown_error");
            return Err(api_error(code));
        }

        debug!(
            "Slack notification {} posted to {}",
            notification.id, channel.target
        );
        Ok(DeliveryReceipt {
            message_id: body.get("ts").and_then(Value::as_str).map(str::to_string),
            recipients: None,
        })
    }
}
