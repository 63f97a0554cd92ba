//! Notification channel adapters.
//!
//! One adapter per [`ChannelKind`]:
//! - Chat: Slack Web API (`chat.postMessage`)
//! - Team chat: incoming-webhook MessageCards
//! - Email: HTTP mail relay
//! - SMS: Twilio-style REST messaging API

mod email;
mod http;
mod slack;
mod sms;
mod teams;

pub use email::{EmailChannel, EmailConfig, EmailRecipient};
pub use slack::{SlackChannel, SlackConfig};
pub use sms::{SmsChannel, SmsConfig, SmsRecipient};
pub use teams::{TeamsChannel, TeamsConfig};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::events::Notification;
use super::routing::{Channel, ChannelKind};
use crate::{Error, Result};

/// Provider acknowledgement of a successful send.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Provider message identifier, when the API returns one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Number of recipients reached, for fan-out transports.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipients: Option<usize>,
}

impl DeliveryReceipt {
    pub fn with_message_id(message_id: impl Into<String>) -> Self {
        Self {
            message_id: Some(message_id.into()),
            recipients: None,
        }
    }
}

/// Trait for notification channels.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Transport family this adapter serves.
    fn kind(&self) -> ChannelKind;

    /// Check if the channel is enabled.
    fn is_enabled(&self) -> bool;

    /// Deliver `notification` to `channel.target`.
    ///
    /// Missing credentials or targets are [`crate::Error::Configuration`];
    /// network and provider failures are retryable errors.
    async fn deliver(&self, channel: &Channel, notification: &Notification)
    -> Result<DeliveryReceipt>;
}

/// Channel configuration wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelConfig {
    Slack(SlackConfig),
    Teams(TeamsConfig),
    Email(EmailConfig),
    Sms(SmsConfig),
}

impl ChannelConfig {
    pub fn kind(&self) -> ChannelKind {
        match self {
            Self::Slack(_) => ChannelKind::Chat,
            Self::Teams(_) => ChannelKind::TeamChat,
            Self::Email(_) => ChannelKind::Email,
            Self::Sms(_) => ChannelKind::Sms,
        }
    }

    pub fn is_enabled(&self) -> bool {
        match self {
            Self::Slack(c) => c.enabled,
            Self::Teams(c) => c.enabled,
            Self::Email(c) => c.enabled,
            Self::Sms(c) => c.enabled,
        }
    }

    /// Per-request HTTP timeout of the adapter.
    pub fn timeout_secs(&self) -> u64 {
        match self {
            Self::Slack(c) => c.timeout_secs,
            Self::Teams(c) => c.timeout_secs,
            Self::Email(c) => c.timeout_secs,
            Self::Sms(c) => c.timeout_secs,
        }
    }

    /// Check endpoint URLs of an enabled channel.
    ///
    /// Empty endpoints are allowed here; the adapter reports them as
    /// disabled instead.
    pub fn validate(&self) -> Result<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        let endpoints: Vec<(&str, &str)> = match self {
            Self::Slack(c) => vec![("api_base_url", c.api_base_url.as_str())],
            Self::Teams(c) => vec![
                ("webhook_url", c.webhook_url.as_str()),
                ("dashboard_url", c.dashboard_url.as_str()),
            ],
            Self::Email(c) => vec![("relay_url", c.relay_url.as_str())],
            Self::Sms(c) => vec![("api_base_url", c.api_base_url.as_str())],
        };
        for (field, value) in endpoints {
            if value.is_empty() {
                continue;
            }
            url::Url::parse(value).map_err(|e| {
                Error::validation(format!("{} channel {field} is not a URL: {e}", self.kind()))
            })?;
        }
        Ok(())
    }

    /// Build the adapter for this configuration.
    pub fn build(&self) -> Arc<dyn NotificationChannel> {
        match self {
            Self::Slack(c) => Arc::new(SlackChannel::new(c.clone())),
            Self::Teams(c) => Arc::new(TeamsChannel::new(c.clone())),
            Self::Email(c) => Arc::new(EmailChannel::new(c.clone())),
            Self::Sms(c) => Arc::new(SmsChannel::new(c.clone())),
        }
    }
}
