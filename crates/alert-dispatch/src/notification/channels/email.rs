//! Email channel backed by an HTTP mail relay.
//!
//! The relay accepts `{from, to, subject, html, text}` as JSON and answers
//! with an optional message id.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::http::{build_client, check_response, request_error};
use super::{DeliveryReceipt, NotificationChannel};
use crate::notification::events::Notification;
use crate::notification::format::format_email_message;
use crate::notification::routing::{Channel, ChannelKind};
use crate::{Error, Result};

/// Target that addresses every configured recipient.
pub const ALL_RECIPIENTS: &str = "all";

/// Built-in groups and the address fragment that places a recipient in them.
const GROUP_KEYWORDS: &[(&str, &str)] = &[
    ("dev-team", "dev"),
    ("ops-team", "ops"),
    ("management", "manager"),
];

/// An email address and the groups it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailRecipient {
    pub address: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl EmailRecipient {
    /// Listed in `groups`, or for a built-in group, an address containing
    /// the group keyword (`dev-alice@...` is in `dev-team`).
    pub fn in_group(&self, group: &str) -> bool {
        if self.groups.iter().any(|g| g == group) {
            return true;
        }
        let address = self.address.to_ascii_lowercase();
        GROUP_KEYWORDS
            .iter()
            .any(|(name, keyword)| *name == group && address.contains(keyword))
    }
}

/// Email channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmailConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// Mail relay endpoint.
    pub relay_url: String,
    /// Bearer token for the relay.
    pub api_key: Option<String>,
    /// Sender address.
    pub from_address: String,
    /// Known recipients.
    pub recipients: Vec<EmailRecipient>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            relay_url: String::new(),
            api_key: None,
            from_address: "error-monitor@example.com".to_string(),
            recipients: Vec::new(),
            timeout_secs: 8,
        }
    }
}

impl EmailConfig {
    /// Resolve a channel target (`all`, `dev-team`, `ops-team`, ...) to
    /// addresses.
    ///
    /// A built-in group resolves to its members, possibly none. Any other
    /// target with no members falls back to everyone.
    pub fn recipients_for(&self, target: &str) -> Vec<String> {
        let everyone = || -> Vec<String> {
            self.recipients.iter().map(|r| r.address.clone()).collect()
        };
        if target == ALL_RECIPIENTS {
            return everyone();
        }

        let members: Vec<String> = self
            .recipients
            .iter()
            .filter(|r| r.in_group(target))
            .map(|r| r.address.clone())
            .collect();
        let built_in = GROUP_KEYWORDS.iter().any(|(name, _)| *name == target);
        if members.is_empty() && !built_in {
            debug!("Email group {} is unknown, sending to all recipients", target);
            everyone()
        } else {
            members
        }
    }
}

/// Email notification channel.
pub struct EmailChannel {
    config: EmailConfig,
    client: Client,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Self {
        let client = build_client(config.timeout_secs);
        Self { config, client }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
            && !self.config.relay_url.is_empty()
            && !self.config.from_address.is_empty()
            && !self.config.recipients.is_empty()
    }

    async fn deliver(
        &self,
        channel: &Channel,
        notification: &Notification,
    ) -> Result<DeliveryReceipt> {
        if self.config.relay_url.is_empty() {
            return Err(Error::config("Email relay URL not configured"));
        }
        let recipients = self.config.recipients_for(&channel.target);
        if recipients.is_empty() {
            return Err(Error::config(format!(
                "No email recipients for target {}",
                channel.target
            )));
        }

        let message = format_email_message(notification);
        let payload = json!({
            "from": self.config.from_address,
            "to": recipients,
            "subject": message.subject,
            "html": message.html,
            "text": message.text,
        });

        let mut request = self.client.post(&self.config.relay_url).json(&payload);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .map_err(|e| request_error(ChannelKind::Email, e))?;
        let response = check_response(ChannelKind::Email, response).await?;

        // Relays differ in how (and whether) they report an id.
        let body: Value = response.json().await.unwrap_or_default();
        let message_id = ["message_id", "messageId", "id"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_str))
            .map(str::to_string);

        debug!(
            "Email notification {} sent to {} recipients ({})",
            notification.id,
            recipients.len(),
            channel.target
        );
        Ok(DeliveryReceipt {
            message_id,
            recipients: Some(recipients.len()),
        })
    }
}
