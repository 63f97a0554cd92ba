//! SMS channel using a Twilio-style messaging REST API.

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::http::{build_client, check_response, request_error};
use super::{DeliveryReceipt, NotificationChannel};
use crate::notification::events::Notification;
use crate::notification::format::format_sms_message;
use crate::notification::routing::{Channel, ChannelKind};
use crate::{Error, Result};

/// Target that pages every configured number.
pub const EMERGENCY_GROUP: &str = "emergency";

/// Built-in groups and the fragment that places a number entry in them,
/// for entries written like `oncall:+15550001`.
const GROUP_KEYWORDS: &[(&str, &str)] = &[("oncall", "oncall"), ("leads", "lead")];

/// A phone number and the groups it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsRecipient {
    pub number: String,
    #[serde(default)]
    pub groups: Vec<String>,
}

impl SmsRecipient {
    /// Listed in `groups`, or for a built-in group, a number entry
    /// containing the group keyword.
    pub fn in_group(&self, group: &str) -> bool {
        group == EMERGENCY_GROUP
            || self.groups.iter().any(|g| g == group)
            || GROUP_KEYWORDS
                .iter()
                .any(|(name, keyword)| *name == group && self.number.contains(keyword))
    }

    /// The dialable part of the entry, without any `group:` prefix.
    pub fn dial_number(&self) -> &str {
        self.number
            .rsplit_once(':')
            .map_or(self.number.as_str(), |(_, number)| number)
            .trim()
    }
}

/// SMS channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmsConfig {
    /// Whether the channel is enabled.
    pub enabled: bool,
    /// REST API base URL.
    pub api_base_url: String,
    /// Account identifier (basic-auth user).
    pub account_sid: String,
    /// Auth token (basic-auth password).
    pub auth_token: String,
    /// Sender number.
    pub from_number: String,
    /// Known recipients.
    pub recipients: Vec<SmsRecipient>,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for SmsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base_url: "https://api.twilio.com/2010-04-01".to_string(),
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            recipients: Vec::new(),
            timeout_secs: 8,
        }
    }
}

impl SmsConfig {
    /// Resolve a target (`oncall`, `leads`, `emergency`) to numbers.
    /// Unknown groups resolve to nobody.
    pub fn recipients_for(&self, target: &str) -> Vec<String> {
        self.recipients
            .iter()
            .filter(|r| r.in_group(target))
            .map(|r| r.dial_number().to_string())
            .collect()
    }

    fn has_credentials(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty() && !self.from_number.is_empty()
    }
}

/// SMS notification channel.
pub struct SmsChannel {
    config: SmsConfig,
    client: Client,
}

impl SmsChannel {
    pub fn new(config: SmsConfig) -> Self {
        let client = build_client(config.timeout_secs);
        Self { config, client }
    }

    async fn send_one(&self, to: &str, body: &str) -> Result<Option<String>> {
        let url = format!(
            "{}/Accounts/{}/Messages.json",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.account_sid
        );
        let params = [
            ("To", to),
            ("From", self.config.from_number.as_str()),
            ("Body", body),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| request_error(ChannelKind::Sms, e))?;
        let response = check_response(ChannelKind::Sms, response).await?;
        let body: Value = response.json().await.unwrap_or_default();
        Ok(body.get("sid").and_then(Value::as_str).map(str::to_string))
    }
}

#[async_trait]
impl NotificationChannel for SmsChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Sms
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled && self.config.has_credentials() && !self.config.recipients.is_empty()
    }

    async fn deliver(
        &self,
        channel: &Channel,
        notification: &Notification,
    ) -> Result<DeliveryReceipt> {
        if !self.config.has_credentials() {
            return Err(Error::config("SMS credentials or sender number not configured"));
        }
        let recipients = self.config.recipients_for(&channel.target);
        if recipients.is_empty() {
            return Err(Error::config(format!(
                "No SMS recipients for target {}",
                channel.target
            )));
        }

        let body = format_sms_message(notification);
        // All numbers at once, so the whole fan-out costs one request timeout.
        let results = join_all(recipients.iter().map(|number| self.send_one(number, &body))).await;

        let mut delivered = 0;
        let mut first_id = None;
        let mut last_error = None;

        // The channel counts as delivered when anyone was paged.
        for (number, result) in recipients.iter().zip(results) {
            match result {
                Ok(id) => {
                    delivered += 1;
                    if first_id.is_none() {
                        first_id = id;
                    }
                }
                Err(e) => {
                    warn!("SMS to {} failed: {}", number, e);
                    last_error = Some(e);
                }
            }
        }

        if delivered == 0 {
            return Err(last_error
                .unwrap_or_else(|| Error::transport(ChannelKind::Sms.as_str(), "no recipient reached")));
        }

        debug!(
            "SMS notification {} sent to {}/{} recipients",
            notification.id,
            delivered,
            recipients.len()
        );
        Ok(DeliveryReceipt {
            message_id: first_id,
            recipients: Some(delivered),
        })
    }
}
