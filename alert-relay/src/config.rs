//! Application configuration.
//!
//! Settings come from an optional TOML file, then secrets from the
//! environment (a `.env` file is loaded first if present).

use std::path::Path;

use alert_dispatch::notification::DispatcherConfig;
use alert_dispatch::notification::channels::{ChannelConfig, SlackConfig, TeamsConfig};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const SLACK_BOT_TOKEN: &str = "SLACK_BOT_TOKEN";
pub const TEAMS_WEBHOOK_URL: &str = "TEAMS_WEBHOOK_URL";
pub const MAIL_RELAY_API_KEY: &str = "MAIL_RELAY_API_KEY";
pub const SMS_AUTH_TOKEN: &str = "SMS_AUTH_TOKEN";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Log filter directive, used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
    pub dispatcher: DispatcherConfig,
}

impl AppConfig {
    /// Load from `path` (defaults when `None`), then apply environment
    /// overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                Self::from_toml(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok().filter(|v| !v.is_empty()));
        config.dispatcher.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Fill channel secrets from the environment.
    ///
    /// Chat and team chat need nothing but their secret, so they are added
    /// when the variable is set and the file does not configure them.
    /// Email and SMS need recipients and are only ever updated.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let channels = &mut self.dispatcher.channels;

        if let Some(token) = lookup(SLACK_BOT_TOKEN) {
            let mut found = false;
            for channel in channels.iter_mut() {
                if let ChannelConfig::Slack(c) = channel {
                    c.bot_token = token.clone();
                    found = true;
                }
            }
            if !found {
                debug!("Enabling Slack channel from {}", SLACK_BOT_TOKEN);
                channels.push(ChannelConfig::Slack(SlackConfig {
                    enabled: true,
                    bot_token: token,
                    ..Default::default()
                }));
            }
        }

        if let Some(url) = lookup(TEAMS_WEBHOOK_URL) {
            let mut found = false;
            for channel in channels.iter_mut() {
                if let ChannelConfig::Teams(c) = channel {
                    c.webhook_url = url.clone();
                    found = true;
                }
            }
            if !found {
                debug!("Enabling Teams channel from {}", TEAMS_WEBHOOK_URL);
                channels.push(ChannelConfig::Teams(TeamsConfig {
                    enabled: true,
                    webhook_url: url,
                    ..Default::default()
                }));
            }
        }

        if let Some(key) = lookup(MAIL_RELAY_API_KEY) {
            for channel in channels.iter_mut() {
                if let ChannelConfig::Email(c) = channel {
                    c.api_key = Some(key.clone());
                }
            }
        }

        if let Some(token) = lookup(SMS_AUTH_TOKEN) {
            for channel in channels.iter_mut() {
                if let ChannelConfig::Sms(c) = channel {
                    c.auth_token = token.clone();
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use alert_dispatch::notification::ChannelKind;

    use super::*;

    const SAMPLE: &str = r#"
log_filter = "alert_dispatch=debug"

[dispatcher]
max_retry_attempts = 5
retry_base_delay_secs = 10

[dispatcher.rate_limits.sms]
calls = 3
window_secs = 60

[[dispatcher.channels]]
type = "email"
enabled = true
relay_url = "https://mail.example.com/send"
recipients = [
    { address = "dev@example.com", groups = ["dev-team"] },
]

[[dispatcher.channels]]
type = "sms"
enabled = true
account_sid = "AC123"
from_number = "+15550000"
recipients = [{ number = "+15551234", groups = ["oncall"] }]
"#;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_parse_toml() {
        let config = AppConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.log_filter.as_deref(), Some("alert_dispatch=debug"));
        assert_eq!(config.dispatcher.max_retry_attempts, 5);
        assert_eq!(config.dispatcher.retry_base_delay_secs, 10);
        // Unset fields keep their defaults.
        assert_eq!(config.dispatcher.max_queue_size, 1000);
        assert_eq!(config.dispatcher.rate_limits.sms.calls, 3);
        assert_eq!(config.dispatcher.rate_limits.chat.calls, 50);
        assert_eq!(config.dispatcher.channels.len(), 2);
        assert!(config.dispatcher.validate().is_ok());
    }

    #[test]
    fn test_env_fills_secrets() {
        let mut config = AppConfig::from_toml(SAMPLE).unwrap();
        config.apply_env(env(&[
            (MAIL_RELAY_API_KEY, "mail-key"),
            (SMS_AUTH_TOKEN, "sms-token"),
        ]));

        for channel in &config.dispatcher.channels {
            match channel {
                ChannelConfig::Email(c) => assert_eq!(c.api_key.as_deref(), Some("mail-key")),
                ChannelConfig::Sms(c) => assert_eq!(c.auth_token, "sms-token"),
                other => panic!("unexpected channel {:?}", other.kind()),
            }
        }
    }

    #[test]
    fn test_env_adds_chat_channels() {
        let mut config = AppConfig::default();
        config.apply_env(env(&[
            (SLACK_BOT_TOKEN, "xoxb-1"),
            (TEAMS_WEBHOOK_URL, "https://example.com/hook"),
            (SMS_AUTH_TOKEN, "ignored"),
        ]));

        let kinds: Vec<_> = config
            .dispatcher
            .channels
            .iter()
            .map(ChannelConfig::kind)
            .collect();
        assert_eq!(kinds, vec![ChannelKind::Chat, ChannelKind::TeamChat]);
        assert!(config.dispatcher.channels.iter().all(ChannelConfig::is_enabled));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(AppConfig::from_toml("dispatcher = 3").is_err());
    }
}
