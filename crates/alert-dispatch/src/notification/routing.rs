//! Priority to channel routing table.

use serde::{Deserialize, Serialize};

use super::events::Priority;

/// Delivery transport family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Chat workspace (Slack-style channels such as `#errors`).
    Chat,
    /// Team messaging connector (Teams-style cards).
    TeamChat,
    /// Email to a recipient group.
    Email,
    /// Text message to a phone group.
    Sms,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 4] = [
        ChannelKind::Chat,
        ChannelKind::TeamChat,
        ChannelKind::Email,
        ChannelKind::Sms,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::TeamChat => "team_chat",
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }
}

impl std::fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A delivery destination for one notification.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Channel {
    pub kind: ChannelKind,
    pub target: String,
    pub immediate: bool,
    #[serde(default)]
    pub batch: bool,
}

impl Channel {
    pub fn new(kind: ChannelKind, target: impl Into<String>, immediate: bool) -> Self {
        Self {
            kind,
            target: target.into(),
            immediate,
            batch: false,
        }
    }

    pub fn batched(mut self) -> Self {
        self.batch = true;
        self
    }
}

/// Channels for a priority, in delivery order.
pub fn select_channels(priority: Priority) -> Vec<Channel> {
    use ChannelKind::*;

    match priority {
        Priority::Critical => vec![
            Channel::new(Chat, "#critical-errors", true),
            Channel::new(TeamChat, "Critical Alerts", true),
            Channel::new(Email, "all", true),
            Channel::new(Sms, "oncall", true),
        ],
        Priority::High => vec![
            Channel::new(Chat, "#errors", true),
            Channel::new(TeamChat, "Error Notifications", false),
            Channel::new(Email, "dev-team", false),
        ],
        Priority::Medium => vec![
            Channel::new(Chat, "#errors", false),
            Channel::new(Email, "dev-team", false),
        ],
        Priority::Low => vec![Channel::new(Chat, "#errors", false).batched()],
    }
}
