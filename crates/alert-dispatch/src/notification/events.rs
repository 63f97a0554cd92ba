//! Alert inputs and the notification built from them.
//!
//! An [`ErrorEvent`] and its [`AnalysisResult`] arrive from an upstream
//! capture/analysis producer. The dispatcher derives a [`Priority`], picks
//! channels and freezes everything into a [`Notification`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::routing::Channel;

/// Label used when an error arrives without a type tag.
pub const DEFAULT_ERROR_TYPE: &str = "Application Error";

/// Priority level for notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Informational; batched on the cheapest channel.
    Low,
    /// Worth a look during working hours.
    Medium,
    /// Needs attention soon.
    High,
    /// Wake someone up.
    Critical,
}

impl Priority {
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Medium,
        Priority::Low,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Upper-case label used in message headers.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the error was observed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, alias = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, alias = "userAgent", skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

/// A captured application error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub message: String,
    #[serde(rename = "type", default = "default_error_type")]
    pub error_type: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,
    /// Priority asserted by the producer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

fn default_error_type() -> String {
    DEFAULT_ERROR_TYPE.to_string()
}

impl ErrorEvent {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            error_type: default_error_type(),
            timestamp: Utc::now(),
            stack: None,
            context: None,
            priority: None,
        }
    }

    pub fn with_type(mut self, error_type: impl Into<String>) -> Self {
        self.error_type = error_type.into();
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn url(&self) -> Option<&str> {
        self.context.as_ref().and_then(|c| c.url.as_deref())
    }

    pub fn session_id(&self) -> Option<&str> {
        self.context.as_ref().and_then(|c| c.session_id.as_deref())
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.context.as_ref().and_then(|c| c.user_agent.as_deref())
    }
}

/// A follow-up suggested by the analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionItem {
    pub text: String,
    #[serde(default = "default_action_priority")]
    pub priority: String,
    #[serde(default, alias = "estimatedTime")]
    pub estimated_time: String,
}

fn default_action_priority() -> String {
    "medium".to_string()
}

/// Output of the upstream analysis step. Treated as opaque text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub content: String,
    #[serde(default, alias = "actionItems")]
    pub action_items: Vec<ActionItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl AnalysisResult {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            action_items: Vec::new(),
            priority: None,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn with_action(
        mut self,
        text: impl Into<String>,
        priority: impl Into<String>,
        estimated_time: impl Into<String>,
    ) -> Self {
        self.action_items.push(ActionItem {
            text: text.into(),
            priority: priority.into(),
            estimated_time: estimated_time.into(),
        });
        self
    }

    pub fn has_content(&self) -> bool {
        !self.content.trim().is_empty()
    }
}

/// One alert, frozen at dispatch time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub error: ErrorEvent,
    pub analysis: AnalysisResult,
    pub priority: Priority,
    pub channels: Vec<Channel>,
}

impl Notification {
    pub fn new(
        error: ErrorEvent,
        analysis: AnalysisResult,
        priority: Priority,
        channels: Vec<Channel>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("notif_{}", Uuid::new_v4().simple()),
            created_at,
            error,
            analysis,
            priority,
            channels,
        }
    }
}
