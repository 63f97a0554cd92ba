//! Error alert notification module.
//!
//! Turns an error report plus its analysis into a prioritized notification
//! and fans it out to chat, team chat, email and SMS.
//!
//! # Features
//!
//! - Keyword and analysis based priority
//! - Priority to channel routing table
//! - Per-channel message formatting with length limits
//! - Sliding-window rate limits per channel kind
//! - Retry with exponential backoff
//! - Dead letter list for deliveries that exhausted their retries
//!
//! # Example
//!
//! ```ignore
//! use alert_dispatch::notification::{DispatcherConfig, NotificationDispatcher};
//! use alert_dispatch::notification::channels::{ChannelConfig, SlackConfig};
//!
//! let config = DispatcherConfig {
//!     channels: vec![ChannelConfig::Slack(SlackConfig {
//!         enabled: true,
//!         bot_token: "xoxb-...".to_string(),
//!         ..Default::default()
//!     })],
//!     ..Default::default()
//! };
//!
//! let dispatcher = Arc::new(NotificationDispatcher::with_config(config));
//! let worker = dispatcher.spawn_retry_worker();
//! let report = dispatcher.dispatch(error, analysis).await?;
//! ```

pub mod channels;
pub mod events;
pub mod format;
pub mod priority;
pub mod rate_limit;
pub mod retry;
pub mod routing;
pub mod service;

pub use channels::{ChannelConfig, DeliveryReceipt, NotificationChannel};
pub use events::{ActionItem, AnalysisResult, ErrorContext, ErrorEvent, Notification, Priority};
pub use priority::determine_priority;
pub use rate_limit::{RateLimit, RateLimitConfig, RateLimiter};
pub use retry::{DeadLetter, FailureRecord, RetryDecision, RetryEntry, RetryPolicy, RetryQueue};
pub use routing::{Channel, ChannelKind, select_channels};
pub use service::{
    DeliveryOutcome, DeliveryReport, DispatchEvent, DispatchReport, DispatcherConfig,
    NotificationDispatcher, NotificationStats, RetrySweepSummary,
};
