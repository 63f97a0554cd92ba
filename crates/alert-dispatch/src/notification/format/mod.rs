//! Per-channel message rendering.
//!
//! Every function here is pure: a [`Notification`](super::events::Notification)
//! goes in, the channel's native payload comes out.

mod chat;
mod email;
mod sms;
mod teams;

pub use chat::{CHAT_ANALYSIS_LIMIT, CHAT_MAX_ACTIONS, format_chat_message};
pub use email::{EmailMessage, format_email_message, markdown_to_html};
pub use sms::{SMS_MESSAGE_LIMIT, format_sms_message};
pub use teams::{TEAMS_ANALYSIS_LIMIT, format_teams_message};

use super::events::Priority;

/// Marker appended to truncated text.
pub const ELLIPSIS: &str = "...";

/// Cut `text` to at most `max_chars` characters, ending in [`ELLIPSIS`]
/// when anything was removed.
pub fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let marker_len = ELLIPSIS.chars().count();
    if max_chars <= marker_len {
        return text.chars().take(max_chars).collect();
    }
    let kept: String = text.chars().take(max_chars - marker_len).collect();
    format!("{kept}{ELLIPSIS}")
}

/// Accent color shared by the chat and team-chat renderings.
pub(crate) fn priority_color(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical => "#FF0000",
        Priority::High => "#FF6600",
        Priority::Medium => "#FFCC00",
        Priority::Low => "#00FF00",
    }
}

pub(crate) fn priority_emoji(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical => "\u{1f6a8}",       // 🚨
        Priority::High => "\u{26a0}\u{fe0f}",    // ⚠️
        Priority::Medium => "\u{26a1}",          // ⚡
        Priority::Low => "\u{2139}\u{fe0f}",     // ℹ️
    }
}
