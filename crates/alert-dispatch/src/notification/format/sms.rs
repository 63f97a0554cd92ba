use super::{priority_emoji, truncate};
use crate::notification::events::Notification;

/// Single-segment SMS length.
pub const SMS_MESSAGE_LIMIT: usize = 160;

const SMS_ERROR_EXCERPT: usize = 100;

/// Build the SMS body, truncated to [`SMS_MESSAGE_LIMIT`] characters.
pub fn format_sms_message(notification: &Notification) -> String {
    let error = &notification.error;
    let excerpt: String = error.message.chars().take(SMS_ERROR_EXCERPT).collect();
    let text = format!(
        "{} {} Error Alert\n{}: {}\nTime: {}\nCheck dashboard for details.",
        priority_emoji(notification.priority),
        notification.priority.label(),
        error.error_type,
        excerpt,
        error.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
    );
    truncate(&text, SMS_MESSAGE_LIMIT)
}
