use serde_json::{Value, json};

use super::{priority_color, priority_emoji, truncate};
use crate::notification::events::Notification;

/// Longest analysis text placed in a chat attachment.
pub const CHAT_ANALYSIS_LIMIT: usize = 1000;

/// Recommended actions listed in chat before the rest are dropped.
pub const CHAT_MAX_ACTIONS: usize = 5;

const ANALYSIS_COLOR: &str = "#0066CC";
const ACTIONS_COLOR: &str = "#00AA00";

/// Build a chat message with attachments.
pub fn format_chat_message(notification: &Notification) -> Value {
    let error = &notification.error;
    let analysis = &notification.analysis;
    let priority = notification.priority;
    let emoji = priority_emoji(priority);

    let browser = error
        .user_agent()
        .and_then(|ua| ua.split_whitespace().next())
        .unwrap_or("Unknown");

    let mut alert = json!({
        "color": priority_color(priority),
        "title": format!("{emoji} {}", error.error_type),
        "fields": [
            { "title": "Error Message", "value": format!("```{}```", error.message), "short": false },
            { "title": "Priority", "value": priority.label(), "short": true },
            { "title": "Timestamp", "value": error.timestamp.to_rfc3339(), "short": true },
            { "title": "User Session", "value": error.session_id().unwrap_or("Unknown"), "short": true },
            { "title": "Browser", "value": browser, "short": true }
        ],
        "footer": "Error Monitoring System",
        "ts": notification.created_at.timestamp()
    });
    if let Some(url) = error.url() {
        alert["title_link"] = json!(url);
    }

    let mut attachments = vec![alert];

    if analysis.has_content() {
        attachments.push(json!({
            "color": ANALYSIS_COLOR,
            "title": "\u{1f916} AI Analysis Result",
            "text": truncate(&analysis.content, CHAT_ANALYSIS_LIMIT),
            "mrkdwn_in": ["text"]
        }));

        if !analysis.action_items.is_empty() {
            let actions = analysis
                .action_items
                .iter()
                .take(CHAT_MAX_ACTIONS)
                .enumerate()
                .map(|(i, item)| format!("{}. {} ({})", i + 1, item.text, item.priority))
                .collect::<Vec<_>>()
                .join("\n");
            attachments.push(json!({
                "color": ACTIONS_COLOR,
                "title": "\u{1f4cb} Recommended Actions",
                "text": actions,
                "mrkdwn_in": ["text"]
            }));
        }
    }

    json!({
        "text": format!("{emoji} Error Detection Alert"),
        "attachments": attachments
    })
}
