use serde_json::{Value, json};

use super::{priority_color, truncate};
use crate::notification::events::Notification;

/// Longest analysis text placed in a team-chat card.
pub const TEAMS_ANALYSIS_LIMIT: usize = 800;

const DEFAULT_APP_URL: &str = "https://app.example.com";

/// Build a MessageCard for a team-chat connector.
///
/// `dashboard_url` is the base of the "View in Dashboard" link; the
/// notification id is appended as `/errors/<id>`.
pub fn format_teams_message(notification: &Notification, dashboard_url: &str) -> Value {
    let error = &notification.error;
    let analysis = &notification.analysis;
    let priority = notification.priority;

    let mut sections = vec![json!({
        "activityTitle": format!("\u{1f6a8} Error Detection Alert - {}", priority.label()),
        "activitySubtitle": error.timestamp.to_rfc3339(),
        "facts": [
            { "name": "Error Type", "value": error.error_type },
            { "name": "Message", "value": error.message },
            { "name": "URL", "value": error.url().unwrap_or("N/A") },
            { "name": "Session ID", "value": error.session_id().unwrap_or("Unknown") }
        ],
        "markdown": true
    })];

    if analysis.has_content() {
        sections.push(json!({
            "activityTitle": "\u{1f916} AI Analysis",
            "text": truncate(&analysis.content, TEAMS_ANALYSIS_LIMIT)
        }));
    }

    let dashboard = format!(
        "{}/errors/{}",
        dashboard_url.trim_end_matches('/'),
        notification.id
    );

    json!({
        "@type": "MessageCard",
        "@context": "https://schema.org/extensions",
        "summary": format!("Error Alert: {}", error.message),
        "themeColor": priority_color(priority),
        "sections": sections,
        "potentialAction": [
            {
                "@type": "OpenUri",
                "name": "View in Dashboard",
                "targets": [{ "os": "default", "uri": dashboard }]
            },
            {
                "@type": "OpenUri",
                "name": "View Application",
                "targets": [{ "os": "default", "uri": error.url().unwrap_or(DEFAULT_APP_URL) }]
            }
        ]
    })
}
