use std::fmt::Write;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::notification::events::{Notification, Priority};

/// Rendered email parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmailMessage {
    pub subject: String,
    pub html: String,
    pub text: String,
}

static HEADING: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^### (.*)$").unwrap());
static CODE_BLOCK: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)```(.*?)```").unwrap());
static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.*?)\*").unwrap());

fn header_color(priority: Priority) -> &'static str {
    match priority {
        Priority::Critical => "#DC3545",
        Priority::High => "#FD7E14",
        Priority::Medium => "#FFC107",
        Priority::Low => "#28A745",
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Render the small markdown subset analysis text uses into HTML.
///
/// Input is escaped first, so only the markup produced here reaches the
/// document.
pub fn markdown_to_html(content: &str) -> String {
    let escaped = escape_html(content);
    let html = CODE_BLOCK.replace_all(
        &escaped,
        r#"<pre style="background-color: #f8f9fa; padding: 10px; border-radius: 4px;">$1</pre>"#,
    );
    let html = HEADING.replace_all(&html, "<h4>$1</h4>");
    let html = BOLD.replace_all(&html, "<strong>$1</strong>");
    let html = ITALIC.replace_all(&html, "<em>$1</em>");
    html.replace('\n', "<br>")
}

/// Build subject, HTML and plain-text bodies.
pub fn format_email_message(notification: &Notification) -> EmailMessage {
    let error = &notification.error;
    let analysis = &notification.analysis;
    let priority = notification.priority;
    let color = header_color(priority);
    let generated_at = notification.created_at.to_rfc3339();

    let subject = format!("[{}] Error Alert: {}", priority.label(), error.error_type);

    let mut html = String::new();
    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html>
<head>
  <style>
    body {{ font-family: Arial, sans-serif; line-height: 1.6; color: #333; }}
    .header {{ background-color: {color}; color: white; padding: 20px; }}
    .content {{ padding: 20px; }}
    .error-details {{ background-color: #f4f4f4; padding: 15px; border-left: 4px solid {color}; }}
    .analysis {{ background-color: #e8f4f8; padding: 15px; margin-top: 20px; }}
    .footer {{ background-color: #f8f8f8; padding: 10px; text-align: center; font-size: 12px; }}
    th, td {{ padding: 8px; text-align: left; border-bottom: 1px solid #ddd; }}
  </style>
</head>
<body>
  <div class="header">
    <h1>Error Detection Alert</h1>
    <h2>Priority: {label}</h2>
  </div>
  <div class="content">
    <div class="error-details">
      <h3>Error Details</h3>
      <table>
        <tr><th>Type</th><td>{error_type}</td></tr>
        <tr><th>Message</th><td>{message}</td></tr>
        <tr><th>Timestamp</th><td>{timestamp}</td></tr>
        <tr><th>URL</th><td>{url}</td></tr>
        <tr><th>Session ID</th><td>{session}</td></tr>
        <tr><th>User Agent</th><td>{user_agent}</td></tr>
      </table>
"#,
        label = priority.label(),
        error_type = escape_html(&error.error_type),
        message = escape_html(&error.message),
        timestamp = error.timestamp.to_rfc3339(),
        url = escape_html(error.url().unwrap_or("N/A")),
        session = escape_html(error.session_id().unwrap_or("Unknown")),
        user_agent = escape_html(error.user_agent().unwrap_or("N/A")),
    );
    if let Some(stack) = &error.stack {
        let _ = write!(
            html,
            "      <h4>Stack Trace</h4>\n      <pre style=\"background-color: #fff; padding: 10px; overflow-x: auto;\">{}</pre>\n",
            escape_html(stack)
        );
    }
    html.push_str("    </div>\n");

    if analysis.has_content() {
        let _ = write!(
            html,
            "    <div class=\"analysis\">\n      <h3>AI Analysis Result</h3>\n      <div>{}</div>\n",
            markdown_to_html(&analysis.content)
        );
        if !analysis.action_items.is_empty() {
            html.push_str("      <h4>Recommended Actions</h4>\n      <ol>\n");
            for item in &analysis.action_items {
                let _ = writeln!(
                    html,
                    "        <li><strong>{}</strong> (Priority: {}, Estimated Time: {})</li>",
                    escape_html(&item.text),
                    escape_html(&item.priority),
                    escape_html(&item.estimated_time)
                );
            }
            html.push_str("      </ol>\n");
        }
        html.push_str("    </div>\n");
    }

    let _ = write!(
        html,
        r#"  </div>
  <div class="footer">
    <p>This message was sent by the Error Monitoring System</p>
    <p>Generated at: {generated_at}</p>
  </div>
</body>
</html>
"#
    );

    let mut text = String::new();
    let _ = write!(
        text,
        "ERROR ALERT - {}\n\nError Details:\n- Type: {}\n- Message: {}\n- Timestamp: {}\n- URL: {}\n- Session ID: {}\n",
        priority.label(),
        error.error_type,
        error.message,
        error.timestamp.to_rfc3339(),
        error.url().unwrap_or("N/A"),
        error.session_id().unwrap_or("Unknown"),
    );
    if analysis.has_content() {
        let _ = write!(text, "\nAI Analysis:\n{}\n\nRecommended Actions:\n", analysis.content);
        if analysis.action_items.is_empty() {
            text.push_str("No actions available\n");
        }
        for (i, item) in analysis.action_items.iter().enumerate() {
            let _ = writeln!(text, "{}. {} ({})", i + 1, item.text, item.priority);
        }
    }
    let _ = write!(
        text,
        "\n--\nError Monitoring System\nGenerated at: {generated_at}\n"
    );

    EmailMessage {
        subject,
        html,
        text,
    }
}
