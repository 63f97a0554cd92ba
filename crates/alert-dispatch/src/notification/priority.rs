//! Priority derivation.
//!
//! Precedence: the analysis' explicit priority, then the error's explicit
//! priority, then a keyword scan of the error message. A message carrying a
//! critical keyword is always critical; explicit priorities may raise but
//! never lower that.

use super::events::{AnalysisResult, ErrorEvent, Priority};

pub const CRITICAL_KEYWORDS: &[&str] = &["critical", "fatal", "crash"];
pub const HIGH_KEYWORDS: &[&str] = &["error", "exception", "failed"];
pub const MEDIUM_KEYWORDS: &[&str] = &["warning", "timeout"];

/// Classify a message by keyword alone.
pub fn priority_from_message(message: &str) -> Priority {
    let message = message.to_lowercase();
    let contains_any = |keywords: &[&str]| keywords.iter().any(|k| message.contains(k));

    if contains_any(CRITICAL_KEYWORDS) {
        Priority::Critical
    } else if contains_any(HIGH_KEYWORDS) {
        Priority::High
    } else if contains_any(MEDIUM_KEYWORDS) {
        Priority::Medium
    } else {
        Priority::Low
    }
}

/// Derive the priority of an alert.
pub fn determine_priority(error: &ErrorEvent, analysis: &AnalysisResult) -> Priority {
    let from_message = priority_from_message(&error.message);
    if from_message == Priority::Critical {
        return Priority::Critical;
    }

    analysis
        .priority
        .or(error.priority)
        .unwrap_or(from_message)
}
