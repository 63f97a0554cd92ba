//! Shared HTTP plumbing for the channel adapters.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::warn;

use crate::notification::routing::ChannelKind;
use crate::{Error, Result};

pub(crate) fn build_client(timeout_secs: u64) -> Client {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs.max(1)))
        .build()
        .unwrap_or_default()
}

pub(crate) fn request_error(kind: ChannelKind, err: reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::transport(kind.as_str(), format!("request timed out: {err}"))
    } else {
        Error::transport(kind.as_str(), format!("request failed: {err}"))
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
///
/// 429 is a rate limit, 401/403/404 are configuration problems, everything
/// else is a retryable transport failure.
pub(crate) fn status_error(kind: ChannelKind, status: StatusCode, body: &str) -> Error {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Error::rate_limited(kind.as_str()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
            Error::config(format!("{kind} rejected credentials or endpoint: {status}"))
        }
        _ => Error::transport(kind.as_str(), format!("{status} - {body}")),
    }
}

/// Pass successful responses through, turn the rest into [`status_error`].
pub(crate) async fn check_response(kind: ChannelKind, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("{} request failed: {} - {}", kind, status, body);
    Err(status_error(kind, status, &body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_error_classification() {
        let cases = [
            (StatusCode::TOO_MANY_REQUESTS, true),
            (StatusCode::UNAUTHORIZED, false),
            (StatusCode::FORBIDDEN, false),
            (StatusCode::NOT_FOUND, false),
            (StatusCode::INTERNAL_SERVER_ERROR, true),
            (StatusCode::BAD_GATEWAY, true),
            (StatusCode::SERVICE_UNAVAILABLE, true),
        ];
        for (status, retryable) in cases {
            let err = status_error(ChannelKind::Email, status, "upstream said no");
            assert_eq!(err.is_retryable(), retryable, "{status}");
        }

        assert!(matches!(
            status_error(ChannelKind::Sms, StatusCode::TOO_MANY_REQUESTS, ""),
            Error::RateLimited { .. }
        ));
        assert!(matches!(
            status_error(ChannelKind::Sms, StatusCode::FORBIDDEN, ""),
            Error::Configuration(_)
        ));
        match status_error(ChannelKind::Sms, StatusCode::SERVICE_UNAVAILABLE, "maintenance") {
            Error::Transport { channel, message } => {
                assert_eq!(channel, "sms");
                assert!(message.contains("503"));
                assert!(message.contains("maintenance"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
