use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the Ufanet client.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("client is closed")]
    Closed,
    #[error("client connector error: {0}")]
    ClientConnector(String),
    #[error("request timed out after {}", human(.0))]
    Timeout(Duration),
    #[error("unauthorized")]
    Unauthorized,
    #[error("unknown error: {} {reason}: {detail}", .status.as_u16())]
    Unknown {
        status: StatusCode,
        reason: String,
        body: Option<Value>,
        detail: String,
    },
}

fn human(duration: &Duration) -> humantime::FormattedDuration {
    humantime::format_duration(*duration)
}

impl Error {
    pub fn unknown(status: StatusCode, body: Option<Value>, detail: impl Into<String>) -> Self {
        Error::Unknown {
            status,
            reason: status.canonical_reason().unwrap_or_default().to_string(),
            body,
            detail: detail.into(),
        }
    }

    /// Short stable name used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "InvalidConfig",
            Error::Closed => "Closed",
            Error::ClientConnector(_) => "ClientConnectorError",
            Error::Timeout(_) => "TimeoutError",
            Error::Unauthorized => "UnauthorizedError",
            Error::Unknown { .. } => "UnknownError",
        }
    }

    /// Classifies a reqwest failure. `status` is the response status when
    /// the failure happened while reading an already received response.
    pub(crate) fn from_transport(
        err: reqwest::Error,
        timeout: Duration,
        status: Option<StatusCode>,
    ) -> Self {
        if err.is_timeout() {
            Error::Timeout(timeout)
        } else if err.is_connect() {
            Error::ClientConnector(err.to_string())
        } else {
            let status = status
                .or_else(|| err.status())
                .unwrap_or(StatusCode::BAD_GATEWAY);
            Error::unknown(status, None, err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_carries_reason_phrase() {
        let err = Error::unknown(StatusCode::FORBIDDEN, None, "denied");
        match &err {
            Error::Unknown { status, reason, .. } => {
                assert_eq!(*status, StatusCode::FORBIDDEN);
                assert_eq!(reason, "Forbidden");
            }
            other => panic!("unexpected variant {other:?}"),
        }
        assert_eq!(err.to_string(), "unknown error: 403 Forbidden: denied");
    }

    fn builder_error() -> reqwest::Error {
        reqwest::Client::new()
            .get("not a url")
            .build()
            .unwrap_err()
    }

    #[test]
    fn transport_failure_keeps_received_status() {
        let err = Error::from_transport(builder_error(), Duration::from_secs(1), Some(StatusCode::OK));
        assert!(matches!(err, Error::Unknown { status, .. } if status == StatusCode::OK));
    }

    #[test]
    fn transport_failure_without_response_is_bad_gateway() {
        let err = Error::from_transport(builder_error(), Duration::from_secs(1), None);
        assert!(matches!(err, Error::Unknown { status, .. } if status == StatusCode::BAD_GATEWAY));
    }

    #[test]
    fn timeout_display_uses_human_duration() {
        let err = Error::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "request timed out after 30s");
        assert_eq!(err.kind(), "TimeoutError");
    }
}
