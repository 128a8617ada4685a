use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;

use crate::gateway::frame::FrameError;

// ---------------------------------------------------------------------------
// REST errors
// ---------------------------------------------------------------------------

/// Error body returned by the backend on failed requests.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// A failed REST call, as surfaced to commands and push-triggered refetches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// HTTP status, absent when the request never got a response.
    pub status: Option<StatusCode>,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: Some(StatusCode::UNAUTHORIZED),
            code: "UNAUTHORIZED".to_string(),
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: Some(StatusCode::FORBIDDEN),
            code: "FORBIDDEN".to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: Some(StatusCode::NOT_FOUND),
            code: "NOT_FOUND".to_string(),
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: "TRANSPORT_ERROR".to_string(),
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            status: None,
            code: "DECODE_ERROR".to_string(),
            message: message.into(),
        }
    }

    /// Build an error from a non-success response, preferring the backend's
    /// own message when the body carries one.
    pub fn from_response(status: StatusCode, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message.or(b.error))
            .unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            });

        match status {
            StatusCode::UNAUTHORIZED => Self::unauthorized(message),
            StatusCode::FORBIDDEN => Self::forbidden(message),
            StatusCode::NOT_FOUND => Self::not_found(message),
            _ => Self {
                status: Some(status),
                code: if status.is_server_error() {
                    "SERVER_ERROR".to_string()
                } else {
                    "REQUEST_FAILED".to_string()
                },
                message,
            },
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == Some(StatusCode::UNAUTHORIZED)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} ({}): {}", self.code, status.as_u16(), self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            tracing::warn!(?err, "response decode error");
            Self::decode("Unexpected response body")
        } else {
            tracing::warn!(?err, "http transport error");
            Self::transport(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Gateway errors
// ---------------------------------------------------------------------------

/// Reasons a gateway connection attempt failed or a live connection ended.
///
/// These are reported through the channel's error callback and never returned
/// from `connect`; every variant is recovered by the reconnect loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The transport link could not be opened.
    Connect(String),
    /// The server answered the handshake with something other than CONNECTED.
    Handshake(String),
    /// The server sent an ERROR frame.
    Rejected(String),
    /// No handshake reply within the configured timeout.
    Timeout,
    /// No inbound traffic within the negotiated heartbeat window.
    HeartbeatTimeout,
    /// The link closed, with the peer's reason when one was given.
    Closed(Option<String>),
    /// An inbound frame could not be parsed.
    Frame(FrameError),
    /// A message body did not match its topic's payload type.
    Decode(String),
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(reason) => write!(f, "connect failed: {reason}"),
            Self::Handshake(reason) => write!(f, "handshake failed: {reason}"),
            Self::Rejected(reason) => write!(f, "server error: {reason}"),
            Self::Timeout => write!(f, "handshake timed out"),
            Self::HeartbeatTimeout => write!(f, "heartbeat timed out"),
            Self::Closed(Some(reason)) => write!(f, "connection closed: {reason}"),
            Self::Closed(None) => write!(f, "connection closed"),
            Self::Frame(err) => write!(f, "bad frame: {err}"),
            Self::Decode(reason) => write!(f, "bad payload: {reason}"),
        }
    }
}

impl std::error::Error for GatewayError {}

impl From<FrameError> for GatewayError {
    fn from(err: FrameError) -> Self {
        Self::Frame(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_response_prefers_backend_message() {
        let err = ApiError::from_response(
            StatusCode::FORBIDDEN,
            r#"{"message":"You don't have permission to update this task"}"#,
        );
        assert_eq!(err.code, "FORBIDDEN");
        assert_eq!(err.message, "You don't have permission to update this task");
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn from_response_falls_back_to_reason_phrase() {
        let err = ApiError::from_response(StatusCode::UNAUTHORIZED, "");
        assert!(err.is_unauthorized());
        assert_eq!(err.message, "Unauthorized");

        let err = ApiError::from_response(StatusCode::BAD_GATEWAY, "<html>");
        assert_eq!(err.code, "SERVER_ERROR");
        assert_eq!(err.status, Some(StatusCode::BAD_GATEWAY));
    }
}
