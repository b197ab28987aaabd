//! Backend error types

use thiserror::Error;

/// Backend call error with classification
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClientError {
    pub kind: ClientErrorKind,
    pub message: String,
}

impl ClientError {
    pub fn new(kind: ClientErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Network, message)
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Auth, message)
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::InvalidRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::NotFound, message)
    }

    pub fn server_error(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::ServerError, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Decode, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ClientErrorKind::Unknown, message)
    }

    /// Classify a non-success HTTP status
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = error_message(body).unwrap_or_else(|| format!("HTTP {status}"));
        match status {
            401 | 403 => Self::auth(message),
            404 => Self::not_found(message),
            400 | 409 | 413 | 415 | 422 => Self::invalid_request(message),
            500..=599 => Self::server_error(message),
            _ => Self::unknown(message),
        }
    }
}

/// Pull `message` out of a JSON error body, if there is one
fn error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("message")
        .and_then(serde_json::Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_owned)
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::decode(e.to_string())
        } else if let Some(status) = e.status() {
            Self::from_status(status.as_u16(), "")
        } else {
            Self::network(e.to_string())
        }
    }
}

/// Error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientErrorKind {
    /// Connection failures, timeouts
    Network,
    /// Bad or missing API key (401, 403)
    Auth,
    /// Rejected request (400)
    InvalidRequest,
    /// Unknown conversation or message (404)
    NotFound,
    /// Backend failure (5xx)
    ServerError,
    /// Response body did not match the expected shape
    Decode,
    Unknown,
}
