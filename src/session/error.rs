//! Rejections and user-facing notifications

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("The app is not ready yet")]
    NotReady,
    #[error("Please wait for the response to the previous message to complete.")]
    Busy,
    /// History of the current conversation has not arrived yet
    #[error("Please wait for the conversation to finish loading.")]
    Loading,
    #[error("Message cannot be empty")]
    EmptyMessage,
    #[error("Variable value can not be empty: {}", .0.join(", "))]
    MissingInputs(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedbackError {
    #[error("Message not found: {0}")]
    UnknownMessage(String),
    #[error("Only answers can be rated")]
    NotAnAnswer(String),
    #[error("Opening statements cannot be rated")]
    OpeningStatement(String),
    #[error("The answer is still streaming")]
    Streaming(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            message: message.into(),
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            message: message.into(),
        }
    }
}
