//! Input composer
//!
//! Holds the query being typed plus pending image attachments, and turns key
//! events into submissions. Enter submits; Shift+Enter inserts a newline;
//! Enter that confirms an IME composition does nothing.

use crate::transcript::Attachment;

/// An Enter press or release; other keys never reach the composer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub shift: bool,
    /// The platform reports an input-method composition in progress
    pub composing: bool,
}

impl KeyEvent {
    pub fn enter() -> Self {
        Self {
            shift: false,
            composing: false,
        }
    }
}

/// What the composer hands to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub query: String,
    pub files: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ComposeError {
    #[error("Message cannot be empty")]
    EmptyMessage,
}

#[derive(Debug, Default)]
pub struct Composer {
    query: String,
    files: Vec<Attachment>,
    composing: bool,
}

impl Composer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        self.query = query.into();
    }

    pub fn files(&self) -> &[Attachment] {
        &self.files
    }

    pub fn attach(&mut self, file: Attachment) {
        self.files.push(file);
    }

    pub fn key_down(&mut self, event: KeyEvent) {
        self.composing = event.composing;
        if !event.shift {
            if let Some(stripped) = self.query.strip_suffix('\n') {
                self.query = stripped.to_string();
            }
        }
    }

    /// Enter released: submit unless Shift is held or the key press belonged
    /// to a composition
    pub fn key_up(&mut self, event: KeyEvent) -> Option<Result<Submission, ComposeError>> {
        if event.shift || self.composing {
            return None;
        }
        Some(self.submit())
    }

    /// Build a submission without clearing; call [`Composer::accepted`] once
    /// the session took it so a rejected send keeps the text
    pub fn submit(&self) -> Result<Submission, ComposeError> {
        if self.query.trim().is_empty() {
            return Err(ComposeError::EmptyMessage);
        }
        Ok(Submission {
            query: self.query.clone(),
            files: self.files.clone(),
        })
    }

    pub fn accepted(&mut self) {
        self.query.clear();
        self.files.clear();
    }
}
