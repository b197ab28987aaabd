//! Typed stream events

use crate::transcript::{Attachment, Citation, NodeTrace, RunStatus, ThoughtStep, ToolInvocation};
use thiserror::Error;

/// Identifiers carried by most payloads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventMeta {
    pub task_id: Option<String>,
    pub message_id: Option<String>,
    pub conversation_id: Option<String>,
}

/// One agent thought as delivered by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThoughtPayload {
    pub id: String,
    pub position: u32,
    pub text: String,
    pub tool: Option<ToolInvocation>,
    pub file_ids: Vec<String>,
}

impl ThoughtPayload {
    pub fn into_step(self) -> ThoughtStep {
        ThoughtStep {
            id: self.id,
            position: self.position,
            text: self.text,
            tool: self.tool,
            file_ids: self.file_ids,
            attachments: Vec::new(),
            finished: false,
        }
    }
}

/// Provenance for a curated reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationReply {
    pub id: String,
    pub author_name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MessageEndMetadata {
    pub citations: Vec<Citation>,
    pub annotation_reply: Option<AnnotationReply>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// The connection failed or ended abnormally
    Transport,
    /// A payload could not be parsed
    Decode,
    /// The backend reported an error
    Server,
}

/// Terminal failure of a response stream
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct StreamError {
    pub kind: StreamErrorKind,
    pub message: String,
    pub code: Option<String>,
}

impl StreamError {
    pub fn new(kind: StreamErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Transport, message)
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(StreamErrorKind::Decode, message)
    }

    pub fn server(message: impl Into<String>, code: Option<String>) -> Self {
        Self {
            code,
            ..Self::new(StreamErrorKind::Server, message)
        }
    }
}

/// Closed vocabulary of events the reconciliation engine consumes
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A chunk of answer text
    TextDelta { text: String, meta: EventMeta },
    /// An agent step was created or updated
    Thought {
        thought: ThoughtPayload,
        meta: EventMeta,
    },
    /// A file produced by the assistant
    File { file: Attachment, meta: EventMeta },
    /// The answer is complete; `message_id` is authoritative
    MessageEnd {
        message_id: String,
        metadata: MessageEndMetadata,
        meta: EventMeta,
    },
    /// Content of `target_id` was rewritten (moderation)
    MessageReplace {
        target_id: String,
        content: String,
        meta: EventMeta,
    },
    WorkflowStarted {
        workflow_run_id: String,
        meta: EventMeta,
    },
    WorkflowFinished { status: RunStatus, meta: EventMeta },
    NodeStarted { node: NodeTrace, meta: EventMeta },
    NodeFinished { node: NodeTrace, meta: EventMeta },
    /// Keep-alive
    Ping,
    /// Known-but-unused event kinds (text-to-speech audio and similar)
    Ignored { kind: String },
    /// Terminal failure; nothing follows it
    Error(StreamError),
    /// The stream ended without error
    Completed,
}

impl StreamEvent {
    pub fn meta(&self) -> Option<&EventMeta> {
        match self {
            StreamEvent::TextDelta { meta, .. }
            | StreamEvent::Thought { meta, .. }
            | StreamEvent::File { meta, .. }
            | StreamEvent::MessageEnd { meta, .. }
            | StreamEvent::MessageReplace { meta, .. }
            | StreamEvent::WorkflowStarted { meta, .. }
            | StreamEvent::WorkflowFinished { meta, .. }
            | StreamEvent::NodeStarted { meta, .. }
            | StreamEvent::NodeFinished { meta, .. } => Some(meta),
            StreamEvent::Ping
            | StreamEvent::Ignored { .. }
            | StreamEvent::Error(_)
            | StreamEvent::Completed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamEvent::Error(_) | StreamEvent::Completed)
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            StreamEvent::TextDelta { .. } => "text_delta",
            StreamEvent::Thought { .. } => "thought",
            StreamEvent::File { .. } => "file",
            StreamEvent::MessageEnd { .. } => "message_end",
            StreamEvent::MessageReplace { .. } => "message_replace",
            StreamEvent::WorkflowStarted { .. } => "workflow_started",
            StreamEvent::WorkflowFinished { .. } => "workflow_finished",
            StreamEvent::NodeStarted { .. } => "node_started",
            StreamEvent::NodeFinished { .. } => "node_finished",
            StreamEvent::Ping => "ping",
            StreamEvent::Ignored { .. } => "ignored",
            StreamEvent::Error(_) => "error",
            StreamEvent::Completed => "completed",
        }
    }
}
