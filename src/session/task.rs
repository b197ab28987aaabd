//! I/O requests emitted by the session

use crate::client::ChatRequest;
use crate::registry::Inputs;
use crate::transcript::Rating;

/// History fetch for one conversation. `ticket` pairs the result with the
/// request so superseded fetches can be dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchPlan {
    pub ticket: u64,
    pub conversation_id: String,
    pub epoch: u64,
    pub introduction: String,
    pub inputs: Inputs,
}

/// Work for the runtime; results come back through the session's
/// `*_loaded` / `*_submitted` methods
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    LoadAppParameters,
    /// Initial load (with the persisted current id) or a refresh
    LoadConversations { limit: u32, initial: bool },
    OpenStream { seq: u64, request: ChatRequest },
    FetchHistory(FetchPlan),
    Rename {
        conversation_id: String,
        summary: String,
    },
    Delete { conversation_id: String },
    SubmitFeedback {
        message_id: String,
        rating: Option<Rating>,
    },
    PersistCurrent { conversation_id: String },
}

impl Task {
    pub fn name(&self) -> &'static str {
        match self {
            Task::LoadAppParameters => "load_app_parameters",
            Task::LoadConversations { .. } => "load_conversations",
            Task::OpenStream { .. } => "open_stream",
            Task::FetchHistory(_) => "fetch_history",
            Task::Rename { .. } => "rename",
            Task::Delete { .. } => "delete",
            Task::SubmitFeedback { .. } => "submit_feedback",
            Task::PersistCurrent { .. } => "persist_current",
        }
    }
}
