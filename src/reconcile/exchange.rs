//! Exchange accumulator

use crate::transcript::MessageEntry;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangePhase {
    /// Receiving content
    Streaming,
    /// `message_end` seen; only replacement, workflow status and the
    /// terminal event may follow
    Finalized,
    Completed,
    Failed,
}

impl ExchangePhase {
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// State of one in-flight request, from send to completion or error
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeContext {
    /// Runtime-assigned sequence number, used to route stream events
    pub seq: u64,
    /// Switch epoch at send time; the exchange owns the transcript only while
    /// this is still the session's epoch
    pub epoch: u64,
    /// Current conversation id when the exchange started (`"-1"` for a new one)
    pub owner_conversation_id: String,
    pub question: MessageEntry,
    pub placeholder_id: String,
    /// The answer being accumulated; published as a whole on every update
    pub answer: MessageEntry,
    pub agent_mode: bool,
    pub response_id_assigned: bool,
    /// First conversation id the backend reported for this exchange
    pub server_conversation_id: Option<String>,
    pub task_id: Option<String>,
    pub phase: ExchangePhase,
}

impl ExchangeContext {
    pub fn new(
        seq: u64,
        epoch: u64,
        owner_conversation_id: impl Into<String>,
        question: MessageEntry,
    ) -> Self {
        Self {
            seq,
            epoch,
            owner_conversation_id: owner_conversation_id.into(),
            question,
            placeholder_id: format!("answer-placeholder-{}", Uuid::new_v4()),
            answer: MessageEntry::answer(format!("answer-{}", Uuid::new_v4()), ""),
            agent_mode: false,
            response_id_assigned: false,
            server_conversation_id: None,
            task_id: None,
            phase: ExchangePhase::Streaming,
        }
    }

    /// The empty answer entry shown until the first content update
    pub fn placeholder(&self) -> MessageEntry {
        MessageEntry::answer(self.placeholder_id.clone(), "")
    }

    /// Conversation this exchange belongs to once the backend has named it
    pub fn conversation_id(&self) -> &str {
        self.server_conversation_id
            .as_deref()
            .unwrap_or(&self.owner_conversation_id)
    }
}
