//! Effects produced by applying a stream event

use crate::stream::StreamError;
use crate::transcript::{MessageEntry, TranscriptEdit};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// The answer's id moved to the server-assigned one
    RenameEntry { from: String, to: String },

    /// Publish the accumulated answer, replacing the placeholder
    UpsertAnswer {
        question: MessageEntry,
        placeholder_id: String,
        answer: MessageEntry,
    },

    /// Moderation rewrite of an existing entry
    ReplaceContent { target_id: String, content: String },

    /// Roll back entries of a failed exchange
    RemoveEntries { ids: Vec<String> },

    /// The stream ended cleanly
    Complete {
        server_conversation_id: Option<String>,
    },

    /// The stream ended with an error
    Fail { error: StreamError },
}

impl Effect {
    pub fn upsert(exchange: &super::ExchangeContext) -> Self {
        Effect::UpsertAnswer {
            question: exchange.question.clone(),
            placeholder_id: exchange.placeholder_id.clone(),
            answer: exchange.answer.clone(),
        }
    }

    /// Transcript edit carried by this effect, if any
    pub fn to_edit(&self) -> Option<TranscriptEdit> {
        match self {
            Effect::RenameEntry { from, to } => Some(TranscriptEdit::RenameEntry {
                from: from.clone(),
                to: to.clone(),
            }),
            Effect::UpsertAnswer {
                question,
                placeholder_id,
                answer,
            } => Some(TranscriptEdit::UpsertExchange {
                question: question.clone(),
                placeholder_id: placeholder_id.clone(),
                answer: answer.clone(),
            }),
            Effect::ReplaceContent { target_id, content } => Some(TranscriptEdit::ReplaceContent {
                target_id: target_id.clone(),
                content: content.clone(),
            }),
            Effect::RemoveEntries { ids } => Some(TranscriptEdit::Remove { ids: ids.clone() }),
            Effect::Complete { .. } | Effect::Fail { .. } => None,
        }
    }
}
