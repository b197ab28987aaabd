//! Transcript Store
//!
//! Ordered list of message entries for the conversation on screen. Every
//! mutation builds a fresh list and publishes it as one immutable snapshot,
//! so observers never see a half-applied edit.

mod types;

pub use types::*;

use std::sync::Arc;
use tokio::sync::broadcast;

/// Immutable view of the transcript published after each mutation
#[derive(Debug, Clone)]
pub struct TranscriptSnapshot {
    pub revision: u64,
    pub entries: Arc<Vec<MessageEntry>>,
}

/// A single list operation. Several edits applied together produce one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEdit {
    /// Append entries at the end
    Append(Vec<MessageEntry>),
    /// Rewrite every entry carrying `from` to carry `to`
    RenameEntry { from: String, to: String },
    /// Drop any entry with the answer's id or the placeholder id, make sure the
    /// question is present, then append the answer
    UpsertExchange {
        question: MessageEntry,
        placeholder_id: String,
        answer: MessageEntry,
    },
    /// Overwrite the content of an existing entry
    ReplaceContent { target_id: String, content: String },
    /// Remove every entry whose id is listed
    Remove { ids: Vec<String> },
    SetFeedback { id: String, feedback: Feedback },
}

const OBSERVER_CAPACITY: usize = 256;

pub struct TranscriptStore {
    entries: Arc<Vec<MessageEntry>>,
    revision: u64,
    observer: broadcast::Sender<TranscriptSnapshot>,
}

impl Default for TranscriptStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TranscriptStore {
    pub fn new() -> Self {
        let (observer, _) = broadcast::channel(OBSERVER_CAPACITY);
        Self {
            entries: Arc::new(Vec::new()),
            revision: 0,
            observer,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TranscriptSnapshot> {
        self.observer.subscribe()
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            revision: self.revision,
            entries: Arc::clone(&self.entries),
        }
    }

    pub fn entries(&self) -> &[MessageEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&MessageEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Replace the whole transcript
    pub fn reset(&mut self, entries: Vec<MessageEntry>) {
        self.publish(entries);
    }

    /// Apply edits in order and publish a single snapshot.
    ///
    /// Returns false (and publishes nothing) when the edits leave the list unchanged.
    pub fn apply(&mut self, edits: Vec<TranscriptEdit>) -> bool {
        if edits.is_empty() {
            return false;
        }
        let mut draft: Vec<MessageEntry> = self.entries.as_ref().clone();
        for edit in edits {
            apply_edit(&mut draft, edit);
        }
        if draft == *self.entries {
            return false;
        }
        self.publish(draft);
        true
    }

    fn publish(&mut self, entries: Vec<MessageEntry>) {
        self.entries = Arc::new(entries);
        self.revision += 1;
        // No subscribers is fine; the store is still authoritative.
        let _ = self.observer.send(self.snapshot());
    }
}

fn apply_edit(draft: &mut Vec<MessageEntry>, edit: TranscriptEdit) {
    match edit {
        TranscriptEdit::Append(entries) => draft.extend(entries),
        TranscriptEdit::RenameEntry { from, to } => {
            for entry in draft.iter_mut().filter(|entry| entry.id == from) {
                entry.id.clone_from(&to);
            }
        }
        TranscriptEdit::UpsertExchange {
            question,
            placeholder_id,
            answer,
        } => {
            draft.retain(|entry| entry.id != answer.id && entry.id != placeholder_id);
            if !draft.iter().any(|entry| entry.id == question.id) {
                draft.push(question);
            }
            draft.push(answer);
        }
        TranscriptEdit::ReplaceContent { target_id, content } => {
            if let Some(entry) = draft.iter_mut().find(|entry| entry.id == target_id) {
                entry.content = content;
            }
        }
        TranscriptEdit::Remove { ids } => {
            draft.retain(|entry| !ids.contains(&entry.id));
        }
        TranscriptEdit::SetFeedback { id, feedback } => {
            if let Some(entry) = draft.iter_mut().find(|entry| entry.id == id) {
                entry.feedback = Some(feedback);
            }
        }
    }
}
