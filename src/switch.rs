//! Conversation Switch Coordinator
//!
//! Decides what happens to the transcript when the current conversation
//! changes: synthesize opening entries for a new conversation, or fetch and
//! rebuild history for an existing one, unless that would race a live
//! exchange on the same conversation.

use crate::client::{HistoryRecord, HistoryThought};
use crate::prompt::{replace_vars, PromptVariable};
use crate::registry::{is_new_conversation, Inputs};
use crate::transcript::{Attachment, MessageEntry, Owner, ThoughtStep};
use std::cmp::Ordering;
use uuid::Uuid;

/// What the session knows when the current id changes
#[derive(Debug, Clone, Copy)]
pub struct SwitchContext<'a> {
    pub initialized: bool,
    pub target_id: &'a str,
    /// Conversation of the exchange still streaming, if any
    pub live_exchange_conversation: Option<&'a str>,
    /// Conversation a history fetch is already in flight for
    pub pending_fetch: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwitchPlan {
    /// App parameters not loaded yet
    NotReady,
    /// Reset to opening entries, no fetch
    Opening,
    /// Fetch history for this conversation
    Fetch,
    /// A fetch for this id is already running
    AlreadyPending,
    /// An exchange is streaming into this conversation; retry when it ends
    Defer,
}

pub fn plan_switch(ctx: SwitchContext<'_>) -> SwitchPlan {
    if !ctx.initialized {
        return SwitchPlan::NotReady;
    }
    if is_new_conversation(ctx.target_id) {
        return SwitchPlan::Opening;
    }
    if ctx.live_exchange_conversation == Some(ctx.target_id) {
        return SwitchPlan::Defer;
    }
    if ctx.pending_fetch == Some(ctx.target_id) {
        return SwitchPlan::AlreadyPending;
    }
    SwitchPlan::Fetch
}

/// Greeting first, then the introduction with its variables filled in
pub fn opening_entries(
    greeting: &str,
    introduction: &str,
    variables: &[PromptVariable],
    inputs: &Inputs,
) -> Vec<MessageEntry> {
    let mut entries = vec![MessageEntry::opening(
        format!("greeting-{}", Uuid::new_v4()),
        greeting,
    )];
    let introduction = replace_vars(introduction, variables, inputs);
    if !introduction.trim().is_empty() {
        entries.push(MessageEntry::opening(
            format!("opening-{}", Uuid::new_v4()),
            introduction,
        ));
    }
    entries
}

/// Thought order used when rebuilding history
pub fn by_position(a: &ThoughtStep, b: &ThoughtStep) -> Ordering {
    a.position.cmp(&b.position)
}

/// Opening entries followed by one question/answer pair per record
pub fn rebuild_transcript<F>(
    opening: Vec<MessageEntry>,
    records: Vec<HistoryRecord>,
    mut thought_order: F,
) -> Vec<MessageEntry>
where
    F: FnMut(&ThoughtStep, &ThoughtStep) -> Ordering,
{
    let mut entries = opening;
    entries.reserve(records.len() * 2);
    for record in records {
        let (user_files, assistant_files): (Vec<Attachment>, Vec<Attachment>) = record
            .message_files
            .iter()
            .cloned()
            .partition(|file| file.owner == Owner::User);

        let mut thoughts: Vec<ThoughtStep> = record
            .agent_thoughts
            .into_iter()
            .map(HistoryThought::into_step)
            .collect();
        thoughts.sort_by(&mut thought_order);
        for step in &mut thoughts {
            step.attachments = step
                .file_ids
                .iter()
                .filter_map(|id| record.message_files.iter().find(|f| &f.id == id).cloned())
                .collect();
        }

        entries.push(
            MessageEntry::question(format!("question-{}", record.id), record.query)
                .with_attachments(user_files),
        );
        let mut answer = MessageEntry::answer(record.id, record.answer).with_attachments(assistant_files);
        answer.thought_steps = thoughts;
        answer.feedback = record.feedback;
        entries.push(answer);
    }
    entries
}
