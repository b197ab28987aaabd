//! Pure event application
//!
//! `apply` folds one stream event into a copy of the exchange and lists the
//! effects the session must carry out. It performs no I/O and never touches
//! the transcript store directly.

use super::{Effect, ExchangeContext, ExchangePhase};
use crate::stream::{EventMeta, MessageEndMetadata, StreamEvent, ThoughtPayload};
use crate::transcript::{
    Annotation, Attachment, NodeTrace, RunStatus, ThoughtStep, WorkflowState,
};
use thiserror::Error;

/// Result of applying one event
#[derive(Debug)]
pub struct Reconciled {
    pub exchange: ExchangeContext,
    pub effects: Vec<Effect>,
}

impl Reconciled {
    fn new(exchange: ExchangeContext) -> Self {
        Self {
            exchange,
            effects: vec![],
        }
    }

    fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ReconcileError {
    #[error("exchange {seq} already ended")]
    ExchangeClosed { seq: u64 },
    #[error("{kind} event after the answer was finalized")]
    AfterFinalize { kind: &'static str },
}

#[allow(clippy::too_many_lines)] // One arm per event kind
pub fn apply(exchange: &ExchangeContext, event: StreamEvent) -> Result<Reconciled, ReconcileError> {
    if exchange.phase.is_closed() {
        return Err(ReconcileError::ExchangeClosed { seq: exchange.seq });
    }
    if exchange.phase == ExchangePhase::Finalized
        && matches!(
            event,
            StreamEvent::TextDelta { .. } | StreamEvent::Thought { .. } | StreamEvent::File { .. }
        )
    {
        return Err(ReconcileError::AfterFinalize { kind: event.kind() });
    }

    let mut next = exchange.clone();
    if let Some(meta) = event.meta() {
        record_meta(&mut next, meta);
    }

    let result = match event {
        StreamEvent::TextDelta { text, meta } => {
            if next.agent_mode {
                if let Some(step) = next.answer.thought_steps.last_mut() {
                    step.text.push_str(&text);
                }
            } else {
                next.answer.content.push_str(&text);
            }
            let rename = assign_response_id(&mut next, meta.message_id.as_deref());
            let upsert = Effect::upsert(&next);
            Reconciled::new(next).with_effects(rename).with_effect(upsert)
        }

        StreamEvent::Thought { thought, meta } => {
            next.agent_mode = true;
            let rename = assign_response_id(&mut next, meta.message_id.as_deref());
            merge_thought(&mut next.answer.thought_steps, thought);
            let upsert = Effect::upsert(&next);
            Reconciled::new(next).with_effects(rename).with_effect(upsert)
        }

        StreamEvent::File { file, .. } => {
            match next.answer.thought_steps.last_mut() {
                Some(step) => push_unique(&mut step.attachments, file),
                None => push_unique(&mut next.answer.attachments, file),
            }
            let upsert = Effect::upsert(&next);
            Reconciled::new(next).with_effect(upsert)
        }

        StreamEvent::MessageEnd {
            message_id,
            metadata,
            ..
        } => finalize(next, &message_id, metadata),

        StreamEvent::MessageReplace {
            target_id, content, ..
        } => {
            if target_id == next.answer.id {
                next.answer.content.clone_from(&content);
            }
            Reconciled::new(next).with_effect(Effect::ReplaceContent { target_id, content })
        }

        StreamEvent::WorkflowStarted {
            workflow_run_id, ..
        } => {
            next.answer.workflow_run_id = Some(workflow_run_id);
            next.answer.workflow = Some(WorkflowState {
                status: RunStatus::Running,
                node_trace: Vec::new(),
            });
            let upsert = Effect::upsert(&next);
            Reconciled::new(next).with_effect(upsert)
        }

        StreamEvent::WorkflowFinished { status, .. } => {
            next.answer.workflow.get_or_insert_with(WorkflowState::default).status = status;
            let upsert = Effect::upsert(&next);
            Reconciled::new(next).with_effect(upsert)
        }

        StreamEvent::NodeStarted { node, .. } => {
            next.answer
                .workflow
                .get_or_insert_with(WorkflowState::default)
                .node_trace
                .push(node);
            let upsert = Effect::upsert(&next);
            Reconciled::new(next).with_effect(upsert)
        }

        StreamEvent::NodeFinished { node, .. } => {
            if replace_node(&mut next.answer.workflow, node) {
                let upsert = Effect::upsert(&next);
                Reconciled::new(next).with_effect(upsert)
            } else {
                Reconciled::new(next)
            }
        }

        StreamEvent::Ping | StreamEvent::Ignored { .. } => Reconciled::new(next),

        StreamEvent::Error(error) => {
            let rollback = if next.phase == ExchangePhase::Finalized {
                None
            } else {
                Some(Effect::RemoveEntries {
                    ids: vec![next.placeholder_id.clone(), next.answer.id.clone()],
                })
            };
            next.phase = ExchangePhase::Failed;
            Reconciled::new(next)
                .with_effects(rollback)
                .with_effect(Effect::Fail { error })
        }

        StreamEvent::Completed => {
            // A stream without content never replaced the placeholder.
            let leftover = (next.phase == ExchangePhase::Streaming).then(|| Effect::RemoveEntries {
                ids: vec![next.placeholder_id.clone()],
            });
            next.phase = ExchangePhase::Completed;
            let server_conversation_id = next.server_conversation_id.clone();
            Reconciled::new(next)
                .with_effects(leftover)
                .with_effect(Effect::Complete {
                    server_conversation_id,
                })
        }
    };
    Ok(result)
}

fn record_meta(exchange: &mut ExchangeContext, meta: &EventMeta) {
    if exchange.server_conversation_id.is_none() {
        exchange.server_conversation_id.clone_from(&meta.conversation_id);
    }
    if meta.task_id.is_some() {
        exchange.task_id.clone_from(&meta.task_id);
    }
}

/// Migrate the answer to the first server id seen. Later ids are ignored.
fn assign_response_id(exchange: &mut ExchangeContext, message_id: Option<&str>) -> Option<Effect> {
    let message_id = message_id.filter(|id| !id.is_empty())?;
    if exchange.response_id_assigned {
        return None;
    }
    exchange.response_id_assigned = true;
    rename_answer(exchange, message_id)
}

fn rename_answer(exchange: &mut ExchangeContext, to: &str) -> Option<Effect> {
    if exchange.answer.id == to {
        return None;
    }
    let from = std::mem::replace(&mut exchange.answer.id, to.to_string());
    Some(Effect::RenameEntry {
        from,
        to: to.to_string(),
    })
}

/// Amend the last step if it has the same id, otherwise append a new one.
/// Earlier steps are never touched except to mark them finished.
fn merge_thought(steps: &mut Vec<ThoughtStep>, incoming: ThoughtPayload) {
    match steps.last_mut() {
        Some(last) if last.id == incoming.id => {
            if incoming.text.starts_with(last.text.as_str()) {
                last.text = incoming.text;
            }
            last.position = incoming.position;
            if incoming.tool.is_some() {
                last.tool = incoming.tool;
            }
            for file_id in incoming.file_ids {
                if !last.file_ids.contains(&file_id) {
                    last.file_ids.push(file_id);
                }
            }
        }
        _ => {
            if let Some(last) = steps.last_mut() {
                last.finished = true;
            }
            steps.push(incoming.into_step());
        }
    }
}

fn push_unique(attachments: &mut Vec<Attachment>, file: Attachment) {
    if !attachments.iter().any(|a| a.id == file.id) {
        attachments.push(file);
    }
}

fn replace_node(workflow: &mut Option<WorkflowState>, node: NodeTrace) -> bool {
    let Some(record) = workflow
        .as_mut()
        .and_then(|w| w.node_trace.iter_mut().find(|n| n.node_id == node.node_id))
    else {
        tracing::warn!(node_id = %node.node_id, "node_finished for unknown node, ignoring");
        return false;
    };
    *record = node;
    true
}

fn finalize(
    mut next: ExchangeContext,
    message_id: &str,
    metadata: MessageEndMetadata,
) -> Reconciled {
    let rename = match metadata.annotation_reply {
        Some(reply) => {
            next.answer.annotation = Some(Annotation {
                id: reply.id,
                author_name: reply.author_name,
            });
            next.response_id_assigned = true;
            if message_id.is_empty() {
                None
            } else {
                rename_answer(&mut next, message_id)
            }
        }
        None => {
            next.answer.citations = metadata.citations;
            assign_response_id(&mut next, Some(message_id))
        }
    };
    for step in &mut next.answer.thought_steps {
        step.finished = true;
    }
    next.phase = ExchangePhase::Finalized;
    let upsert = Effect::upsert(&next);
    Reconciled::new(next).with_effects(rename).with_effect(upsert)
}
