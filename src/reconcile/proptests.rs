//! Property-based tests for the reconciliation engine
//!
//! Events are folded through `apply` and the resulting edits are executed
//! against a real transcript store, the same way the session does it.

use super::*;
use crate::stream::{EventMeta, MessageEndMetadata, StreamError, StreamEvent, ThoughtPayload};
use crate::transcript::{
    Attachment, MessageEntry, NodeTrace, Owner, Role, RunStatus, TranscriptEdit, TranscriptStore,
};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn prior_entries() -> Vec<MessageEntry> {
    vec![
        MessageEntry::opening("greeting", "Hello"),
        MessageEntry::question("old-q", "earlier"),
        MessageEntry::answer("old-a", "earlier answer"),
    ]
}

/// Store holding prior history plus the freshly submitted question and placeholder
fn start(exchange: &ExchangeContext) -> TranscriptStore {
    let mut store = TranscriptStore::new();
    let mut entries = prior_entries();
    entries.push(exchange.question.clone());
    entries.push(exchange.placeholder());
    store.reset(entries);
    store
}

fn execute(store: &mut TranscriptStore, effects: &[Effect]) {
    let edits: Vec<TranscriptEdit> = effects.iter().filter_map(Effect::to_edit).collect();
    store.apply(edits);
}

fn new_exchange() -> ExchangeContext {
    ExchangeContext::new(7, 0, "-1", MessageEntry::question("q", "question"))
}

fn meta(message_id: Option<String>) -> EventMeta {
    EventMeta {
        task_id: None,
        message_id,
        conversation_id: Some("c".to_string()),
    }
}

fn node(node_id: &str, status: RunStatus, index: u32) -> NodeTrace {
    NodeTrace {
        id: format!("exec-{index}"),
        node_id: node_id.to_string(),
        node_type: "code".to_string(),
        title: node_id.to_string(),
        index,
        predecessor_node_id: None,
        status,
        inputs: None,
        outputs: None,
        error: None,
        elapsed_time: None,
    }
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_message_id() -> impl Strategy<Value = Option<String>> {
    prop_oneof![Just(None), "m[0-9]{1,2}".prop_map(Some)]
}

fn arb_text_delta() -> impl Strategy<Value = StreamEvent> {
    ("[a-zA-Z ]{0,8}", arb_message_id()).prop_map(|(text, id)| StreamEvent::TextDelta {
        text,
        meta: meta(id),
    })
}

fn arb_thought() -> impl Strategy<Value = StreamEvent> {
    (
        prop_oneof![Just("A"), Just("B"), Just("C")],
        "[a-z]{0,6}",
        arb_message_id(),
    )
        .prop_map(|(id, text, message_id)| StreamEvent::Thought {
            thought: ThoughtPayload {
                id: id.to_string(),
                position: 0,
                text,
                tool: None,
                file_ids: vec![],
            },
            meta: meta(message_id),
        })
}

fn arb_file() -> impl Strategy<Value = StreamEvent> {
    "f[0-9]".prop_map(|id| StreamEvent::File {
        file: Attachment::remote_image(id, "http://files/x.png", Owner::Assistant),
        meta: meta(None),
    })
}

fn arb_node_event() -> impl Strategy<Value = StreamEvent> {
    (prop_oneof![Just("N1"), Just("N2")], any::<bool>(), 0u32..10).prop_map(
        |(id, started, index)| {
            if started {
                StreamEvent::NodeStarted {
                    node: node(id, RunStatus::Running, index),
                    meta: meta(None),
                }
            } else {
                StreamEvent::NodeFinished {
                    node: node(id, RunStatus::Succeeded, index),
                    meta: meta(None),
                }
            }
        },
    )
}

/// Any non-terminal event that may precede `message_end`
fn arb_intermediate_event() -> impl Strategy<Value = StreamEvent> {
    prop_oneof![
        4 => arb_text_delta(),
        3 => arb_thought(),
        1 => arb_file(),
        2 => arb_node_event(),
        1 => Just(StreamEvent::Ping),
    ]
}

fn arb_message_end() -> impl Strategy<Value = StreamEvent> {
    "m[0-9]{1,2}".prop_map(|message_id| StreamEvent::MessageEnd {
        message_id,
        metadata: MessageEndMetadata::default(),
        meta: meta(None),
    })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(1000))]

    /// Non-agent answer content is the plain concatenation of the deltas
    #[test]
    fn prop_text_deltas_concatenate(deltas in proptest::collection::vec("[a-zA-Z0-9 ]{0,10}", 0..30)) {
        let mut exchange = new_exchange();
        let mut store = start(&exchange);
        for delta in &deltas {
            let r = apply(&exchange, StreamEvent::TextDelta { text: delta.clone(), meta: meta(None) }).unwrap();
            execute(&mut store, &r.effects);
            exchange = r.exchange;
        }
        let expected: String = deltas.concat();
        prop_assert_eq!(&exchange.answer.content, &expected);
        if !deltas.is_empty() {
            prop_assert_eq!(&store.get(&exchange.answer.id).unwrap().content, &expected);
        }
    }

    /// After message_end exactly one question and one answer of the exchange survive
    #[test]
    fn prop_single_question_and_answer_after_message_end(
        events in proptest::collection::vec(arb_intermediate_event(), 0..40),
        end in arb_message_end(),
    ) {
        let mut exchange = new_exchange();
        let mut store = start(&exchange);
        for event in events.into_iter().chain(std::iter::once(end)) {
            let r = apply(&exchange, event).unwrap();
            execute(&mut store, &r.effects);
            exchange = r.exchange;
        }

        let entries = store.entries();
        let prior = prior_entries();
        prop_assert_eq!(&entries[..prior.len()], &prior[..]);

        let tail = &entries[prior.len()..];
        prop_assert_eq!(tail.len(), 2, "tail: {:?}", tail);
        prop_assert_eq!(tail[0].role, Role::Question);
        prop_assert_eq!(&tail[0].id, "q");
        prop_assert_eq!(tail[1].role, Role::Answer);
        prop_assert_eq!(&tail[1].id, &exchange.answer.id);
        prop_assert!(!entries.iter().any(|e| e.id == exchange.placeholder_id));
    }

    /// Thought steps only grow, and only the last one is ever amended
    #[test]
    fn prop_thoughts_append_only(events in proptest::collection::vec(
        prop_oneof![3 => arb_thought(), 2 => arb_text_delta(), 1 => arb_file()], 1..40)
    ) {
        let mut exchange = new_exchange();
        for event in events {
            let before = exchange.answer.thought_steps.clone();
            exchange = apply(&exchange, event).unwrap().exchange;
            let after = &exchange.answer.thought_steps;

            prop_assert!(after.len() >= before.len());
            if before.len() > 1 {
                for (old, new) in before[..before.len() - 1].iter().zip(after.iter()) {
                    let mut old = old.clone();
                    old.finished = new.finished;
                    prop_assert_eq!(&old, new);
                }
            }
        }
    }

    /// Thought ids [A, A, B] give two steps, the first holding both A payloads
    #[test]
    fn prop_repeated_thought_id_merges(first in "[a-z]{1,5}", extra in "[a-z]{0,5}", second in "[a-z]{0,5}") {
        let thought = |id: &str, text: String| StreamEvent::Thought {
            thought: ThoughtPayload { id: id.to_string(), position: 1, text, tool: None, file_ids: vec![] },
            meta: meta(None),
        };
        let mut exchange = new_exchange();
        for event in [
            thought("A", first.clone()),
            thought("A", format!("{first}{extra}")),
            thought("B", second.clone()),
        ] {
            exchange = apply(&exchange, event).unwrap().exchange;
        }
        let steps = &exchange.answer.thought_steps;
        prop_assert_eq!(steps.len(), 2);
        prop_assert_eq!(&steps[0].id, "A");
        prop_assert_eq!(&steps[0].text, &format!("{first}{extra}"));
        prop_assert_eq!(&steps[1].text, &second);
    }

    /// node_finished never appends a second record for the same node
    #[test]
    fn prop_node_finished_replaces(finishes in 1usize..5) {
        let mut exchange = new_exchange();
        exchange = apply(&exchange, StreamEvent::NodeStarted {
            node: node("N", RunStatus::Running, 0),
            meta: meta(None),
        }).unwrap().exchange;
        for i in 0..finishes {
            let index = u32::try_from(i).unwrap() + 1;
            exchange = apply(&exchange, StreamEvent::NodeFinished {
                node: node("N", RunStatus::Succeeded, index),
                meta: meta(None),
            }).unwrap().exchange;
        }
        let trace = &exchange.answer.workflow.as_ref().unwrap().node_trace;
        prop_assert_eq!(trace.len(), 1);
        prop_assert_eq!(trace[0].index, u32::try_from(finishes).unwrap());
    }

    /// An error rolls back the exchange's answer and leaves everything else alone
    #[test]
    fn prop_error_removes_only_the_answer(events in proptest::collection::vec(arb_intermediate_event(), 0..20)) {
        let mut exchange = new_exchange();
        let mut store = start(&exchange);
        for event in events {
            let r = apply(&exchange, event).unwrap();
            execute(&mut store, &r.effects);
            exchange = r.exchange;
        }
        let r = apply(&exchange, StreamEvent::Error(StreamError::transport("reset"))).unwrap();
        execute(&mut store, &r.effects);

        let mut expected = prior_entries();
        expected.push(exchange.question.clone());
        prop_assert_eq!(store.entries(), &expected[..]);
        prop_assert_eq!(r.exchange.phase, ExchangePhase::Failed);
    }
}
