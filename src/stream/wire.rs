//! Wire payloads of the streaming chat endpoint
//!
//! Each `data:` line holds one JSON object with an `event` discriminator.
//! Payloads are read into a `Value` first so that error objects (which carry
//! a `status` and no `event`) can be told apart before typed parsing.

use super::event::{
    AnnotationReply, EventMeta, MessageEndMetadata, StreamError, StreamEvent, ThoughtPayload,
};
use crate::transcript::{Attachment, Citation, NodeTrace, Owner, RunStatus, ToolInvocation};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize, Default)]
struct WireMeta {
    #[serde(default)]
    task_id: Option<String>,
    #[serde(default)]
    message_id: Option<String>,
    #[serde(default)]
    conversation_id: Option<String>,
}

impl From<WireMeta> for EventMeta {
    fn from(meta: WireMeta) -> Self {
        let non_empty = |s: Option<String>| s.filter(|s| !s.is_empty());
        EventMeta {
            task_id: non_empty(meta.task_id),
            message_id: non_empty(meta.message_id),
            conversation_id: non_empty(meta.conversation_id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    #[serde(default)]
    answer: String,
}

#[derive(Debug, Deserialize)]
struct AgentThoughtPayload {
    id: String,
    #[serde(default)]
    position: u32,
    #[serde(default)]
    thought: String,
    #[serde(default)]
    tool: String,
    #[serde(default)]
    tool_input: String,
    #[serde(default)]
    observation: String,
    #[serde(default)]
    message_files: Vec<String>,
}

impl From<AgentThoughtPayload> for ThoughtPayload {
    fn from(p: AgentThoughtPayload) -> Self {
        let tool = (!p.tool.is_empty()).then(|| ToolInvocation {
            name: p.tool,
            input: p.tool_input,
            observation: (!p.observation.is_empty()).then_some(p.observation),
        });
        ThoughtPayload {
            id: p.id,
            position: p.position,
            text: p.thought,
            tool,
            file_ids: p.message_files,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessageFilePayload {
    id: String,
    #[serde(rename = "type", default = "default_image")]
    file_type: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    belongs_to: Option<Owner>,
}

fn default_image() -> String {
    "image".to_string()
}

#[derive(Debug, Deserialize)]
struct AnnotationAccount {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct AnnotationReplyPayload {
    id: String,
    account: AnnotationAccount,
}

#[derive(Debug, Deserialize, Default)]
struct MessageEndMetadataPayload {
    #[serde(default)]
    retriever_resources: Vec<Citation>,
    #[serde(default)]
    annotation_reply: Option<AnnotationReplyPayload>,
}

#[derive(Debug, Deserialize)]
struct MessageEndPayload {
    id: Option<String>,
    #[serde(default)]
    metadata: MessageEndMetadataPayload,
}

#[derive(Debug, Deserialize)]
struct MessageReplacePayload {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    answer: String,
}

#[derive(Debug, Deserialize)]
struct WorkflowStartedPayload {
    #[serde(default)]
    workflow_run_id: String,
}

#[derive(Debug, Deserialize)]
struct WorkflowFinishedData {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct WorkflowFinishedPayload {
    data: WorkflowFinishedData,
}

#[derive(Debug, Deserialize)]
struct NodeData {
    #[serde(default)]
    id: String,
    node_id: String,
    #[serde(default)]
    node_type: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    index: u32,
    #[serde(default)]
    predecessor_node_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    inputs: Option<Value>,
    #[serde(default)]
    outputs: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    elapsed_time: Option<f64>,
}

impl From<NodeData> for NodeTrace {
    fn from(d: NodeData) -> Self {
        NodeTrace {
            id: d.id,
            node_id: d.node_id,
            node_type: d.node_type,
            title: d.title,
            index: d.index,
            predecessor_node_id: d.predecessor_node_id,
            status: d.status.as_deref().map_or(RunStatus::Running, RunStatus::parse),
            inputs: d.inputs,
            outputs: d.outputs,
            error: d.error,
            elapsed_time: d.elapsed_time,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NodePayload {
    data: NodeData,
}

/// Parse one JSON payload into an event. Never fails: problems become
/// `StreamEvent::Error`.
pub fn parse_payload(text: &str) -> StreamEvent {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return StreamEvent::Error(StreamError::decode(format!("invalid payload: {e}"))),
    };

    let status = value.get("status").and_then(Value::as_u64);
    let kind = value.get("event").and_then(Value::as_str).map(str::to_owned);
    let Some(kind) = kind.filter(|_| status.is_none_or(|s| s < 400)) else {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("stream payload without event")
            .to_string();
        let code = value.get("code").and_then(Value::as_str).map(str::to_owned);
        return StreamEvent::Error(StreamError::server(message, code));
    };

    match typed_event(&kind, value) {
        Ok(event) => event,
        Err(e) => StreamEvent::Error(StreamError::decode(format!("invalid {kind} payload: {e}"))),
    }
}

fn typed_event(kind: &str, value: Value) -> Result<StreamEvent, serde_json::Error> {
    let meta: EventMeta = WireMeta::deserialize(&value)?.into();
    let event = match kind {
        "message" | "agent_message" => {
            let p = MessagePayload::deserialize(&value)?;
            StreamEvent::TextDelta { text: p.answer, meta }
        }
        "agent_thought" => {
            let p = AgentThoughtPayload::deserialize(&value)?;
            StreamEvent::Thought {
                thought: p.into(),
                meta,
            }
        }
        "message_file" => {
            let p = MessageFilePayload::deserialize(&value)?;
            let mut file = Attachment::remote_image(p.id, p.url, p.belongs_to.unwrap_or(Owner::Assistant));
            file.file_type = p.file_type;
            StreamEvent::File { file, meta }
        }
        "message_end" => {
            let p = MessageEndPayload::deserialize(&value)?;
            let message_id = p
                .id
                .filter(|id| !id.is_empty())
                .or_else(|| meta.message_id.clone())
                .unwrap_or_default();
            let metadata = MessageEndMetadata {
                citations: p.metadata.retriever_resources,
                annotation_reply: p.metadata.annotation_reply.map(|a| AnnotationReply {
                    id: a.id,
                    author_name: a.account.name,
                }),
            };
            StreamEvent::MessageEnd {
                message_id,
                metadata,
                meta,
            }
        }
        "message_replace" => {
            let p = MessageReplacePayload::deserialize(&value)?;
            let target_id = p
                .id
                .filter(|id| !id.is_empty())
                .or_else(|| meta.message_id.clone())
                .unwrap_or_default();
            StreamEvent::MessageReplace {
                target_id,
                content: p.answer,
                meta,
            }
        }
        "workflow_started" => {
            let p = WorkflowStartedPayload::deserialize(&value)?;
            StreamEvent::WorkflowStarted {
                workflow_run_id: p.workflow_run_id,
                meta,
            }
        }
        "workflow_finished" => {
            let p = WorkflowFinishedPayload::deserialize(&value)?;
            StreamEvent::WorkflowFinished {
                status: RunStatus::parse(&p.data.status),
                meta,
            }
        }
        "node_started" => StreamEvent::NodeStarted {
            node: NodePayload::deserialize(&value)?.data.into(),
            meta,
        },
        "node_finished" => StreamEvent::NodeFinished {
            node: NodePayload::deserialize(&value)?.data.into(),
            meta,
        },
        "ping" => StreamEvent::Ping,
        "error" => {
            let message = value
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown server error")
                .to_string();
            let code = value.get("code").and_then(Value::as_str).map(str::to_owned);
            StreamEvent::Error(StreamError::server(message, code))
        }
        other => StreamEvent::Ignored {
            kind: other.to_string(),
        },
    };
    Ok(event)
}
