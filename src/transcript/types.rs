//! Transcript entry types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of the exchange an entry belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Question,
    Answer,
}

/// Who produced an attachment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    #[default]
    User,
    Assistant,
}

/// How an attached file reaches the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferMethod {
    #[default]
    RemoteUrl,
    LocalFile,
}

/// A file reference attached to a question, an answer or a thought step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    /// File type as reported by the backend (`image`, `document`, ...)
    #[serde(rename = "type", default = "default_file_type")]
    pub file_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(rename = "belongs_to", default)]
    pub owner: Owner,
    #[serde(default)]
    pub transfer_method: TransferMethod,
    /// Backend upload id, set for `local_file` transfers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_file_id: Option<String>,
}

fn default_file_type() -> String {
    "image".to_string()
}

impl Attachment {
    pub fn remote_image(id: impl Into<String>, url: impl Into<String>, owner: Owner) -> Self {
        Self {
            id: id.into(),
            file_type: default_file_type(),
            url: url.into(),
            owner,
            transfer_method: TransferMethod::RemoteUrl,
            upload_file_id: None,
        }
    }

    #[cfg(test)]
    pub fn local_upload(upload_file_id: impl Into<String>) -> Self {
        let upload_file_id = upload_file_id.into();
        Self {
            id: upload_file_id.clone(),
            file_type: default_file_type(),
            url: String::new(),
            owner: Owner::User,
            transfer_method: TransferMethod::LocalFile,
            upload_file_id: Some(upload_file_id),
        }
    }
}

/// A tool call made during an agent step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    #[serde(default)]
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,
}

/// One step of a multi-step ("agent") answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtStep {
    pub id: String,
    /// Ordering key assigned by the backend
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolInvocation>,
    /// File ids the backend linked to this step
    #[serde(default)]
    pub file_ids: Vec<String>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub finished: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rating {
    Like,
    Dislike,
}

/// User feedback on an answer. `rating: None` clears a previous rating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Feedback {
    pub rating: Option<Rating>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Succeeded,
    Failed,
    Stopped,
}

impl RunStatus {
    /// Parse a backend status string. Unknown values count as failures.
    pub fn parse(status: &str) -> Self {
        match status {
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "stopped" => Self::Stopped,
            _ => Self::Failed,
        }
    }
}

/// Trace of one workflow node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeTrace {
    /// Execution id of this node run
    pub id: String,
    pub node_id: String,
    #[serde(default)]
    pub node_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub predecessor_node_id: Option<String>,
    #[serde(default)]
    pub status: RunStatus,
    #[serde(default)]
    pub inputs: Option<Value>,
    #[serde(default)]
    pub outputs: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub elapsed_time: Option<f64>,
}

/// Workflow progress attached to an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct WorkflowState {
    pub status: RunStatus,
    pub node_trace: Vec<NodeTrace>,
}

/// A curated reply that answered the question instead of the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub id: String,
    pub author_name: String,
}

/// A retrieval source the answer was grounded on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub dataset_name: String,
    #[serde(default)]
    pub document_name: String,
    #[serde(default)]
    pub segment_id: String,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub content: String,
}

/// One turn of the transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[serde(default)]
    pub thought_steps: Vec<ThoughtStep>,
    #[serde(default)]
    pub feedback: Option<Feedback>,
    #[serde(default)]
    pub workflow_run_id: Option<String>,
    #[serde(default)]
    pub workflow: Option<WorkflowState>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub annotation: Option<Annotation>,
    /// Synthetic greeting / introduction, never rated or deleted
    #[serde(default)]
    pub opening_statement: bool,
}

impl MessageEntry {
    pub fn question(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, Role::Question, content)
    }

    pub fn answer(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(id, Role::Answer, content)
    }

    pub fn opening(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            opening_statement: true,
            ..Self::new(id, Role::Answer, content)
        }
    }

    fn new(id: impl Into<String>, role: Role, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            attachments: Vec::new(),
            thought_steps: Vec::new(),
            feedback: None,
            workflow_run_id: None,
            workflow: None,
            citations: Vec::new(),
            annotation: None,
            opening_statement: false,
        }
    }

    pub fn with_attachments(mut self, attachments: Vec<Attachment>) -> Self {
        self.attachments = attachments;
        self
    }

    pub fn is_answer(&self) -> bool {
        self.role == Role::Answer
    }

    /// Text shown for this entry: the content, or the first thought for agent answers
    pub fn display_text(&self) -> &str {
        if self.content.is_empty() {
            self.thought_steps
                .first()
                .map_or("", |step| step.text.as_str())
        } else {
            &self.content
        }
    }
}
