//! Backend request and response types

use crate::prompt::UserInputFormItem;
use crate::registry::{ConversationSummary, Inputs};
use crate::transcript::{Attachment, Feedback, Rating, ThoughtStep, ToolInvocation, TransferMethod};
use serde::{Deserialize, Serialize};

/// App configuration served by `/parameters`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppParameters {
    #[serde(default)]
    pub opening_statement: String,
    #[serde(default)]
    pub user_input_form: Vec<UserInputFormItem>,
    #[serde(default)]
    pub file_upload: FileUploadSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileUploadSettings {
    #[serde(default)]
    pub image: VisionSettings,
}

/// Image upload settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisionSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub number_limits: u32,
    #[serde(default)]
    pub transfer_methods: Vec<TransferMethod>,
}

/// Page wrapper used by list endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
}

pub type ConversationPage = Page<ConversationSummary>;
pub type MessagePage = Page<HistoryRecord>;

/// Thought step as stored in history
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryThought {
    pub id: String,
    #[serde(default)]
    pub position: u32,
    #[serde(default)]
    pub thought: String,
    #[serde(default)]
    pub tool: String,
    #[serde(default)]
    pub tool_input: String,
    #[serde(default)]
    pub observation: String,
    /// Referenced file ids
    #[serde(default, alias = "message_files")]
    pub files: Vec<String>,
}

impl HistoryThought {
    pub fn into_step(self) -> ThoughtStep {
        let tool = (!self.tool.is_empty()).then(|| ToolInvocation {
            name: self.tool,
            input: self.tool_input,
            observation: (!self.observation.is_empty()).then_some(self.observation),
        });
        ThoughtStep {
            id: self.id,
            position: self.position,
            text: self.thought,
            tool,
            file_ids: self.files,
            attachments: Vec::new(),
            finished: true,
        }
    }
}

/// One historical question/answer pair
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HistoryRecord {
    pub id: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub answer: String,
    #[serde(default)]
    pub message_files: Vec<Attachment>,
    #[serde(default)]
    pub agent_thoughts: Vec<HistoryThought>,
    #[serde(default)]
    pub feedback: Option<Feedback>,
}

/// Request that opens a response stream
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub inputs: Inputs,
    pub query: String,
    /// `None` starts a new conversation
    pub conversation_id: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<Attachment>,
}

impl ChatRequest {
    /// Strip URLs from locally uploaded files; the upload id identifies them
    pub fn with_files(mut self, files: Vec<Attachment>) -> Self {
        self.files = files
            .into_iter()
            .map(|mut file| {
                if file.transfer_method == TransferMethod::LocalFile {
                    file.url.clear();
                }
                file
            })
            .collect();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedbackRequest<'a> {
    pub message_id: &'a str,
    pub rating: Option<Rating>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameRequest<'a> {
    pub conversation_id: &'a str,
    /// Seed text for generation, or the literal name when not generating
    pub seed_text: &'a str,
    pub auto_generate: bool,
}
