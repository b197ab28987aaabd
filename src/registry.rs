//! Conversation Registry
//!
//! Holds the conversation summaries shown in the sidebar and tracks which one
//! is current. The uncommitted "new conversation" is a summary with the
//! sentinel id `"-1"`; there is never more than one of it.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Id of the uncommitted "new conversation" placeholder
pub const NEW_CONVERSATION_ID: &str = "-1";

/// Variable name to value bindings used to fill the prompt template
pub type Inputs = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub inputs: Inputs,
    #[serde(default)]
    pub introduction: String,
}

impl ConversationSummary {
    pub fn is_placeholder(&self) -> bool {
        self.id == NEW_CONVERSATION_ID
    }
}

pub fn is_new_conversation(id: &str) -> bool {
    id == NEW_CONVERSATION_ID
}

#[derive(Debug, Default)]
pub struct ConversationRegistry {
    conversations: Vec<ConversationSummary>,
    current_id: Option<String>,
    new_conversation_inputs: Inputs,
    new_conversation_introduction: String,
    new_conversation_name: String,
}

impl ConversationRegistry {
    pub fn new(new_conversation_name: impl Into<String>) -> Self {
        Self {
            new_conversation_name: new_conversation_name.into(),
            ..Self::default()
        }
    }

    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    pub fn is_current(&self, id: &str) -> bool {
        self.current_id.as_deref() == Some(id)
    }

    pub fn is_new_conversation_current(&self) -> bool {
        self.current_id.as_deref().is_some_and(is_new_conversation)
    }

    /// Set the current id. Returns true if it changed.
    pub fn set_current(&mut self, id: impl Into<String>) -> bool {
        let id = id.into();
        if self.current_id.as_deref() == Some(id.as_str()) {
            return false;
        }
        self.current_id = Some(id);
        true
    }

    pub fn get(&self, id: &str) -> Option<&ConversationSummary> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn has_placeholder(&self) -> bool {
        self.conversations.iter().any(ConversationSummary::is_placeholder)
    }

    /// Committed conversations, without the placeholder
    pub fn committed(&self) -> impl Iterator<Item = &ConversationSummary> {
        self.conversations.iter().filter(|c| !c.is_placeholder())
    }

    pub fn set_new_conversation_inputs(&mut self, inputs: Inputs) {
        self.new_conversation_inputs = inputs;
        let inputs = self.new_conversation_inputs.clone();
        if let Some(placeholder) = self.placeholder_mut() {
            placeholder.inputs = inputs;
        }
    }

    pub fn new_conversation_introduction(&self) -> &str {
        &self.new_conversation_introduction
    }

    pub fn set_new_conversation_introduction(&mut self, introduction: impl Into<String>) {
        self.new_conversation_introduction = introduction.into();
        let introduction = self.new_conversation_introduction.clone();
        if let Some(placeholder) = self.placeholder_mut() {
            placeholder.introduction = introduction;
        }
    }

    /// Inputs and introduction bound to a conversation; the sentinel yields
    /// the pending new-conversation defaults
    pub fn info_for(&self, id: &str) -> (Inputs, String) {
        if is_new_conversation(id) {
            return (
                self.new_conversation_inputs.clone(),
                self.new_conversation_introduction.clone(),
            );
        }
        self.get(id).map_or_else(
            || (Inputs::new(), String::new()),
            |c| (c.inputs.clone(), c.introduction.clone()),
        )
    }

    /// Add the "new conversation" placeholder at the front unless one exists
    pub fn ensure_placeholder(&mut self) {
        if self.has_placeholder() {
            return;
        }
        self.conversations.insert(
            0,
            ConversationSummary {
                id: NEW_CONVERSATION_ID.to_string(),
                name: self.new_conversation_name.clone(),
                inputs: self.new_conversation_inputs.clone(),
                introduction: self.new_conversation_introduction.clone(),
            },
        );
    }

    /// Replace the committed list with a freshly fetched one, keeping the
    /// placeholder if there is one
    pub fn replace_committed(&mut self, fetched: Vec<ConversationSummary>) {
        let placeholder = self
            .conversations
            .iter()
            .find(|c| c.is_placeholder())
            .cloned();
        self.conversations = placeholder
            .into_iter()
            .chain(fetched.into_iter().filter(|c| !c.is_placeholder()))
            .collect();
    }

    /// Turn the placeholder into a committed conversation with the server id.
    ///
    /// Returns false if there is no placeholder to promote. The new
    /// conversation's inputs carry over from the pending defaults.
    pub fn promote_placeholder(&mut self, server_id: &str) -> bool {
        let Some(index) = self.conversations.iter().position(ConversationSummary::is_placeholder)
        else {
            return false;
        };
        if self.contains(server_id) {
            // Already listed (refresh raced us); just drop the placeholder.
            self.conversations.remove(index);
        } else {
            let placeholder = &mut self.conversations[index];
            placeholder.id = server_id.to_string();
        }
        if self.is_new_conversation_current() {
            self.current_id = Some(server_id.to_string());
        }
        true
    }

    /// Remove a conversation; returns its former index
    pub fn remove(&mut self, id: &str) -> Option<usize> {
        let index = self.conversations.iter().position(|c| c.id == id)?;
        self.conversations.remove(index);
        Some(index)
    }

    pub fn rename(&mut self, id: &str, name: impl Into<String>) -> bool {
        match self.conversations.iter_mut().find(|c| c.id == id) {
            Some(conversation) => {
                conversation.name = name.into();
                true
            }
            None => false,
        }
    }

    fn placeholder_mut(&mut self) -> Option<&mut ConversationSummary> {
        self.conversations.iter_mut().find(|c| c.is_placeholder())
    }
}
