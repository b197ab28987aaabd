//! Trait abstractions for runtime I/O
//!
//! These traits let the runtime run against mock backends in tests.

use crate::client::{
    AppParameters, ChatRequest, ClientError, FeedbackRequest, HistoryRecord, HttpBackend,
    RenameRequest,
};
use crate::db::Database;
use crate::registry::ConversationSummary;
use crate::stream::StreamEvent;
use crate::transcript::Rating;
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

/// Decoded events of one response stream, ending with exactly one terminal event
pub type EventStream = BoxStream<'static, StreamEvent>;

/// The assistant backend
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    async fn app_parameters(&self) -> Result<AppParameters, ClientError>;

    /// Conversations, most recent first
    async fn conversations(&self, limit: u32) -> Result<Vec<ConversationSummary>, ClientError>;

    /// Full history of one conversation, oldest first
    async fn messages(&self, conversation_id: &str) -> Result<Vec<HistoryRecord>, ClientError>;

    /// Start an exchange. Failures after the stream opened arrive as a
    /// terminal error event instead.
    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream, ClientError>;

    async fn submit_feedback(
        &self,
        message_id: &str,
        rating: Option<Rating>,
    ) -> Result<(), ClientError>;

    /// Returns the conversation's new name
    async fn rename_conversation(
        &self,
        conversation_id: &str,
        seed_text: &str,
        auto_generate: bool,
    ) -> Result<String, ClientError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ClientError>;
}

/// Remembers the current conversation per application id
#[async_trait]
pub trait ConversationPointerStore: Send + Sync {
    async fn get_current(&self, app_id: &str) -> Result<Option<String>, String>;

    async fn set_current(&self, app_id: &str, conversation_id: &str) -> Result<(), String>;

    #[allow(dead_code)] // API completeness
    async fn clear_current(&self, app_id: &str) -> Result<(), String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: AssistantBackend + ?Sized> AssistantBackend for Arc<T> {
    async fn app_parameters(&self) -> Result<AppParameters, ClientError> {
        (**self).app_parameters().await
    }

    async fn conversations(&self, limit: u32) -> Result<Vec<ConversationSummary>, ClientError> {
        (**self).conversations(limit).await
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<HistoryRecord>, ClientError> {
        (**self).messages(conversation_id).await
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream, ClientError> {
        (**self).open_stream(request).await
    }

    async fn submit_feedback(
        &self,
        message_id: &str,
        rating: Option<Rating>,
    ) -> Result<(), ClientError> {
        (**self).submit_feedback(message_id, rating).await
    }

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        seed_text: &str,
        auto_generate: bool,
    ) -> Result<String, ClientError> {
        (**self)
            .rename_conversation(conversation_id, seed_text, auto_generate)
            .await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        (**self).delete_conversation(conversation_id).await
    }
}

#[async_trait]
impl<T: ConversationPointerStore + ?Sized> ConversationPointerStore for Arc<T> {
    async fn get_current(&self, app_id: &str) -> Result<Option<String>, String> {
        (**self).get_current(app_id).await
    }

    async fn set_current(&self, app_id: &str, conversation_id: &str) -> Result<(), String> {
        (**self).set_current(app_id, conversation_id).await
    }

    async fn clear_current(&self, app_id: &str) -> Result<(), String> {
        (**self).clear_current(app_id).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

#[async_trait]
impl AssistantBackend for HttpBackend {
    async fn app_parameters(&self) -> Result<AppParameters, ClientError> {
        HttpBackend::app_parameters(self).await
    }

    async fn conversations(&self, limit: u32) -> Result<Vec<ConversationSummary>, ClientError> {
        HttpBackend::conversations(self, limit).await
    }

    async fn messages(&self, conversation_id: &str) -> Result<Vec<HistoryRecord>, ClientError> {
        HttpBackend::messages(self, conversation_id).await
    }

    async fn open_stream(&self, request: &ChatRequest) -> Result<EventStream, ClientError> {
        HttpBackend::open_stream(self, request).await
    }

    async fn submit_feedback(
        &self,
        message_id: &str,
        rating: Option<Rating>,
    ) -> Result<(), ClientError> {
        HttpBackend::submit_feedback(self, FeedbackRequest { message_id, rating }).await
    }

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        seed_text: &str,
        auto_generate: bool,
    ) -> Result<String, ClientError> {
        HttpBackend::rename_conversation(
            self,
            RenameRequest {
                conversation_id,
                seed_text,
                auto_generate,
            },
        )
        .await
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        HttpBackend::delete_conversation(self, conversation_id).await
    }
}

/// Adapter to use Database as the pointer store
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ConversationPointerStore for DatabaseStore {
    async fn get_current(&self, app_id: &str) -> Result<Option<String>, String> {
        self.db
            .get_current_conversation(app_id)
            .map(|current| current.map(|c| c.conversation_id))
            .map_err(|e| e.to_string())
    }

    async fn set_current(&self, app_id: &str, conversation_id: &str) -> Result<(), String> {
        self.db
            .set_current_conversation(app_id, conversation_id)
            .map_err(|e| e.to_string())
    }

    async fn clear_current(&self, app_id: &str) -> Result<(), String> {
        self.db
            .clear_current_conversation(app_id)
            .map_err(|e| e.to_string())
    }
}
