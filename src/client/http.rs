//! HTTP backend for Dify-compatible chat apps

use super::error::ClientError;
use super::types::{
    AppParameters, ChatRequest, ConversationPage, FeedbackRequest, HistoryRecord, MessagePage,
    RenameRequest,
};
use crate::registry::ConversationSummary;
use crate::stream::{decode_stream, StreamEvent};
use futures::stream::BoxStream;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Unary calls only; streams are bounded by the backend
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const HISTORY_LIMIT: u32 = 100;

pub struct HttpBackend {
    client: Client,
    base_url: String,
    api_key: String,
    user: String,
}

#[derive(Debug, Deserialize)]
struct RenamedConversation {
    name: String,
}

impl HttpBackend {
    pub fn new(base_url: &str, api_key: impl Into<String>, user: impl Into<String>) -> Self {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            user: user.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn authed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(&self.api_key)
    }

    pub async fn app_parameters(&self) -> Result<AppParameters, ClientError> {
        let request = self
            .client
            .get(self.url("/parameters"))
            .query(&[("user", self.user.as_str())]);
        self.send_json(request).await
    }

    pub async fn conversations(&self, limit: u32) -> Result<Vec<ConversationSummary>, ClientError> {
        let request = self
            .client
            .get(self.url("/conversations"))
            .query(&[("user", self.user.as_str())])
            .query(&[("limit", limit)]);
        let page: ConversationPage = self.send_json(request).await?;
        Ok(page.data)
    }

    pub async fn messages(&self, conversation_id: &str) -> Result<Vec<HistoryRecord>, ClientError> {
        let request = self
            .client
            .get(self.url("/messages"))
            .query(&[
                ("conversation_id", conversation_id),
                ("user", self.user.as_str()),
            ])
            .query(&[("limit", HISTORY_LIMIT)]);
        let page: MessagePage = self.send_json(request).await?;
        Ok(page.data)
    }

    /// Start an exchange. Failures after the response headers arrive are
    /// reported inside the stream as a terminal error event.
    pub async fn open_stream(
        &self,
        request: &ChatRequest,
    ) -> Result<BoxStream<'static, StreamEvent>, ClientError> {
        let body = json!({
            "inputs": request.inputs,
            "query": request.query,
            "conversation_id": request.conversation_id,
            "files": request.files,
            "response_mode": "streaming",
            "user": self.user,
        });
        let response = self
            .authed(self.client.post(self.url("/chat-messages")))
            .json(&body)
            .send()
            .await?;
        let response = check_status(response).await?;
        tracing::debug!(
            conversation_id = ?request.conversation_id,
            "Response stream opened"
        );
        Ok(decode_stream(response.bytes_stream()))
    }

    pub async fn submit_feedback(&self, feedback: FeedbackRequest<'_>) -> Result<(), ClientError> {
        let request = self
            .client
            .post(self.url(&format!("/messages/{}/feedbacks", feedback.message_id)))
            .json(&json!({ "rating": feedback.rating, "user": self.user }));
        self.send_ok(request).await
    }

    pub async fn rename_conversation(&self, rename: RenameRequest<'_>) -> Result<String, ClientError> {
        let request = self
            .client
            .post(self.url(&format!("/conversations/{}/name", rename.conversation_id)))
            .json(&json!({
                "name": rename.seed_text,
                "auto_generate": rename.auto_generate,
                "user": self.user,
            }));
        let renamed: RenamedConversation = self.send_json(request).await?;
        Ok(renamed.name)
    }

    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ClientError> {
        let request = self
            .client
            .delete(self.url(&format!("/conversations/{conversation_id}")))
            .json(&json!({ "user": self.user }));
        self.send_ok(request).await
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = self
            .authed(request)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        let response = check_status(response).await?;
        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| ClientError::decode(format!("{e}: {text}")))
    }

    async fn send_ok(&self, request: RequestBuilder) -> Result<(), ClientError> {
        let response = self
            .authed(request)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }
}

async fn check_status(response: Response) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), body = %body, "Backend request failed");
    Err(ClientError::from_status(status.as_u16(), &body))
}
