//! HTTP client for the chat backend

use futures::StreamExt;
use reqwest_eventsource::EventSource;
use serde::de::DeserializeOwned;

use crate::{
    error::{Error, Result},
    stream::{ChunkStream, chunk_stream},
    types::{
        ChatRequest, ChatResponse, GenerationOptions, Message, ModelInfo, ProviderStatus,
        RemoteConversation, SystemPrompt,
    },
};

/// Backend used when nothing else is configured
pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Client for the chat backend's HTTP surface
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
}

impl ChatClient {
    /// Create a client for the backend at `base_url`
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Create a client reusing an existing `reqwest::Client`
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// The backend base URL, without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Request a complete reply in one response
    pub async fn send(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChatResponse> {
        let request = ChatRequest {
            messages,
            stream: false,
            options,
        };
        tracing::debug!(
            "POST /api/chat ({} messages, model {})",
            messages.len(),
            options.model
        );
        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&request)
            .send()
            .await?;
        read_json(response).await
    }

    /// Request a streamed reply.
    ///
    /// Connection and status errors surface as the stream's first item.
    pub async fn stream(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
    ) -> Result<ChunkStream> {
        let request = ChatRequest {
            messages,
            stream: true,
            options,
        };
        tracing::debug!(
            "POST /api/chat/stream ({} messages, model {})",
            messages.len(),
            options.model
        );
        let request_builder = self
            .client
            .post(self.url("/api/chat/stream"))
            .json(&request);

        let event_source = EventSource::new(request_builder)
            .map_err(|e| Error::Sse(format!("Failed to create event source: {}", e)))?;

        Ok(Box::pin(chunk_stream(event_source)))
    }

    /// Stream a reply, handing each fragment to `on_chunk`. Errors propagate.
    pub async fn stream_message(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
        mut on_chunk: impl FnMut(&str),
    ) -> Result<()> {
        let mut chunks = self.stream(messages, options).await?;
        while let Some(chunk) = chunks.next().await {
            on_chunk(&chunk?);
        }
        Ok(())
    }

    /// Like [`stream_message`](Self::stream_message), but routes a failure to
    /// `on_error` instead of returning it.
    pub async fn stream_message_with(
        &self,
        messages: &[Message],
        options: &GenerationOptions,
        on_chunk: impl FnMut(&str),
        on_error: impl FnOnce(Error),
    ) {
        if let Err(e) = self.stream_message(messages, options, on_chunk).await {
            on_error(e);
        }
    }

    /// List models from every configured provider
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>> {
        self.get_json("/api/models").await
    }

    /// Check the status of every configured provider
    pub async fn provider_status(&self) -> Result<Vec<ProviderStatus>> {
        self.get_json("/api/models/providers").await
    }

    /// List conversations known to the backend
    pub async fn list_conversations(&self) -> Result<Vec<RemoteConversation>> {
        self.get_json("/api/chat/conversations").await
    }

    /// Fetch one conversation known to the backend
    pub async fn get_conversation(&self, id: &str) -> Result<RemoteConversation> {
        self.get_json(&format!("/api/chat/conversations/{}", urlencoding::encode(id)))
            .await
    }

    /// Drop a conversation from the backend's memory
    pub async fn delete_conversation(&self, id: &str) -> Result<()> {
        self.delete(&format!("/api/chat/conversations/{}", urlencoding::encode(id)))
            .await
    }

    /// List stored system prompts
    pub async fn list_prompts(&self) -> Result<Vec<SystemPrompt>> {
        self.get_json("/api/prompts").await
    }

    /// Fetch one stored system prompt
    pub async fn get_prompt(&self, id: &str) -> Result<SystemPrompt> {
        self.get_json(&format!("/api/prompts/{}", urlencoding::encode(id)))
            .await
    }

    /// Store a new system prompt
    pub async fn create_prompt(&self, prompt: &SystemPrompt) -> Result<SystemPrompt> {
        let response = self
            .client
            .post(self.url("/api/prompts"))
            .json(prompt)
            .send()
            .await?;
        read_json(response).await
    }

    /// Replace a stored system prompt
    pub async fn update_prompt(&self, id: &str, prompt: &SystemPrompt) -> Result<SystemPrompt> {
        let response = self
            .client
            .put(self.url(&format!("/api/prompts/{}", urlencoding::encode(id))))
            .json(prompt)
            .send()
            .await?;
        read_json(response).await
    }

    /// Remove a stored system prompt
    pub async fn delete_prompt(&self, id: &str) -> Result<()> {
        self.delete(&format!("/api/prompts/{}", urlencoding::encode(id)))
            .await
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.client.get(self.url(path)).send().await?;
        read_json(response).await
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self.client.delete(self.url(path)).send().await?;
        check_status(response).await?;
        Ok(())
    }
}

impl Default for ChatClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Status {
        status: status.as_u16(),
        body,
    })
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let response = check_status(response).await?;
    let bytes = response.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}
