//! Transport abstraction between the session and the backend

use async_trait::async_trait;
use neethi_api::{ChatClient, ChatResponse, ChunkStream, GenerationOptions, Message, Result};

/// Transport for chat completions
#[async_trait]
pub trait Transport: Send + Sync {
    /// Request a complete reply for `messages`
    async fn complete(
        &self,
        messages: Vec<Message>,
        options: &GenerationOptions,
    ) -> Result<ChatResponse>;

    /// Request a streamed reply for `messages`
    async fn stream(&self, messages: Vec<Message>, options: &GenerationOptions)
    -> Result<ChunkStream>;
}

/// Talks to the backend over HTTP
#[async_trait]
impl Transport for ChatClient {
    async fn complete(
        &self,
        messages: Vec<Message>,
        options: &GenerationOptions,
    ) -> Result<ChatResponse> {
        self.send(&messages, options).await
    }

    async fn stream(
        &self,
        messages: Vec<Message>,
        options: &GenerationOptions,
    ) -> Result<ChunkStream> {
        ChatClient::stream(self, &messages, options).await
    }
}
