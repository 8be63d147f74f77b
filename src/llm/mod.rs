//! Language-model completion capability.
//!
//! The orchestrator consumes a [`CompletionBackend`] and never depends on a
//! concrete provider. Two implementations ship with the crate:
//!
//! | Backend                  | Use                                              |
//! |--------------------------|--------------------------------------------------|
//! | [`OpenAiCompatibleBackend`] | `/chat/completions` over HTTP with SSE streaming |
//! | [`ScriptedBackend`]      | deterministic replies for tests and dry runs     |

pub mod openai;
pub mod scripted;

pub use openai::OpenAiCompatibleBackend;
pub use scripted::{ScriptedBackend, ScriptedReply};

use crate::errors::BackendError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One turn of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Generation parameters for one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Everything the backend needs for one completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub history: Vec<ChatMessage>,
    pub user_input: String,
    pub params: CompletionParams,
}

impl CompletionRequest {
    /// Flatten into the chat message list most providers expect.
    pub fn to_messages(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        if !self.system_prompt.is_empty() {
            messages.push(ChatMessage::system(self.system_prompt.clone()));
        }
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(self.user_input.clone()));
        messages
    }
}

/// Sink for streamed text deltas.
pub type DeltaSink<'a> = &'a mut (dyn FnMut(&str) + Send);

/// A language-model completion provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    /// Short provider name for logs.
    fn name(&self) -> &str;

    /// Produce the full completion text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, BackendError>;

    /// Produce the completion incrementally, handing each delta to `on_delta`,
    /// and return the full text.
    ///
    /// Default implementation falls back to [`complete`](Self::complete) and
    /// delivers the whole text as a single delta.
    async fn complete_streaming(
        &self,
        request: &CompletionRequest,
        on_delta: DeltaSink<'_>,
    ) -> Result<String, BackendError> {
        let text = self.complete(request).await?;
        if !text.is_empty() {
            on_delta(&text);
        }
        Ok(text)
    }
}
