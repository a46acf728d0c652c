/// OpenAI-compatible HTTP backend.
pub mod openai;

use async_trait::async_trait;
use fleet_core::FleetResult;
use serde::{Deserialize, Serialize};

pub use openai::OpenAiBackend;

/// Speaker of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// Instructions.
    System,
    /// Caller input.
    User,
    /// Model output.
    Assistant,
}

/// One message of a chat completion request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who is speaking.
    pub role: ChatRole,
    /// Message text.
    pub content: String,
}

impl ChatMessage {
    /// A system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// A user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// An assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Trait for chat-completion providers.
///
/// Both the reasoning calls ([`crate::ChatReasoningCall`]) and chat-backed
/// agents sit on top of this. Implementations classify failures: rate limits,
/// server errors and transport problems are transient, everything else fatal.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Non-streaming completion returning the assistant's text.
    async fn complete(&self, messages: &[ChatMessage]) -> FleetResult<String>;
}
