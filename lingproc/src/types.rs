use anyhow::Result;
use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

/// Speaker roles for a chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Assistant,
    User,
}

/// Message in a chat exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Stream of chat response deltas.
///
/// Each item carries only new text. An `Err` item is terminal.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Context for generating a chat response.
#[derive(Debug, Clone)]
pub struct ChatContext<'a> {
    /// Instructions guiding the assistant's behavior.
    pub system_prompt: &'a str,
    /// Previous dialog turns, ending with the user's latest message.
    pub history: &'a [Message],
}

#[async_trait]
pub trait Chatter: Send + Sync {
    async fn chat(&self, ctx: ChatContext<'_>) -> Result<ChatStream>;
}
