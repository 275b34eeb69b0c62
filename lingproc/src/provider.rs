//! [`Chatter`] backed by an Ollama server.

use anyhow::Context;
use async_trait::async_trait;
use ollama_rs::{Ollama, generation::completion::request::GenerationRequest};
use tokio_stream::StreamExt;
use tracing::debug;

use crate::{ChatContext, ChatStream, Chatter, Message, Role};

/// Streams chat replies from a single model on an Ollama server.
pub struct OllamaProvider {
    client: Ollama,
    model: String,
}

impl OllamaProvider {
    /// Create a provider for `model` on the server at `base_url`
    /// (e.g. `http://localhost:11434`).
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not a valid URL.
    pub fn new(base_url: impl AsRef<str>, model: impl Into<String>) -> anyhow::Result<Self> {
        let client = Ollama::try_new(base_url.as_ref())
            .with_context(|| format!("invalid Ollama url {}", base_url.as_ref()))?;
        Ok(Self {
            client,
            model: model.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Flatten the dialog into a single generation prompt.
    fn render_history(history: &[Message]) -> String {
        let mut prompt = String::new();
        for msg in history {
            let speaker = match msg.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            prompt.push_str(speaker);
            prompt.push_str(": ");
            prompt.push_str(msg.content.trim());
            prompt.push('\n');
        }
        prompt.push_str("Assistant:");
        prompt
    }
}

#[async_trait]
impl Chatter for OllamaProvider {
    async fn chat(&self, ctx: ChatContext<'_>) -> anyhow::Result<ChatStream> {
        let prompt = Self::render_history(ctx.history);
        debug!(model = %self.model, turns = ctx.history.len(), "starting chat stream");
        let req = GenerationRequest::new(self.model.clone(), prompt)
            .system(ctx.system_prompt.to_string());
        let stream = self
            .client
            .generate_stream(req)
            .await
            .context("ollama generate request failed")?;
        let mapped = stream.map(|res| {
            res.map_err(|e| anyhow::anyhow!("ollama stream error: {e}"))
                .map(|chunk| {
                    chunk
                        .into_iter()
                        .map(|c| c.response)
                        .collect::<Vec<_>>()
                        .join("")
                })
        });
        Ok(Box::pin(mapped))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_rendered_in_order() {
        let history = vec![
            Message::user("Hi"),
            Message::assistant("Hello! "),
            Message::user("How are you?"),
        ];
        let prompt = OllamaProvider::render_history(&history);
        assert_eq!(
            prompt,
            "User: Hi\nAssistant: Hello!\nUser: How are you?\nAssistant:"
        );
    }
}
