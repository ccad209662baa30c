//! Completion API client.
//!
//! [`CompletionClient`] is the seam between the send pipeline and the
//! network. [`GroqClient`] implements it for any OpenAI-compatible
//! `chat/completions` endpoint; tests substitute scripted clients.

pub mod groq;

pub use groq::{GroqClient, GroqConnector};

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde::Serialize;

use crate::chat::{MessageContent, Role};
use crate::error::ChatResult;

/// Stream of assistant text fragments in arrival order.
pub type FragmentStream = Pin<Box<dyn Stream<Item = ChatResult<String>> + Send>>;

/// Message as sent on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    /// Author.
    pub role: Role,
    /// Normalized content.
    pub content: MessageContent,
}

/// Parameters of one completion call (the `stream` flag is set per call).
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompletionRequest {
    /// System instruction followed by the sanitized history.
    pub messages: Vec<WireMessage>,
    /// Model identifier.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Token ceiling for the reply.
    pub max_completion_tokens: u32,
    /// Nucleus sampling mass.
    pub top_p: f64,
    /// Stop sequences; always sent, `null` when unset.
    pub stop: Option<Vec<String>>,
}

/// Chat completion backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Request a whole reply.
    ///
    /// # Errors
    /// Returns an error on transport failure, non-success status, or a
    /// response without assistant content.
    async fn complete(&self, request: &CompletionRequest) -> ChatResult<String>;

    /// Open a streamed reply.
    ///
    /// # Errors
    /// Returns an error if the stream cannot be opened; errors while reading
    /// are yielded by the stream.
    async fn stream(&self, request: &CompletionRequest) -> ChatResult<FragmentStream>;
}

/// Builds a client for an API key.
pub trait ClientFactory: Send + Sync {
    /// Create a client authenticated with `api_key`.
    ///
    /// # Errors
    /// Returns an error if the client cannot be built.
    fn connect(&self, api_key: &str) -> ChatResult<Arc<dyn CompletionClient>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ContentPart;

    #[test]
    fn test_request_wire_shape() {
        let request = CompletionRequest {
            messages: vec![
                WireMessage {
                    role: Role::System,
                    content: MessageContent::Text("sys".to_string()),
                },
                WireMessage {
                    role: Role::User,
                    content: MessageContent::Parts(vec![ContentPart::text("hi")]),
                },
            ],
            model: "m".to_string(),
            temperature: 0.5,
            max_completion_tokens: 64,
            top_p: 1.0,
            stop: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"][0]["type"], "text");
        assert_eq!(json["max_completion_tokens"], 64);
        assert_eq!(json["top_p"], 1.0);
        assert!(json["stop"].is_null());
    }
}
