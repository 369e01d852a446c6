//! Model call capability.
//!
//! Prompt payloads are opaque to the engine; this module only defines the
//! wire shapes (OpenAI-compatible chat messages, optionally multimodal) and
//! the [`ChatModel`] seam the discovery layer calls through.

mod routed;

pub use routed::RoutedClient;

use crate::config::CallPurpose;
use crate::error::EngineResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A model call backend.
///
/// [`RoutedClient`] is the production implementation; tests substitute
/// canned responders.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run a completion and return the raw response text.
    ///
    /// `purpose` selects the model priority chain the backend walks.
    async fn complete(
        &self,
        purpose: CallPurpose,
        messages: Vec<Message>,
        options: &CompletionOptions,
    ) -> EngineResult<String>;
}

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Role: "system", "user", or "assistant".
    pub role: String,
    /// Message content.
    pub content: MessageContent,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(content.into()),
        }
    }

    /// Create a user message with an embedded PNG image.
    pub fn user_with_image(text: impl Into<String>, image_base64: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::MultiPart(vec![
                ContentPart::Text { text: text.into() },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{}", image_base64.into()),
                    },
                },
            ]),
        }
    }
}

/// Message content, either plain text or multi-part (text + images).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text content.
    Text(String),
    /// Multi-part content.
    MultiPart(Vec<ContentPart>),
}

/// A part of multi-part content.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text part.
    Text {
        /// The text.
        text: String,
    },
    /// Image part.
    ImageUrl {
        /// The image reference.
        image_url: ImageUrl,
    },
}

/// Image URL for vision models (data URLs with base64 payloads).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    /// URL, typically `data:image/png;base64,...`.
    pub url: String,
}

/// Options for completion requests.
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Request strict JSON output from the provider.
    pub json_mode: bool,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_tokens: 4096,
            json_mode: false,
        }
    }
}

impl CompletionOptions {
    /// Options for a structured-JSON call.
    pub fn json() -> Self {
        Self {
            json_mode: true,
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_message_serializes_flat() {
        let msg = Message::user("hello");
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["role"], "user");
        assert_eq!(v["content"], "hello");
    }

    #[test]
    fn test_image_message_serializes_multipart() {
        let msg = Message::user_with_image("describe", "QUJD");
        let v = serde_json::to_value(&msg).unwrap();
        let parts = v["content"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[1]["type"], "image_url");
        assert!(parts[1]["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,QUJD"));
    }

    #[test]
    fn test_completion_options_json() {
        let opts = CompletionOptions::json();
        assert!(opts.json_mode);
        assert_eq!(opts.max_tokens, 4096);
    }
}
