//! OpenAI-compatible chat completion wire types.
//!
//! Shared by every provider that speaks the `/chat/completions` dialect.

use base64::{engine::general_purpose::STANDARD, Engine};
use okibot_core::completion::{CompletionRequest, ImageInput};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Debug, Clone)]
pub(crate) struct ChatMessage {
    pub role: String,
    pub content: ChatContent,
}

/// Plain text, or a list of parts when an image is attached.
#[derive(Serialize, Debug, Clone)]
#[serde(untagged)]
pub(crate) enum ChatContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize, Debug, Clone)]
pub(crate) struct ImageUrl {
    pub url: String,
}

#[derive(Serialize)]
pub(crate) struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Deserialize)]
pub(crate) struct ChatCompletionResponse {
    pub choices: Option<Vec<ChatChoice>>,
    pub usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
pub(crate) struct ChatChoice {
    pub message: Option<ChatResponseMessage>,
}

#[derive(Deserialize)]
pub(crate) struct ChatResponseMessage {
    pub content: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ChatUsage {
    pub total_tokens: Option<u64>,
}

impl ChatCompletionResponse {
    /// Text of the first choice. Empty when the model returned nothing.
    pub fn first_text(&self) -> String {
        self.choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
            .map(|t| t.trim().to_string())
            .unwrap_or_default()
    }
}

/// Render an image input as something `image_url` accepts.
pub(crate) fn image_url(image: &ImageInput) -> String {
    match image {
        ImageInput::Url(url) => url.clone(),
        ImageInput::Inline { mimetype, data } => {
            format!("data:{mimetype};base64,{}", STANDARD.encode(data))
        }
    }
}

/// Build the message list: instruction as a system message, then the user turn.
pub(crate) fn build_chat_messages(request: &CompletionRequest) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(2);
    if let Some(instruction) = &request.instruction {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: ChatContent::Text(instruction.clone()),
        });
    }

    let content = match &request.image {
        Some(image) => {
            let mut parts = Vec::with_capacity(2);
            if !request.text.is_empty() {
                parts.push(ContentPart::Text {
                    text: request.text.clone(),
                });
            }
            parts.push(ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: image_url(image),
                },
            });
            ChatContent::Parts(parts)
        }
        None => ChatContent::Text(request.text.clone()),
    };
    messages.push(ChatMessage {
        role: "user".to_string(),
        content,
    });
    messages
}
