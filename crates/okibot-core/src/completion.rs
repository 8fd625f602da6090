use serde::{Deserialize, Serialize};

/// What a completion call is for. Providers use it to pick token limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    Summarize,
    Reply,
    Vision,
}

impl CompletionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Reply => "reply",
            Self::Vision => "vision",
        }
    }
}

/// Image input for vision requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageInput {
    Url(String),
    Inline { mimetype: String, data: Vec<u8> },
}

/// A single request to a completion provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub mode: CompletionMode,
    /// The user's text, verbatim (command argument or full message body).
    pub text: String,
    /// Framing sent as the system instruction (persona, summarization rules).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageInput>,
}

impl CompletionRequest {
    pub fn new(mode: CompletionMode, text: impl Into<String>) -> Self {
        Self {
            mode,
            text: text.into(),
            instruction: None,
            image: None,
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        let instruction = instruction.into();
        if !instruction.is_empty() {
            self.instruction = Some(instruction);
        }
        self
    }

    pub fn with_image(mut self, image: ImageInput) -> Self {
        self.image = Some(image);
        self
    }

    /// Output token cap for this mode, if any.
    pub fn max_tokens(&self) -> Option<u32> {
        match self.mode {
            CompletionMode::Summarize => Some(300),
            CompletionMode::Vision => Some(500),
            CompletionMode::Reply => None,
        }
    }
}
