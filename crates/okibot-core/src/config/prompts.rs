use serde::{Deserialize, Serialize};

/// Instructions sent alongside each completion mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompts {
    /// Persona for free-form replies.
    #[serde(default = "default_persona")]
    pub persona: String,
    #[serde(default = "default_summarize")]
    pub summarize: String,
    #[serde(default = "default_vision")]
    pub vision: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            persona: default_persona(),
            summarize: default_summarize(),
            vision: default_vision(),
        }
    }
}

fn default_persona() -> String {
    "Tu es OkitakoyBot, un assistant WhatsApp professionnel, poli et utile. \
     Réponds clairement en français formel."
        .to_string()
}

fn default_summarize() -> String {
    "Résume ce texte en français de manière concise.".to_string()
}

fn default_vision() -> String {
    "Décris cette image en français de manière claire et précise.".to_string()
}
