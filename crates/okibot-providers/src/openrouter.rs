//! OpenRouter provider: OpenAI-compatible chat completions routed to many models.

use async_trait::async_trait;
use okibot_core::{completion::CompletionRequest, error::OkibotError, traits::CompletionProvider};
use std::time::Instant;
use tracing::debug;

use crate::openai::{build_chat_messages, ChatCompletionRequest, ChatCompletionResponse};

pub struct OpenRouterProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenRouterProvider {
    /// Create from config values.
    pub fn from_config(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            base_url,
        }
    }
}

#[async_trait]
impl CompletionProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, OkibotError> {
        let start = Instant::now();
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: build_chat_messages(request),
            max_tokens: request.max_tokens(),
        };

        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        debug!(
            "openrouter: POST {url} model={} mode={}",
            self.model,
            request.mode.as_str()
        );

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| OkibotError::Provider(format!("openrouter request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(OkibotError::Provider(format!(
                "openrouter returned {status}: {text}"
            )));
        }

        let parsed: ChatCompletionResponse = resp.json().await.map_err(|e| {
            OkibotError::Provider(format!("openrouter: failed to parse response: {e}"))
        })?;

        debug!(
            "openrouter: {} tokens in {}ms",
            parsed
                .usage
                .as_ref()
                .and_then(|u| u.total_tokens)
                .unwrap_or_default(),
            start.elapsed().as_millis()
        );
        Ok(parsed.first_text())
    }
}
