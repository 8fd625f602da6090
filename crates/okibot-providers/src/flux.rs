//! Flux image generation API.

use async_trait::async_trait;
use okibot_core::{error::OkibotError, traits::ImageProvider};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct FluxImageProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl FluxImageProvider {
    pub fn from_config(api_key: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    prompt: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    url: Option<String>,
}

#[async_trait]
impl ImageProvider for FluxImageProvider {
    fn name(&self) -> &str {
        "flux"
    }

    async fn generate(&self, prompt: &str) -> Result<String, OkibotError> {
        let url = format!("{}/generate", self.base_url.trim_end_matches('/'));
        debug!("flux: POST {url}");

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&GenerateRequest { prompt })
            .send()
            .await
            .map_err(|e| OkibotError::Provider(format!("flux request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(OkibotError::Provider(format!("flux returned {status}: {text}")));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| OkibotError::Provider(format!("flux: failed to parse response: {e}")))?;

        parsed
            .url
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| OkibotError::Provider("flux: response has no image url".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_generate_returns_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .and(header("authorization", "Bearer flux-key"))
            .and(body_json(serde_json::json!({"prompt": "a red bicycle"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"url": "https://img/123.png"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let p = FluxImageProvider::from_config("flux-key".into(), format!("{}/v1", server.uri()));
        assert_eq!(p.generate("a red bicycle").await.unwrap(), "https://img/123.png");
    }

    #[tokio::test]
    async fn test_missing_url_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "x"})))
            .mount(&server)
            .await;

        let p = FluxImageProvider::from_config("k".into(), server.uri());
        assert!(matches!(p.generate("x").await, Err(OkibotError::Provider(_))));
    }

    #[tokio::test]
    async fn test_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let p = FluxImageProvider::from_config("k".into(), server.uri());
        let err = p.generate("x").await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
