use crate::{
    completion::CompletionRequest,
    error::OkibotError,
    message::{OutboundPayload, TransportEvent},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Text completion backend (OpenRouter, Gemini, ...).
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Run one completion and return the model's text. An empty string means
    /// the model produced nothing.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, OkibotError>;
}

/// Image generation backend.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Generate an image and return a URL pointing at it.
    async fn generate(&self, prompt: &str) -> Result<String, OkibotError>;
}

/// Messaging transport: pairing, lifecycle events and message delivery.
///
/// One instance covers one session attempt. Reconnecting means dropping the
/// instance and asking the [`TransportFactory`] for a fresh one.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &str;

    /// Start the session. Returns a receiver that yields events in delivery order.
    async fn start(&self) -> Result<mpsc::Receiver<TransportEvent>, OkibotError>;

    /// Deliver a payload to a recipient.
    async fn send(&self, recipient: &str, payload: OutboundPayload) -> Result<(), OkibotError>;

    /// Cheap round-trip that keeps the session warm.
    async fn keep_alive(&self) -> Result<(), OkibotError> {
        Ok(())
    }

    /// Tear the session down.
    async fn stop(&self) -> Result<(), OkibotError>;
}

/// Builds fresh transport instances.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Arc<dyn Transport>;
}
