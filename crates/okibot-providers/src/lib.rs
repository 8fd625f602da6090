//! # okibot-providers
//!
//! Completion and image provider implementations for okibot.

pub mod flux;
pub mod gemini;
pub mod openai;
pub mod openrouter;

pub use flux::FluxImageProvider;
pub use gemini::GeminiProvider;
pub use openrouter::OpenRouterProvider;
