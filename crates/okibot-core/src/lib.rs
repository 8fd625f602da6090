//! # okibot-core
//!
//! Core types, traits, configuration, and error handling for okibot.

pub mod completion;
pub mod config;
pub mod error;
pub mod message;
pub mod state;
pub mod traits;
