//! # okibot-channels
//!
//! Messaging transport integrations for okibot.

pub mod whatsapp;
pub mod whatsapp_store;
