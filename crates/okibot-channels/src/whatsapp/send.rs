//! Outbound helpers: recipient parsing, payload rendering, retrying send.

use okibot_core::{error::OkibotError, message::OutboundPayload};
use std::time::Duration;
use tracing::{error, warn};
use wacore_binary::jid::Jid;
use whatsapp_rust::client::Client;

/// Backoff between send attempts: 500ms, 1s, 2s.
pub(super) const RETRY_DELAYS_MS: [u64; 3] = [500, 1000, 2000];

const USER_SERVER: &str = "s.whatsapp.net";

/// Accept a full JID, a legacy `@c.us` id, or a bare phone number.
pub(super) fn parse_jid(recipient: &str) -> Result<Jid, OkibotError> {
    let recipient = recipient.trim();
    let normalized = match recipient.split_once('@') {
        Some((user, "c.us")) => format!("{user}@{USER_SERVER}"),
        Some(_) => recipient.to_string(),
        None => {
            let digits: String = recipient.chars().filter(char::is_ascii_digit).collect();
            if digits.is_empty() {
                return Err(OkibotError::Transport(format!(
                    "invalid whatsapp recipient '{recipient}'"
                )));
            }
            format!("{digits}@{USER_SERVER}")
        }
    };
    normalized
        .parse()
        .map_err(|e| OkibotError::Transport(format!("invalid whatsapp JID '{normalized}': {e}")))
}

/// Media goes out as its caption followed by the link.
pub(super) fn render(payload: OutboundPayload) -> String {
    match payload {
        OutboundPayload::Text(text) => text,
        OutboundPayload::Media { url, caption } => match caption {
            Some(caption) if !caption.is_empty() => format!("{caption}\n{url}"),
            _ => url,
        },
    }
}

/// Send with up to three attempts. Returns the message id.
pub(super) async fn retry_send(
    client: &Client,
    jid: &Jid,
    msg: waproto::whatsapp::Message,
) -> Result<String, OkibotError> {
    let attempts = RETRY_DELAYS_MS.len();
    let mut last_err = String::new();

    for (attempt, delay_ms) in RETRY_DELAYS_MS.iter().enumerate() {
        match client.send_message(jid.clone(), msg.clone()).await {
            Ok(id) => return Ok(id),
            Err(e) => {
                let n = attempt + 1;
                if n < attempts {
                    warn!("whatsapp send {n}/{attempts} to {jid} failed: {e}, retrying in {delay_ms}ms");
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                } else {
                    error!("whatsapp send {n}/{attempts} to {jid} failed: {e}, giving up");
                }
                last_err = e.to_string();
            }
        }
    }

    Err(OkibotError::Transport(format!(
        "whatsapp send failed after {attempts} attempts: {last_err}"
    )))
}
