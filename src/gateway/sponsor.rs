//! Short-lived sponsor codes: issued over HTTP, redeemed by sending them in chat.

use chrono::{DateTime, Duration, Utc};
use okibot_core::config::MAX_SPONSOR_CODE_TTL_MINUTES;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::info;

const CODE_LEN: usize = 6;
const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// One outstanding code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SponsorCode {
    pub code: String,
    pub phone: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Outcome of redeeming a chat message as a code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    Accepted(SponsorCode),
    Rejected,
}

#[derive(Debug)]
pub struct SponsorRegistry {
    ttl: Duration,
    codes: Mutex<HashMap<String, SponsorCode>>,
}

/// Exactly six ASCII uppercase letters or digits.
pub fn looks_like_code(body: &str) -> bool {
    body.len() == CODE_LEN
        && body
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
}

fn random_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect()
}

impl SponsorRegistry {
    /// `ttl_minutes` is clamped to 1..=[`MAX_SPONSOR_CODE_TTL_MINUTES`].
    pub fn new(ttl_minutes: u64) -> Self {
        let minutes = ttl_minutes.clamp(1, MAX_SPONSOR_CODE_TTL_MINUTES) as i64;
        Self {
            ttl: Duration::minutes(minutes),
            codes: Mutex::new(HashMap::new()),
        }
    }

    /// Purge expired codes, then issue a fresh one for `phone`.
    pub async fn issue(&self, phone: &str) -> SponsorCode {
        let now = Utc::now();
        let mut codes = self.codes.lock().await;
        codes.retain(|_, c| c.expires_at > now);

        let code = loop {
            let candidate = random_code();
            if !codes.contains_key(&candidate) {
                break candidate;
            }
        };
        let entry = SponsorCode {
            code: code.clone(),
            phone: phone.to_string(),
            issued_at: now,
            expires_at: now + self.ttl,
        };
        codes.insert(code, entry.clone());
        info!("sponsor code issued for {phone}, expires {}", entry.expires_at);
        entry
    }

    /// Consume a live code. Expired or unknown codes are rejected.
    pub async fn redeem(&self, code: &str) -> Redemption {
        let now = Utc::now();
        let mut codes = self.codes.lock().await;
        match codes.remove(code) {
            Some(entry) if entry.expires_at > now => Redemption::Accepted(entry),
            _ => Redemption::Rejected,
        }
    }

    /// Codes that have not expired, oldest first.
    pub async fn active(&self) -> Vec<SponsorCode> {
        let now = Utc::now();
        let mut active: Vec<SponsorCode> = self
            .codes
            .lock()
            .await
            .values()
            .filter(|c| c.expires_at > now)
            .cloned()
            .collect();
        active.sort_by_key(|c| c.issued_at);
        active
    }

    #[cfg(test)]
    async fn backdate(&self, code: &str, by: Duration) {
        if let Some(entry) = self.codes.lock().await.get_mut(code) {
            entry.issued_at -= by;
            entry.expires_at -= by;
        }
    }
}
