//! Ledger of senders that already received the welcome message.
//!
//! Stored as a flat JSON object `{ "<sender>": "<first seen, RFC 3339>" }`.

use chrono::{DateTime, Utc};
use okibot_core::error::OkibotError;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub struct SeenSenders {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, DateTime<Utc>>>,
}

impl SeenSenders {
    /// Load the ledger from disk. A missing file is an empty ledger; an
    /// unreadable one is logged and replaced on the next write.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self, OkibotError> {
        let path = path.into();
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => BTreeMap::new(),
            Ok(content) => match serde_json::from_str(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!("seen ledger {} is corrupt, starting empty: {e}", path.display());
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(OkibotError::Io(e)),
        };
        debug!("loaded {} seen senders from {}", entries.len(), path.display());
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn contains(&self, sender: &str) -> bool {
        self.entries.lock().await.contains_key(sender)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Record `sender`. Returns `true` the first time a sender is seen.
    ///
    /// A failed write is logged; the sender still counts as seen for this process.
    pub async fn mark_seen(&self, sender: &str) -> bool {
        let mut entries = self.entries.lock().await;
        if entries.contains_key(sender) {
            return false;
        }
        entries.insert(sender.to_string(), Utc::now());
        if let Err(e) = persist(&self.path, &entries).await {
            warn!("failed to persist seen ledger {}: {e}", self.path.display());
        }
        true
    }
}

/// Write via a temp file + rename so a crash never leaves half a document.
async fn persist(path: &Path, entries: &BTreeMap<String, DateTime<Utc>>) -> Result<(), OkibotError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let json = serde_json::to_vec_pretty(entries)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_first_sighting_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let seen = SeenSenders::load(dir.path().join("seen.json")).await.unwrap();
        assert!(seen.mark_seen("a@c.us").await);
        assert!(!seen.mark_seen("a@c.us").await);
        assert!(seen.mark_seen("b@c.us").await);
        assert_eq!(seen.len().await, 2);
    }

    #[tokio::test]
    async fn test_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/seen.json");
        {
            let seen = SeenSenders::load(&path).await.unwrap();
            assert!(seen.is_empty().await);
            assert!(seen.mark_seen("a@c.us").await);
        }
        let reloaded = SeenSenders::load(&path).await.unwrap();
        assert!(reloaded.contains("a@c.us").await);
        assert!(!reloaded.mark_seen("a@c.us").await);
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty_and_is_rewritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("seen.json");
        std::fs::write(&path, "{not json").unwrap();

        let seen = SeenSenders::load(&path).await.unwrap();
        assert!(seen.is_empty().await);
        assert!(seen.mark_seen("x@c.us").await);

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: BTreeMap<String, DateTime<Utc>> = serde_json::from_str(&content).unwrap();
        assert!(parsed.contains_key("x@c.us"));
    }
}
