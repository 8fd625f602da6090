//! Connection state shared by the lifecycle controller, router, and status surface.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Instant;
use tokio::sync::RwLock;

/// The most recent pairing QR issued by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingArtifact {
    /// Raw QR payload.
    pub payload: String,
    /// `data:image/png;base64,...` rendering, when available.
    pub data_url: Option<String>,
    pub issued_at: DateTime<Utc>,
}

impl PairingArtifact {
    pub fn new(payload: impl Into<String>, data_url: Option<String>) -> Self {
        Self {
            payload: payload.into(),
            data_url,
            issued_at: Utc::now(),
        }
    }
}

/// Lifecycle stage of the messaging session.
///
/// The pairing artifact lives inside `AwaitingPairing`, so it cannot outlive it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Unauthenticated,
    AwaitingPairing(PairingArtifact),
    Ready,
    Disconnected { reason: String },
    AuthFailed { reason: String },
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::AwaitingPairing(_) => "awaiting_pairing",
            Self::Ready => "ready",
            Self::Disconnected { .. } => "disconnected",
            Self::AuthFailed { .. } => "auth_failed",
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready)
    }

    pub fn pairing_artifact(&self) -> Option<&PairingArtifact> {
        match self {
            Self::AwaitingPairing(artifact) => Some(artifact),
            _ => None,
        }
    }
}

/// Process-wide session state. Cheap to share behind an `Arc`.
#[derive(Debug)]
pub struct SessionState {
    state: RwLock<ConnectionState>,
    started: Instant,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Unauthenticated),
            started: Instant::now(),
        }
    }

    /// Snapshot of the current state.
    pub async fn current(&self) -> ConnectionState {
        self.state.read().await.clone()
    }

    /// Replace the current state, returning the previous one.
    pub async fn transition(&self, next: ConnectionState) -> ConnectionState {
        let mut guard = self.state.write().await;
        std::mem::replace(&mut *guard, next)
    }

    pub async fn is_ready(&self) -> bool {
        self.state.read().await.is_ready()
    }

    /// Current pairing artifact, if the session is waiting for a scan.
    pub async fn pairing_artifact(&self) -> Option<PairingArtifact> {
        self.state.read().await.pairing_artifact().cloned()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_starts_unauthenticated() {
        let session = SessionState::new();
        assert_eq!(session.current().await, ConnectionState::Unauthenticated);
        assert!(session.pairing_artifact().await.is_none());
    }

    #[tokio::test]
    async fn test_artifact_only_while_awaiting_pairing() {
        let session = SessionState::new();
        session
            .transition(ConnectionState::AwaitingPairing(PairingArtifact::new(
                "qr-1", None,
            )))
            .await;
        assert_eq!(
            session.pairing_artifact().await.map(|a| a.payload),
            Some("qr-1".to_string())
        );

        let prev = session.transition(ConnectionState::Ready).await;
        assert_eq!(prev.label(), "awaiting_pairing");
        assert!(session.pairing_artifact().await.is_none());
        assert!(session.is_ready().await);
    }

    #[test]
    fn test_labels() {
        assert_eq!(
            ConnectionState::Disconnected {
                reason: "x".into()
            }
            .label(),
            "disconnected"
        );
        assert_eq!(
            ConnectionState::AuthFailed {
                reason: "x".into()
            }
            .label(),
            "auth_failed"
        );
    }
}
