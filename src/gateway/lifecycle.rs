//! Session lifecycle: reacts to transport events and supervises reconnects.

use okibot_channels::whatsapp::{generate_qr_data_url, generate_qr_terminal};
use okibot_core::{
    message::TransportEvent,
    state::{ConnectionState, PairingArtifact},
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::Shared;

/// A scheduled re-initialization that has not fired or been cancelled yet.
struct PendingReconnect {
    generation: u64,
    token: CancellationToken,
}

pub struct Lifecycle {
    shared: Arc<Shared>,
    reconnect_delay: Duration,
    auto_backup: bool,
    /// Fires the generation of a reconnect whose delay elapsed.
    reinit_tx: mpsc::Sender<u64>,
    shutdown: CancellationToken,
    pending: Option<PendingReconnect>,
    generation: u64,
}

impl Lifecycle {
    pub fn new(
        shared: Arc<Shared>,
        reconnect_delay: Duration,
        auto_backup: bool,
        reinit_tx: mpsc::Sender<u64>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            shared,
            reconnect_delay,
            auto_backup,
            reinit_tx,
            shutdown,
            pending: None,
            generation: 0,
        }
    }

    /// Apply one lifecycle event.
    pub async fn handle(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::PairingIssued(payload) => self.on_pairing(payload).await,
            TransportEvent::Authenticated => info!("session authenticated"),
            TransportEvent::AuthFailed(reason) => {
                error!("authentication failed: {reason}");
                self.shared
                    .session
                    .transition(ConnectionState::AuthFailed { reason })
                    .await;
            }
            TransportEvent::Ready => self.on_ready().await,
            TransportEvent::Disconnected(reason) => {
                // Auth failure is terminal: the drop that follows it is not retried.
                if let ConnectionState::AuthFailed { .. } = self.shared.session.current().await {
                    warn!("disconnected ({reason}) after authentication failure, not reconnecting");
                    return;
                }
                warn!(
                    "disconnected ({reason}), reconnecting in {}s",
                    self.reconnect_delay.as_secs()
                );
                self.shared
                    .session
                    .transition(ConnectionState::Disconnected { reason })
                    .await;
                self.schedule_reconnect();
            }
            TransportEvent::MessageReceived(msg) => {
                debug!("lifecycle ignoring message from {}", msg.sender)
            }
        }
    }

    /// The fresh transport did not start. Counts as a drop.
    pub async fn start_failed(&mut self, reason: String) {
        self.shared
            .session
            .transition(ConnectionState::Disconnected { reason })
            .await;
        self.schedule_reconnect();
    }

    async fn on_pairing(&mut self, payload: String) {
        info!("pairing QR received");
        match generate_qr_terminal(&payload) {
            Ok(qr) => info!("scan with WhatsApp > Linked devices:\n{qr}"),
            Err(e) => warn!("terminal QR rendering failed: {e}"),
        }
        let data_url = generate_qr_data_url(&payload)
            .map_err(|e| warn!("QR image rendering failed: {e}"))
            .ok();
        self.shared
            .session
            .transition(ConnectionState::AwaitingPairing(PairingArtifact::new(
                payload, data_url,
            )))
            .await;
    }

    async fn on_ready(&mut self) {
        info!("{} is ready and connected ✅", self.shared.bot_name);
        self.cancel_pending();
        self.shared.session.transition(ConnectionState::Ready).await;

        if self.auto_backup {
            let shared = self.shared.clone();
            tokio::spawn(async move { shared.backup("on-ready").await });
        }
    }

    /// Schedule a full re-initialization after the reconnect delay, replacing
    /// any reconnect already pending.
    pub fn schedule_reconnect(&mut self) {
        self.cancel_pending();
        self.generation += 1;
        let generation = self.generation;
        let token = self.shutdown.child_token();
        let delay = self.reconnect_delay;
        let tx = self.reinit_tx.clone();

        let task_token = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => debug!("reconnect #{generation} cancelled"),
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(generation).await;
                }
            }
        });
        self.pending = Some(PendingReconnect { generation, token });
    }

    /// Whether a fired reconnect is still wanted. Consumes it if so.
    pub fn claim_reconnect(&mut self, generation: u64) -> bool {
        match &self.pending {
            Some(p) if p.generation == generation && !p.token.is_cancelled() => {
                self.pending = None;
                true
            }
            _ => {
                debug!("stale reconnect #{generation} ignored");
                false
            }
        }
    }

    pub fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.token.cancel();
        }
    }
}
