//! Gateway: the event loop tying the transport, the lifecycle controller, and the router together.

mod lifecycle;
mod routing;
pub mod sponsor;

#[cfg(test)]
mod tests;

pub use lifecycle::Lifecycle;
pub use routing::Router;
pub use sponsor::SponsorRegistry;

use okibot_core::{
    config::Config,
    message::{InboundMessage, TransportEvent},
    state::{ConnectionState, SessionState},
    traits::{Transport, TransportFactory},
};
use okibot_memory::{SeenSenders, SnapshotManager};
use std::{path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// State shared by the gateway loop, the router, and the HTTP surface.
pub struct Shared {
    pub bot_name: String,
    pub session: SessionState,
    pub seen: SeenSenders,
    pub snapshots: SnapshotManager,
    /// Directory archived by snapshots.
    pub auth_dir: PathBuf,
    /// Present only in sponsor pairing mode.
    pub sponsors: Option<SponsorRegistry>,
    transport: RwLock<Option<Arc<dyn Transport>>>,
}

impl Shared {
    pub fn new(
        bot_name: impl Into<String>,
        seen: SeenSenders,
        snapshots: SnapshotManager,
        auth_dir: PathBuf,
        sponsors: Option<SponsorRegistry>,
    ) -> Self {
        Self {
            bot_name: bot_name.into(),
            session: SessionState::new(),
            seen,
            snapshots,
            auth_dir,
            sponsors,
            transport: RwLock::new(None),
        }
    }

    /// The transport of the current session attempt, if one started.
    pub async fn current_transport(&self) -> Option<Arc<dyn Transport>> {
        self.transport.read().await.clone()
    }

    /// Archive the auth directory. Failures are logged and swallowed.
    pub async fn backup(&self, trigger: &str) {
        match self.snapshots.snapshot(&self.auth_dir).await {
            Ok(Some(record)) => info!("{trigger} snapshot saved: {}", record.name),
            Ok(None) => debug!("{trigger} snapshot skipped: no auth directory yet"),
            Err(e) => warn!("{trigger} snapshot failed: {e}"),
        }
    }
}

/// Timing and toggles for the gateway's background work.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub reconnect_delay: Duration,
    /// `None` disables keep-alive pings.
    pub keep_alive: Option<Duration>,
    /// `None` disables periodic snapshots.
    pub snapshot_interval: Option<Duration>,
    pub auto_backup: bool,
}

impl GatewaySettings {
    pub fn from_config(config: &Config) -> Self {
        let minutes = |m: u64| Duration::from_secs(m * 60);
        Self {
            reconnect_delay: Duration::from_secs(config.transport.reconnect_delay_secs),
            keep_alive: (config.transport.keep_alive_minutes > 0)
                .then(|| minutes(config.transport.keep_alive_minutes)),
            snapshot_interval: (config.snapshot.periodic && config.snapshot.interval_minutes > 0)
                .then(|| minutes(config.snapshot.interval_minutes)),
            auto_backup: config.snapshot.auto_backup,
        }
    }
}

/// Owns the transport slot and consumes transport events in delivery order.
pub struct Gateway {
    shared: Arc<Shared>,
    factory: Arc<dyn TransportFactory>,
    router: Arc<Router>,
    settings: GatewaySettings,
}

async fn next_event(events: &mut Option<mpsc::Receiver<TransportEvent>>) -> Option<TransportEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

impl Gateway {
    pub fn new(
        shared: Arc<Shared>,
        factory: Arc<dyn TransportFactory>,
        router: Arc<Router>,
        settings: GatewaySettings,
    ) -> Self {
        Self {
            shared,
            factory,
            router,
            settings,
        }
    }

    /// Run until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let (reinit_tx, mut reinit_rx) = mpsc::channel::<u64>(8);
        let mut lifecycle = Lifecycle::new(
            self.shared.clone(),
            self.settings.reconnect_delay,
            self.settings.auto_backup,
            reinit_tx,
            shutdown.clone(),
        );

        info!(
            "{} gateway running | auto-backup: {}",
            self.shared.bot_name,
            if self.settings.auto_backup { "on" } else { "off" },
        );

        let mut events = None;
        self.connect(&mut lifecycle, &mut events).await;

        let mut background = Vec::new();
        if let Some(period) = self.settings.keep_alive {
            background.push(tokio::spawn(keep_alive_loop(
                self.shared.clone(),
                period,
                shutdown.clone(),
            )));
        }
        if let Some(period) = self.settings.snapshot_interval {
            background.push(tokio::spawn(snapshot_loop(
                self.shared.clone(),
                period,
                shutdown.clone(),
            )));
        }

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown requested");
                    break;
                }
                Some(generation) = reinit_rx.recv() => {
                    if lifecycle.claim_reconnect(generation) {
                        self.connect(&mut lifecycle, &mut events).await;
                    }
                }
                event = next_event(&mut events) => match event {
                    Some(TransportEvent::MessageReceived(msg)) => self.dispatch(msg).await,
                    Some(event) => lifecycle.handle(event).await,
                    None => {
                        events = None;
                        lifecycle
                            .handle(TransportEvent::Disconnected("event stream closed".into()))
                            .await;
                    }
                },
            }
        }

        lifecycle.cancel_pending();
        if let Some(transport) = self.shared.transport.write().await.take() {
            if let Err(e) = transport.stop().await {
                warn!("transport stop failed: {e}");
            }
        }
        for handle in background {
            let _ = handle.await;
        }
        info!("gateway stopped");
        Ok(())
    }

    /// Replace the current transport with a fresh one and start it.
    async fn connect(
        &self,
        lifecycle: &mut Lifecycle,
        events: &mut Option<mpsc::Receiver<TransportEvent>>,
    ) {
        *events = None;
        let previous = self.shared.transport.write().await.take();
        if let Some(old) = previous {
            if let Err(e) = old.stop().await {
                warn!("stopping previous transport failed: {e}");
            }
        }

        let transport = self.factory.create();
        self.shared
            .session
            .transition(ConnectionState::Unauthenticated)
            .await;
        match transport.start().await {
            Ok(rx) => {
                info!("transport {} started", transport.name());
                *events = Some(rx);
                *self.shared.transport.write().await = Some(transport);
            }
            Err(e) => {
                error!("transport {} failed to start: {e}", transport.name());
                lifecycle.start_failed(e.to_string()).await;
            }
        }
    }

    /// Hand a message to the router on its own task. Dropped unless ready.
    async fn dispatch(&self, msg: InboundMessage) {
        let state = self.shared.session.current().await;
        if !state.is_ready() {
            debug!(
                "dropping message from {} while {}",
                msg.sender,
                state.label()
            );
            return;
        }
        let Some(transport) = self.shared.current_transport().await else {
            debug!("dropping message from {}: no transport", msg.sender);
            return;
        };
        let router = self.router.clone();
        tokio::spawn(async move {
            router.dispatch(transport, msg).await;
        });
    }
}

async fn keep_alive_loop(shared: Arc<Shared>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let Some(transport) = shared.current_transport().await else {
                    continue;
                };
                info!("keep-alive ping");
                if let Err(e) = transport.keep_alive().await {
                    warn!("keep-alive failed: {e}");
                }
            }
        }
    }
}

async fn snapshot_loop(shared: Arc<Shared>, period: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => shared.backup("periodic").await,
        }
    }
}
