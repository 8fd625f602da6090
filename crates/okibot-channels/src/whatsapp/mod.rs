//! WhatsApp transport running the `whatsapp-rust` client in-process.
//!
//! Each transport instance is one session attempt: `start` opens the SQLite
//! session store under the auth directory, builds the client and runs it in
//! the background. Client events are translated to [`TransportEvent`]s.

mod events;
mod qr;
mod send;

#[cfg(test)]
mod tests;

pub use qr::{generate_qr_data_url, generate_qr_image, generate_qr_terminal};

use crate::whatsapp_store::{SessionStore, SESSION_DB};
use async_trait::async_trait;
use events::ClientSlot;
use okibot_core::{
    config::TransportConfig,
    error::OkibotError,
    message::{OutboundPayload, TransportEvent},
    traits::{Transport, TransportFactory},
};
use std::{path::PathBuf, sync::Arc};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info};
use whatsapp_rust::bot::Bot;
use whatsapp_rust_tokio_transport::TokioWebSocketTransportFactory;
use whatsapp_rust_ureq_http_client::UreqHttpClient;

/// Event buffer between the client callbacks and the gateway.
const EVENT_BUFFER: usize = 64;

/// Where the session lives and how the linked device presents itself.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub device_name: String,
    pub auth_dir: PathBuf,
}

impl WhatsAppConfig {
    pub fn from_config(config: &TransportConfig, auth_dir: PathBuf) -> Self {
        Self {
            device_name: config.device_name.clone(),
            auth_dir,
        }
    }

    pub fn session_db_path(&self) -> PathBuf {
        self.auth_dir.join(SESSION_DB)
    }
}

/// One client run = one session attempt.
pub struct WhatsAppTransport {
    config: WhatsAppConfig,
    client: ClientSlot,
    store: Mutex<Option<Arc<SessionStore>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WhatsAppTransport {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            client: Arc::new(Mutex::new(None)),
            store: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    fn not_connected() -> OkibotError {
        OkibotError::Transport("whatsapp client not connected".into())
    }
}

#[async_trait]
impl Transport for WhatsAppTransport {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn start(&self) -> Result<mpsc::Receiver<TransportEvent>, OkibotError> {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return Err(OkibotError::Transport("whatsapp client already started".into()));
        }

        tokio::fs::create_dir_all(&self.config.auth_dir).await?;
        let db_path = self.config.session_db_path();
        info!("whatsapp: opening session store {}", db_path.display());
        let store = Arc::new(SessionStore::open(&db_path).await.map_err(|e| {
            OkibotError::Transport(format!("whatsapp session store init failed: {e}"))
        })?);

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let slot = self.client.clone();
        let mut bot = Bot::builder()
            .with_backend(store.clone())
            .with_transport_factory(TokioWebSocketTransportFactory::new())
            .with_http_client(UreqHttpClient::new())
            .with_device_props(
                Some(self.config.device_name.clone()),
                None,
                Some(waproto::whatsapp::device_props::PlatformType::Desktop),
            )
            .on_event(move |event, client| {
                let tx = tx.clone();
                let slot = slot.clone();
                async move { events::forward(event, client, &tx, &slot).await }
            })
            .build()
            .await
            .map_err(|e| OkibotError::Transport(format!("whatsapp client build failed: {e}")))?;

        let handle = bot
            .run()
            .await
            .map_err(|e| OkibotError::Transport(format!("whatsapp client run failed: {e}")))?;

        *self.store.lock().await = Some(store);
        *task = Some(handle);
        Ok(rx)
    }

    async fn send(&self, recipient: &str, payload: OutboundPayload) -> Result<(), OkibotError> {
        let jid = send::parse_jid(recipient)?;
        let client = self
            .client
            .lock()
            .await
            .clone()
            .ok_or_else(Self::not_connected)?;
        let msg = waproto::whatsapp::Message {
            conversation: Some(send::render(payload)),
            ..Default::default()
        };
        let id = send::retry_send(&client, &jid, msg).await?;
        debug!("whatsapp: sent {id} to {jid}");
        Ok(())
    }

    /// The client pings the socket itself; this only confirms the session is
    /// still attached.
    async fn keep_alive(&self) -> Result<(), OkibotError> {
        match self.client.lock().await.as_ref() {
            Some(_) => Ok(()),
            None => Err(Self::not_connected()),
        }
    }

    async fn stop(&self) -> Result<(), OkibotError> {
        self.client.lock().await.take();
        match self.task.lock().await.take() {
            Some(handle) => {
                handle.abort();
                info!("whatsapp: client stopped");
            }
            None => debug!("whatsapp stop: not running"),
        }
        if let Some(store) = self.store.lock().await.take() {
            store.close().await;
        }
        Ok(())
    }
}

/// Hands the gateway a fresh client for every (re)connect.
pub struct WhatsAppTransportFactory {
    config: WhatsAppConfig,
}

impl WhatsAppTransportFactory {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self { config }
    }
}

impl TransportFactory for WhatsAppTransportFactory {
    fn create(&self) -> Arc<dyn Transport> {
        Arc::new(WhatsAppTransport::new(self.config.clone()))
    }
}
