//! Scripted fakes for transport and provider contracts.

use async_trait::async_trait;
use okibot_core::{
    completion::CompletionRequest,
    error::OkibotError,
    message::{OutboundPayload, TransportEvent},
    traits::{CompletionProvider, ImageProvider, Transport, TransportFactory},
};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex,
};
use tokio::sync::mpsc;

/// Transport that records every send and replays events pushed by the test.
pub struct FakeTransport {
    pub id: usize,
    sent: Mutex<Vec<(String, OutboundPayload)>>,
    events: Mutex<Option<mpsc::Receiver<TransportEvent>>>,
    pings: AtomicUsize,
    stopped: AtomicBool,
    fail_start: AtomicBool,
}

impl FakeTransport {
    /// A transport plus the sender that feeds its event stream.
    pub fn new(id: usize) -> (Arc<Self>, mpsc::Sender<TransportEvent>) {
        let (tx, rx) = mpsc::channel(32);
        let transport = Arc::new(Self {
            id,
            sent: Mutex::new(Vec::new()),
            events: Mutex::new(Some(rx)),
            pings: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
            fail_start: AtomicBool::new(false),
        });
        (transport, tx)
    }

    pub fn sent(&self) -> Vec<(String, OutboundPayload)> {
        self.sent.lock().unwrap().clone()
    }

    /// Text of every send, in order.
    pub fn sent_texts(&self) -> Vec<String> {
        self.sent()
            .iter()
            .map(|(_, p)| p.as_text().to_string())
            .collect()
    }

    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn fail_next_start(&self) {
        self.fail_start.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    fn name(&self) -> &str {
        "fake"
    }

    async fn start(&self) -> Result<mpsc::Receiver<TransportEvent>, OkibotError> {
        if self.fail_start.swap(false, Ordering::SeqCst) {
            return Err(OkibotError::Transport("scripted start failure".into()));
        }
        self.events
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| OkibotError::Transport("already started".into()))
    }

    async fn send(&self, recipient: &str, payload: OutboundPayload) -> Result<(), OkibotError> {
        if self.is_stopped() {
            return Err(OkibotError::Transport("stopped".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), payload));
        Ok(())
    }

    async fn keep_alive(&self) -> Result<(), OkibotError> {
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), OkibotError> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory that hands out numbered fakes and keeps their event senders.
#[derive(Default)]
pub struct FakeFactory {
    created: Mutex<Vec<(Arc<FakeTransport>, mpsc::Sender<TransportEvent>)>>,
    fail_starts: AtomicUsize,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Make the next `n` created transports fail to start.
    pub fn fail_next_starts(&self, n: usize) {
        self.fail_starts.store(n, Ordering::SeqCst);
    }

    pub fn count(&self) -> usize {
        self.created.lock().unwrap().len()
    }

    pub fn transport(&self, index: usize) -> Arc<FakeTransport> {
        self.created.lock().unwrap()[index].0.clone()
    }

    pub fn events(&self, index: usize) -> mpsc::Sender<TransportEvent> {
        self.created.lock().unwrap()[index].1.clone()
    }

    /// Drop the stored sender so the transport's event stream ends.
    pub fn close_events(&self, index: usize) {
        let (dangling, _) = mpsc::channel(1);
        self.created.lock().unwrap()[index].1 = dangling;
    }
}

impl TransportFactory for FakeFactory {
    fn create(&self) -> Arc<dyn Transport> {
        let mut created = self.created.lock().unwrap();
        let (transport, tx) = FakeTransport::new(created.len());
        let pending = self.fail_starts.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_starts.store(pending - 1, Ordering::SeqCst);
            transport.fail_next_start();
        }
        created.push((transport.clone(), tx));
        transport
    }
}

/// Completion provider returning a scripted result and recording requests.
pub struct FakeCompletion {
    response: Result<String, String>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl FakeCompletion {
    pub fn ok(text: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(text.to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            response: Err("upstream 500".to_string()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for FakeCompletion {
    fn name(&self) -> &str {
        "fake-completion"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, OkibotError> {
        self.requests.lock().unwrap().push(request.clone());
        self.response.clone().map_err(OkibotError::Provider)
    }
}

/// Image provider returning a scripted URL or failure.
pub struct FakeImage {
    response: Result<String, String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeImage {
    pub fn ok(url: &str) -> Arc<Self> {
        Arc::new(Self {
            response: Ok(url.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            response: Err("quota".to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageProvider for FakeImage {
    fn name(&self) -> &str {
        "fake-image"
    }

    async fn generate(&self, prompt: &str) -> Result<String, OkibotError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.response.clone().map_err(OkibotError::Provider)
    }
}
