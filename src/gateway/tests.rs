use super::*;
use crate::commands::{replies, CommandSet, Providers};
use crate::testing::{FakeCompletion, FakeFactory};
use okibot_core::config::{CommandsConfig, Prompts};
use okibot_core::message::InboundMessage;

const WELCOME: &str = "Bienvenue !";
const SENDER: &str = "22912345678@c.us";

struct Fixture {
    _dir: tempfile::TempDir,
    shared: Arc<Shared>,
    factory: Arc<FakeFactory>,
    shutdown: CancellationToken,
    handle: tokio::task::JoinHandle<anyhow::Result<()>>,
}

async fn shared_in(dir: &std::path::Path, sponsors: Option<SponsorRegistry>) -> Arc<Shared> {
    let seen = SeenSenders::load(dir.join("seen.json")).await.unwrap();
    let snapshots = SnapshotManager::new(dir.join("backups"), 0);
    Arc::new(Shared::new(
        "OkitakoyBot",
        seen,
        snapshots,
        dir.join("auth"),
        sponsors,
    ))
}

fn router(shared: &Arc<Shared>, providers: Providers) -> Arc<Router> {
    Arc::new(Router::new(
        shared.clone(),
        CommandSet::from_config(&CommandsConfig::default()),
        providers,
        Prompts::default(),
        WELCOME.to_string(),
    ))
}

fn settings() -> GatewaySettings {
    GatewaySettings {
        reconnect_delay: Duration::from_secs(5),
        keep_alive: Some(Duration::from_secs(300)),
        snapshot_interval: None,
        auto_backup: false,
    }
}

async fn start(settings: GatewaySettings, prepare: impl FnOnce(&FakeFactory)) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let shared = shared_in(dir.path(), None).await;
    let factory = FakeFactory::new();
    prepare(factory.as_ref());
    let gateway = Gateway::new(
        shared.clone(),
        factory.clone(),
        router(&shared, Providers::default()),
        settings,
    );
    let shutdown = CancellationToken::new();
    let handle = tokio::spawn(gateway.run(shutdown.clone()));
    settle().await;
    Fixture {
        _dir: dir,
        shared,
        factory,
        shutdown,
        handle,
    }
}

/// Let spawned tasks and blocking file writes finish. Moves a paused clock by
/// a few milliseconds at most.
async fn settle() {
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

impl Fixture {
    async fn emit(&self, index: usize, event: TransportEvent) {
        self.factory.events(index).send(event).await.unwrap();
        settle().await;
    }

    async fn state(&self) -> ConnectionState {
        self.shared.session.current().await
    }

    async fn stop(self) {
        self.shutdown.cancel();
        self.handle.await.unwrap().unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn test_initial_connect_and_pairing() {
    let fx = start(settings(), |_| {}).await;
    assert_eq!(fx.factory.count(), 1);
    assert_eq!(fx.state().await, ConnectionState::Unauthenticated);

    fx.emit(0, TransportEvent::PairingIssued("2@qr-one".into())).await;
    let artifact = fx.shared.session.pairing_artifact().await.unwrap();
    assert_eq!(artifact.payload, "2@qr-one");
    assert!(artifact
        .data_url
        .as_deref()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    fx.emit(0, TransportEvent::PairingIssued("2@qr-two".into())).await;
    assert_eq!(
        fx.shared.session.pairing_artifact().await.unwrap().payload,
        "2@qr-two"
    );

    fx.emit(0, TransportEvent::Authenticated).await;
    fx.emit(0, TransportEvent::Ready).await;
    assert_eq!(fx.state().await, ConnectionState::Ready);
    assert!(fx.shared.session.pairing_artifact().await.is_none());
    fx.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_ready_dispatches_messages_and_welcomes_once() {
    let fx = start(settings(), |_| {}).await;
    fx.emit(0, TransportEvent::Ready).await;

    fx.emit(
        0,
        TransportEvent::MessageReceived(InboundMessage::new(SENDER, "ping")),
    )
    .await;
    fx.emit(
        0,
        TransportEvent::MessageReceived(InboundMessage::new(SENDER, "PING")),
    )
    .await;

    let transport = fx.factory.transport(0);
    assert_eq!(transport.sent_texts(), vec![WELCOME, "pong ✅", "pong ✅"]);
    assert!(transport.sent().iter().all(|(to, _)| to == SENDER));
    assert!(fx.shared.seen.contains(SENDER).await);
    fx.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_messages_dropped_unless_ready() {
    let fx = start(settings(), |_| {}).await;
    fx.emit(
        0,
        TransportEvent::MessageReceived(InboundMessage::new(SENDER, "ping")),
    )
    .await;
    fx.emit(0, TransportEvent::PairingIssued("qr".into())).await;
    fx.emit(
        0,
        TransportEvent::MessageReceived(InboundMessage::new(SENDER, "ping")),
    )
    .await;

    assert!(fx.factory.transport(0).sent().is_empty());
    assert!(!fx.shared.seen.contains(SENDER).await);
    fx.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_reinitializes_after_delay() {
    let fx = start(settings(), |_| {}).await;
    fx.emit(0, TransportEvent::Ready).await;
    fx.emit(0, TransportEvent::Disconnected("reason-x".into())).await;

    assert_eq!(
        fx.state().await,
        ConnectionState::Disconnected {
            reason: "reason-x".into()
        }
    );
    assert_eq!(fx.factory.count(), 1);

    tokio::time::sleep(Duration::from_secs(4)).await;
    settle().await;
    assert_eq!(fx.factory.count(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    settle().await;
    assert_eq!(fx.factory.count(), 2);
    assert!(fx.factory.transport(0).is_stopped());
    assert_eq!(fx.state().await, ConnectionState::Unauthenticated);

    // The new transport drives state from here.
    fx.emit(1, TransportEvent::Ready).await;
    assert_eq!(fx.state().await, ConnectionState::Ready);
    fx.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_ready_cancels_pending_reconnect() {
    let fx = start(settings(), |_| {}).await;
    fx.emit(0, TransportEvent::Disconnected("blip".into())).await;
    fx.emit(0, TransportEvent::Ready).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    settle().await;
    assert_eq!(fx.factory.count(), 1);
    assert_eq!(fx.state().await, ConnectionState::Ready);
    fx.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_newer_disconnect_supersedes_pending_reconnect() {
    let fx = start(settings(), |_| {}).await;
    fx.emit(0, TransportEvent::Disconnected("first".into())).await;
    tokio::time::sleep(Duration::from_secs(3)).await;
    fx.emit(0, TransportEvent::Disconnected("second".into())).await;

    tokio::time::sleep(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(fx.factory.count(), 1);

    tokio::time::sleep(Duration::from_secs(3)).await;
    settle().await;
    assert_eq!(fx.factory.count(), 2);
    fx.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_does_not_retry() {
    let fx = start(settings(), |_| {}).await;
    fx.emit(0, TransportEvent::AuthFailed("bad creds".into())).await;
    assert_eq!(
        fx.state().await,
        ConnectionState::AuthFailed {
            reason: "bad creds".into()
        }
    );
    tokio::time::sleep(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(fx.factory.count(), 1);
    fx.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_stays_terminal_after_disconnect() {
    let fx = start(settings(), |_| {}).await;
    fx.emit(0, TransportEvent::AuthFailed("bad creds".into())).await;
    fx.emit(0, TransportEvent::Disconnected("connection lost".into()))
        .await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(fx.factory.count(), 1);
    assert_eq!(
        fx.state().await,
        ConnectionState::AuthFailed {
            reason: "bad creds".into()
        }
    );
    fx.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_then_closed_stream_is_not_retried() {
    let fx = start(settings(), |_| {}).await;
    fx.emit(0, TransportEvent::AuthFailed("logged out".into())).await;
    fx.factory.close_events(0);
    settle().await;

    tokio::time::sleep(Duration::from_secs(60)).await;
    settle().await;
    assert_eq!(fx.factory.count(), 1);
    assert!(matches!(
        fx.state().await,
        ConnectionState::AuthFailed { .. }
    ));
    fx.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_failure_schedules_retry() {
    let fx = start(settings(), |f| f.fail_next_starts(1)).await;
    assert!(matches!(
        fx.state().await,
        ConnectionState::Disconnected { .. }
    ));

    tokio::time::sleep(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(fx.factory.count(), 2);
    assert_eq!(fx.state().await, ConnectionState::Unauthenticated);
    fx.emit(1, TransportEvent::Ready).await;
    assert!(fx.shared.session.is_ready().await);
    fx.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_closed_event_stream_counts_as_disconnect() {
    let fx = start(settings(), |_| {}).await;
    fx.emit(0, TransportEvent::Ready).await;
    fx.factory.close_events(0);
    settle().await;
    assert!(matches!(
        fx.state().await,
        ConnectionState::Disconnected { .. }
    ));

    tokio::time::sleep(Duration::from_secs(6)).await;
    settle().await;
    assert_eq!(fx.factory.count(), 2);
    fx.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_keep_alive_pings_current_transport() {
    let fx = start(settings(), |_| {}).await;
    fx.emit(0, TransportEvent::Ready).await;
    assert_eq!(fx.factory.transport(0).pings(), 0);

    tokio::time::sleep(Duration::from_secs(301)).await;
    settle().await;
    assert_eq!(fx.factory.transport(0).pings(), 1);

    tokio::time::sleep(Duration::from_secs(300)).await;
    settle().await;
    assert_eq!(fx.factory.transport(0).pings(), 2);
    fx.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_transport() {
    let fx = start(settings(), |_| {}).await;
    let factory = fx.factory.clone();
    fx.stop().await;
    assert!(factory.transport(0).is_stopped());
}

#[tokio::test]
async fn test_ready_triggers_backup_when_enabled() {
    let mut s = settings();
    s.auto_backup = true;
    let fx = start(s, |_| {}).await;
    let auth = fx.shared.auth_dir.clone();
    std::fs::create_dir_all(&auth).unwrap();
    std::fs::write(auth.join("creds.json"), "{}").unwrap();

    fx.emit(0, TransportEvent::Ready).await;
    let mut archives = Vec::new();
    for _ in 0..100 {
        archives = fx.shared.snapshots.list().await.unwrap();
        if !archives.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(archives.len(), 1);
    fx.stop().await;
}

#[tokio::test]
async fn test_welcome_survives_reload() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, _events) = crate::testing::FakeTransport::new(0);

    let shared = shared_in(dir.path(), None).await;
    router(&shared, Providers::default())
        .dispatch(transport.clone(), InboundMessage::new(SENDER, "ping"))
        .await;

    let reloaded = shared_in(dir.path(), None).await;
    router(&reloaded, Providers::default())
        .dispatch(transport.clone(), InboundMessage::new(SENDER, "ping"))
        .await;

    assert_eq!(transport.sent_texts(), vec![WELCOME, "pong ✅", "pong ✅"]);
}

#[tokio::test]
async fn test_welcome_precedes_fallback_reply() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, _events) = crate::testing::FakeTransport::new(0);
    let shared = shared_in(dir.path(), None).await;
    let completion = FakeCompletion::ok("Bonjour !");
    let providers = Providers {
        completion: Some(completion.clone()),
        image: None,
    };

    router(&shared, providers)
        .dispatch(transport.clone(), InboundMessage::new(SENDER, "salut"))
        .await;
    assert_eq!(transport.sent_texts(), vec![WELCOME, "Bonjour !"]);
    assert_eq!(completion.requests().len(), 1);
}

#[tokio::test]
async fn test_sponsor_code_redemption() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, _events) = crate::testing::FakeTransport::new(0);
    let shared = shared_in(dir.path(), Some(SponsorRegistry::new(10))).await;
    let code = shared
        .sponsors
        .as_ref()
        .unwrap()
        .issue("+22912345678")
        .await;
    let router = router(&shared, Providers::default());

    router
        .dispatch(transport.clone(), InboundMessage::new(SENDER, &code.code))
        .await;
    router
        .dispatch(transport.clone(), InboundMessage::new(SENDER, &code.code))
        .await;
    router
        .dispatch(transport.clone(), InboundMessage::new(SENDER, "ping"))
        .await;

    let sent = transport.sent_texts();
    assert_eq!(sent.len(), 3);
    assert!(sent[0].contains("+22912345678"));
    assert_eq!(sent[1], replies::SPONSOR_INVALID);
    // Redemption marked the sender seen, so no welcome here.
    assert_eq!(sent[2], "pong ✅");
}

#[tokio::test]
async fn test_code_shaped_text_outside_sponsor_mode_is_plain_text() {
    let dir = tempfile::tempdir().unwrap();
    let (transport, _events) = crate::testing::FakeTransport::new(0);
    let shared = shared_in(dir.path(), None).await;
    router(&shared, Providers::default())
        .dispatch(transport.clone(), InboundMessage::new(SENDER, "AB12CD"))
        .await;
    assert_eq!(
        transport.sent_texts(),
        vec![WELCOME, replies::FALLBACK_DISABLED]
    );
}

#[test]
fn test_settings_from_config() {
    let mut cfg = Config::default();
    cfg.transport.keep_alive_minutes = 0;
    cfg.snapshot.periodic = true;
    cfg.snapshot.interval_minutes = 30;
    let s = GatewaySettings::from_config(&cfg);
    assert_eq!(s.reconnect_delay, Duration::from_secs(5));
    assert!(s.keep_alive.is_none());
    assert_eq!(s.snapshot_interval, Some(Duration::from_secs(1800)));
    assert!(s.auto_backup);
}
