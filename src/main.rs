mod api;
mod commands;
mod gateway;
#[cfg(test)]
mod testing;

use clap::{Parser, Subcommand};
use okibot_channels::whatsapp::{WhatsAppConfig, WhatsAppTransportFactory};
use okibot_core::{
    config::{self, Config, ConfigSource, PairingMode},
    traits::{CompletionProvider, ImageProvider},
};
use okibot_memory::{SeenSenders, SnapshotManager, StartupRestore};
use okibot_providers::{FluxImageProvider, GeminiProvider, OpenRouterProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::{CommandSet, Providers};
use gateway::{Gateway, GatewaySettings, Router, Shared, SponsorRegistry};

#[derive(Parser)]
#[command(
    name = "okibot",
    version,
    about = "OkitakoyBot: WhatsApp assistant with AI replies and session backups"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml", env = "OKIBOT_CONFIG")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the bot.
    Start,
    /// Show configuration, providers and stored snapshots.
    Status,
    /// Archive the current session once and exit.
    Snapshot,
    /// Restore the session directory from an archive.
    Restore {
        /// Archive to restore. Defaults to the newest one.
        #[arg(long)]
        archive: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let (mut cfg, source) = config::load_file(&cli.config)?;
    let _log_guard = init_logging(&cfg);
    if source == ConfigSource::Defaults {
        info!("Config file not found at {}, using defaults", cli.config);
    }
    cfg.apply_env_overrides();
    cfg.validate()?;

    match cli.command {
        Commands::Start => start(cfg).await?,
        Commands::Status => status(&cli.config, &cfg).await?,
        Commands::Snapshot => {
            let snapshots = snapshot_manager(&cfg);
            match snapshots.snapshot(&cfg.auth_dir()).await? {
                Some(record) => println!("Snapshot saved: {}", record.path.display()),
                None => println!(
                    "Nothing to archive: {} does not exist",
                    cfg.auth_dir().display()
                ),
            }
        }
        Commands::Restore { archive } => {
            let snapshots = snapshot_manager(&cfg);
            let auth_dir = cfg.auth_dir();
            match archive {
                Some(path) => {
                    snapshots.restore(&path, &auth_dir).await?;
                    println!("Restored {} into {}", path.display(), auth_dir.display());
                }
                None => match snapshots.restore_latest(&auth_dir).await? {
                    Some(record) => {
                        println!("Restored {} into {}", record.name, auth_dir.display())
                    }
                    None => anyhow::bail!(
                        "no snapshot found in {}",
                        snapshots.dir().display()
                    ),
                },
            }
        }
    }

    Ok(())
}

/// Stdout plus a daily-rolling file under `{data_dir}/logs`.
///
/// The returned guard flushes the file writer on drop; hold it for the process lifetime.
fn init_logging(cfg: &Config) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.bot.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let logs_dir = cfg.logs_dir();
    let (file_layer, guard) = match std::fs::create_dir_all(&logs_dir) {
        Ok(()) => {
            let appender = tracing_appender::rolling::daily(&logs_dir, "okibot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        Err(e) => {
            eprintln!("file logging disabled, cannot create {}: {e}", logs_dir.display());
            (None, None)
        }
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();
    guard
}

fn snapshot_manager(cfg: &Config) -> SnapshotManager {
    SnapshotManager::new(cfg.snapshot_dir(), cfg.snapshot.keep_last)
}

/// Build the configured completion provider. `None` when its key is missing.
fn build_completion(cfg: &Config) -> Option<Arc<dyn CompletionProvider>> {
    match cfg.provider.default.as_str() {
        "gemini" => {
            let g = &cfg.provider.gemini;
            (!g.api_key.is_empty()).then(|| {
                Arc::new(GeminiProvider::from_config(
                    g.api_key.clone(),
                    g.model.clone(),
                    g.base_url.clone(),
                )) as Arc<dyn CompletionProvider>
            })
        }
        _ => {
            let o = &cfg.provider.openrouter;
            (!o.api_key.is_empty()).then(|| {
                Arc::new(OpenRouterProvider::from_config(
                    o.api_key.clone(),
                    o.model.clone(),
                    o.base_url.clone(),
                )) as Arc<dyn CompletionProvider>
            })
        }
    }
}

fn build_image(cfg: &Config) -> Option<Arc<dyn ImageProvider>> {
    (!cfg.image.api_key.is_empty()).then(|| {
        Arc::new(FluxImageProvider::from_config(
            cfg.image.api_key.clone(),
            cfg.image.base_url.clone(),
        )) as Arc<dyn ImageProvider>
    })
}

async fn start(cfg: Config) -> anyhow::Result<()> {
    let auth_dir = cfg.auth_dir();
    let snapshots = snapshot_manager(&cfg);

    // Restore before the transport exists, and only into an empty auth dir.
    if cfg.snapshot.restore_on_start {
        match snapshots.restore_if_absent(&auth_dir).await {
            Ok(StartupRestore::Kept) => info!("existing session found, skipping restore"),
            Ok(StartupRestore::Restored(record)) => {
                info!("session restored from {}", record.name)
            }
            Ok(StartupRestore::NoArchive) => info!("no session snapshot to restore"),
            Err(e) => error!("session restore failed, starting without it: {e}"),
        }
    }

    let providers = Providers {
        completion: build_completion(&cfg),
        image: build_image(&cfg),
    };
    match &providers.completion {
        Some(p) => info!("completion provider: {}", p.name()),
        None => warn!(
            "no API key for provider '{}', AI commands disabled",
            cfg.provider.default
        ),
    }
    if providers.image.is_none() {
        warn!("no Flux API key, image generation disabled");
    }

    let seen = SeenSenders::load(cfg.seen_path()).await?;
    let sponsors = (cfg.pairing.mode == PairingMode::Sponsor)
        .then(|| SponsorRegistry::new(cfg.pairing.sponsor_code_ttl_minutes));
    let shared = Arc::new(Shared::new(
        cfg.bot.name.clone(),
        seen,
        snapshots,
        auth_dir.clone(),
        sponsors,
    ));

    let router = Arc::new(Router::new(
        shared.clone(),
        CommandSet::from_config(&cfg.commands),
        providers,
        cfg.prompts.clone(),
        cfg.bot.welcome_text.clone(),
    ));
    let factory = Arc::new(WhatsAppTransportFactory::new(WhatsAppConfig::from_config(
        &cfg.transport,
        auth_dir,
    )));

    let shutdown = CancellationToken::new();
    tokio::spawn(watch_signals(shutdown.clone()));

    let server = if cfg.http.enabled {
        let state = api::ApiState::new(shared.clone(), &cfg.http);
        Some(tokio::spawn(api::serve(
            cfg.http.clone(),
            state,
            shutdown.clone(),
        )))
    } else {
        None
    };

    info!("{} starting...", cfg.bot.name);
    let gw = Gateway::new(shared, factory, router, GatewaySettings::from_config(&cfg));
    gw.run(shutdown.clone()).await?;

    shutdown.cancel();
    if let Some(server) = server {
        let _ = server.await;
    }
    Ok(())
}

/// Cancel `shutdown` on Ctrl+C or SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Ctrl+C received"),
                    _ = term.recv() => info!("SIGTERM received"),
                }
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received");
    }
    shutdown.cancel();
}

async fn status(config_path: &str, cfg: &Config) -> anyhow::Result<()> {
    let configured = |key: &str| if key.is_empty() { "missing key" } else { "configured" };

    println!("{} status\n", cfg.bot.name);
    println!("Config: {config_path}");
    println!("Data dir: {}", cfg.data_dir().display());
    println!("Pairing mode: {:?}", cfg.pairing.mode);
    println!();

    println!("Default provider: {}", cfg.provider.default);
    println!("  openrouter: {}", configured(&cfg.provider.openrouter.api_key));
    println!("  gemini: {}", configured(&cfg.provider.gemini.api_key));
    println!("  flux: {}", configured(&cfg.image.api_key));
    println!();

    let auth_dir = cfg.auth_dir();
    println!(
        "Session: {} ({})",
        auth_dir.display(),
        if auth_dir.exists() { "present" } else { "not paired" }
    );
    let seen = SeenSenders::load(cfg.seen_path()).await?;
    println!("Known senders: {}", seen.len().await);

    let snapshots = snapshot_manager(cfg).list().await?;
    match snapshots.last() {
        Some(latest) => println!(
            "Snapshots: {} (latest {})",
            snapshots.len(),
            latest.name
        ),
        None => println!("Snapshots: none"),
    }
    Ok(())
}
