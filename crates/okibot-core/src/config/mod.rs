mod defaults;
mod prompts;
mod providers;


pub use prompts::*;
pub use providers::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::OkibotError;
use defaults::*;

/// Top-level okibot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub pairing: PairingConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub prompts: Prompts,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// General bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Sent once to every new sender.
    #[serde(default = "default_welcome_text")]
    pub welcome_text: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            welcome_text: default_welcome_text(),
        }
    }
}

/// WhatsApp session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Name shown under "Linked devices" on the phone.
    #[serde(default = "default_device_name")]
    pub device_name: String,
    /// Session store directory. Empty = `{data_dir}/auth`.
    #[serde(default)]
    pub auth_dir: String,
    /// Wait before re-initializing after a disconnect.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    /// Keep-alive ping period. 0 disables.
    #[serde(default = "default_keep_alive_minutes")]
    pub keep_alive_minutes: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            device_name: default_device_name(),
            auth_dir: String::new(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            keep_alive_minutes: default_keep_alive_minutes(),
        }
    }
}

/// How end users are onboarded.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingMode {
    /// Device-bound QR pairing only.
    #[default]
    Qr,
    /// Shared short codes issued over HTTP and redeemed in chat.
    Sponsor,
}

/// Upper bound for sponsor code lifetimes (one year).
pub const MAX_SPONSOR_CODE_TTL_MINUTES: u64 = 525_600;

/// Pairing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairingConfig {
    #[serde(default)]
    pub mode: PairingMode,
    /// 1 to [`MAX_SPONSOR_CODE_TTL_MINUTES`].
    #[serde(default = "default_sponsor_code_ttl_minutes")]
    pub sponsor_code_ttl_minutes: u64,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            mode: PairingMode::default(),
            sponsor_code_ttl_minutes: default_sponsor_code_ttl_minutes(),
        }
    }
}

/// Command keywords. Matching is case-insensitive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    #[serde(default = "default_help_aliases")]
    pub help_aliases: Vec<String>,
    #[serde(default = "default_summarize_prefixes")]
    pub summarize_prefixes: Vec<String>,
    #[serde(default = "default_image_prefixes")]
    pub image_prefixes: Vec<String>,
    #[serde(default = "default_analyze_prefixes")]
    pub analyze_prefixes: Vec<String>,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            help_aliases: default_help_aliases(),
            summarize_prefixes: default_summarize_prefixes(),
            image_prefixes: default_image_prefixes(),
            analyze_prefixes: default_analyze_prefixes(),
        }
    }
}

/// Session backup settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotConfig {
    /// Archive the auth directory every time the session becomes ready.
    #[serde(default = "default_true")]
    pub auto_backup: bool,
    #[serde(default)]
    pub periodic: bool,
    #[serde(default = "default_snapshot_interval_minutes")]
    pub interval_minutes: u64,
    /// Archives to keep. 0 = keep everything.
    #[serde(default)]
    pub keep_last: usize,
    #[serde(default = "default_true")]
    pub restore_on_start: bool,
    /// Archive directory. Empty = `{data_dir}/session-backups`.
    #[serde(default)]
    pub dir: String,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            auto_backup: true,
            periodic: false,
            interval_minutes: default_snapshot_interval_minutes(),
            keep_last: 0,
            restore_on_start: true,
            dir: String::new(),
        }
    }
}

/// Status web server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
    /// Expose the pairing QR on `/` and `/qr`.
    #[serde(default)]
    pub show_qr: bool,
    /// Bearer token for `/admin/codes` and session export/import.
    /// Empty = those routes are not served.
    #[serde(default)]
    pub export_token: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_http_host(),
            port: default_http_port(),
            show_qr: false,
            export_token: String::new(),
        }
    }
}

impl Config {
    /// Expanded data directory.
    pub fn data_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand(&self.bot.data_dir))
    }

    /// Directory holding the transport's session credentials.
    pub fn auth_dir(&self) -> PathBuf {
        if self.transport.auth_dir.is_empty() {
            self.data_dir().join("auth")
        } else {
            PathBuf::from(shellexpand(&self.transport.auth_dir))
        }
    }

    /// Directory holding session archives.
    pub fn snapshot_dir(&self) -> PathBuf {
        if self.snapshot.dir.is_empty() {
            self.data_dir().join("session-backups")
        } else {
            PathBuf::from(shellexpand(&self.snapshot.dir))
        }
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.data_dir().join("logs")
    }

    /// Path of the persisted seen-sender ledger.
    pub fn seen_path(&self) -> PathBuf {
        self.data_dir().join("seen_senders.json")
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    ///
    /// Keys: `OPENAI_API_KEY` / `OPENROUTER_API_KEY`, `GEMINI_API_KEY`, `FLUXAI_API_KEY`,
    /// `PORT`, `SHOW_QR_WEB`, `AUTO_BACKUP`, `EXPORT_TOKEN`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = non_empty("OPENROUTER_API_KEY").or_else(|| non_empty("OPENAI_API_KEY"))
        {
            self.provider.openrouter.api_key = key;
        }
        if let Some(key) = non_empty("GEMINI_API_KEY") {
            self.provider.gemini.api_key = key;
        }
        if let Some(key) = non_empty("FLUXAI_API_KEY") {
            self.image.api_key = key;
        }
        if let Some(port) = non_empty("PORT") {
            match port.trim().parse::<u16>() {
                Ok(p) => self.http.port = p,
                Err(e) => warn!("ignoring invalid PORT '{port}': {e}"),
            }
        }
        if let Some(flag) = non_empty("SHOW_QR_WEB") {
            self.http.show_qr = flag.trim().eq_ignore_ascii_case("true");
        }
        if let Some(flag) = non_empty("AUTO_BACKUP") {
            self.snapshot.auto_backup = !flag.trim().eq_ignore_ascii_case("false");
        }
        if let Some(token) = non_empty("EXPORT_TOKEN") {
            self.http.export_token = token;
        }
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<(), OkibotError> {
        match self.provider.default.as_str() {
            "openrouter" | "gemini" => {}
            other => {
                return Err(OkibotError::Config(format!(
                    "unsupported provider '{other}', expected 'openrouter' or 'gemini'"
                )))
            }
        }
        if self.transport.device_name.trim().is_empty() {
            return Err(OkibotError::Config(
                "transport.device_name must not be empty".into(),
            ));
        }
        let ttl = self.pairing.sponsor_code_ttl_minutes;
        if !(1..=MAX_SPONSOR_CODE_TTL_MINUTES).contains(&ttl) {
            return Err(OkibotError::Config(format!(
                "pairing.sponsor_code_ttl_minutes must be between 1 and {MAX_SPONSOR_CODE_TTL_MINUTES}, got {ttl}"
            )));
        }
        if self.snapshot.periodic && self.snapshot.interval_minutes == 0 {
            return Err(OkibotError::Config(
                "snapshot.interval_minutes must be > 0 when periodic snapshots are on".into(),
            ));
        }
        Ok(())
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Where [`load_file`] found its settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSource {
    File,
    /// No file at the given path; built-in defaults.
    Defaults,
}

/// Parse the TOML file only. Missing file = defaults.
///
/// Nothing is logged here: the caller sets up logging from the returned config
/// first, then reports the source and applies [`Config::apply_env_overrides`]
/// and [`Config::validate`].
pub fn load_file(path: &str) -> Result<(Config, ConfigSource), OkibotError> {
    let path = Path::new(path);
    if !path.exists() {
        return Ok((Config::default(), ConfigSource::Defaults));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| OkibotError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    let config = toml::from_str(&content)
        .map_err(|e| OkibotError::Config(format!("failed to parse config: {}", e)))?;
    Ok((config, ConfigSource::File))
}
