// src/config/sync.rs
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::{env, fs, path::Path, path::PathBuf};
use url::Url;

use crate::pipeline::scheduler::{parse_schedule, DEFAULT_CRON_SCHEDULE};

pub const ENV_CONFIG_PATH: &str = "CARD_SYNC_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/card_sync.toml";

pub const ENV_CRON_SCHEDULE: &str = "CRON_SCHEDULE";
pub const ENV_SYNC_ON_STARTUP: &str = "SYNC_ON_STARTUP";
pub const ENV_DATABASE_URL: &str = "DATABASE_URL";
pub const ENV_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";
pub const ENV_SOURCE_LABEL: &str = "SOURCE_LABEL";
pub const ENV_PORT: &str = "PORT";
pub const ENV_RETRY_UNSAVED: &str = "RETRY_UNSAVED";

pub const DEFAULT_DATABASE_URL: &str = "sqlite://data/card_sync.db";
/// Selects the in-memory repository (nothing survives a restart).
pub const MEMORY_DATABASE_URL: &str = "memory";
pub const DEFAULT_TARGET_URL: &str = "https://www.game.es/buscar/pokemon%20tcg";
pub const DEFAULT_ORIGIN: &str = "https://www.game.es";
pub const DEFAULT_SOURCE: &str = "gamestore";
pub const DEFAULT_SOURCE_LABEL: &str = "GAME";
pub const DEFAULT_PORT: u16 = 3000;

fn default_cron() -> String {
    DEFAULT_CRON_SCHEDULE.to_string()
}
fn default_database_url() -> String {
    DEFAULT_DATABASE_URL.to_string()
}
fn default_webhook_username() -> String {
    crate::notify::discord::DEFAULT_USERNAME.to_string()
}
fn default_target_url() -> String {
    DEFAULT_TARGET_URL.to_string()
}
fn default_origin() -> String {
    DEFAULT_ORIGIN.to_string()
}
fn default_source() -> String {
    DEFAULT_SOURCE.to_string()
}
fn default_source_label() -> String {
    DEFAULT_SOURCE_LABEL.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_navigation_timeout_secs() -> u64 {
    20
}
fn default_settle_delay_secs() -> u64 {
    3
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig {
    /// Standard 5-field cron expression.
    #[serde(default = "default_cron")]
    pub cron_schedule: String,
    #[serde(default)]
    pub sync_on_startup: bool,
    /// sqlx SQLite URL, or "memory".
    #[serde(default = "default_database_url")]
    pub database_url: String,
    /// No webhook means notifications are disabled.
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_webhook_username")]
    pub webhook_username: String,
    #[serde(default = "default_target_url")]
    pub target_url: String,
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Tag stored with every listing; part of the natural key.
    #[serde(default = "default_source")]
    pub source: String,
    /// Human label used in notifications.
    #[serde(default = "default_source_label")]
    pub source_label: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub retry_unsaved: bool,
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
    #[serde(default = "default_settle_delay_secs")]
    pub settle_delay_secs: u64,
    #[serde(default)]
    pub chrome_executable: Option<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            cron_schedule: default_cron(),
            sync_on_startup: false,
            database_url: default_database_url(),
            webhook_url: None,
            webhook_username: default_webhook_username(),
            target_url: default_target_url(),
            origin: default_origin(),
            source: default_source(),
            source_label: default_source_label(),
            port: default_port(),
            retry_unsaved: false,
            navigation_timeout_secs: default_navigation_timeout_secs(),
            settle_delay_secs: default_settle_delay_secs(),
            chrome_executable: None,
        }
    }
}

impl SyncConfig {
    /// Resolve, in order: $CARD_SYNC_CONFIG_PATH, `config/card_sync.toml`, built-in defaults.
    /// Environment overrides are applied on top, then the result is validated.
    pub fn load() -> anyhow::Result<Self> {
        let mut cfg = if let Ok(p) = env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
            }
            Self::load_from_file(&pb)?
        } else {
            let pb = PathBuf::from(DEFAULT_CONFIG_PATH);
            if pb.exists() {
                Self::load_from_file(&pb)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading sync config from {}", path.display()))?;
        Self::from_toml_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Environment beats file; blank values are ignored.
    pub fn apply_env(&mut self) {
        if let Some(v) = env_nonempty(ENV_CRON_SCHEDULE) {
            self.cron_schedule = v;
        }
        if let Some(v) = env_nonempty(ENV_SYNC_ON_STARTUP) {
            self.sync_on_startup = parse_flag(&v);
        }
        if let Some(v) = env_nonempty(ENV_DATABASE_URL) {
            self.database_url = v;
        }
        if let Some(v) = env_nonempty(ENV_WEBHOOK_URL) {
            self.webhook_url = Some(v);
        }
        if let Some(v) = env_nonempty(ENV_SOURCE_LABEL) {
            self.source_label = v;
        }
        if let Some(v) = env_nonempty(ENV_PORT) {
            match v.parse::<u16>() {
                Ok(p) => self.port = p,
                Err(_) => tracing::warn!(value = %v, "ignoring unparsable PORT"),
            }
        }
        if let Some(v) = env_nonempty(ENV_RETRY_UNSAVED) {
            self.retry_unsaved = parse_flag(&v);
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        parse_schedule(&self.cron_schedule)
            .with_context(|| format!("invalid cron schedule format: {:?}", self.cron_schedule))?;
        if self.port == 0 {
            bail!("port must be a positive integer");
        }
        for (name, raw) in [("target_url", &self.target_url), ("origin", &self.origin)] {
            parse_http_url(raw).with_context(|| format!("{name} is not a valid http(s) URL"))?;
        }
        if let Some(hook) = &self.webhook_url {
            parse_http_url(hook).context("webhook_url is not a valid http(s) URL")?;
        }
        if self.source.trim().is_empty() {
            bail!("source tag must not be empty");
        }
        if self.database_url != MEMORY_DATABASE_URL && !self.database_url.starts_with("sqlite:") {
            bail!("database_url must be a sqlite: URL or \"{MEMORY_DATABASE_URL}\"");
        }
        Ok(())
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE_URL
    }
}

fn parse_http_url(raw: &str) -> anyhow::Result<Url> {
    let u = Url::parse(raw)?;
    if !matches!(u.scheme(), "http" | "https") {
        bail!("unsupported scheme {}", u.scheme());
    }
    Ok(u)
}

fn env_nonempty(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_flag(v: &str) -> bool {
    v.eq_ignore_ascii_case("true") || v == "1"
}
