use std::path::PathBuf;

use common::config::MqAppConfig;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Unset keeps idle connections open.
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    #[serde(default)]
    pub max_lifetime_secs: Option<u64>,
    #[serde(default)]
    pub sqlx_logging: bool,
}

fn default_max_connections() -> u32 {
    20
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout_secs() -> u64 {
    8
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: default_max_connections(),
            min_connections: default_min_connections(),
            connect_timeout_secs: default_connect_timeout_secs(),
            idle_timeout_secs: None,
            max_lifetime_secs: None,
            sqlx_logging: false,
        }
    }
}

/// Scheduler loop and execution-report consumer settings.
#[derive(Debug, Deserialize, Clone)]
pub struct SchedulerConfig {
    /// Identity written into lock rows. Defaults to a fresh `engine-<uuid>` per process.
    #[serde(default = "default_holder")]
    pub holder: String,
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
    /// Waiting instances scheduled per tick.
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    /// Lock rows older than this are considered abandoned.
    #[serde(default = "default_stale_lock_timeout_secs")]
    pub stale_lock_timeout_secs: u64,
    /// Attempts per execution report before giving up on lock contention.
    #[serde(default = "default_report_max_attempts")]
    pub report_max_attempts: u8,
    #[serde(default = "default_report_backoff_base_ms")]
    pub report_backoff_base_ms: u64,
    #[serde(default = "default_report_backoff_max_ms")]
    pub report_backoff_max_ms: u64,
}

fn default_holder() -> String {
    format!("engine-{}", Uuid::new_v4())
}
fn default_tick_interval_ms() -> u64 {
    2000
}
fn default_batch_size() -> u64 {
    50
}
fn default_stale_lock_timeout_secs() -> u64 {
    600
}
fn default_report_max_attempts() -> u8 {
    5
}
fn default_report_backoff_base_ms() -> u64 {
    200
}
fn default_report_backoff_max_ms() -> u64 {
    10_000
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            holder: default_holder(),
            tick_interval_ms: default_tick_interval_ms(),
            batch_size: default_batch_size(),
            stale_lock_timeout_secs: default_stale_lock_timeout_secs(),
            report_max_attempts: default_report_max_attempts(),
            report_backoff_base_ms: default_report_backoff_base_ms(),
            report_backoff_max_ms: default_report_backoff_max_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory that instance output folders are resolved against.
    pub root: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PluginConfig {
    /// Directory holding one `<plugin>/plugin.toml` per plugin.
    pub plugins_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
    pub plugin: PluginConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .set_default("database.url", "postgres://localhost/chris")?
            .set_default("storage.root", "./data")?
            .set_default("plugin.plugins_dir", "./plugins")?
            // Load from config/config.toml
            .add_source(File::with_name("config/config").required(false))
            // Override from environment (e.g., CHRIS__DATABASE__URL)
            .add_source(Environment::with_prefix("CHRIS").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
