//! Configuration loading for btts.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The config file lives at ~/.config/btts/config.toml.
//!
//! Environment overrides follow `BTTS_{SECTION}_{KEY}` (for example
//! `BTTS_ENGINE_URL` or `BTTS_HTTP_PORT`). Keys themselves contain
//! underscores, so the variables are mapped onto known sections instead of
//! being split on every separator.

use config::{Config, File};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::BttsError;

const ENV_PREFIX: &str = "BTTS_";

/// Top-level keys that may be overridden from the environment.
const TOP_LEVEL_KEYS: &[&str] = &[
    "db_path",
    "log_level",
    "log_format",
    "admin_ids",
    "ignore_users",
    "plugin_prefixes",
];

/// Sections, longest first so `file_cache` wins over a shorter prefix.
const SECTIONS: &[&str] = &["file_cache", "reconcile", "engine", "cache", "http", "app"];

/// Keys parsed as comma-separated lists.
const LIST_KEYS: &[&str] = &["admin_ids", "ignore_users", "plugin_prefixes"];

/// Platform application credentials.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub app_id: i64,
    pub app_hash: String,
    /// Read by the bot front end, which lives outside this workspace
    pub bot_token: Option<String>,
}

/// Which index backend is active. Exactly one runs per process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    #[default]
    Embedded,
    External,
}

/// Index layout for the external backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexLayout {
    /// One index per chat, named `btts_{chat_id}`
    #[default]
    PerChat,
    /// Single `btts` index with Cantor-paired primary keys
    Single,
}

/// Search engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub kind: EngineKind,
    /// Base URL of the external search service
    pub url: Option<String>,
    /// API key for the external search service
    pub api_key: Option<String>,
    pub index_layout: IndexLayout,
    /// Root directory for embedded per-chat indices
    pub index_root: String,
    /// Writer heap per embedded index (MB)
    pub writer_memory_mb: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            kind: EngineKind::Embedded,
            url: None,
            api_key: None,
            index_layout: IndexLayout::PerChat,
            index_root: default_index_root(),
            writer_memory_mb: 50,
            timeout_secs: 30,
            max_retries: 3,
        }
    }
}

/// HTTP search surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub host: String,
    pub port: u16,
    /// Bearer key with unrestricted access
    pub master_key: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 39415,
            master_key: None,
        }
    }
}

/// Gap reconciler timing and fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    /// Period of the background difference loop
    pub interval_secs: u64,
    /// Timeout applied to each outbound call of an iteration
    pub timeout_secs: u64,
    pub max_concurrent_channel_syncs: usize,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            interval_secs: 300,
            timeout_secs: 60,
            max_concurrent_channel_syncs: 4,
        }
    }
}

/// Result cache used for paginating callback-driven queries.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub max_entries: usize,
    pub max_cost_bytes: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl_secs: 15 * 60,
            max_entries: 10_000_000,
            max_cost_bytes: 100_000_000,
        }
    }
}

/// Media file cache. Stored for the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCacheSettings {
    pub enabled: bool,
    pub dir: String,
    pub max_bytes: u64,
}

impl Default for FileCacheSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: data_dir("file-cache"),
            max_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: AppSettings,

    /// Users allowed to administer the bot
    #[serde(default)]
    pub admin_ids: Vec<i64>,

    /// Authors whose messages are never indexed
    #[serde(default)]
    pub ignore_users: Vec<i64>,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub http: HttpSettings,

    /// Path to RocksDB metadata directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub reconcile: ReconcileSettings,

    #[serde(default)]
    pub cache: CacheSettings,

    /// Bot command prefixes handled by plugins
    #[serde(default)]
    pub plugin_prefixes: Vec<String>,

    #[serde(default)]
    pub file_cache: FileCacheSettings,
}

fn data_dir(name: &str) -> String {
    ProjectDirs::from("", "", "btts")
        .map(|p| p.data_local_dir().join(name))
        .unwrap_or_else(|| PathBuf::from(format!("./{}", name)))
        .to_string_lossy()
        .to_string()
}

fn default_db_path() -> String {
    data_dir("db")
}

fn default_index_root() -> String {
    data_dir("index")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            app: AppSettings::default(),
            admin_ids: Vec::new(),
            ignore_users: Vec::new(),
            engine: EngineSettings::default(),
            http: HttpSettings::default(),
            db_path: default_db_path(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            reconcile: ReconcileSettings::default(),
            cache: CacheSettings::default(),
            plugin_prefixes: Vec::new(),
            file_cache: FileCacheSettings::default(),
        }
    }
}

/// Value of a single environment override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvValue {
    Scalar(String),
    List(Vec<String>),
}

/// Map `BTTS_*` variables onto config keys (`engine.url`, `admin_ids`, ...).
///
/// Unknown variables are ignored.
pub fn env_overrides<I>(vars: I) -> Vec<(String, EnvValue)>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut overrides = Vec::new();
    for (name, value) in vars {
        let Some(rest) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let rest = rest.to_lowercase();

        let key = if TOP_LEVEL_KEYS.contains(&rest.as_str()) {
            rest.clone()
        } else {
            let Some((section, field)) = SECTIONS.iter().find_map(|section| {
                rest.strip_prefix(section)
                    .and_then(|r| r.strip_prefix('_'))
                    .filter(|field| !field.is_empty())
                    .map(|field| (*section, field))
            }) else {
                continue;
            };
            format!("{}.{}", section, field)
        };

        let value = if LIST_KEYS.contains(&key.as_str()) {
            EnvValue::List(
                value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
            )
        } else {
            EnvValue::Scalar(value)
        };
        overrides.push((key, value));
    }
    overrides
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/btts/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (BTTS_*)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, BttsError> {
        Self::load_with_env(cli_config_path, std::env::vars())
    }

    /// Same as [`Settings::load`] with an explicit environment.
    pub fn load_with_env<I>(cli_config_path: Option<&str>, vars: I) -> Result<Self, BttsError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config_dir = ProjectDirs::from("", "", "btts")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| BttsError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| BttsError::Config(e.to_string()))?
            .set_default("engine.index_root", default_index_root())
            .map_err(|e| BttsError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        for (key, value) in env_overrides(vars) {
            builder = match value {
                EnvValue::Scalar(v) => builder.set_override(key.as_str(), v),
                EnvValue::List(v) => builder.set_override(key.as_str(), v),
            }
            .map_err(|e| BttsError::Config(e.to_string()))?;
        }

        let config = builder
            .build()
            .map_err(|e| BttsError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| BttsError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject combinations no subsystem can run with.
    pub fn validate(&self) -> Result<(), BttsError> {
        if self.engine.kind == EngineKind::External
            && self.engine.url.as_deref().map_or(true, str::is_empty)
        {
            return Err(BttsError::Fatal(
                "engine.url is required for the external engine".to_string(),
            ));
        }
        if self.engine.writer_memory_mb < 15 {
            return Err(BttsError::Config(format!(
                "engine.writer_memory_mb must be >= 15, got {}",
                self.engine.writer_memory_mb
            )));
        }
        if self.engine.timeout_secs == 0 || self.reconcile.timeout_secs == 0 {
            return Err(BttsError::Config("timeouts must be > 0".to_string()));
        }
        if self.reconcile.max_concurrent_channel_syncs == 0 {
            return Err(BttsError::Config(
                "reconcile.max_concurrent_channel_syncs must be > 0".to_string(),
            ));
        }
        if self.cache.max_entries == 0 {
            return Err(BttsError::Config("cache.max_entries must be > 0".to_string()));
        }
        Ok(())
    }

    /// Socket address for the HTTP server
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http.host, self.http.port)
    }

    pub fn expanded_db_path(&self) -> PathBuf {
        expand_home(&self.db_path)
    }

    pub fn expanded_index_root(&self) -> PathBuf {
        expand_home(&self.engine.index_root)
    }

    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admin_ids.contains(&user_id)
    }
}

/// Expand a leading `~/` to the home directory
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
