use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub notifier: NotifierConfig,

    #[serde(default)]
    pub digest: DigestConfig,

    #[serde(default)]
    pub update: UpdateConfig,

    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_level: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            database: DatabaseConfig::default(),
            notifier: NotifierConfig::default(),
            digest: DigestConfig::default(),
            update: UpdateConfig::default(),
            data_dir: None,
            log_level: Some("info".to_string()),
        }
    }
}

impl AppConfig {
    /// Database file to use, falling back to `data.db` inside `data_dir` and
    /// then inside `config_dir`.
    pub fn resolved_db_path(&self, config_dir: &Path) -> PathBuf {
        if let Some(path) = &self.database.path {
            return path.clone();
        }
        self.data_dir
            .clone()
            .unwrap_or_else(|| config_dir.to_path_buf())
            .join("data.db")
    }

    pub fn resolved_migrations_dir(&self) -> PathBuf {
        self.database
            .migrations_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MIGRATIONS_DIR))
    }
}

pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3456
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Explicit path to the SQLite file.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Directory scanned for `*.sql` migration files.
    #[serde(default)]
    pub migrations_dir: Option<PathBuf>,

    /// How long a connection waits on SQLite's write lock before giving up.
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    #[serde(default = "default_notifier_url")]
    pub url: String,

    /// Bearer token for the OpenClaw gateway. Outbound sends are skipped
    /// when unset.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_channel")]
    pub channel: String,

    #[serde(default)]
    pub target: Option<String>,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            url: default_notifier_url(),
            token: None,
            channel: default_channel(),
            target: None,
        }
    }
}

fn default_notifier_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_channel() -> String {
    "telegram".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestConfig {
    #[serde(default)]
    pub deliver_hourly: bool,

    #[serde(default = "default_true")]
    pub deliver_daily: bool,
}

impl Default for DigestConfig {
    fn default() -> Self {
        Self {
            deliver_hourly: false,
            deliver_daily: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Git checkout the service runs from. Defaults to the working directory.
    #[serde(default)]
    pub install_dir: Option<PathBuf>,

    #[serde(default = "default_remote")]
    pub remote: String,

    #[serde(default = "default_branch")]
    pub branch: String,

    /// Optional command run after a successful pull, e.g.
    /// `["cargo", "build", "--release"]`.
    #[serde(default)]
    pub build_command: Vec<String>,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            install_dir: None,
            remote: default_remote(),
            branch: default_branch(),
            build_command: Vec::new(),
        }
    }
}

fn default_remote() -> String {
    "origin".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}
