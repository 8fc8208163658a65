use std::path::{Path, PathBuf};

use thought_common::{Error, Result};
use tracing::{info, warn};

use crate::model::AppConfig;

/// Environment variable that relocates the whole config directory.
pub const HOME_ENV: &str = "THOUGHT_SYSTEM_HOME";

pub struct ConfigLoader {
    config_dir: PathBuf,
}

impl ConfigLoader {
    pub fn new() -> Result<Self> {
        let config_dir = Self::default_config_dir();
        Ok(Self { config_dir })
    }

    pub fn default_config_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(HOME_ENV)
            && !dir.trim().is_empty()
        {
            return PathBuf::from(dir);
        }

        let home_dir = dirs::home_dir().map(|h| h.join(".thought-system"));
        let xdg_dir = dirs::config_dir().map(|c| c.join("thought-system"));

        match (xdg_dir, home_dir) {
            // An existing XDG directory wins, otherwise keep the legacy home location.
            (Some(xdg), _) if xdg.exists() => xdg,
            (_, Some(home)) => home,
            (Some(xdg), None) => xdg,
            (None, None) => PathBuf::from(".thought-system"),
        }
    }

    pub fn with_dir(config_dir: impl Into<PathBuf>) -> Self {
        Self {
            config_dir: config_dir.into(),
        }
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Load the config file (if any) and apply environment overrides.
    pub fn load(&self) -> Result<AppConfig> {
        let config = self.load_file()?;
        Ok(apply_env_overrides(config, |key| std::env::var(key).ok()))
    }

    pub fn load_file(&self) -> Result<AppConfig> {
        let yaml_path = self.config_dir.join("config.yml");
        let toml_path = self.config_dir.join("config.toml");

        if yaml_path.exists() {
            info!("loading config from {}", yaml_path.display());
            let contents = std::fs::read_to_string(&yaml_path)?;
            serde_yaml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse YAML config: {e}")))
        } else if toml_path.exists() {
            info!("loading config from {}", toml_path.display());
            let contents = std::fs::read_to_string(&toml_path)?;
            toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("failed to parse TOML config: {e}")))
        } else {
            info!("no config file found, using defaults");
            Ok(AppConfig::default())
        }
    }

    /// Resolve the database path for this loader's directory.
    pub fn db_path(&self, config: &AppConfig) -> PathBuf {
        config.resolved_db_path(&self.config_dir)
    }

    pub fn ensure_dirs(&self, config: &AppConfig) -> Result<()> {
        let mut dirs = vec![self.config_dir.clone()];
        if let Some(data_dir) = &config.data_dir {
            dirs.push(data_dir.clone());
        }
        if let Some(parent) = self.db_path(config).parent()
            && !parent.as_os_str().is_empty()
        {
            dirs.push(parent.to_path_buf());
        }

        for dir in &dirs {
            if !dir.exists() {
                std::fs::create_dir_all(dir)?;
            }
        }

        Ok(())
    }
}

/// Overlay environment variables on top of file-based config.
///
/// `lookup` is `std::env::var` in production; tests pass a map.
pub fn apply_env_overrides<F>(mut config: AppConfig, lookup: F) -> AppConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(port) = lookup("THOUGHT_SYSTEM_PORT") {
        match port.trim().parse::<u16>() {
            Ok(port) => config.gateway.port = port,
            Err(_) => warn!("ignoring invalid THOUGHT_SYSTEM_PORT: {port}"),
        }
    }

    if let Some(path) = lookup("THOUGHT_SYSTEM_DB").filter(|p| !p.trim().is_empty()) {
        config.database.path = Some(PathBuf::from(path));
    }

    if let Some(url) = lookup("OPENCLAW_URL").filter(|u| !u.trim().is_empty()) {
        config.notifier.url = url;
    }

    if let Some(token) = lookup("OPENCLAW_TOKEN").filter(|t| !t.trim().is_empty()) {
        config.notifier.token = Some(token);
    }

    config
}
