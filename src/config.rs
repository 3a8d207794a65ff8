use crate::views::slugify;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MARKER_TAG: &str = "Home Assistant";
pub const ENTRY_TITLE: &str = "Jotty Notes & Lists";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "meghendra", "jotty-hub")
}

fn default_state_dir() -> PathBuf {
    if let Some(path) = std::env::var_os("JOTTY_HUB_STATE_DIR") {
        return PathBuf::from(path);
    }
    if let Some(dirs) = project_dirs() {
        return dirs.data_dir().to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".jotty-hub")
}

pub fn config_path() -> PathBuf {
    if let Some(path) = std::env::var_os("JOTTY_HUB_CONFIG") {
        return PathBuf::from(path);
    }
    if let Some(dirs) = project_dirs() {
        return dirs.config_dir().join("config.toml");
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".jotty-hub-config.toml")
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub polling: PollingConfig,
    pub timeouts: TimeoutConfig,
    pub data: DataConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct ConnectionConfig {
    pub url: String,
    pub api_key: String,
    pub marker_tag: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3000".to_string(),
            api_key: String::new(),
            marker_tag: DEFAULT_MARKER_TAG.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
    pub refresh_debounce_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 300,
            refresh_debounce_ms: 500,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub request_seconds: u64,
    pub fetch_seconds: u64,
    pub health_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_seconds: 30,
            fetch_seconds: 10,
            health_seconds: 10,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_seconds)
    }

    pub fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_seconds)
    }

    pub fn health(&self) -> Duration {
        Duration::from_secs(self.health_seconds)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DataConfig {
    pub state_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&config_path())
    }

    pub fn load_from(config_path: &Path) -> Self {
        let mut config = if let Ok(content) = fs::read_to_string(config_path) {
            match toml::from_str::<Config>(&content) {
                Ok(config) => config,
                Err(e) => {
                    // Logging is not initialized yet; the level comes from this file.
                    eprintln!("Failed to parse config.toml ({config_path:?}), using defaults: {e}");
                    Config::default()
                }
            }
        } else {
            Config::default()
        };

        let changed = config.normalize();

        if changed || !config_path.exists() {
            let _ = config.save_to_path(config_path);
        }

        config
    }

    pub fn save_to_path(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).unwrap_or_default();
        fs::write(path, content)
    }

    /// API key from the file, falling back to `JOTTY_API_KEY`.
    pub fn api_key(&self) -> String {
        if !self.connection.api_key.trim().is_empty() {
            return self.connection.api_key.trim().to_string();
        }
        std::env::var("JOTTY_API_KEY").unwrap_or_default()
    }

    /// One registry file per instance, keyed by server URL and marker tag,
    /// so instances sharing a state dir never see each other's views.
    pub fn entity_registry_path(&self) -> PathBuf {
        let instance = slugify(&format!(
            "{} {}",
            self.connection.url, self.connection.marker_tag
        ));
        self.data
            .state_dir
            .join(format!("entities-{instance}.json"))
    }

    fn normalize(&mut self) -> bool {
        let mut changed = false;

        let trimmed = self.connection.url.trim().trim_end_matches('/').to_string();
        if trimmed != self.connection.url {
            self.connection.url = trimmed;
            changed = true;
        }

        if self.connection.marker_tag.is_empty() {
            self.connection.marker_tag = DEFAULT_MARKER_TAG.to_string();
            changed = true;
        }

        if self.polling.interval_seconds == 0 {
            self.polling.interval_seconds = PollingConfig::default().interval_seconds;
            changed = true;
        }

        let defaults = TimeoutConfig::default();
        for (value, default) in [
            (&mut self.timeouts.request_seconds, defaults.request_seconds),
            (&mut self.timeouts.fetch_seconds, defaults.fetch_seconds),
            (&mut self.timeouts.health_seconds, defaults.health_seconds),
        ] {
            if *value == 0 {
                *value = default;
                changed = true;
            }
        }

        if self.data.state_dir.as_os_str().is_empty() {
            self.data.state_dir = default_state_dir();
            changed = true;
        }

        if self.data.state_dir.is_relative() {
            self.data.state_dir = default_state_dir().join(&self.data.state_dir);
            changed = true;
        }

        changed
    }
}
