use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::{RetryPolicy, TransportOptions};
use crate::error::SyncError;

const CONFIG_DIR: &str = "inventory-sync";
const CONFIG_FILE: &str = "config.yaml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub url: String,
    pub username: String,
    pub password: String,
    /// `source` tag stamped on every batch
    pub source: String,
    pub accept_invalid_certs: bool,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub cleaning: CleaningConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub connect_secs: u64,
    pub read_secs: u64,
    pub send_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_secs: u64,
    pub transient_delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            url: "http://localhost:3000".to_string(),
            username: "admin".to_string(),
            password: String::new(),
            source: "inventory_sync".to_string(),
            accept_invalid_certs: true,
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            cleaning: CleaningConfig::default(),
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        TimeoutConfig {
            connect_secs: 5,
            read_secs: 10,
            send_secs: 30,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 2,
            initial_delay_secs: 10,
            transient_delay_secs: 10,
        }
    }
}

impl Default for CleaningConfig {
    fn default() -> Self {
        CleaningConfig {
            timeout_secs: 60,
            interval_secs: 5,
        }
    }
}

impl Config {
    /// `~/.config/inventory-sync/config.yaml` (or the platform equivalent).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, or from the default location if it exists.
    /// An explicit path that cannot be read is an error; a missing default file is not.
    pub fn load(path: Option<&Path>) -> Result<Config, SyncError> {
        match path {
            Some(path) => Self::from_file(path),
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::from_file(&default),
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Config::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Config, SyncError> {
        let contents = fs::read_to_string(path).map_err(|e| {
            SyncError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = serde_yaml::from_str(&contents)?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    /// Command line / environment values win over the file.
    pub fn apply_overrides(
        &mut self,
        url: Option<&str>,
        username: Option<&str>,
        password: Option<&str>,
    ) {
        if let Some(url) = url {
            self.url = url.to_string();
        }
        if let Some(username) = username {
            self.username = username.to_string();
        }
        if let Some(password) = password {
            self.password = password.to_string();
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if !(self.url.starts_with("http://") || self.url.starts_with("https://")) {
            return Err(SyncError::Config(format!(
                "url must start with http:// or https://, got '{}'",
                self.url
            )));
        }
        if self.username.is_empty() {
            return Err(SyncError::Config("username must not be empty".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(SyncError::Config("retry.max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            connect_timeout: Duration::from_secs(self.timeouts.connect_secs),
            read_timeout: Duration::from_secs(self.timeouts.read_secs),
            accept_invalid_certs: self.accept_invalid_certs,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_delay: Duration::from_secs(self.retry.initial_delay_secs),
            transient_delay: Duration::from_secs(self.retry.transient_delay_secs),
        }
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.send_secs)
    }

    pub fn cleaning_timeout(&self) -> Duration {
        Duration::from_secs(self.cleaning.timeout_secs)
    }

    pub fn cleaning_interval(&self) -> Duration {
        Duration::from_secs(self.cleaning.interval_secs)
    }
}
