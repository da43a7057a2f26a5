use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cache::DEFAULT_TTL;
use crate::models::DEFAULT_DAYS;
use crate::sync::{RetryPolicy, SchedulerSettings};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
  pub database: DatabaseConfig,
  pub cache: CacheConfig,
  pub sync: SyncConfig,
  pub http: HttpConfig,
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
  /// Integration database (defaults to the user data directory)
  pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
  /// SQLite file shared between runs
  #[default]
  Sqlite,
  /// Process-local, gone on exit
  Memory,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub enabled: bool,
  pub backend: CacheBackend,
  /// SQLite cache file (defaults to the user data directory)
  pub path: Option<PathBuf>,
  pub ttl_seconds: u64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      backend: CacheBackend::default(),
      path: None,
      ttl_seconds: DEFAULT_TTL.as_secs(),
    }
  }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration {
    Duration::from_secs(self.ttl_seconds)
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
  pub interval_seconds: u64,
  pub initial_attempts: u32,
  pub initial_retry_delay_seconds: u64,
  pub batch_attempts: u32,
  pub batch_retry_delay_seconds: u64,
  /// Lookback window of scheduled syncs
  pub default_days: u32,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_seconds: 3600,
      initial_attempts: 3,
      initial_retry_delay_seconds: 60,
      batch_attempts: 2,
      batch_retry_delay_seconds: 300,
      default_days: DEFAULT_DAYS,
    }
  }
}

impl SyncConfig {
  pub fn scheduler_settings(&self) -> SchedulerSettings {
    SchedulerSettings {
      interval: Duration::from_secs(self.interval_seconds.max(1)),
      initial_retry: RetryPolicy::new(
        self.initial_attempts,
        Duration::from_secs(self.initial_retry_delay_seconds),
      ),
      batch_retry: RetryPolicy::new(
        self.batch_attempts,
        Duration::from_secs(self.batch_retry_delay_seconds),
      ),
      days: self.default_days,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
  /// Hard bound on every upstream call
  pub timeout_seconds: u64,
}

impl Default for HttpConfig {
  fn default() -> Self {
    Self {
      timeout_seconds: 30,
    }
  }
}

impl HttpConfig {
  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_seconds.max(1))
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Also write daily rotated log files here
  pub directory: Option<PathBuf>,
  /// JSON lines instead of human-readable output
  pub json: bool,
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./agiletrack.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/agiletrack/config.yaml
  ///
  /// Without any file the defaults apply.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Self::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("agiletrack.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("agiletrack").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file deserializes to null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }
}
