//! Cache store trait and its SQLite, in-memory and no-op implementations.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;

/// The cache store could not be reached or used.
#[derive(Debug, Error)]
pub enum CacheError {
  #[error("cache unavailable: {0}")]
  Unavailable(String),
  #[error("cache lock poisoned")]
  Poisoned,
}

impl From<rusqlite::Error> for CacheError {
  fn from(value: rusqlite::Error) -> Self {
    Self::Unavailable(value.to_string())
  }
}

/// Key-value store with per-entry expiry.
///
/// Calls may block; async callers go through `Memoizer`, which moves them off
/// the runtime workers.
pub trait CacheStore: Send + Sync {
  /// Fetch a live entry. Expired entries read as `None`.
  fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;

  /// Store an entry that expires after `ttl`.
  fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;
}

/// Store that never caches. Used when caching is disabled or the real store
/// could not be opened.
pub struct NoopStore;

impl CacheStore for NoopStore {
  fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, CacheError> {
    Ok(None)
  }

  fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), CacheError> {
    Ok(())
  }
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, (Vec<u8>, Instant)>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
    let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
    match entries.get(key) {
      Some((value, expires_at)) if *expires_at > Instant::now() => Ok(Some(value.clone())),
      Some(_) => {
        entries.remove(key);
        Ok(None)
      }
      None => Ok(None),
    }
  }

  fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
    let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
    entries.insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
    Ok(())
  }
}

/// SQLite-backed store shared by every process pointing at the same file.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS metric_cache (
    cache_key TEXT PRIMARY KEY,
    value BLOB NOT NULL,
    expires_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_metric_cache_expiry ON metric_cache(expires_at);
"#;

impl SqliteStore {
  /// Open (or create) the cache database at `path`.
  pub fn open(path: &Path) -> Result<Self, CacheError> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        CacheError::Unavailable(format!("failed to create cache directory: {}", e))
      })?;
    }

    let conn = Connection::open(path)?;
    Self::from_connection(conn)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> Result<Self, CacheError> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self, CacheError> {
    conn.execute_batch(CACHE_SCHEMA)?;
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.purge_expired()?;
    Ok(store)
  }

  /// Default location of the cache file.
  pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|dir| dir.join("agiletrack").join("cache.db"))
  }

  /// Drop every expired entry. Returns the number removed.
  pub fn purge_expired(&self) -> Result<usize, CacheError> {
    let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
    let removed = conn.execute(
      "DELETE FROM metric_cache WHERE expires_at <= ?",
      params![Utc::now().timestamp()],
    )?;
    Ok(removed)
  }
}

impl CacheStore for SqliteStore {
  fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
    let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
    let value = conn
      .query_row(
        "SELECT value FROM metric_cache WHERE cache_key = ? AND expires_at > ?",
        params![key, Utc::now().timestamp()],
        |row| row.get::<_, Vec<u8>>(0),
      )
      .optional()?;
    Ok(value)
  }

  fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
    let conn = self.conn.lock().map_err(|_| CacheError::Poisoned)?;
    let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;
    conn.execute(
      "INSERT OR REPLACE INTO metric_cache (cache_key, value, expires_at) VALUES (?, ?, ?)",
      params![key, value, expires_at],
    )?;
    Ok(())
  }
}
