pub mod schema;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{SyncError, SyncResult};
use crate::models::{Integration, Owner};

/// Persistence boundary the sync core reads integrations through.
pub trait IntegrationStore: Send + Sync {
  fn get_integration(&self, id: i64) -> SyncResult<Option<Integration>>;

  fn list_active_integrations(&self) -> SyncResult<Vec<Integration>>;

  /// Active integrations attached to a project or team.
  fn list_integrations_for_owner(&self, owner: OwnerRef) -> SyncResult<Vec<Integration>>;

  fn update_last_sync(&self, id: i64, at: DateTime<Utc>) -> SyncResult<()>;
}

/// Selects integrations by owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerRef {
  Project(i64),
  Team(i64),
}

/// Fields of an integration about to be created.
#[derive(Debug, Clone, Default)]
pub struct NewIntegration {
  pub name: String,
  pub kind: String,
  pub api_key: Option<String>,
  pub api_url: Option<String>,
  pub username: Option<String>,
  pub config: Map<String, Value>,
  pub owner: Owner,
}

const COLUMNS: &str = "id, name, integration_type, api_key, api_url, username, config, active, \
                       last_sync, project_id, team_id";

/// SQLite-backed integration store
pub struct Database {
  conn: Mutex<Connection>,
}

impl Database {
  /// Open or create the database at `path`
  pub fn open(path: &Path) -> SyncResult<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        SyncError::Store(format!("failed to create database directory: {}", e))
      })?;
    }

    let conn = Connection::open(path).map_err(|e| {
      SyncError::Store(format!("failed to open database at {}: {}", path.display(), e))
    })?;
    Self::from_connection(conn)
  }

  #[cfg(test)]
  pub fn open_in_memory() -> SyncResult<Self> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> SyncResult<Self> {
    conn.execute_batch(schema::SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path
  pub fn default_path() -> Option<PathBuf> {
    dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .map(|dir| dir.join("agiletrack").join("agiletrack.db"))
  }

  fn conn(&self) -> SyncResult<std::sync::MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|_| SyncError::Store("database lock poisoned".to_string()))
  }

  /// Insert an integration and return it with its assigned id.
  pub fn insert_integration(&self, new: &NewIntegration) -> SyncResult<Integration> {
    let config = serde_json::to_string(&new.config)
      .map_err(|e| SyncError::Store(format!("failed to encode config: {}", e)))?;

    let id = {
      let conn = self.conn()?;
      conn.execute(
        "INSERT INTO integrations
           (name, integration_type, api_key, api_url, username, config, project_id, team_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          new.name,
          new.kind,
          new.api_key,
          new.api_url,
          new.username,
          config,
          new.owner.project_id,
          new.owner.team_id,
        ],
      )?;
      conn.last_insert_rowid()
    };

    tracing::info!(integration_id = id, kind = %new.kind, "integration created");
    self
      .get_integration(id)?
      .ok_or(SyncError::NotFound(id))
  }

  /// Turn an integration on or off. Returns false when no row matched.
  pub fn set_active(&self, id: i64, active: bool) -> SyncResult<bool> {
    let updated = self.conn()?.execute(
      "UPDATE integrations SET active = ? WHERE id = ?",
      params![active, id],
    )?;
    Ok(updated > 0)
  }

  fn query(&self, filter: &str, args: impl rusqlite::Params) -> SyncResult<Vec<Integration>> {
    let conn = self.conn()?;
    let sql = format!("SELECT {} FROM integrations WHERE {} ORDER BY id", COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
      .query_map(args, integration_from_row)?
      .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
  }
}

impl IntegrationStore for Database {
  fn get_integration(&self, id: i64) -> SyncResult<Option<Integration>> {
    let conn = self.conn()?;
    let sql = format!("SELECT {} FROM integrations WHERE id = ?", COLUMNS);
    let integration = conn
      .query_row(&sql, params![id], integration_from_row)
      .optional()?;
    Ok(integration)
  }

  fn list_active_integrations(&self) -> SyncResult<Vec<Integration>> {
    self.query("active = 1", [])
  }

  fn list_integrations_for_owner(&self, owner: OwnerRef) -> SyncResult<Vec<Integration>> {
    match owner {
      OwnerRef::Project(id) => self.query("active = 1 AND project_id = ?", params![id]),
      OwnerRef::Team(id) => self.query("active = 1 AND team_id = ?", params![id]),
    }
  }

  fn update_last_sync(&self, id: i64, at: DateTime<Utc>) -> SyncResult<()> {
    let updated = self.conn()?.execute(
      "UPDATE integrations SET last_sync = ? WHERE id = ?",
      params![at.to_rfc3339(), id],
    )?;
    if updated == 0 {
      return Err(SyncError::NotFound(id));
    }
    Ok(())
  }
}

fn integration_from_row(row: &Row<'_>) -> rusqlite::Result<Integration> {
  let id: i64 = row.get(0)?;
  let config: String = row.get(6)?;
  let last_sync: Option<String> = row.get(8)?;

  let config = match serde_json::from_str::<Value>(&config) {
    Ok(Value::Object(map)) => map,
    Ok(_) | Err(_) => {
      tracing::warn!(integration_id = id, "ignoring malformed integration config");
      Map::new()
    }
  };

  Ok(Integration {
    id,
    name: row.get(1)?,
    kind: row.get(2)?,
    api_key: row.get(3)?,
    api_url: row.get(4)?,
    username: row.get(5)?,
    config,
    active: row.get(7)?,
    last_sync: last_sync
      .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
      .map(|dt| dt.with_timezone(&Utc)),
    owner: Owner {
      project_id: row.get(9)?,
      team_id: row.get(10)?,
    },
  })
}
