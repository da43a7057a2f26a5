/// Integration table. `config` holds a JSON object, `last_sync` an RFC 3339
/// timestamp.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS integrations (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  name TEXT NOT NULL,
  integration_type TEXT NOT NULL,
  api_key TEXT,
  api_url TEXT,
  username TEXT,
  config TEXT NOT NULL DEFAULT '{}',
  active INTEGER NOT NULL DEFAULT 1,
  last_sync TEXT,
  project_id INTEGER,
  team_id INTEGER,
  created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_integrations_active ON integrations(active);
CREATE INDEX IF NOT EXISTS idx_integrations_project ON integrations(project_id);
CREATE INDEX IF NOT EXISTS idx_integrations_team ON integrations(team_id);
"#;
