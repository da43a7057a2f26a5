mod adapters;
mod cache;
mod config;
mod dashboard;
mod db;
mod error;
mod github;
mod jira;
mod logging;
mod models;
mod registry;
mod service;
mod sync;
mod trello;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

use crate::cache::{CacheStore, Memoizer, MemoryStore, NoopStore, SqliteStore};
use crate::config::{CacheBackend, CacheConfig, Config};
use crate::db::{Database, NewIntegration, OwnerRef};
use crate::models::{MetricParams, Owner, DEFAULT_DAYS};
use crate::registry::{HttpConnector, Registry};
use crate::service::MetricsService;
use crate::sync::Scheduler;

#[derive(Parser, Debug)]
#[command(name = "agiletrack")]
#[command(about = "Engineering metrics from GitHub, Jira and Trello")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/agiletrack/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(clap::Args, Debug)]
struct RequestArgs {
  /// Lookback window in days
  #[arg(long, default_value_t = DEFAULT_DAYS)]
  days: u32,

  /// Jira project key (overrides the stored one)
  #[arg(long)]
  project_key: Option<String>,

  /// Trello board id (overrides the stored one)
  #[arg(long)]
  board_id: Option<String>,
}

impl RequestArgs {
  fn params(&self) -> MetricParams {
    MetricParams {
      days: self.days,
      project_key: self.project_key.clone(),
      board_id: self.board_id.clone(),
    }
  }
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Register an integration and run its initial sync
  Add {
    #[arg(long)]
    name: String,

    /// github, jira or trello
    #[arg(long = "type")]
    kind: String,

    #[arg(long)]
    api_key: Option<String>,

    /// Jira server, or GitHub/Trello API base
    #[arg(long)]
    api_url: Option<String>,

    #[arg(long)]
    username: Option<String>,

    #[arg(long)]
    project_id: Option<i64>,

    #[arg(long)]
    team_id: Option<i64>,

    /// Config entry such as repository=acme/app (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_value)]
    settings: Vec<(String, String)>,
  },

  /// Print the metrics envelope of one integration
  Metrics {
    id: i64,
    #[command(flatten)]
    request: RequestArgs,
  },

  /// Compute metrics and fail on any error
  Validate {
    id: i64,
    #[command(flatten)]
    request: RequestArgs,
  },

  /// Metrics of every integration of a project or team
  Dashboard {
    #[arg(long, conflicts_with = "team", required_unless_present = "team")]
    project: Option<i64>,

    #[arg(long)]
    team: Option<i64>,

    #[arg(long, default_value_t = DEFAULT_DAYS)]
    days: u32,
  },

  /// Sync every active integration once
  Sync,

  /// Sync periodically until interrupted
  Run,

  /// Stop syncing an integration
  Deactivate { id: i64 },

  /// List supported integration types
  Types,

  /// List the metrics an integration type provides
  SupportedMetrics {
    #[arg(value_name = "TYPE")]
    kind: String,
  },
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
  raw
    .split_once('=')
    .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
    .filter(|(k, _)| !k.is_empty())
    .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))
}

/// Long-lived handles shared by all commands.
struct Context {
  db: Arc<Database>,
  service: MetricsService,
  scheduler: Scheduler,
}

impl Context {
  fn build(config: &Config) -> Result<Self> {
    let db_path = config
      .database
      .path
      .clone()
      .or_else(Database::default_path)
      .ok_or_else(|| eyre!("Could not determine data directory"))?;
    let db = Arc::new(Database::open(&db_path)?);

    let memo = Memoizer::new(open_cache(&config.cache)).with_ttl(config.cache.ttl());
    let connector = Arc::new(HttpConnector::new(config.http.timeout()));
    let service = MetricsService::new(Registry::new(connector, memo), db.clone());
    let scheduler = Scheduler::new(service.clone(), config.sync.scheduler_settings());

    Ok(Self {
      db,
      service,
      scheduler,
    })
  }
}

/// Pick the cache store. A store that cannot be opened degrades to no caching.
fn open_cache(config: &CacheConfig) -> Arc<dyn CacheStore> {
  if !config.enabled {
    return Arc::new(NoopStore);
  }
  match config.backend {
    CacheBackend::Memory => Arc::new(MemoryStore::new()),
    CacheBackend::Sqlite => {
      let Some(path) = config.path.clone().or_else(SqliteStore::default_path) else {
        tracing::warn!("no cache location available, caching disabled");
        return Arc::new(NoopStore);
      };
      match SqliteStore::open(&path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
          tracing::warn!(path = %path.display(), error = %e, "cache unavailable, caching disabled");
          Arc::new(NoopStore)
        }
      }
    }
  }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  logging::init(&config.logging)?;

  // Capability listings need no database
  match &args.command {
    Command::Types => return print_json(&Registry::supported_types()),
    Command::SupportedMetrics { kind } => return print_json(&Registry::supported_metrics(kind)?),
    _ => {}
  }

  let ctx = Context::build(&config)?;

  match args.command {
    Command::Add {
      name,
      kind,
      api_key,
      api_url,
      username,
      project_id,
      team_id,
      settings,
    } => {
      let entries: Map<String, Value> = settings
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
      let integration = ctx.db.insert_integration(&NewIntegration {
        name,
        kind,
        api_key,
        api_url,
        username,
        config: entries,
        owner: Owner {
          project_id,
          team_id,
        },
      })?;
      println!("created integration {}", integration.id);

      let report = ctx.scheduler.enqueue_initial_sync(integration.id).await?;
      println!(
        "initial sync: {:?} after {} attempt(s)",
        report.outcome.state(),
        report.attempts
      );
    }
    Command::Metrics { id, request } => {
      let envelope = ctx.service.request_metrics(id, &request.params()).await?;
      print_json(&envelope)?;
    }
    Command::Validate { id, request } => {
      let metrics = ctx.service.validate(id, &request.params()).await?;
      print_json(&metrics)?;
    }
    Command::Dashboard {
      project,
      team,
      days,
    } => {
      let owner = match (project, team) {
        (Some(id), _) => OwnerRef::Project(id),
        (None, Some(id)) => OwnerRef::Team(id),
        (None, None) => return Err(eyre!("either --project or --team is required")),
      };
      let view = dashboard::owner_dashboard(&ctx.service, owner, days).await?;
      print_json(&view)?;
    }
    Command::Sync => {
      let report = ctx.scheduler.run_periodic_sync().await?;
      println!(
        "synced {} integration(s): {} succeeded, {} skipped, {} failed",
        report.total(),
        report.count(sync::SyncState::Succeeded),
        report.count(sync::SyncState::SkippedConfig),
        report.failed()
      );
    }
    Command::Run => {
      let (shutdown_tx, shutdown_rx) = watch::channel(false);
      let handle = ctx.scheduler.spawn_periodic(shutdown_rx);

      tokio::signal::ctrl_c().await?;
      tracing::info!("shutdown requested");
      let _ = shutdown_tx.send(true);
      handle.await?;
    }
    Command::Deactivate { id } => {
      if !ctx.db.set_active(id, false)? {
        return Err(eyre!("Integration {} not found", id));
      }
      println!("deactivated integration {}", id);
    }
    Command::Types | Command::SupportedMetrics { .. } => {}
  }

  Ok(())
}
