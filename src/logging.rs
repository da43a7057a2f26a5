use color_eyre::{eyre::eyre, Result};
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

use crate::config::LoggingConfig;

/// Flushes the file writer on exit; lives for the whole process.
static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Install the global subscriber.
///
/// Events go to stderr, plus a daily rotated JSON file when a log directory
/// is configured. `RUST_LOG` overrides the default `info` level.
pub fn init(config: &LoggingConfig) -> Result<()> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let mut layers: Vec<BoxedLayer> = Vec::new();
  let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);
  layers.push(if config.json {
    stderr.json().boxed()
  } else {
    stderr.boxed()
  });

  if let Some(dir) = &config.directory {
    std::fs::create_dir_all(dir)
      .map_err(|e| eyre!("Failed to create log directory {}: {}", dir.display(), e))?;
    let appender = tracing_appender::rolling::daily(dir, "agiletrack.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    layers.push(fmt::layer().json().with_ansi(false).with_writer(writer).boxed());
  }

  tracing_subscriber::registry()
    .with(layers)
    .with(filter)
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))
}
