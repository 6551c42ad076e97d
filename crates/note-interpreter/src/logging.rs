//! Tracing setup for the binaries.
//!
//! Logs go to stderr so stdout stays free for prompts, answers and JSON
//! output. A plain-text file log is added when asked for, or automatically
//! at `debug`/`trace` level.

use std::path::PathBuf;

use chrono::Local;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::LogSettings;
use crate::error::{Error, Result};

/// Parse a level name (`trace` .. `error`, case-insensitive).
pub fn parse_level(level: &str) -> Result<Level> {
    level
        .trim()
        .parse::<Level>()
        .map_err(|_| Error::Config(format!("invalid log level '{level}'")))
}

fn env_filter(level: Level) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy()
}

/// Whether a file log is written for these settings.
pub fn wants_file_log(settings: &LogSettings, level: Level) -> bool {
    settings.log_to_file || level >= Level::DEBUG
}

/// Timestamped log file name, `note_interpreter_YYYYmmdd_HHMMSS.log`.
pub fn log_file_name() -> String {
    format!("note_interpreter_{}.log", Local::now().format("%Y%m%d_%H%M%S"))
}

/// Install the global subscriber.
///
/// `RUST_LOG` overrides the configured level. Keep the returned guard alive
/// for the life of the process or buffered file output is lost.
pub fn init_logging(settings: &LogSettings) -> Result<Option<WorkerGuard>> {
    let level = parse_level(&settings.level)?;

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_filter(env_filter(level));

    if !wants_file_log(settings, level) {
        tracing_subscriber::registry()
            .with(stderr_layer)
            .try_init()
            .map_err(|e| Error::Config(format!("failed to install logger: {e}")))?;
        return Ok(None);
    }

    let dir = PathBuf::from(&settings.log_dir);
    std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
    let file_name = log_file_name();
    let (writer, guard) = tracing_appender::non_blocking(rolling::never(&dir, &file_name));
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_filter(env_filter(level));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install logger: {e}")))?;
    tracing::debug!("Writing log file {}", dir.join(&file_name).display());
    Ok(Some(guard))
}
