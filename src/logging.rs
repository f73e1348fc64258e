//! Structured logging: console plus a daily rolling file.

use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{PosError, PosResult};

const LOG_FILE_PREFIX: &str = "pos";
/// Daily files kept after pruning.
pub const MAX_LOG_FILES: usize = 14;

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
/// Dropping the returned guard flushes and stops the file writer.
pub fn init_logging(log_dir: &Path) -> PosResult<WorkerGuard> {
    fs::create_dir_all(log_dir)?;
    prune_old_logs(log_dir, MAX_LOG_FILES);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shop_pos_lib=debug"));

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| PosError::Config(format!("Logging already initialised: {e}")))?;

    Ok(guard)
}

/// Keep only the `keep` most recently modified `pos.*` files.
pub fn prune_old_logs(log_dir: &Path, keep: usize) -> usize {
    let Ok(entries) = fs::read_dir(log_dir) else {
        return 0;
    };
    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with("pos.") || n == "pos.log")
                .unwrap_or(false)
        })
        .map(|path| {
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH);
            (path, modified)
        })
        .collect();

    // newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(keep) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) => warn!("Failed to prune log file {}: {e}", path.display()),
        }
    }
    removed
}
