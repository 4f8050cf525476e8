use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Local;
use restore_utils::{PLUGIN_NAME_SMALL, ServerPaths, ensure_dir};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// `<server>/logs/EasyBackuper/easybackuper_restore_<YYYYMMDD>.log`
pub fn log_file_path(paths: &ServerPaths) -> PathBuf {
    paths.log_dir.join(format!(
        "{PLUGIN_NAME_SMALL}_restore_{}.log",
        Local::now().format("%Y%m%d")
    ))
}

/// Console with colour, plus the same lines appended in plain text to today's log file.
pub fn init(paths: &ServerPaths, debug: bool) -> Result<PathBuf> {
    ensure_dir(&paths.log_dir)
        .with_context(|| format!("Failed to create log directory {}", paths.log_dir.display()))?;
    let path = log_file_path(paths);
    let file = open_append(&path)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_timer(ChronoLocal::new(TIME_FORMAT.to_string())),
        )
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(debug)
                .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
                .with_writer(Arc::new(file)),
        )
        .try_init()
        .context("Failed to install log subscriber")?;

    Ok(path)
}

fn open_append(path: &Path) -> Result<std::fs::File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_is_dated_under_plugin_dir() {
        let paths = ServerPaths::new("/srv/bedrock");
        let path = log_file_path(&paths);
        let name = path.file_name().expect("file name").to_string_lossy().into_owned();

        assert!(path.starts_with("/srv/bedrock/logs/EasyBackuper"));
        assert!(name.starts_with("easybackuper_restore_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "easybackuper_restore_".len() + 8 + ".log".len());
    }
}
