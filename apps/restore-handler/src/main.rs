use std::path::PathBuf;
use std::process::ExitCode;

use restore_core::pipeline::{RemovalOutcome, SnapshotOutcome};
use restore_core::{ConfigSource, PluginConfig, RestoreContext, RestoreRequest, Restorer};
use restore_utils::ServerPaths;
use tracing::{debug, error, info, warn};

mod cli;
mod logging;

#[tokio::main]
async fn main() -> ExitCode {
    let request = match cli::parse(std::env::args_os()) {
        cli::Parsed::Request(request) => request,
        cli::Parsed::Missing => {
            println!("{}", cli::USAGE);
            println!("Missing required parameters");
            pause_before_exit();
            return ExitCode::FAILURE;
        }
    };

    if !request.server_dir.is_dir() {
        println!(
            "Server directory does not exist: {}",
            request.server_dir.display()
        );
        return ExitCode::FAILURE;
    }

    let paths = ServerPaths::new(&request.server_dir);
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let (config, source) = match PluginConfig::load(&paths, &cwd) {
        Ok(loaded) => loaded,
        Err(err) => {
            println!("Failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };

    let log_path = match logging::init(&paths, config.restore.debug) {
        Ok(path) => path,
        Err(err) => {
            println!("Failed to setup logging: {err:#}");
            return ExitCode::FAILURE;
        }
    };

    banner(&request, &log_path);
    report_config(&source, &config);

    let restorer = Restorer::new(request, RestoreContext::new(config, paths));
    match restorer.run().await {
        Ok(summary) => {
            if let SnapshotOutcome::Saved(path) = &summary.snapshot {
                info!("pre-restore snapshot: {}", path.display());
            }
            if let RemovalOutcome::Failed(reason) = &summary.old_world {
                warn!("old world was not fully removed ({reason}); check for leftover files");
            }
            debug!("restore summary: {summary:?}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("restore aborted: {err}");
            ExitCode::FAILURE
        }
    }
}

fn banner(request: &RestoreRequest, log_path: &std::path::Path) {
    info!("{}", "=".repeat(60));
    info!("EasyBackuper restore handler v{} started", restore_core::pkg_version());
    info!(
        "operating system: {}/{}",
        std::env::consts::OS,
        std::env::consts::ARCH
    );
    info!("server directory: {}", request.server_dir.display());
    info!("backup file: {}", request.backup_file.display());
    info!("world: {}", request.world_name);
    info!("log file: {}", log_path.display());
    info!("{}", "=".repeat(60));
}

fn report_config(source: &ConfigSource, config: &PluginConfig) {
    match source {
        ConfigSource::File(path) => info!("loaded configuration file: {}", path.display()),
        ConfigSource::Defaults { probed } => {
            for path in probed {
                debug!("no configuration at {}", path.display());
            }
            warn!("no configuration file found, using default configuration");
        }
    }
    info!("debug mode: {}", config.restore.debug);
    info!("max workers: {}", config.max_workers);
    info!("compression method: {}", config.compression_method);
    match serde_json::to_string(config) {
        Ok(json) => debug!("effective configuration: {json}"),
        Err(err) => debug!("failed to serialize configuration: {err}"),
    }
}

/// The Windows console closes with the process; give the operator a chance to read the usage.
fn pause_before_exit() {
    if cfg!(windows) {
        println!("Press Enter to continue...");
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
    }
}
