use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::task;
use tokio::time::sleep;
use tracing::{error, info};

use crate::archive::{ArchiveEngine, Backend};
use crate::config::PluginConfig;
use crate::copy::{CopyReport, copy_tree};
use crate::errors::{RestoreError, Result};
use crate::fsutil::{ScratchDir, remove_dir_forced};
use crate::launcher::{LaunchOutcome, ProcessLauncher, platform_launcher};
use crate::process::{ProcessWatcher, default_server_process_name};
use restore_utils::{ServerPaths, ensure_dir};

/// The three inputs the plugin hands over. Fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreRequest {
    pub backup_file: PathBuf,
    pub server_dir: PathBuf,
    pub world_name: String,
}

/// Everything the pipeline needs, passed in explicitly instead of living in globals.
pub struct RestoreContext {
    pub config: PluginConfig,
    pub paths: ServerPaths,
    pub engine: ArchiveEngine,
    pub watcher: ProcessWatcher,
    pub launcher: Arc<dyn ProcessLauncher>,
    pub process_name: String,
}

impl RestoreContext {
    /// Production wiring: 7-zip + tar backends, `sysinfo` process table, platform launcher.
    pub fn new(config: PluginConfig, paths: ServerPaths) -> Self {
        let timeout = match config.restore.wait_timeout_s {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let process_name = config
            .restore
            .server_process_name
            .clone()
            .unwrap_or_else(|| default_server_process_name().to_string());

        Self {
            engine: ArchiveEngine::from_config(&config, &paths),
            watcher: ProcessWatcher::system().with_timeout(timeout),
            launcher: platform_launcher(),
            process_name,
            config,
            paths,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotOutcome {
    Disabled,
    Saved(PathBuf),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalOutcome {
    Absent,
    Removed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartOutcome {
    Disabled,
    ScriptMissing(PathBuf),
    Launched(LaunchOutcome),
    Failed(String),
}

/// What happened in each step of a completed restore.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreSummary {
    pub snapshot: SnapshotOutcome,
    pub old_world: RemovalOutcome,
    pub installed: CopyReport,
    pub restart: RestartOutcome,
}

pub struct Restorer {
    request: RestoreRequest,
    ctx: RestoreContext,
}

fn separator() {
    info!("{}", "=".repeat(60));
}

impl Restorer {
    pub fn new(request: RestoreRequest, ctx: RestoreContext) -> Self {
        Self { request, ctx }
    }

    fn world_dir(&self) -> PathBuf {
        self.ctx.paths.world_dir(&self.request.world_name)
    }

    fn workers(&self) -> usize {
        self.ctx.config.max_workers
    }

    /// Run every step in order.
    ///
    /// Errors come only from the required steps: waiting for the server,
    /// extracting the archive and installing the extracted world. Snapshot,
    /// old-world removal and restart failures are logged and recorded in the
    /// summary instead.
    pub async fn run(&self) -> Result<RestoreSummary> {
        self.await_quiescent().await?;
        separator();

        let snapshot = if self.ctx.config.restore.backup_old_world_before_restore {
            info!("configured to back up the current world before restoring");
            match self.snapshot().await {
                Ok(path) => {
                    info!("pre-restore backup completed");
                    SnapshotOutcome::Saved(path)
                }
                Err(err) => {
                    error!("pre-restore backup failed: {err}");
                    SnapshotOutcome::Failed(err.to_string())
                }
            }
        } else {
            info!("configured not to back up the current world");
            SnapshotOutcome::Disabled
        };
        separator();

        let (old_world, installed) = {
            let scratch = self.extract().await?;
            separator();
            let old_world = self.replace().await;
            separator();
            let installed = self.install(scratch.path()).await?;
            (old_world, installed)
        };
        info!("backup restore completed");
        separator();

        let restart = self.restart().await;

        Ok(RestoreSummary {
            snapshot,
            old_world,
            installed,
            restart,
        })
    }

    async fn await_quiescent(&self) -> Result<()> {
        let name = &self.ctx.process_name;
        if self.ctx.watcher.is_running(name) {
            self.ctx.watcher.wait_for_exit(name).await
        } else {
            info!("no {name} process detected, continuing with restore");
            Ok(())
        }
    }

    /// Copy the live world into scratch space and archive it under `backup/`.
    async fn snapshot(&self) -> Result<PathBuf> {
        let paths = &self.ctx.paths;
        ensure_dir(&paths.snapshot_dir).map_err(|e| {
            RestoreError::io(format!("creating {}", paths.snapshot_dir.display()), e)
        })?;

        let scratch = ScratchDir::create(&paths.snapshot_scratch)?;
        let staged_world = scratch.path().join(&self.request.world_name);
        info!("backing up current world: {}", self.world_dir().display());
        copy_tree(&self.world_dir(), &staged_world, self.workers()).await?;

        let file_name = format!(
            "before_restore_{}{}",
            Local::now().format("%Y%m%d_%H%M%S"),
            self.ctx.config.snapshot_extension()
        );
        let dest = paths.snapshot_dir.join(file_name);

        let source = snapshot_source(
            self.ctx.engine.compression_backend(),
            scratch.path(),
            &staged_world,
        );
        self.ctx.engine.compress(source, &dest).await?;
        Ok(dest)
    }

    /// Unpack the requested archive into `<scratch>/<world>`.
    async fn extract(&self) -> Result<ScratchDir> {
        info!("starting backup restore");
        let archive = self.ctx.paths.resolve(&self.request.backup_file);
        if !archive.is_file() {
            let err = RestoreError::io(
                format!("locating backup {}", archive.display()),
                std::io::Error::from(std::io::ErrorKind::NotFound),
            );
            error!("extraction failed: {err}");
            return Err(err);
        }

        let scratch = ScratchDir::create(&self.ctx.paths.extract_scratch)?;
        info!("created temporary directory: {}", scratch.path().display());

        let target = scratch.path().join(&self.request.world_name);
        if let Err(err) = self.ctx.engine.extract(&archive, &target).await {
            error!("extraction failed: {err}");
            return Err(err);
        }
        Ok(scratch)
    }

    /// Remove the current world. Failure is recorded and the restore carries on.
    async fn replace(&self) -> RemovalOutcome {
        let world_dir = self.world_dir();
        if !world_dir.exists() {
            return RemovalOutcome::Absent;
        }

        info!("removing directory: {}", world_dir.display());
        let target = world_dir.clone();
        let removed = task::spawn_blocking(move || remove_dir_forced(&target))
            .await
            .map_err(RestoreError::from)
            .and_then(|inner| inner);
        match removed {
            Ok(()) => {
                info!("directory removal completed");
                RemovalOutcome::Removed
            }
            Err(err) => {
                error!("failed to remove old world directory: {err}");
                RemovalOutcome::Failed(err.to_string())
            }
        }
    }

    /// Copy `<scratch>/<world>` over `worlds/`, which places the archive's `<world>/` root.
    async fn install(&self, scratch: &Path) -> Result<CopyReport> {
        let staged = scratch.join(&self.request.world_name);
        let worlds = &self.ctx.paths.worlds_dir;
        info!("starting file copy...");
        info!("copy target: {} ==> {}", staged.display(), worlds.display());
        info!("using {} workers for file copying", self.workers());

        match copy_tree(&staged, worlds, self.workers()).await {
            Ok(report) => {
                info!(
                    "file copy completed ({} files, {} directories)",
                    report.files, report.dirs
                );
                Ok(report)
            }
            Err(err) => {
                error!("file copy failed: {err}");
                Err(err)
            }
        }
    }

    async fn restart(&self) -> RestartOutcome {
        let settings = &self.ctx.config.restore.restart_server;
        if !settings.status {
            info!("configured not to restart the server automatically");
            return RestartOutcome::Disabled;
        }

        info!("configured to restart the server after restore");
        let wait = settings.effective_wait_s();
        info!("waiting {wait} seconds before starting server...");
        sleep(Duration::from_secs(wait)).await;

        let script = self.ctx.paths.resolve(&settings.start_script_path);
        info!("server directory: {}", self.ctx.paths.server_dir.display());
        info!("start script: {}", script.display());
        if !script.exists() {
            error!("start script does not exist: {}", script.display());
            return RestartOutcome::ScriptMissing(script);
        }

        info!("starting server...");
        match self
            .ctx
            .launcher
            .launch(&script, &self.ctx.paths.server_dir)
            .await
        {
            Ok(LaunchOutcome::Started) => {
                info!("server start command has been executed");
                RestartOutcome::Launched(LaunchOutcome::Started)
            }
            Ok(LaunchOutcome::Unsupported { platform }) => {
                error!("automatic restart is not supported on {platform}");
                info!("please start the server manually");
                RestartOutcome::Launched(LaunchOutcome::Unsupported { platform })
            }
            Err(err) => {
                error!("failed to start server: {err}");
                RestartOutcome::Failed(err.to_string())
            }
        }
    }
}

/// Both backends must produce an archive rooted at `<world>/`.
///
/// 7-zip stores the children of the directory it is given, the tar codec
/// stores the directory itself.
fn snapshot_source<'a>(backend: Backend, scratch: &'a Path, staged_world: &'a Path) -> &'a Path {
    match backend {
        Backend::ExternalTool => scratch,
        Backend::BuiltinTarGz => staged_world,
    }
}
