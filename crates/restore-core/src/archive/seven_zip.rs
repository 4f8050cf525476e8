use std::ffi::OsString;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::ArchiveBackend;
use crate::errors::{RestoreError, Result};
use restore_utils::ServerPaths;

/// Delegates to a 7-zip compatible executable.
#[derive(Debug, Clone)]
pub struct SevenZip {
    program: PathBuf,
}

impl SevenZip {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// The configured executable, relative paths taken from the server directory.
    pub fn configured(configured: &Path, paths: &ServerPaths) -> Self {
        Self::new(paths.resolve(configured))
    }

    /// The bundled `7za.exe` on Windows, `7z` from `PATH` everywhere else.
    pub fn for_platform(configured: &Path, paths: &ServerPaths) -> Self {
        if cfg!(windows) {
            Self::configured(configured, paths)
        } else {
            Self::new("7z")
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub(crate) fn extract_args(archive: &Path, dest: &Path) -> Vec<OsString> {
        let mut out_flag = OsString::from("-o");
        out_flag.push(dest.as_os_str());
        vec!["x".into(), archive.into(), out_flag, "-y".into()]
    }

    /// The trailing wildcard is expanded by 7-zip itself, not by a shell.
    pub(crate) fn compress_args(src_dir: &Path, dest_file: &Path) -> Vec<OsString> {
        vec![
            "a".into(),
            dest_file.into(),
            src_dir.join("*").into_os_string(),
            "-y".into(),
        ]
    }

    async fn run(&self, args: Vec<OsString>) -> Result<()> {
        debug!("running {} {:?}", self.program.display(), args);
        let output = Command::new(&self.program)
            .args(&args)
            .output()
            .await
            .map_err(|err| RestoreError::Archive {
                tool: "7z",
                message: format!("failed to start {}: {err}", self.program.display()),
            })?;

        if output.status.success() {
            return Ok(());
        }

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(RestoreError::ArchiveTool {
            status: output.status.to_string(),
            output: combined,
        })
    }
}

#[async_trait]
impl ArchiveBackend for SevenZip {
    fn name(&self) -> &'static str {
        "7z"
    }

    async fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        self.run(Self::extract_args(archive, dest)).await
    }

    async fn compress(&self, src_dir: &Path, dest_file: &Path) -> Result<()> {
        self.run(Self::compress_args(src_dir, dest_file)).await
    }
}
