use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchOutcome {
    Started,
    /// The platform has no detached launch; the operator has to start the server.
    Unsupported { platform: &'static str },
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    /// Start `script` detached from this process with `working_dir` as its cwd.
    async fn launch(&self, script: &Path, working_dir: &Path) -> Result<LaunchOutcome>;
}

/// Opens the script in a new console window via `cmd /c start`.
#[cfg(windows)]
#[derive(Debug, Default)]
pub struct WindowsStartLauncher;

#[cfg(windows)]
#[async_trait]
impl ProcessLauncher for WindowsStartLauncher {
    async fn launch(&self, script: &Path, working_dir: &Path) -> Result<LaunchOutcome> {
        use crate::errors::RestoreError;
        use tokio::process::Command;
        use tracing::info;

        let mut cmd = Command::new(r"C:\Windows\System32\cmd.exe");
        cmd.args(["/c", "start", "/I"])
            .arg(script)
            .current_dir(working_dir);
        info!("executing command: {:?}", cmd.as_std());
        info!("working directory: {}", working_dir.display());

        let status = cmd
            .status()
            .await
            .map_err(|err| RestoreError::Launch(err.to_string()))?;
        if !status.success() {
            return Err(RestoreError::Launch(format!("cmd exited with {status}")));
        }
        Ok(LaunchOutcome::Started)
    }
}

#[derive(Debug, Default)]
pub struct UnsupportedLauncher;

#[async_trait]
impl ProcessLauncher for UnsupportedLauncher {
    async fn launch(&self, _script: &Path, _working_dir: &Path) -> Result<LaunchOutcome> {
        Ok(LaunchOutcome::Unsupported {
            platform: std::env::consts::OS,
        })
    }
}

pub fn platform_launcher() -> Arc<dyn ProcessLauncher> {
    #[cfg(windows)]
    {
        Arc::new(WindowsStartLauncher)
    }
    #[cfg(not(windows))]
    {
        Arc::new(UnsupportedLauncher)
    }
}
