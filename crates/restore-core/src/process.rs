use std::sync::Arc;
use std::time::Duration;

use sysinfo::{ProcessesToUpdate, System};
use tokio::time::{Instant, sleep};
use tracing::{error, info, warn};

use crate::errors::{RestoreError, Result};

/// Platform default name of the Bedrock dedicated server executable.
pub fn default_server_process_name() -> &'static str {
    if cfg!(windows) {
        "bedrock_server.exe"
    } else {
        "bedrock_server"
    }
}

/// Source of executable names for every live process.
pub trait ProcessTable: Send + Sync {
    fn executable_names(&self) -> Result<Vec<String>>;
}

/// Process table backed by `sysinfo`.
#[derive(Debug, Default)]
pub struct SystemProcessTable;

impl ProcessTable for SystemProcessTable {
    fn executable_names(&self) -> Result<Vec<String>> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(RestoreError::ProcessEnumeration(format!(
                "process listing is not supported on {}",
                std::env::consts::OS
            )));
        }
        let mut system = System::new();
        system.refresh_processes(ProcessesToUpdate::All, true);
        Ok(system
            .processes()
            .values()
            .map(|process| process.name().to_string_lossy().into_owned())
            .collect())
    }
}

/// Polls the process table until a named executable disappears.
#[derive(Clone)]
pub struct ProcessWatcher {
    table: Arc<dyn ProcessTable>,
    interval: Duration,
    timeout: Option<Duration>,
}

impl ProcessWatcher {
    pub fn new(table: Arc<dyn ProcessTable>) -> Self {
        Self {
            table,
            interval: Duration::from_secs(1),
            timeout: None,
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemProcessTable))
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// `None` keeps waiting forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Case-insensitive substring match against every executable name.
    ///
    /// Enumeration failures count as "not running".
    pub fn is_running(&self, name: &str) -> bool {
        let needle = name.to_lowercase();
        match self.table.executable_names() {
            Ok(names) => names
                .iter()
                .any(|exe| exe.to_lowercase().contains(&needle)),
            Err(err) => {
                error!("failed to get process list: {err}");
                false
            }
        }
    }

    /// Block until no process matches `name`, or until the timeout runs out.
    pub async fn wait_for_exit(&self, name: &str) -> Result<()> {
        warn!("detected {name} process is running, waiting for server to shut down");
        // a timeout past the end of the clock waits forever
        let deadline = self.timeout.and_then(|t| Instant::now().checked_add(t));

        while self.is_running(name) {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                    return Err(RestoreError::WaitTimeout(secs, name.to_string()));
                }
            }
            sleep(self.interval).await;
        }

        info!("server has been shut down");
        Ok(())
    }
}
