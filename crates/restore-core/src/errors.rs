use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("invalid configuration at {path}: {message}")]
    Config { path: PathBuf, message: String },

    #[error("failed to enumerate processes: {0}")]
    ProcessEnumeration(String),

    #[error("{tool} failed: {message}")]
    Archive { tool: &'static str, message: String },

    #[error("7z exited with {status}\nOutput: {output}")]
    ArchiveTool { status: String, output: String },

    #[error("archive entry escapes the destination: {0}")]
    UnsafeEntry(PathBuf),

    #[error("{failures} file(s) failed to copy, first: {first}")]
    Copy {
        failures: usize,
        #[source]
        first: Box<RestoreError>,
    },

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {0}s waiting for {1} to exit")]
    WaitTimeout(u64, String),

    #[error("failed to launch server: {0}")]
    Launch(String),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl RestoreError {
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub fn config(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Config {
            path: path.into(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = RestoreError> = std::result::Result<T, E>;
