pub mod errors;

pub mod archive;
pub mod config;
pub mod copy;
pub mod fsutil;
pub mod launcher;
pub mod pipeline;
pub mod process;

pub use config::{ConfigSource, PluginConfig};
pub use errors::RestoreError;
pub use pipeline::{RestoreContext, RestoreRequest, RestoreSummary, Restorer};

pub fn pkg_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
