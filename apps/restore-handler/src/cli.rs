use std::ffi::OsString;
use std::path::PathBuf;

use clap::Parser;
use clap::error::ErrorKind;
use restore_core::RestoreRequest;

const FLAGS: [&str; 3] = ["backup", "server", "world"];

pub const USAGE: &str =
    "Usage: restore_handler -backup <backup_file> -server <server_directory> -world <world_name>";

#[derive(Parser, Debug)]
#[command(
    name = "restore_handler",
    version,
    about = "Restore a Bedrock world from an EasyBackuper archive"
)]
pub struct Cli {
    /// Archive to restore (.7z, .zip, .tar.gz or .tgz)
    #[arg(long, value_name = "BACKUP_FILE")]
    pub backup: Option<PathBuf>,
    /// Server root containing the worlds/ directory
    #[arg(long, value_name = "SERVER_DIR")]
    pub server: Option<PathBuf>,
    /// Name of the world folder under worlds/
    #[arg(long, value_name = "WORLD_NAME")]
    pub world: Option<String>,
}

impl Cli {
    /// `None` when any of the three values is missing or empty.
    pub fn into_request(self) -> Option<RestoreRequest> {
        let backup_file = self.backup.filter(|p| !p.as_os_str().is_empty())?;
        let server_dir = self.server.filter(|p| !p.as_os_str().is_empty())?;
        let world_name = self.world.filter(|w| !w.trim().is_empty())?;
        Some(RestoreRequest {
            backup_file,
            server_dir,
            world_name,
        })
    }
}

/// The plugin passes single-dash long flags (`-backup x`, `-world=y`); turn them into `--backup`.
fn normalize_legacy_flags<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(idx, arg)| {
            if idx == 0 {
                return arg;
            }
            let Some(text) = arg.to_str() else { return arg };
            let Some(rest) = text.strip_prefix('-') else { return arg };
            if rest.starts_with('-') {
                return arg;
            }
            let key = rest.split_once('=').map(|(k, _)| k).unwrap_or(rest);
            if FLAGS.contains(&key) {
                OsString::from(format!("-{text}"))
            } else {
                arg
            }
        })
        .collect()
}

pub enum Parsed {
    Request(RestoreRequest),
    Missing,
}

pub fn parse<I>(args: I) -> Parsed
where
    I: IntoIterator<Item = OsString>,
{
    match Cli::try_parse_from(normalize_legacy_flags(args)) {
        Ok(cli) => cli.into_request().map_or(Parsed::Missing, Parsed::Request),
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            err.exit()
        }
        Err(err) => {
            println!("{}", err.render());
            Parsed::Missing
        }
    }
}
