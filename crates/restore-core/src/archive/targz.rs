use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::EntryType;
use tokio::task;
use tracing::debug;
use walkdir::WalkDir;

use super::{ArchiveBackend, contained_path};
use crate::errors::{RestoreError, Result};

/// In-process tar+gzip codec.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarGz;

#[async_trait]
impl ArchiveBackend for TarGz {
    fn name(&self) -> &'static str {
        "tar"
    }

    async fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let (archive, dest) = (archive.to_path_buf(), dest.to_path_buf());
        task::spawn_blocking(move || extract_blocking(&archive, &dest)).await?
    }

    async fn compress(&self, src_dir: &Path, dest_file: &Path) -> Result<()> {
        let (src_dir, dest_file) = (src_dir.to_path_buf(), dest_file.to_path_buf());
        task::spawn_blocking(move || compress_blocking(&src_dir, &dest_file)).await?
    }
}

fn tar_err(context: &str, err: impl std::fmt::Display) -> RestoreError {
    RestoreError::Archive {
        tool: "tar",
        message: format!("{context}: {err}"),
    }
}

fn extract_blocking(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)
        .map_err(|e| tar_err(&format!("opening {}", archive_path.display()), e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    fs::create_dir_all(dest).map_err(|e| tar_err(&format!("creating {}", dest.display()), e))?;

    let entries = archive.entries().map_err(|e| tar_err("reading tar header", e))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| tar_err("reading tar header", e))?;
        let name = entry
            .path()
            .map_err(|e| tar_err("decoding entry name", e))?
            .into_owned();
        let target = contained_path(dest, &name).ok_or(RestoreError::UnsafeEntry(name))?;

        match entry.header().entry_type() {
            EntryType::Directory => {
                fs::create_dir_all(&target)
                    .map_err(|e| tar_err(&format!("creating {}", target.display()), e))?;
            }
            EntryType::Regular | EntryType::Continuous => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|e| tar_err(&format!("creating {}", parent.display()), e))?;
                }
                let mut out = fs::File::create(&target)
                    .map_err(|e| tar_err(&format!("creating {}", target.display()), e))?;
                io::copy(&mut entry, &mut out)
                    .map_err(|e| tar_err(&format!("writing {}", target.display()), e))?;
                drop(out);
                apply_mode(&target, entry.header().mode().ok())?;
            }
            other => debug!("skipping {:?} entry {}", other, target.display()),
        }
    }
    Ok(())
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: Option<u32>) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let Some(mode) = mode else { return Ok(()) };
    fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))
        .map_err(|e| tar_err(&format!("setting permissions on {}", path.display()), e))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: Option<u32>) -> Result<()> {
    Ok(())
}

/// Entries are stored as `<basename(src_dir)>/<relative path>`.
fn compress_blocking(src_dir: &Path, dest_file: &Path) -> Result<()> {
    let root_name = src_dir
        .file_name()
        .map(PathBuf::from)
        .ok_or_else(|| tar_err("resolving archive root", format!("{} has no name", src_dir.display())))?;

    if let Some(parent) = dest_file.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| tar_err(&format!("creating {}", parent.display()), e))?;
    }
    let file = fs::File::create(dest_file)
        .map_err(|e| tar_err(&format!("creating {}", dest_file.display()), e))?;
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    builder.follow_symlinks(false);

    for entry in WalkDir::new(src_dir).follow_links(false) {
        let entry = entry.map_err(|e| tar_err("walking source", e))?;
        let rel = entry
            .path()
            .strip_prefix(src_dir)
            .map_err(|e| tar_err("computing entry name", e))?;
        let name = root_name.join(rel);

        if entry.file_type().is_dir() {
            builder
                .append_dir(&name, entry.path())
                .map_err(|e| tar_err(&format!("adding {}", name.display()), e))?;
        } else {
            builder
                .append_path_with_name(entry.path(), &name)
                .map_err(|e| tar_err(&format!("adding {}", name.display()), e))?;
        }
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| tar_err("finishing archive", e))?;
    encoder
        .finish()
        .map_err(|e| tar_err("finishing gzip stream", e))?;
    Ok(())
}
