use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::errors::{RestoreError, Result};

/// Remove `dir` recursively after making every entry writable.
///
/// Read-only attributes would otherwise make removal fail on Windows.
pub fn remove_dir_forced(dir: &Path) -> Result<()> {
    for entry in WalkDir::new(dir).follow_links(false) {
        let entry = entry.map_err(|e| {
            RestoreError::io(
                format!("walking {}", dir.display()),
                e.into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop detected")),
            )
        })?;
        if entry.path_is_symlink() {
            continue;
        }
        make_writable(entry.path());
        if entry.file_type().is_file() {
            debug!("deleting file: {} --> [deleted]", entry.path().display());
        }
    }

    fs::remove_dir_all(dir)
        .map_err(|e| RestoreError::io(format!("removing {}", dir.display()), e))
}

fn make_writable(path: &Path) {
    let Ok(meta) = fs::metadata(path) else { return };
    let mut perms = meta.permissions();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // directories keep their search bit so the walk can continue
        let mode = perms.mode() | 0o200 | if meta.is_dir() { 0o700 } else { 0 };
        perms.set_mode(mode);
    }
    #[cfg(not(unix))]
    {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
    }
    let _ = fs::set_permissions(path, perms);
}

/// A scratch directory that is wiped when the guard drops, on success and error paths alike.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    /// Create `path` fresh, removing any leftover from an earlier run first.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            fs::remove_dir_all(&path)
                .map_err(|e| RestoreError::io(format!("clearing stale {}", path.display()), e))?;
        }
        fs::create_dir_all(&path)
            .map_err(|e| RestoreError::io(format!("creating {}", path.display()), e))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(err) = fs::remove_dir_all(&self.path) {
                warn!("failed to remove scratch dir {}: {}", self.path.display(), err);
            }
        }
    }
}
