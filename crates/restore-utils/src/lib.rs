use std::path::{Path, PathBuf};

pub const PLUGIN_NAME: &str = "EasyBackuper";
pub const PLUGIN_NAME_SMALL: &str = "easybackuper";

/// Filesystem layout of one Bedrock server directory as the restore helper sees it.
#[derive(Debug, Clone)]
pub struct ServerPaths {
    pub server_dir: PathBuf,
    pub worlds_dir: PathBuf,
    pub extract_scratch: PathBuf,
    pub snapshot_scratch: PathBuf,
    pub snapshot_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl ServerPaths {
    pub fn new(server_dir: impl Into<PathBuf>) -> Self {
        let server_dir = server_dir.into();
        Self {
            worlds_dir: server_dir.join("worlds"),
            extract_scratch: server_dir.join(format!("temp_{PLUGIN_NAME_SMALL}")),
            snapshot_scratch: server_dir.join(format!("temp_{PLUGIN_NAME_SMALL}_backup")),
            snapshot_dir: server_dir.join("backup"),
            log_dir: server_dir.join("logs").join(PLUGIN_NAME),
            server_dir,
        }
    }

    pub fn world_dir(&self, world_name: &str) -> PathBuf {
        self.worlds_dir.join(world_name)
    }

    /// Resolve a possibly relative path against the server directory.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.server_dir.join(path)
        }
    }

    /// Candidate config files, probed in order; the first existing one wins.
    pub fn config_candidates(&self, cwd: &Path) -> Vec<PathBuf> {
        let rel = config_rel_path();
        let mut out = vec![self.server_dir.join(&rel)];
        let from_cwd = cwd.join(&rel);
        if !out.contains(&from_cwd) {
            out.push(from_cwd);
        }
        out
    }
}

fn config_rel_path() -> PathBuf {
    Path::new("plugins")
        .join(PLUGIN_NAME)
        .join("config")
        .join(format!("{PLUGIN_NAME}.json"))
}

pub fn ensure_dir(p: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(p)
}
