use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value};

use crate::errors::{RestoreError, Result};
use restore_utils::ServerPaths;

pub const DEFAULT_MAX_WORKERS: usize = 4;
pub const DEFAULT_RESTART_WAIT_S: u64 = 10;
pub const DEFAULT_EXE_7Z_PATH: &str = "./plugins/EasyBackuper/7za.exe";
pub const DEFAULT_START_SCRIPT: &str = "./start.bat";

/// Compression method named by `Compression.method`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CompressionMethod {
    SevenZip,
    Zip,
    Tar,
    Other(String),
}

impl CompressionMethod {
    pub fn parse(value: &str) -> Self {
        match value {
            "" | "zip" => Self::Zip,
            "7z" => Self::SevenZip,
            "tar" => Self::Tar,
            other => Self::Other(other.to_string()),
        }
    }

    /// Key into `Compression.formats`.
    pub fn key(&self) -> &str {
        match self {
            Self::SevenZip => "7z",
            Self::Zip => "zip",
            Self::Tar => "tar",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompressionFormat {
    pub extension: String,
    pub compress_args: Vec<String>,
    pub extract_args: Vec<String>,
}

impl CompressionFormat {
    fn new(extension: &str, compress_args: &[&str], extract_args: &[&str]) -> Self {
        Self {
            extension: extension.to_string(),
            compress_args: compress_args.iter().map(|s| s.to_string()).collect(),
            extract_args: extract_args.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartSettings {
    pub status: bool,
    pub wait_time_s: u64,
    pub start_script_path: PathBuf,
}

impl RestartSettings {
    /// Zero means "use the default delay".
    pub fn effective_wait_s(&self) -> u64 {
        if self.wait_time_s == 0 {
            DEFAULT_RESTART_WAIT_S
        } else {
            self.wait_time_s
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestoreSettings {
    pub backup_old_world_before_restore: bool,
    pub debug: bool,
    pub restart_server: RestartSettings,
    /// Upper bound on the liveness wait; `0` waits forever.
    pub wait_timeout_s: u64,
    pub server_process_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginConfig {
    pub compression_method: CompressionMethod,
    pub exe_7z_path: PathBuf,
    pub formats: BTreeMap<String, CompressionFormat>,
    pub max_workers: usize,
    pub restore: RestoreSettings,
}

/// Where the loaded configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    Defaults { probed: Vec<PathBuf> },
}

impl Default for PluginConfig {
    fn default() -> Self {
        let mut formats = BTreeMap::new();
        formats.insert(
            "7z".to_string(),
            CompressionFormat::new(".7z", &["a", "-t7z", "-mx=5"], &["x", "-y"]),
        );
        formats.insert(
            "zip".to_string(),
            CompressionFormat::new(".zip", &["a", "-tzip", "-mx=5"], &["x", "-y"]),
        );
        formats.insert(
            "tar".to_string(),
            CompressionFormat::new(".tar.gz", &["a", "-ttar", "-mx=5"], &["x", "-y"]),
        );

        Self {
            compression_method: CompressionMethod::Zip,
            exe_7z_path: PathBuf::from(DEFAULT_EXE_7Z_PATH),
            formats,
            max_workers: DEFAULT_MAX_WORKERS,
            restore: RestoreSettings {
                backup_old_world_before_restore: false,
                debug: false,
                restart_server: RestartSettings {
                    status: false,
                    wait_time_s: DEFAULT_RESTART_WAIT_S,
                    start_script_path: PathBuf::from(DEFAULT_START_SCRIPT),
                },
                wait_timeout_s: 0,
                server_process_name: None,
            },
        }
    }
}

impl PluginConfig {
    /// Load from the first existing candidate path, or fall back to defaults.
    ///
    /// A missing file is not an error. A file that exists but cannot be read
    /// or is not a JSON document is.
    pub fn load(paths: &ServerPaths, cwd: &Path) -> Result<(Self, ConfigSource)> {
        let candidates = paths.config_candidates(cwd);
        let Some(path) = candidates.iter().find(|p| p.is_file()).cloned() else {
            return Ok((Self::default(), ConfigSource::Defaults { probed: candidates }));
        };

        let text = std::fs::read_to_string(&path)
            .map_err(|err| RestoreError::config(&path, format!("read failed: {err}")))?;
        let config = Self::from_json_str(&text)
            .map_err(|message| RestoreError::config(&path, message))?;
        Ok((config, ConfigSource::File(path)))
    }

    /// Overlay a JSON document on top of the defaults.
    ///
    /// Unknown keys and keys whose type does not match are ignored.
    pub fn from_json_str(text: &str) -> std::result::Result<Self, String> {
        let root: Value =
            serde_json::from_str(text).map_err(|err| format!("parse failed: {err}"))?;
        let root = root
            .as_object()
            .ok_or_else(|| "top level is not a JSON object".to_string())?;

        let mut config = Self::default();

        if let Some(compression) = object(root, "Compression") {
            if let Some(method) = string(compression, "method") {
                config.compression_method = CompressionMethod::parse(method);
            }
            if let Some(exe) = string(compression, "exe_7z_path") {
                config.exe_7z_path = PathBuf::from(exe);
            }
            if let Some(formats) = object(compression, "formats") {
                for (name, value) in formats {
                    if let Some(format) = value.as_object() {
                        config.formats.insert(name.clone(), parse_format(format));
                    }
                }
            }
        }

        config.max_workers = root
            .get("max_workers")
            .and_then(Value::as_f64)
            .map(f64::trunc)
            .filter(|n| *n >= 1.0)
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_WORKERS);

        if let Some(settings) = object(root, "Restore").and_then(|r| object(r, "config")) {
            let restore = &mut config.restore;
            if let Some(debug) = boolean(settings, "debug") {
                restore.debug = debug;
            }
            if let Some(backup) = boolean(settings, "backup_old_world_before_restore") {
                restore.backup_old_world_before_restore = backup;
            }
            if let Some(timeout) = unsigned(settings, "wait_timeout_s") {
                restore.wait_timeout_s = timeout;
            }
            if let Some(name) = string(settings, "server_process_name").filter(|s| !s.is_empty()) {
                restore.server_process_name = Some(name.to_string());
            }
            if let Some(restart) = object(settings, "restart_server") {
                let target = &mut restore.restart_server;
                if let Some(status) = boolean(restart, "status") {
                    target.status = status;
                }
                if let Some(wait) = unsigned(restart, "wait_time_s") {
                    target.wait_time_s = wait;
                }
                if let Some(script) = string(restart, "start_script_path").filter(|s| !s.is_empty()) {
                    target.start_script_path = PathBuf::from(script);
                }
            }
        }

        Ok(config)
    }

    /// Archive extension for the configured method, `.zip` when the method has no format entry.
    pub fn snapshot_extension(&self) -> &str {
        self.formats
            .get(self.compression_method.key())
            .map(|format| format.extension.as_str())
            .unwrap_or(".zip")
    }
}

fn parse_format(map: &Map<String, Value>) -> CompressionFormat {
    CompressionFormat {
        extension: string(map, "extension").unwrap_or_default().to_string(),
        compress_args: string_list(map, "compress_args"),
        extract_args: string_list(map, "extract_args"),
    }
}

fn object<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    map.get(key).and_then(Value::as_object)
}

fn string<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

fn boolean(map: &Map<String, Value>, key: &str) -> Option<bool> {
    map.get(key).and_then(Value::as_bool)
}

fn unsigned(map: &Map<String, Value>, key: &str) -> Option<u64> {
    map.get(key)
        .and_then(Value::as_f64)
        .filter(|n| *n >= 0.0)
        .map(|n| n as u64)
}

fn string_list(map: &Map<String, Value>, key: &str) -> Vec<String> {
    map.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
