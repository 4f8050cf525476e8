use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::config::{CompressionMethod, PluginConfig};
use crate::errors::Result;
use restore_utils::ServerPaths;

mod seven_zip;
mod targz;

pub use seven_zip::SevenZip;
pub use targz::TarGz;

/// Which implementation handles an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    ExternalTool,
    BuiltinTarGz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionPlan {
    pub primary: Backend,
    pub fallback: Option<Backend>,
}

impl ExtractionPlan {
    const fn only(primary: Backend) -> Self {
        Self {
            primary,
            fallback: None,
        }
    }
}

/// Pick the extraction backend from the archive name, falling back to the configured method.
///
/// `.zip` goes to the external tool: the built-in codec only speaks tar+gzip.
pub fn extraction_plan(archive: &Path, method: &CompressionMethod) -> ExtractionPlan {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if name.ends_with(".7z") || name.ends_with(".zip") {
        ExtractionPlan::only(Backend::ExternalTool)
    } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        ExtractionPlan {
            primary: Backend::BuiltinTarGz,
            fallback: Some(Backend::ExternalTool),
        }
    } else {
        ExtractionPlan::only(compression_backend(method))
    }
}

pub fn compression_backend(method: &CompressionMethod) -> Backend {
    match method {
        CompressionMethod::Tar => Backend::BuiltinTarGz,
        CompressionMethod::SevenZip | CompressionMethod::Zip | CompressionMethod::Other(_) => {
            Backend::ExternalTool
        }
    }
}

#[async_trait]
pub trait ArchiveBackend: Send + Sync {
    fn name(&self) -> &'static str;

    /// Unpack `archive` into `dest`, creating `dest` if needed.
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;

    /// Pack `src_dir` into `dest_file`.
    async fn compress(&self, src_dir: &Path, dest_file: &Path) -> Result<()>;
}

/// Routes archive work to one of two backends.
#[derive(Clone)]
pub struct ArchiveEngine {
    external: Arc<dyn ArchiveBackend>,
    builtin: Arc<dyn ArchiveBackend>,
    method: CompressionMethod,
}

impl ArchiveEngine {
    pub fn new(
        external: Arc<dyn ArchiveBackend>,
        builtin: Arc<dyn ArchiveBackend>,
        method: CompressionMethod,
    ) -> Self {
        Self {
            external,
            builtin,
            method,
        }
    }

    pub fn from_config(config: &PluginConfig, paths: &ServerPaths) -> Self {
        Self::new(
            Arc::new(SevenZip::for_platform(&config.exe_7z_path, paths)),
            Arc::new(TarGz),
            config.compression_method.clone(),
        )
    }

    pub fn method(&self) -> &CompressionMethod {
        &self.method
    }

    fn backend(&self, which: Backend) -> &Arc<dyn ArchiveBackend> {
        match which {
            Backend::ExternalTool => &self.external,
            Backend::BuiltinTarGz => &self.builtin,
        }
    }

    /// Extract with the dispatched backend, retrying once on the fallback if there is one.
    pub async fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let plan = extraction_plan(archive, &self.method);
        let primary = self.backend(plan.primary);
        info!("extracting {} with {}", archive.display(), primary.name());
        info!("extracting to: {} --> {}", archive.display(), dest.display());

        match (primary.extract(archive, dest).await, plan.fallback) {
            (Ok(()), _) => {
                info!("{} extraction completed", primary.name());
                Ok(())
            }
            (Err(err), Some(fallback)) => {
                let fallback = self.backend(fallback);
                warn!(
                    "{} extraction failed ({err}), retrying with {}",
                    primary.name(),
                    fallback.name()
                );
                fallback.extract(archive, dest).await?;
                info!("{} extraction completed", fallback.name());
                Ok(())
            }
            (Err(err), None) => Err(err),
        }
    }

    /// Compress with the backend selected by the configured method.
    pub async fn compress(&self, src_dir: &Path, dest_file: &Path) -> Result<()> {
        let backend = self.backend(self.compression_backend());
        info!("compressing {} with {}", src_dir.display(), backend.name());
        backend.compress(src_dir, dest_file).await?;
        info!("backup file saved: {}", dest_file.display());
        Ok(())
    }

    pub fn compression_backend(&self) -> Backend {
        compression_backend(&self.method)
    }
}

/// Join an archive entry name onto `dest`, refusing anything that could escape it.
pub(crate) fn contained_path(dest: &Path, entry: &Path) -> Option<PathBuf> {
    use std::path::Component;

    let mut out = dest.to_path_buf();
    for component in entry.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(out)
}

#[cfg(test)]
mod tests;
