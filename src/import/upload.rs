use super::error::ImportError;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const UPLOADS_DIR: &str = "uploads";

/// A submitted file copied into the workspace staging area. The staged copy
/// is removed exactly once: by `release`, or on drop if `release` never ran.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
    original_name: String,
    size: u64,
    released: bool,
}

impl StagedUpload {
    pub fn stage_bytes(
        dir: &Path,
        original_name: &str,
        bytes: &[u8],
        max_bytes: u64,
    ) -> Result<Self, ImportError> {
        Self::stage_with(dir, original_name, bytes.len() as u64, max_bytes, |path| {
            std::fs::write(path, bytes)
        })
    }

    pub fn stage_file(
        dir: &Path,
        original_name: &str,
        source: &Path,
        max_bytes: u64,
    ) -> Result<Self, ImportError> {
        let size = std::fs::metadata(source).map_err(ImportError::Upload)?.len();
        Self::stage_with(dir, original_name, size, max_bytes, |path| {
            std::fs::copy(source, path).map(|_| ())
        })
    }

    /// The guard exists before `fill` runs, so a failed fill never leaves a
    /// partial file behind.
    fn stage_with(
        dir: &Path,
        original_name: &str,
        size: u64,
        max_bytes: u64,
        fill: impl FnOnce(&Path) -> std::io::Result<()>,
    ) -> Result<Self, ImportError> {
        check_size(size, max_bytes)?;
        let staged = Self::new(staged_path(dir)?, original_name, size);
        fill(&staged.path).map_err(ImportError::Upload)?;
        Ok(staged)
    }

    fn new(path: PathBuf, original_name: &str, size: u64) -> Self {
        tracing::debug!(path = %path.display(), original_name, size, "staged upload");
        Self {
            path,
            original_name: original_name.to_string(),
            size,
            released: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn release(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "released upload"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "failed to release upload"),
        }
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        self.remove();
    }
}

fn check_size(size: u64, limit: u64) -> Result<(), ImportError> {
    if size > limit {
        return Err(ImportError::UploadTooLarge { size, limit });
    }
    Ok(())
}

fn staged_path(dir: &Path) -> Result<PathBuf, ImportError> {
    std::fs::create_dir_all(dir).map_err(ImportError::Upload)?;
    Ok(dir.join(Uuid::new_v4().to_string()))
}
