//! Local filesystem asset bundle.
//!
//! Assets live under a configured directory and are read with `tokio::fs`.

use crate::error::{ErrorKind, Result};
use crate::{AssetReader, path::validate as validate_path};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Assets stored in a directory on the local filesystem.
///
/// # Examples
///
/// ```no_run
/// use cartage_storage::backend::LocalAssets;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let assets = LocalAssets::new("bundle", "/opt/app/assets")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalAssets {
    name: String,
    /// Root directory of the bundle
    root: PathBuf,
}
impl LocalAssets {
    /// Create a reader rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidPath`](ErrorKind::InvalidPath) if the path is not
    /// absolute, or exists and is not a directory. A missing directory is
    /// fine: every read will simply report `NotFound`.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        if root.exists() && !root.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the absolute path for a bundle-relative path.
    fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    fn map_io_error(e: std::io::Error, path: &Path) -> ErrorKind {
        match e.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied(path.to_path_buf()),
            _ => ErrorKind::Io(e),
        }
    }
}

#[async_trait]
impl AssetReader for LocalAssets {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let abs_path = self.absolute_path(path)?;
        Ok(fs::try_exists(&abs_path).await.map_err(ErrorKind::Io)?)
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let abs_path = self.absolute_path(path)?;
        let data = fs::read(&abs_path).await.map_err(|e| Self::map_io_error(e, path))?;
        tracing::trace!(bundle = %self.name, path = %path.display(), bytes = data.len(), "Read asset");
        Ok(data)
    }
}
