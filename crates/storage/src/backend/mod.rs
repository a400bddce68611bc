//! Asset reader trait and implementations.
//!
//! This module defines the [`AssetReader`] trait, a read-only view of the
//! files bundled with the application, with a local filesystem
//! implementation and (behind the `mock` feature) an in-memory one.

mod local;
#[cfg(any(test, feature = "mock"))]
mod mock;

pub use self::local::LocalAssets;
#[cfg(any(test, feature = "mock"))]
pub use self::mock::MockAssets;
use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Read-only access to the application bundle.
///
/// # Path Handling
/// All paths are relative to the bundle root and must be validated using
/// [`validate_path`](crate::validate_path) before use. Implementations
/// enforce this validation.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use cartage_storage::{backend::AssetReader, error::Result};
///
/// async fn style_size(assets: &dyn AssetReader) -> Result<u64> {
///     let path = Path::new("styles/bright.json");
///     if assets.exists(path).await? {
///         Ok(assets.read(path).await?.len() as u64)
///     } else {
///         Ok(0)
///     }
/// }
/// ```
#[async_trait]
pub trait AssetReader: Send + Sync {
    /// Name of the bundle, for logging only.
    fn name(&self) -> &str;

    /// Check if an asset exists.
    async fn exists(&self, path: &Path) -> Result<bool>;

    /// Read an asset's contents.
    ///
    /// Returns [`NotFound`](crate::error::ErrorKind::NotFound) if the asset
    /// does not exist.
    async fn read(&self, path: &Path) -> Result<Vec<u8>>;
}
