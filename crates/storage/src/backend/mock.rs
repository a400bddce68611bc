//! In-memory asset bundle for testing.

use crate::AssetReader;
use crate::error::{ErrorKind, Result};
use crate::path::validate as validate_path;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory asset bundle for testing.
///
/// Files are stored in a `HashMap` behind a [`RwLock`]. Every call to
/// [`read`](AssetReader::read) is counted so tests can assert whether the
/// bundle was consulted at all.
///
/// # Examples
///
/// ```
/// use cartage_storage::backend::{AssetReader, MockAssets};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let assets = MockAssets::with_files([("styles/bright.json", b"{}")]);
/// assert!(assets.exists(Path::new("styles/bright.json")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockAssets {
    name: String,
    files: RwLock<HashMap<PathBuf, Vec<u8>>>,
    reads: AtomicUsize,
}

impl MockAssets {
    /// Create a mock bundle pre-populated with files.
    ///
    /// Panics if any path fails validation (e.g. path traversal). If test
    /// setup is wrong, then test should not pass.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let mut map = HashMap::new();
        for (path, data) in files {
            let path = path.into();
            let Ok(validated) = validate_path(&path) else {
                panic!("MockAssets::with_files: invalid path {}", path.display());
            };
            map.insert(validated, data.into());
        }
        Self {
            name: "mock".to_string(),
            files: RwLock::new(map),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Number of [`read`](AssetReader::read) calls so far, successful or not.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}
impl Default for MockAssets {
    fn default() -> Self {
        let files: [(&str, &str); 0] = [];
        Self::with_files(files)
    }
}

#[async_trait]
impl AssetReader for MockAssets {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.files.read().await.contains_key(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let path = validate_path(path)?;
        self.files.read().await.get(&path).cloned().ok_or_else(|| exn::Exn::from(ErrorKind::NotFound(path)))
    }
}
