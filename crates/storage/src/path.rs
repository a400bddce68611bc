//! Asset path validation.
//!
//! `asset://` URLs come from style documents, which come from the network.
//! Their paths must never be allowed to escape the bundle root.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a bundle-relative asset path.
///
/// Resolves `.` and `..` components lexically and rejects anything that
/// would leave the bundle root, contains NUL bytes, carries a Windows prefix,
/// or resolves to nothing at all. A leading `/` is tolerated, since
/// `asset:///styles/x.json` is a common spelling.
///
/// # Returns
/// Returns the normalized path if valid, or [`InvalidPath`](crate::error::ErrorKind::InvalidPath)
/// if invalid.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use cartage_storage::validate_path;
/// assert!(validate_path("styles/bright.json").is_ok());
/// assert!(validate_path("/sprites/sprite@2x.png").is_ok());
/// assert!(validate_path("../secrets.json").is_err());
/// assert_eq!(
///     validate_path("styles/../fonts/./Noto Sans/0-255.pbf").unwrap(),
///     Path::new("fonts/Noto Sans/0-255.pbf")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let invalid = || ErrorKind::InvalidPath(path.as_ref().to_path_buf());
    let mut components = Vec::new();
    for component in path.as_ref().components() {
        match component {
            Component::Normal(s) => {
                // NUL bytes survive Path::components() on Unix but truncate
                // C-based syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(invalid());
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(invalid()),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(invalid());
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(invalid()),
        false => Ok(components.into_iter().collect()),
    }
}
