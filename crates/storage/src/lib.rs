//! Read access to resources bundled with the application.
//!
//! Styles, sprites and glyphs shipped inside the app are addressed with
//! `asset://` URLs. The [`AssetReader`] trait is the seam between the file
//! sources and wherever the platform keeps those files.

pub mod backend;
pub mod error;
mod path;

pub use crate::backend::AssetReader;
pub use crate::path::validate as validate_path;
use std::sync::Arc;

pub type AssetHandle = Arc<dyn AssetReader + Send + Sync>;
