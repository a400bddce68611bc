//! Value types flowing through every file source.
//!
//! A [`Resource`] names something a map client wants (a style document, a
//! tile, a sprite sheet...), and a [`Response`] is what a source hands back.
//! Failures are data: a [`Response`] with its `error` populated is a failed
//! delivery, never a panic or a propagated Rust error.

pub mod error;
mod geo;
mod resource;
mod response;

pub use crate::geo::{LatLngBounds, TileId};
pub use crate::resource::{ASSET_SCHEME, Resource, ResourceKind, Scheme};
pub use crate::response::{Response, ResponseError, ResponseErrorKind};
