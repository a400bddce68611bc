//! Layered resolution of map resources.
//!
//! A map client asks for styles, tiles, sprites and glyphs by URL and gets
//! exactly one [`Response`](cartage_resource::Response) back per request,
//! through a callback. Where the response comes from depends on the URL and
//! the routing mode:
//!
//! - `asset://` URLs are read from the application bundle
//!   ([`AssetFileSource`](asset::AssetFileSource)).
//! - Everything else goes through the shared cache and then the network
//!   ([`OnlineFileSource`](online::OnlineFileSource)), or, offline-first,
//!   through the database of downloaded regions before that
//!   ([`OfflineFirst`]).
//!
//! [`DefaultFileSource`] assembles all of them from a
//! [`Config`](cartage_config::Config).
//!
//! # Cancellation
//! Every request returns a [`FileRequest`] handle. Dropping it cancels the
//! request: the callback is guaranteed not to run afterwards, even when the
//! response has already been computed.

pub mod asset;
mod clock;
mod composite;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod offline;
pub mod online;
mod request;
mod resolver;

pub use crate::clock::{Clock, ClockHandle, SystemClock};
pub use crate::composite::OfflineFirst;
pub use crate::request::{Callback, FileRequest, ProgressCallback, ProgressSink, Responder};
pub use crate::resolver::{DefaultFileSource, DefaultFileSourceBuilder};

use crate::asset::AssetFileSource;
use crate::offline::OfflineFileSource;
use crate::online::OnlineFileSource;
use cartage_resource::Resource;

/// Anything that can resolve a [`Resource`].
pub trait FileSource: Send + Sync {
    /// Start resolving `resource`, delivering its response to `callback`.
    ///
    /// The callback never runs from within this call, and never after the
    /// returned handle has been dropped.
    fn request(&self, resource: Resource, callback: Callback) -> FileRequest;
}

/// The sources a resolver routes between.
#[derive(Debug, Clone)]
pub enum Source {
    Asset(AssetFileSource),
    Online(OnlineFileSource),
    Offline(OfflineFileSource),
    Fallback(OfflineFirst),
}

impl Source {
    pub fn name(&self) -> &'static str {
        match self {
            Source::Asset(_) => "asset",
            Source::Online(_) => "online",
            Source::Offline(_) => "offline",
            Source::Fallback(_) => "offline-first",
        }
    }
}

impl FileSource for Source {
    fn request(&self, resource: Resource, callback: Callback) -> FileRequest {
        match self {
            Source::Asset(source) => source.request(resource, callback),
            Source::Online(source) => source.request(resource, callback),
            Source::Offline(source) => source.request(resource, callback),
            Source::Fallback(source) => source.request(resource, callback),
        }
    }
}
