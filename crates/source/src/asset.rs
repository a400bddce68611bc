//! `asset://` resources read from the application bundle.

use crate::FileSource;
use crate::error::{ErrorKind, Result};
use crate::request::{Callback, FileRequest};
use cartage_resource::{Resource, Response, ResponseErrorKind};
use cartage_storage::{AssetHandle, validate_path};
use exn::ResultExt;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use tokio::runtime::Handle;
use tracing::{debug, instrument, warn};

/// Serves `asset://` URLs from an [`AssetReader`](cartage_storage::AssetReader).
///
/// A terminal source: a missing asset is reported as
/// [`NotFound`](ResponseErrorKind::NotFound) and nothing else is consulted.
/// Asset responses never carry an expiry.
#[derive(Clone)]
pub struct AssetFileSource {
    assets: AssetHandle,
    runtime: Handle,
}

impl Debug for AssetFileSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AssetFileSource").field("bundle", &self.assets.name()).finish()
    }
}

impl AssetFileSource {
    /// Create a source reading from `assets`, spawning reads onto the current
    /// tokio runtime.
    pub fn new(assets: AssetHandle) -> Result<Self> {
        let runtime = Handle::try_current().or_raise(|| ErrorKind::Runtime)?;
        Ok(Self::with_runtime(assets, runtime))
    }

    pub fn with_runtime(assets: AssetHandle, runtime: Handle) -> Self {
        Self { assets, runtime }
    }

    /// Read `resource` from the bundle.
    #[instrument(level = "debug", skip_all, fields(url = %resource.url()))]
    pub async fn read(&self, resource: &Resource) -> Response {
        let Some(path) = resource.asset_path() else {
            return Response::not_found(format!("not an asset URL: {}", resource.url()));
        };
        let path = match validate_path(path) {
            Ok(path) => path,
            Err(err) => {
                debug!(error = ?err, "Rejected asset path");
                return Response::not_found(err.to_string());
            },
        };
        match self.assets.read(&path).await {
            Ok(data) => Response::ok(data),
            Err(err) if err.is_missing() => Response::not_found(err.to_string()),
            Err(err) => {
                warn!(error = ?err, "Failed to read asset");
                Response::error(ResponseErrorKind::Other, err.to_string())
            },
        }
    }
}

impl FileSource for AssetFileSource {
    fn request(&self, resource: Resource, callback: Callback) -> FileRequest {
        let (handle, responder) = FileRequest::channel(callback);
        let source = self.clone();
        let task = self.runtime.spawn(async move {
            if responder.is_cancelled() {
                return;
            }
            let response = source.read(&resource).await;
            responder.deliver(response);
        });
        handle.with_task(task.abort_handle())
    }
}
