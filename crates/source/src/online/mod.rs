//! Cache-then-network resolution.
//!
//! A request first consults the shared cache. A fresh entry is served as is.
//! Otherwise the network fetcher is asked, with the stale entry's validators
//! attached, and whatever it answers is written back to the cache before it
//! is delivered. Fetch failures are delivered verbatim: a stale copy is never
//! substituted and nothing is retried.

mod credentials;
mod fetcher;

pub use crate::online::credentials::{Credentials, CredentialsHandle, StaticCredentials};
pub use crate::online::fetcher::{FetchRequest, FetcherHandle, NetworkFetcher};

use crate::FileSource;
use crate::clock::ClockHandle;
use crate::error::{ErrorKind, Result};
use crate::request::{Callback, FileRequest};
use cartage_cache::SharedCache;
use cartage_cache::error::ErrorKind as CacheErrorKind;
use cartage_resource::{Resource, Response, ResponseErrorKind};
use exn::ResultExt;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, instrument, trace, warn};

/// Resolves resources through the [`SharedCache`] and a [`NetworkFetcher`].
///
/// Cheap to clone; clones share everything.
#[derive(Clone)]
pub struct OnlineFileSource {
    inner: Arc<Inner>,
}

struct Inner {
    cache: Arc<SharedCache>,
    fetcher: FetcherHandle,
    credentials: CredentialsHandle,
    clock: ClockHandle,
    runtime: Handle,
}

impl Debug for OnlineFileSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("OnlineFileSource").field("cache", &self.inner.cache).finish_non_exhaustive()
    }
}

impl OnlineFileSource {
    /// Create a source spawning its fetches onto the current tokio runtime.
    pub fn new(
        cache: Arc<SharedCache>,
        fetcher: FetcherHandle,
        credentials: CredentialsHandle,
        clock: ClockHandle,
    ) -> Result<Self> {
        let runtime = Handle::try_current().or_raise(|| ErrorKind::Runtime)?;
        Ok(Self::with_runtime(cache, fetcher, credentials, clock, runtime))
    }

    pub fn with_runtime(
        cache: Arc<SharedCache>,
        fetcher: FetcherHandle,
        credentials: CredentialsHandle,
        clock: ClockHandle,
        runtime: Handle,
    ) -> Self {
        Self {
            inner: Arc::new(Inner { cache, fetcher, credentials, clock, runtime }),
        }
    }

    pub fn cache(&self) -> &Arc<SharedCache> {
        &self.inner.cache
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.credentials.access_token()
    }

    /// Used from the next fetch onwards; fetches already in flight keep the
    /// token they were issued with.
    pub fn set_access_token(&self, token: impl Into<String>) {
        self.inner.credentials.set_access_token(token.into());
    }

    /// Resolve `resource` without a callback.
    #[instrument(level = "debug", skip_all, fields(url = %resource.url(), kind = %resource.kind()))]
    pub async fn fetch(&self, resource: &Resource) -> Response {
        let cached = match self.inner.cache.read(resource).await {
            Ok(cached) => cached,
            Err(err) => {
                warn!(error = ?err, "Cache read failed, treating as a miss");
                None
            },
        };
        let now = self.inner.clock.now();
        if let Some(fresh) = cached.as_ref().filter(|cached| cached.is_fresh(now)) {
            trace!("Serving fresh cached response");
            return fresh.clone();
        }

        let request = FetchRequest {
            resource: resource.clone(),
            etag: cached.as_ref().and_then(|cached| cached.etag.clone()),
            modified: cached.as_ref().and_then(|cached| cached.modified),
            access_token: self.access_token(),
        };
        debug!(conditional = request.is_conditional(), "Fetching from network");
        let response = self.inner.fetcher.fetch(request).await;

        if let Some(error) = &response.error {
            debug!(error = %error, "Fetch failed");
            return response;
        }
        if response.not_modified {
            return self.revalidated(resource, &response, cached).await;
        }
        if let Err(err) = self.inner.cache.write(resource, &response).await {
            match &*err {
                CacheErrorKind::EntryTooLarge { size, maximum } => {
                    warn!(size, maximum, "Response too large to cache")
                },
                _ => warn!(error = ?err, "Failed to cache response"),
            }
        }
        response
    }

    /// The cached copy, with the validators of a not-modified answer applied.
    async fn revalidated(&self, resource: &Resource, revalidation: &Response, cached: Option<Response>) -> Response {
        debug!("Cached copy is still valid");
        match self.inner.cache.refresh(resource, revalidation).await {
            Ok(Some(refreshed)) => return refreshed,
            Ok(None) => trace!("Cached copy evicted during revalidation"),
            Err(err) => warn!(error = ?err, "Failed to refresh cached entry"),
        }
        match cached {
            Some(cached) => Response {
                expires: revalidation.expires.or(cached.expires),
                modified: revalidation.modified.or(cached.modified),
                etag: revalidation.etag.clone().or(cached.etag),
                ..cached
            },
            None => Response::error(ResponseErrorKind::Other, "not modified, but no cached copy exists"),
        }
    }
}

impl FileSource for OnlineFileSource {
    fn request(&self, resource: Resource, callback: Callback) -> FileRequest {
        let (handle, responder) = FileRequest::channel(callback);
        let source = self.clone();
        let task = self.inner.runtime.spawn(async move {
            if responder.is_cancelled() {
                return;
            }
            let response = source.fetch(&resource).await;
            responder.deliver(response);
        });
        handle.with_task(task.abort_handle())
    }
}
