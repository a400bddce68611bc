//! Pinned resources for use without a network.
//!
//! [`OfflineFileSource`] answers requests from the pinned partition only and
//! runs download sessions that fill it. All database access is serialized
//! through a dedicated worker task owned by the source.

mod manifest;
mod session;
mod tiles;
mod worker;

pub use crate::offline::session::{DownloadProgress, Milestone, OfflineRegion, SessionOptions};
pub use crate::offline::tiles::{TileEnumerator, TileEnumeratorHandle};

use crate::FileSource;
use crate::composite::style_file_request;
use crate::error::{ErrorKind, Result};
use crate::offline::session::Downloader;
use crate::offline::worker::{Job, JobSender};
use crate::online::OnlineFileSource;
use crate::request::{Callback, FileRequest, ProgressCallback};
use cartage_cache::SharedCache;
use cartage_cache::error::Result as CacheResult;
use cartage_resource::{Resource, Response, ResponseErrorKind};
use exn::ResultExt;
use futures::StreamExt;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::pin::pin;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

/// Serves requests from pinned resources and downloads regions.
///
/// Never reaches the network for a request: a resource that was not
/// downloaded is [`NotFound`](ResponseErrorKind::NotFound). Sessions fetch
/// through the wrapped [`OnlineFileSource`].
///
/// Cheap to clone. The worker stops once the last clone (and every session
/// started from it) is gone.
#[derive(Clone)]
pub struct OfflineFileSource {
    inner: Arc<Inner>,
}

struct Inner {
    jobs: JobSender,
    downloader: Downloader,
    runtime: Handle,
}

impl Debug for OfflineFileSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("OfflineFileSource")
            .field("options", &self.inner.downloader.options)
            .finish_non_exhaustive()
    }
}

impl OfflineFileSource {
    /// Create a source pinning into `store`, running its worker and sessions
    /// on the current tokio runtime.
    pub fn new(
        store: Arc<SharedCache>,
        online: OnlineFileSource,
        tiles: TileEnumeratorHandle,
        options: SessionOptions,
    ) -> Result<Self> {
        let runtime = Handle::try_current().or_raise(|| ErrorKind::Runtime)?;
        Ok(Self::with_runtime(store, online, tiles, options, runtime))
    }

    pub fn with_runtime(
        store: Arc<SharedCache>,
        online: OnlineFileSource,
        tiles: TileEnumeratorHandle,
        options: SessionOptions,
        runtime: Handle,
    ) -> Self {
        let jobs = worker::spawn(store, &runtime);
        let downloader = Downloader {
            online,
            jobs: jobs.clone(),
            tiles,
            options,
        };
        Self {
            inner: Arc::new(Inner { jobs, downloader, runtime }),
        }
    }

    /// Start downloading `region`, reporting every [`Milestone`] to
    /// `progress`. Dropping the returned handle stops the session; resources
    /// already handed to the worker are still stored.
    pub fn begin_downloading(&self, region: OfflineRegion, progress: ProgressCallback) -> FileRequest {
        let session = self.inner.downloader.clone().session(region);
        let (handle, mut sink) = FileRequest::progress(progress);
        let task = self.inner.runtime.spawn(async move {
            let mut session = pin!(session);
            while let Some(milestone) = session.next().await {
                if !sink.report(milestone) {
                    break;
                }
            }
        });
        handle.with_task(task.abort_handle())
    }

    /// Download and pin the style at `url` alone, delivering its response.
    pub fn download_style(&self, url: impl Into<String>, callback: Callback) -> FileRequest {
        style_file_request(self, url.into(), callback)
    }

    /// Number of pinned resources.
    pub async fn count(&self) -> Result<u64> {
        self.ask(|done| Job::Count { done }).await
    }

    pub async fn contains(&self, resource: &Resource) -> Result<bool> {
        let resource = resource.clone();
        self.ask(|done| Job::Contains { resource, done }).await
    }

    async fn ask<T>(&self, job: impl FnOnce(oneshot::Sender<CacheResult<T>>) -> Job) -> Result<T> {
        let (done, answer) = oneshot::channel();
        if self.inner.jobs.send(job(done)).is_err() {
            exn::bail!(ErrorKind::WorkerStopped);
        }
        answer.await.or_raise(|| ErrorKind::WorkerStopped)?.or_raise(|| ErrorKind::Cache)
    }
}

impl FileSource for OfflineFileSource {
    fn request(&self, resource: Resource, callback: Callback) -> FileRequest {
        let (handle, responder) = FileRequest::channel(callback);
        if let Err(mpsc::error::SendError(job)) = self.inner.jobs.send(Job::Read { resource, responder }) {
            // Deliver from a task, never from within this call.
            if let Job::Read { responder, .. } = job {
                self.inner.runtime.spawn(async move {
                    responder.deliver(Response::error(ResponseErrorKind::Other, "offline worker stopped"));
                });
            }
        }
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::mock::{GridEnumerator, MockFetcher, capture};
    use crate::online::StaticCredentials;
    use cartage_cache::MemoryStore;
    use cartage_config::FailurePolicy;
    use cartage_resource::{LatLngBounds, TileId};
    use std::sync::Mutex;
    use tokio::sync::mpsc::UnboundedReceiver;

    const STYLE_URL: &str = "https://example.com/styles/bright.json";
    const STYLE: &str = r#"{
        "version": 8,
        "sources": {
            "streets": {
                "type": "vector",
                "tiles": ["https://tiles.example.com/{z}/{x}/{y}.pbf"],
                "minzoom": 0,
                "maxzoom": 14
            }
        },
        "sprite": "https://example.com/sprites/bright",
        "glyphs": "https://example.com/fonts/{fontstack}/{range}.pbf",
        "layers": [
            { "id": "labels", "type": "symbol", "layout": { "text-font": ["Noto Sans Regular"] } }
        ]
    }"#;

    struct Fixture {
        offline: OfflineFileSource,
        fetcher: Arc<MockFetcher>,
        store: Arc<SharedCache>,
    }

    fn fixture(fetcher: MockFetcher, options: SessionOptions) -> Fixture {
        let store = Arc::new(SharedCache::new("test", Arc::new(MemoryStore::default())));
        let fetcher = Arc::new(fetcher);
        let online = OnlineFileSource::new(
            store.clone(),
            fetcher.clone(),
            Arc::new(StaticCredentials::default()),
            Arc::new(SystemClock),
        )
        .unwrap();
        let offline = OfflineFileSource::new(store.clone(), online, Arc::new(GridEnumerator::new(2)), options).unwrap();
        Fixture { offline, fetcher, store }
    }

    fn milestones() -> (ProgressCallback, UnboundedReceiver<Milestone>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let progress: ProgressCallback = Box::new(move |milestone| {
            let _ = tx.send(milestone);
        });
        (progress, rx)
    }

    /// Collect milestones until the session reports completion.
    async fn until_complete(rx: &mut UnboundedReceiver<Milestone>) -> Vec<Milestone> {
        let mut received = Vec::new();
        while let Some(milestone) = rx.recv().await {
            let complete = milestone.progress.complete;
            received.push(milestone);
            if complete {
                break;
            }
        }
        received
    }

    fn region(min_zoom: f64, max_zoom: f64) -> OfflineRegion {
        OfflineRegion::new(STYLE_URL, LatLngBounds::world(), min_zoom, max_zoom)
    }

    #[tokio::test]
    async fn test_request_serves_pinned_resources_only() {
        let fixture = fixture(MockFetcher::default(), SessionOptions::default());
        let tile = Resource::tile("https://tiles.example.com/{z}/{x}/{y}.pbf", TileId::new(3, 1, 2), 1.0);
        fixture.store.pin(&tile, &Response::ok(b"pinned".to_vec())).await.unwrap();

        let (callback, rx) = capture();
        let _handle = fixture.offline.request(tile, callback);
        assert_eq!(rx.await.unwrap().bytes(), Some(b"pinned".as_slice()));

        let (callback, rx) = capture();
        let _handle = fixture.offline.request(Resource::from_url("https://tiles.example.com/3/0/0.pbf"), callback);
        assert_eq!(rx.await.unwrap().error_kind(), Some(ResponseErrorKind::NotFound));
        assert_eq!(fixture.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_read_is_skipped() {
        let fixture = fixture(MockFetcher::default(), SessionOptions::default());
        let (callback, rx) = capture();
        let handle = fixture.offline.request(Resource::from_url("https://tiles.example.com/1/0/0.pbf"), callback);
        drop(handle);
        assert!(rx.await.is_err());
        // The worker keeps serving later jobs.
        assert_eq!(fixture.offline.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_download_style_fetches_once() {
        let fetcher = MockFetcher::default().with_response(STYLE_URL, Response::ok(STYLE));
        let fixture = fixture(fetcher, SessionOptions::default());
        let (callback, rx) = capture();
        let _handle = fixture.offline.download_style(STYLE_URL, callback);
        assert_eq!(rx.await.unwrap().bytes(), Some(STYLE.as_bytes()));
        assert_eq!(fixture.fetcher.calls(), 1);
        assert!(fixture.offline.contains(&Resource::style(STYLE_URL)).await.unwrap());
        assert_eq!(fixture.offline.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_download_style_failure() {
        let fixture = fixture(MockFetcher::default(), SessionOptions::default());
        let (progress, mut rx) = milestones();
        let _handle = fixture.offline.begin_downloading(region(0.0, 1.0), progress);
        let received = until_complete(&mut rx).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].response.error_kind(), Some(ResponseErrorKind::HttpStatus { code: 404 }));
        assert_eq!(received[0].progress.failed, 1);
        assert_eq!(fixture.fetcher.calls(), 1);
        assert_eq!(fixture.offline.count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_begin_downloading_fetches_everything_once() {
        let fetcher = MockFetcher::default()
            .with_response(STYLE_URL, Response::ok(STYLE))
            .with_fallback(Response::ok(b"payload".to_vec()));
        let fixture = fixture(fetcher, SessionOptions::default());
        let (progress, mut rx) = milestones();
        let _handle = fixture.offline.begin_downloading(region(0.0, 1.0), progress);
        let received = until_complete(&mut rx).await;

        // Style, sprite index and image, 256 glyph ranges, 1 + 4 tiles.
        let expected = 1 + 2 + 256 + 5;
        assert_eq!(fixture.fetcher.calls(), expected);
        let last = received.last().unwrap();
        assert!(last.progress.complete);
        assert_eq!(last.resource.url(), STYLE_URL);
        assert_eq!(last.progress.completed, expected as u64);
        assert_eq!(last.progress.expected, expected as u64);
        assert_eq!(last.progress.failed, 0);
        // One milestone per resource, plus the final one.
        assert_eq!(received.len(), expected + 1);
        assert!(received[..expected].iter().all(|milestone| !milestone.progress.complete));

        assert_eq!(fixture.offline.count().await.unwrap(), expected as u64);
        let tile = Resource::from_url("https://tiles.example.com/1/1/1.pbf");
        assert!(fixture.offline.contains(&tile).await.unwrap());
        assert_eq!(fixture.fetcher.calls_for("https://example.com/sprites/bright.png"), 1);
        assert_eq!(fixture.fetcher.calls_for("https://example.com/fonts/Noto Sans Regular/65280-65535.pbf"), 1);
    }

    #[tokio::test]
    async fn test_tilejson_source_and_high_dpi() {
        let style = r#"{
            "version": 8,
            "sources": { "satellite": { "type": "raster", "url": "https://example.com/satellite.json" } },
            "sprite": "https://example.com/sprite",
            "layers": []
        }"#;
        let tilejson = r#"{"tiles": ["https://tiles.example.com/{z}/{x}/{y}{ratio}.png"], "minzoom": 1, "maxzoom": 1}"#;
        let fetcher = MockFetcher::default()
            .with_response(STYLE_URL, Response::ok(style))
            .with_response("https://example.com/satellite.json", Response::ok(tilejson))
            .with_fallback(Response::ok(b"payload".to_vec()));
        let options = SessionOptions { pixel_ratio: 2.0, ..SessionOptions::default() };
        let fixture = fixture(fetcher, options);
        let (progress, mut rx) = milestones();
        let _handle = fixture.offline.begin_downloading(region(0.0, 5.0), progress);
        let received = until_complete(&mut rx).await;

        assert_eq!(received[1].resource.url(), "https://example.com/satellite.json");
        // Style, TileJSON, two sprite files, and the four tiles of zoom 1.
        assert_eq!(fixture.fetcher.calls(), 1 + 1 + 2 + 4);
        assert_eq!(fixture.fetcher.calls_for("https://example.com/sprite@2x.json"), 1);
        assert_eq!(fixture.fetcher.calls_for("https://tiles.example.com/1/0/1@2x.png"), 1);
        assert_eq!(fixture.fetcher.calls_for("https://tiles.example.com/0/0/0@2x.png"), 0);
    }

    #[tokio::test]
    async fn test_failures_are_reported_and_session_continues() {
        let fetcher = MockFetcher::default()
            .with_response(STYLE_URL, Response::ok(STYLE))
            .with_response(
                "https://tiles.example.com/0/0/0.pbf",
                Response::error(ResponseErrorKind::ConnectionError, "reset"),
            )
            .with_fallback(Response::ok(b"payload".to_vec()));
        let fixture = fixture(fetcher, SessionOptions::default());
        let (progress, mut rx) = milestones();
        let _handle = fixture.offline.begin_downloading(region(0.0, 1.0), progress);
        let received = until_complete(&mut rx).await;

        let failed: Vec<_> = received.iter().filter(|milestone| milestone.response.is_error()).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].resource.url(), "https://tiles.example.com/0/0/0.pbf");
        let last = received.last().unwrap();
        assert_eq!(last.progress.failed, 1);
        assert_eq!(last.progress.completed, last.progress.expected - 1);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_after_first_failure() {
        let fetcher = MockFetcher::default()
            .with_response(STYLE_URL, Response::ok(STYLE))
            .with_response(
                "https://example.com/sprites/bright.json",
                Response::error(ResponseErrorKind::HttpStatus { code: 500 }, "boom"),
            )
            .with_fallback(Response::ok(b"payload".to_vec()));
        let options = SessionOptions {
            concurrency: 1,
            failure_policy: FailurePolicy::Abort,
            ..SessionOptions::default()
        };
        let fixture = fixture(fetcher, options);
        let (progress, mut rx) = milestones();
        let _handle = fixture.offline.begin_downloading(region(0.0, 1.0), progress);
        let received = until_complete(&mut rx).await;

        // The sprite index is the first resource after the style.
        assert_eq!(fixture.fetcher.calls(), 2);
        let last = received.last().unwrap();
        assert!(last.progress.complete);
        assert_eq!(last.progress.failed, 1);
        assert!(last.progress.completed + last.progress.failed < last.progress.expected);
    }

    #[tokio::test]
    async fn test_abort_policy_stops_at_failed_tilejson() {
        let style = r#"{
            "version": 8,
            "sources": { "satellite": { "type": "raster", "url": "https://example.com/satellite.json" } },
            "sprite": "https://example.com/sprite",
            "layers": []
        }"#;
        let fetcher = MockFetcher::default()
            .with_response(STYLE_URL, Response::ok(style))
            .with_response(
                "https://example.com/satellite.json",
                Response::error(ResponseErrorKind::ConnectionError, "unreachable"),
            );
        let options = SessionOptions {
            failure_policy: FailurePolicy::Abort,
            ..SessionOptions::default()
        };
        let fixture = fixture(fetcher, options);
        let (progress, mut rx) = milestones();
        let _handle = fixture.offline.begin_downloading(region(0.0, 1.0), progress);
        let received = until_complete(&mut rx).await;

        assert_eq!(received.len(), 2);
        assert!(!received[0].progress.complete);
        let last = &received[1];
        assert!(last.progress.complete);
        assert_eq!(last.resource.url(), "https://example.com/satellite.json");
        assert_eq!(last.response.error_kind(), Some(ResponseErrorKind::ConnectionError));
        assert_eq!(last.progress.failed, 1);
        // Neither sprites nor tiles were requested.
        assert_eq!(fixture.fetcher.calls(), 2);
        assert_eq!(fixture.offline.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_oversized_resource_is_reported() {
        let fetcher = MockFetcher::default().with_response(STYLE_URL, Response::ok(STYLE));
        let fixture = fixture(fetcher, SessionOptions::default());
        fixture.store.set_maximum_pinned_entry_size(Some(8));
        let (progress, mut rx) = milestones();
        let _handle = fixture.offline.begin_downloading(region(0.0, 0.0), progress);
        let received = until_complete(&mut rx).await;
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].response.error_kind(), Some(ResponseErrorKind::EntryTooLarge));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropping_session_stops_progress() {
        let fetcher = MockFetcher::gated()
            .with_response(STYLE_URL, Response::ok(STYLE))
            .with_fallback(Response::ok(b"payload".to_vec()));
        let fixture = fixture(fetcher, SessionOptions::default());
        let received = Arc::new(Mutex::new(0));
        let counter = received.clone();
        let handle = fixture.offline.begin_downloading(
            region(0.0, 1.0),
            Box::new(move |_: Milestone| *counter.lock().unwrap() += 1),
        );
        fixture.fetcher.wait_for_calls(1).await;
        drop(handle);
        fixture.fetcher.open();
        tokio::task::yield_now().await;
        assert_eq!(*received.lock().unwrap(), 0);
        assert_eq!(fixture.fetcher.calls(), 1);
    }
}
