//! Requests made of other requests.
//!
//! A composite handle owns its children: dropping it drops them, which is
//! enough to silence every callback further down. Callbacks only ever hold
//! a [`Responder`](crate::Responder) or a `Weak` reference back to the
//! composite, so firing after teardown is a checked no-op.

use crate::FileSource;
use crate::offline::{Milestone, OfflineFileSource, OfflineRegion};
use crate::online::OnlineFileSource;
use crate::request::{Callback, FileRequest, attach};
use cartage_resource::{Resource, Response};
use tracing::debug;

/// Download and pin a style alone, delivering the style's response to a
/// single-shot callback. The session is the handle's only child.
pub(crate) fn style_file_request(offline: &OfflineFileSource, style_url: String, callback: Callback) -> FileRequest {
    let (mut handle, responder) = FileRequest::channel(callback);
    let mut responder = Some(responder);
    let session = offline.begin_downloading(
        OfflineRegion::style_only(style_url),
        Box::new(move |milestone: Milestone| {
            // The first milestone is always the style.
            if let Some(responder) = responder.take() {
                responder.deliver(milestone.response);
            }
        }),
    );
    handle.adopt(session);
    handle
}

/// Offline database first, then cache and network.
///
/// Each request first asks the offline source. If that fails (typically
/// because the resource was never downloaded) the same resource is requested
/// from the online source and its response is delivered verbatim. An
/// offline hit never touches the network.
#[derive(Debug, Clone)]
pub struct OfflineFirst {
    offline: OfflineFileSource,
    online: OnlineFileSource,
}

impl OfflineFirst {
    pub fn new(offline: OfflineFileSource, online: OnlineFileSource) -> Self {
        Self { offline, online }
    }
}

impl FileSource for OfflineFirst {
    fn request(&self, resource: Resource, callback: Callback) -> FileRequest {
        let (mut handle, responder) = FileRequest::channel(callback);
        let children = handle.children();
        let online = self.online.clone();
        let fallback = resource.clone();
        let offline = self.offline.request(
            resource,
            Box::new(move |response: Response| {
                if !response.is_error() {
                    responder.deliver(response);
                    return;
                }
                debug!(url = %fallback.url(), error = ?response.error, "Offline miss, requesting online");
                let child = online.request(
                    fallback,
                    Box::new(move |response: Response| {
                        responder.deliver(response);
                    }),
                );
                // Dropped at once if the composite is already gone.
                attach(&children, child);
            }),
        );
        handle.adopt(offline);
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::mock::{GridEnumerator, MockFetcher, capture};
    use crate::offline::SessionOptions;
    use crate::online::StaticCredentials;
    use cartage_cache::{MemoryStore, SharedCache};
    use cartage_resource::{ResponseErrorKind, TileId};
    use std::sync::Arc;

    const TEMPLATE: &str = "https://tiles.example.com/{z}/{x}/{y}.pbf";

    struct Fixture {
        source: OfflineFirst,
        fetcher: Arc<MockFetcher>,
        store: Arc<SharedCache>,
    }

    fn fixture(fetcher: MockFetcher) -> Fixture {
        let store = Arc::new(SharedCache::new("test", Arc::new(MemoryStore::default())));
        let fetcher = Arc::new(fetcher);
        let online = OnlineFileSource::new(
            store.clone(),
            fetcher.clone(),
            Arc::new(StaticCredentials::default()),
            Arc::new(SystemClock),
        )
        .unwrap();
        let offline = OfflineFileSource::new(
            store.clone(),
            online.clone(),
            Arc::new(GridEnumerator::new(1)),
            SessionOptions::default(),
        )
        .unwrap();
        Fixture {
            source: OfflineFirst::new(offline, online),
            fetcher,
            store,
        }
    }

    fn tile() -> Resource {
        Resource::tile(TEMPLATE, TileId::new(3, 1, 2), 1.0)
    }

    #[tokio::test]
    async fn test_offline_miss_falls_back_to_online() {
        let online = Response::ok(b"from the network".to_vec()).with_etag("\"n\"");
        let fixture = fixture(MockFetcher::default().with_response(tile().url(), online.clone()));
        let (callback, rx) = capture();
        let _handle = fixture.source.request(tile(), callback);
        assert_eq!(rx.await.unwrap(), online);
        assert_eq!(fixture.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_online_failure_is_delivered_verbatim() {
        let failure = Response::error(ResponseErrorKind::HttpStatus { code: 410 }, "gone");
        let fixture = fixture(MockFetcher::default().with_response(tile().url(), failure.clone()));
        let (callback, rx) = capture();
        let _handle = fixture.source.request(tile(), callback);
        assert_eq!(rx.await.unwrap(), failure);
        assert_eq!(fixture.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_offline_hit_never_reaches_network() {
        let fixture = fixture(MockFetcher::default());
        fixture.store.pin(&tile(), &Response::ok(b"pinned".to_vec())).await.unwrap();
        let (callback, rx) = capture();
        let _handle = fixture.source.request(tile(), callback);
        assert_eq!(rx.await.unwrap().bytes(), Some(b"pinned".as_slice()));
        assert_eq!(fixture.fetcher.calls(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropping_composite_cancels_online_child() {
        let fixture = fixture(MockFetcher::gated().with_response(tile().url(), Response::ok(b"late".to_vec())));
        let (callback, rx) = capture();
        let handle = fixture.source.request(tile(), callback);
        fixture.fetcher.wait_for_calls(1).await;
        drop(handle);
        fixture.fetcher.open();
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_dropping_composite_before_offline_answer() {
        let fixture = fixture(MockFetcher::default());
        let (callback, rx) = capture();
        let handle = fixture.source.request(tile(), callback);
        drop(handle);
        assert!(rx.await.is_err());
        assert_eq!(fixture.fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_style_request_delivers_style_once() {
        let style = br#"{"version": 8, "sources": {}, "layers": []}"#;
        let url = "https://example.com/style.json";
        let fixture = fixture(MockFetcher::default().with_response(url, Response::ok(style.to_vec())));
        let (callback, rx) = capture();
        let _handle = fixture.source.offline.download_style(url, callback);
        assert_eq!(rx.await.unwrap().bytes(), Some(style.as_slice()));
        assert_eq!(fixture.fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_style_request_delivers_failure() {
        let fixture = fixture(MockFetcher::default());
        let (callback, rx) = capture();
        let _handle = fixture.source.offline.download_style("https://example.com/missing.json", callback);
        assert_eq!(rx.await.unwrap().error_kind(), Some(ResponseErrorKind::HttpStatus { code: 404 }));
    }
}
