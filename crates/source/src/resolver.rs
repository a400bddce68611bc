use crate::asset::AssetFileSource;
use crate::clock::{ClockHandle, SystemClock};
use crate::composite::OfflineFirst;
use crate::error::{ErrorKind, Result};
use crate::offline::{OfflineFileSource, OfflineRegion, SessionOptions, TileEnumeratorHandle};
use crate::online::{CredentialsHandle, FetcherHandle, OnlineFileSource, StaticCredentials};
use crate::request::{Callback, FileRequest, ProgressCallback};
use crate::{FileSource, Source};
use cartage_cache::{CacheRegistry, SharedCache};
use cartage_config::{Config, RoutingMode};
use cartage_resource::Resource;
use cartage_storage::AssetHandle;
use cartage_storage::backend::LocalAssets;
use exn::{OptionExt, ResultExt};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, trace};

/// The resolver: routes every request to the right source.
///
/// `asset://` URLs always go to the bundle. Everything else follows the
/// configured [`RoutingMode`]: cache then network, or offline database first.
/// The online and offline sources share one cache registry, so pointing the
/// cache and the offline database at the same file shares one connection
/// pool.
///
/// # Examples
///
/// ```no_run
/// use cartage_config::Config;
/// use cartage_resource::Resource;
/// use cartage_source::offline::TileEnumeratorHandle;
/// use cartage_source::online::FetcherHandle;
/// use cartage_source::{DefaultFileSource, FileSource};
///
/// # async fn example(fetcher: FetcherHandle, tiles: TileEnumeratorHandle) -> Result<(), Box<dyn std::error::Error>> {
/// let resolver = DefaultFileSource::builder(Config::load(None)?)
///     .fetcher(fetcher)
///     .tile_enumerator(tiles)
///     .build()
///     .await?;
/// let _request = resolver.request(
///     Resource::style("https://example.com/styles/bright.json"),
///     Box::new(|response| println!("{:?}", response.error)),
/// );
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct DefaultFileSource {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    routing: RoutingMode,
    cache: Arc<SharedCache>,
    asset: AssetFileSource,
    online: OnlineFileSource,
    offline: OfflineFileSource,
    fallback: OfflineFirst,
}

impl DefaultFileSource {
    pub fn builder(config: Config) -> DefaultFileSourceBuilder {
        DefaultFileSourceBuilder {
            config,
            registry: None,
            fetcher: None,
            assets: None,
            credentials: None,
            tiles: None,
            clock: None,
        }
    }

    /// The source `resource` is routed to.
    pub fn route(&self, resource: &Resource) -> Source {
        if resource.is_asset() {
            return Source::Asset(self.inner.asset.clone());
        }
        match self.inner.routing {
            RoutingMode::Online => Source::Online(self.inner.online.clone()),
            RoutingMode::OfflineFirst => Source::Fallback(self.inner.fallback.clone()),
        }
    }

    /// Download and pin the style at `url` alone, delivering its response.
    pub fn download_style(&self, url: impl Into<String>, callback: Callback) -> FileRequest {
        self.inner.offline.download_style(url, callback)
    }

    /// Download `region` into the offline database.
    pub fn begin_downloading(&self, region: OfflineRegion, progress: ProgressCallback) -> FileRequest {
        self.inner.offline.begin_downloading(region, progress)
    }

    pub fn set_maximum_cache_size(&self, size: u64) {
        self.inner.cache.set_maximum_size(size);
    }

    pub fn set_maximum_cache_entry_size(&self, size: u64) {
        self.inner.cache.set_maximum_entry_size(size);
    }

    pub fn set_access_token(&self, token: impl Into<String>) {
        self.inner.online.set_access_token(token);
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.online.access_token()
    }

    pub fn routing(&self) -> RoutingMode {
        self.inner.routing
    }

    pub fn cache(&self) -> &Arc<SharedCache> {
        &self.inner.cache
    }

    pub fn online(&self) -> &OnlineFileSource {
        &self.inner.online
    }

    pub fn offline(&self) -> &OfflineFileSource {
        &self.inner.offline
    }
}

impl FileSource for DefaultFileSource {
    fn request(&self, resource: Resource, callback: Callback) -> FileRequest {
        let source = self.route(&resource);
        trace!(url = %resource.url(), source = source.name(), "Routing request");
        source.request(resource, callback)
    }
}

/// Assembles a [`DefaultFileSource`].
///
/// The network fetcher and the tile enumerator are required. Unless given
/// otherwise, caches come from [`CacheRegistry::shared`], assets from the
/// configured directory (or the working directory), the access token from
/// the configuration and time from the system clock.
pub struct DefaultFileSourceBuilder {
    config: Config,
    registry: Option<Arc<CacheRegistry>>,
    fetcher: Option<FetcherHandle>,
    assets: Option<AssetHandle>,
    credentials: Option<CredentialsHandle>,
    tiles: Option<TileEnumeratorHandle>,
    clock: Option<ClockHandle>,
}

impl DefaultFileSourceBuilder {
    /// Share caches with every other resolver built from `registry` instead
    /// of the process-wide one.
    pub fn registry(mut self, registry: Arc<CacheRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn fetcher(mut self, fetcher: FetcherHandle) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn assets(mut self, assets: AssetHandle) -> Self {
        self.assets = Some(assets);
        self
    }

    /// Credentials to use instead of the configured access token. The
    /// configured token is still applied if they hold none.
    pub fn credentials(mut self, credentials: CredentialsHandle) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn tile_enumerator(mut self, tiles: TileEnumeratorHandle) -> Self {
        self.tiles = Some(tiles);
        self
    }

    pub fn clock(mut self, clock: ClockHandle) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Open the caches and start the sources on the current tokio runtime.
    pub async fn build(self) -> Result<DefaultFileSource> {
        let runtime = Handle::try_current().or_raise(|| ErrorKind::Runtime)?;
        let config = self.config;
        config.validate().or_raise(|| ErrorKind::Config)?;
        let fetcher = self.fetcher.ok_or_raise(|| ErrorKind::MissingCollaborator("network fetcher"))?;
        let tiles = self.tiles.ok_or_raise(|| ErrorKind::MissingCollaborator("tile enumerator"))?;
        let registry = self.registry.unwrap_or_else(CacheRegistry::shared);

        let cache = registry.get(&config.cache.path).await.or_raise(|| ErrorKind::Cache)?;
        cache.set_maximum_size(config.cache.maximum_size);
        cache.set_maximum_entry_size(config.cache.maximum_entry_size);
        cache.set_compression(config.cache.compression);
        let store = registry.get(&config.offline.path).await.or_raise(|| ErrorKind::Cache)?;
        store.set_maximum_pinned_entry_size(config.offline.maximum_entry_size);
        store.set_compression(config.cache.compression);

        let assets: AssetHandle = match self.assets {
            Some(assets) => assets,
            None => {
                let root = match &config.assets.root {
                    Some(root) => root.clone(),
                    None => std::env::current_dir().or_raise(|| ErrorKind::Storage)?,
                };
                Arc::new(LocalAssets::new("bundle", root).or_raise(|| ErrorKind::Storage)?)
            },
        };
        let credentials: CredentialsHandle = match self.credentials {
            Some(credentials) => credentials,
            None => Arc::new(StaticCredentials::default()),
        };
        if let Some(token) = &config.access_token
            && credentials.access_token().is_none()
        {
            credentials.set_access_token(token.clone());
        }
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let online = OnlineFileSource::with_runtime(cache.clone(), fetcher, credentials, clock, runtime.clone());
        let offline = OfflineFileSource::with_runtime(
            store,
            online.clone(),
            tiles,
            SessionOptions::from(&config.offline),
            runtime.clone(),
        );
        let asset = AssetFileSource::with_runtime(assets, runtime);
        info!(
            cache = %config.cache.path.display(),
            offline = %config.offline.path.display(),
            routing = ?config.routing.mode,
            "File source ready"
        );
        Ok(DefaultFileSource {
            inner: Arc::new(Inner {
                routing: config.routing.mode,
                cache,
                asset,
                fallback: OfflineFirst::new(offline.clone(), online.clone()),
                online,
                offline,
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{GridEnumerator, ManualClock, MockFetcher, capture};
    use cartage_cache::IN_MEMORY;
    use cartage_compress::Compression;
    use cartage_resource::{Response, ResponseErrorKind, TileId};
    use cartage_storage::backend::MockAssets;
    use rstest::rstest;
    use time::{Duration, UtcDateTime};

    const TILE_TEMPLATE: &str = "https://tiles.example.com/{z}/{x}/{y}.pbf";
    const STYLE_URL: &str = "https://example.com/styles/bright.json";

    fn config(routing: RoutingMode) -> Config {
        let mut config = Config::default();
        config.cache.path = IN_MEMORY.into();
        config.offline.path = IN_MEMORY.into();
        config.routing.mode = routing;
        config
    }

    fn tile() -> Resource {
        Resource::tile(TILE_TEMPLATE, TileId::new(3, 1, 2), 1.0)
    }

    async fn start(config: Config, fetcher: &Arc<MockFetcher>, assets: &Arc<MockAssets>) -> DefaultFileSource {
        DefaultFileSource::builder(config)
            .registry(Arc::default())
            .fetcher(fetcher.clone())
            .assets(assets.clone())
            .tile_enumerator(Arc::new(GridEnumerator::new(1)))
            .build()
            .await
            .unwrap()
    }

    #[rstest]
    #[case::online(RoutingMode::Online)]
    #[case::offline_first(RoutingMode::OfflineFirst)]
    #[tokio::test]
    async fn test_assets_never_reach_other_sources(#[case] routing: RoutingMode) {
        let fetcher = Arc::new(MockFetcher::default().with_fallback(Response::ok(b"network".to_vec())));
        let assets = Arc::new(MockAssets::with_files([("styles/bright.json", b"{}")]));
        let resolver = start(config(routing), &fetcher, &assets).await;

        let (callback, rx) = capture();
        let _handle = resolver.request(Resource::from_url("asset://styles/bright.json"), callback);
        assert_eq!(rx.await.unwrap().bytes(), Some(b"{}".as_slice()));

        let (callback, rx) = capture();
        let _handle = resolver.request(Resource::from_url("asset://styles/missing.json"), callback);
        assert_eq!(rx.await.unwrap().error_kind(), Some(ResponseErrorKind::NotFound));

        assert_eq!(assets.reads(), 2);
        assert_eq!(fetcher.calls(), 0);
        assert_eq!(resolver.offline().count().await.unwrap(), 0);
    }

    #[rstest]
    #[case::online(RoutingMode::Online, "online")]
    #[case::offline_first(RoutingMode::OfflineFirst, "offline-first")]
    #[tokio::test]
    async fn test_routing(#[case] routing: RoutingMode, #[case] expected: &str) {
        let resolver = start(config(routing), &Arc::default(), &Arc::default()).await;
        assert_eq!(resolver.routing(), routing);
        assert_eq!(resolver.route(&tile()).name(), expected);
        assert_eq!(resolver.route(&Resource::from_url("asset://x.json")).name(), "asset");
    }

    #[tokio::test]
    async fn test_cache_expiry_with_manual_clock() {
        let now = UtcDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let clock = Arc::new(ManualClock::new(now));
        let fetcher = Arc::new(
            MockFetcher::default().with_response(tile().url(), Response::ok(b"tile".to_vec()).with_expires(now + Duration::hours(1))),
        );
        let resolver = DefaultFileSource::builder(config(RoutingMode::Online))
            .registry(Arc::default())
            .fetcher(fetcher.clone())
            .assets(Arc::new(MockAssets::default()))
            .tile_enumerator(Arc::new(GridEnumerator::new(1)))
            .clock(clock.clone())
            .build()
            .await
            .unwrap();

        for _ in 0..2 {
            let (callback, rx) = capture();
            let _handle = resolver.request(tile(), callback);
            assert_eq!(rx.await.unwrap().bytes(), Some(b"tile".as_slice()));
        }
        assert_eq!(fetcher.calls(), 1);

        clock.advance(Duration::hours(1));
        let (callback, rx) = capture();
        let _handle = resolver.request(tile(), callback);
        rx.await.unwrap();
        assert_eq!(fetcher.calls(), 2);
    }

    #[tokio::test]
    async fn test_offline_miss_is_served_online() {
        let fetcher = Arc::new(MockFetcher::default().with_response(tile().url(), Response::ok(b"online".to_vec())));
        let resolver = start(config(RoutingMode::OfflineFirst), &fetcher, &Arc::default()).await;
        let (callback, rx) = capture();
        let _handle = resolver.request(tile(), callback);
        assert_eq!(rx.await.unwrap().bytes(), Some(b"online".as_slice()));
        assert_eq!(fetcher.calls_for(tile().url()), 1);
    }

    #[tokio::test]
    async fn test_configured_limits_and_token() {
        let mut config = config(RoutingMode::Online);
        config.cache.maximum_size = 4096;
        config.cache.maximum_entry_size = 512;
        config.cache.compression = Compression::Zstd;
        config.access_token = Some("pk.config".to_string());
        let resolver = start(config, &Arc::default(), &Arc::default()).await;
        assert_eq!(resolver.cache().maximum_size(), 4096);
        assert_eq!(resolver.cache().maximum_entry_size(), 512);
        assert_eq!(resolver.cache().compression(), Compression::Zstd);
        assert_eq!(resolver.access_token().as_deref(), Some("pk.config"));

        resolver.set_maximum_cache_size(8192);
        resolver.set_maximum_cache_entry_size(1024);
        resolver.set_access_token("pk.rotated");
        assert_eq!(resolver.cache().maximum_size(), 8192);
        assert_eq!(resolver.cache().maximum_entry_size(), 1024);
        assert_eq!(resolver.access_token().as_deref(), Some("pk.rotated"));
    }

    #[tokio::test]
    async fn test_shared_registry_shares_caches() {
        let registry = Arc::new(CacheRegistry::default());
        let build = || {
            DefaultFileSource::builder(config(RoutingMode::Online))
                .registry(registry.clone())
                .fetcher(Arc::new(MockFetcher::default()))
                .assets(Arc::new(MockAssets::default()))
                .tile_enumerator(Arc::new(GridEnumerator::new(1)))
                .build()
        };
        let first = build().await.unwrap();
        let second = build().await.unwrap();
        assert!(Arc::ptr_eq(first.cache(), second.cache()));
        first.set_maximum_cache_size(1234);
        assert_eq!(second.cache().maximum_size(), 1234);
    }

    #[tokio::test]
    async fn test_resolvers_share_caches_by_default() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = config(RoutingMode::Online);
        config.cache.path = temp_dir.path().join("cache.db");
        config.offline.path = temp_dir.path().join("offline.db");
        let build = |config: Config| {
            DefaultFileSource::builder(config)
                .fetcher(Arc::new(MockFetcher::default()))
                .assets(Arc::new(MockAssets::default()))
                .tile_enumerator(Arc::new(GridEnumerator::new(1)))
                .build()
        };
        let first = build(config.clone()).await.unwrap();
        config.cache.path = temp_dir.path().join("./cache.db");
        let second = build(config).await.unwrap();
        assert!(Arc::ptr_eq(first.cache(), second.cache()));
        first.set_maximum_cache_size(1234);
        assert_eq!(second.cache().maximum_size(), 1234);
    }

    #[tokio::test]
    async fn test_missing_collaborators() {
        let err = DefaultFileSource::builder(config(RoutingMode::Online))
            .tile_enumerator(Arc::new(GridEnumerator::new(1)))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingCollaborator("network fetcher")));

        let err = DefaultFileSource::builder(config(RoutingMode::Online))
            .fetcher(Arc::new(MockFetcher::default()))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::MissingCollaborator("tile enumerator")));
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let mut config = config(RoutingMode::Online);
        config.offline.concurrency = 0;
        let err = DefaultFileSource::builder(config)
            .fetcher(Arc::new(MockFetcher::default()))
            .build()
            .await
            .unwrap_err();
        assert!(matches!(&*err, ErrorKind::Config));
    }

    #[test]
    fn test_requires_runtime() {
        let builder = DefaultFileSource::builder(config(RoutingMode::Online)).fetcher(Arc::new(MockFetcher::default()));
        let err = futures::executor::block_on(builder.build()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Runtime));
    }

    #[tokio::test]
    async fn test_downloaded_style_survives_restart() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = config(RoutingMode::OfflineFirst);
        config.cache.path = temp_dir.path().join("cache.db");
        config.offline.path = temp_dir.path().join("offline/offline.db");
        let style = br#"{"version": 8, "sources": {}, "layers": []}"#;

        let fetcher = Arc::new(MockFetcher::default().with_response(STYLE_URL, Response::ok(style.to_vec())));
        let resolver = start(config.clone(), &fetcher, &Arc::default()).await;
        let (callback, rx) = capture();
        let _handle = resolver.download_style(STYLE_URL, callback);
        assert_eq!(rx.await.unwrap().bytes(), Some(style.as_slice()));
        drop(resolver);

        // A fresh resolver, with a network that knows nothing.
        let fetcher = Arc::new(MockFetcher::default());
        let resolver = start(config, &fetcher, &Arc::default()).await;
        let (callback, rx) = capture();
        let _handle = resolver.request(Resource::style(STYLE_URL), callback);
        assert_eq!(rx.await.unwrap().bytes(), Some(style.as_slice()));
        assert_eq!(fetcher.calls(), 0);
    }
}
