//! Download sessions.
//!
//! A session walks a style document and pins everything a map of the region
//! needs: the style, its TileJSON sources, sprites, glyph ranges and tiles.
//! Progress is reported as a stream of [`Milestone`]s:
//!
//! 1. The style. If it cannot be fetched (or stored) this is the only
//!    milestone and it is already `complete`. So is it when the region's
//!    bounds are empty: only the style is downloaded.
//! 2. One per TileJSON document, in source name order.
//! 3. One per sprite, glyph range and tile, in completion order.
//! 4. A final milestone repeating the style, with `complete` set.

use crate::offline::manifest::{StyleManifest, TileJson, Tileset};
use crate::offline::tiles::TileEnumeratorHandle;
use crate::offline::worker::{Job, JobSender};
use crate::online::OnlineFileSource;
use async_stream::stream;
use cartage_cache::error::ErrorKind as CacheErrorKind;
use cartage_config::{FailurePolicy, OfflineConfig};
use cartage_resource::{LatLngBounds, Resource, Response, ResponseErrorKind};
use futures::future::ready;
use futures::{Stream, StreamExt, stream};
use std::collections::HashSet;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Glyph ranges per font stack: 256 ranges of 256 codepoints cover the
/// basic multilingual plane.
const GLYPH_RANGES: u32 = 256;
const GLYPH_RANGE_SIZE: u32 = 256;

/// A style plus the area and zoom levels to download for it.
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineRegion {
    pub style_url: String,
    pub bounds: LatLngBounds,
    pub min_zoom: f64,
    pub max_zoom: f64,
}

impl OfflineRegion {
    pub fn new(style_url: impl Into<String>, bounds: LatLngBounds, min_zoom: f64, max_zoom: f64) -> Self {
        Self {
            style_url: style_url.into(),
            bounds,
            min_zoom,
            max_zoom,
        }
    }

    /// A region with no area: only the style document is downloaded.
    pub fn style_only(style_url: impl Into<String>) -> Self {
        Self::new(style_url, LatLngBounds::empty(), 0.0, 0.0)
    }
}

/// Running totals of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadProgress {
    pub completed: u64,
    pub failed: u64,
    /// Grows as the style and its sources are parsed.
    pub expected: u64,
    /// Set on the last milestone of the session, and only there.
    pub complete: bool,
}

/// One resource downloaded (or not) by a session.
#[derive(Debug, Clone)]
pub struct Milestone {
    pub resource: Resource,
    /// The fetched response, or why the resource could not be fetched or
    /// stored.
    pub response: Response,
    pub progress: DownloadProgress,
}

/// Tuning of download sessions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Resources fetched in parallel.
    pub concurrency: usize,
    pub failure_policy: FailurePolicy,
    /// Selects `@2x` sprites and tiles when greater than 1.
    pub pixel_ratio: f32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&OfflineConfig::default())
    }
}

impl From<&OfflineConfig> for SessionOptions {
    fn from(config: &OfflineConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            failure_policy: config.failure_policy,
            pixel_ratio: config.pixel_ratio,
        }
    }
}

/// Everything a session needs, cheap to clone into a task.
#[derive(Clone)]
pub(crate) struct Downloader {
    pub online: OnlineFileSource,
    pub jobs: JobSender,
    pub tiles: TileEnumeratorHandle,
    pub options: SessionOptions,
}

impl Downloader {
    pub fn session(self, region: OfflineRegion) -> impl Stream<Item = Milestone> + Send + 'static {
        // `rustfmt` does not format macros that use braces. Wrap in parentheses!
        stream!({
            let style = Resource::style(region.style_url.clone());
            let mut progress = DownloadProgress {
                expected: 1,
                ..DownloadProgress::default()
            };
            info!(url = %style.url(), bounds = %region.bounds, "Starting offline download");

            let style_response = self.download(&style).await;
            let failed = progress.record(&style_response);
            if failed || region.bounds.is_empty() {
                progress.complete = true;
                yield Milestone { resource: style, response: style_response, progress };
                return;
            }
            yield Milestone { resource: style.clone(), response: style_response.clone(), progress };

            let manifest = match StyleManifest::parse(style_response.bytes().unwrap_or_default()) {
                Ok(manifest) => manifest,
                Err(err) => {
                    warn!(url = %style.url(), error = %err, "Downloaded style is not a valid style document");
                    progress.complete = true;
                    let response = Response::error(ResponseErrorKind::Other, format!("invalid style document: {err}"));
                    yield Milestone { resource: style, response, progress };
                    return;
                },
            };

            let mut tilesets: Vec<Tileset> = Vec::new();
            for (name, source) in manifest.tiled_sources() {
                let Some(url) = &source.url else {
                    tilesets.extend(source.tileset.tileset());
                    continue;
                };
                let resource = Resource::source(url.clone());
                progress.expected += 1;
                let response = self.download(&resource).await;
                if progress.record(&response) && self.aborts() {
                    progress.complete = true;
                    yield Milestone { resource, response, progress };
                    return;
                }
                match response.bytes().map(TileJson::parse) {
                    Some(Ok(tilejson)) => tilesets.extend(tilejson.tileset()),
                    Some(Err(err)) => warn!(source = name, error = %err, "Invalid TileJSON document"),
                    None => {},
                }
                yield Milestone { resource, response, progress };
            }

            let resources = self.resources(&manifest, &tilesets, &region);
            progress.expected += resources.len() as u64;
            debug!(resources = resources.len(), "Enumerated offline resources");

            let stop = AtomicBool::new(false);
            let this = &self;
            let mut downloads = pin!(
                stream::iter(resources)
                    .take_while(|_| ready(!stop.load(Ordering::Relaxed)))
                    .map(|resource| async move {
                        let response = this.download(&resource).await;
                        (resource, response)
                    })
                    .buffer_unordered(self.options.concurrency.max(1))
            );
            while let Some((resource, response)) = downloads.next().await {
                if progress.record(&response) && self.aborts() {
                    debug!(url = %resource.url(), "Stopping download after failure");
                    stop.store(true, Ordering::Relaxed);
                }
                yield Milestone { resource, response, progress };
            }

            progress.complete = true;
            info!(
                url = %style.url(),
                completed = progress.completed,
                failed = progress.failed,
                expected = progress.expected,
                "Finished offline download"
            );
            yield Milestone { resource: style, response: style_response, progress };
        })
    }

    fn aborts(&self) -> bool {
        self.options.failure_policy == FailurePolicy::Abort
    }

    /// Fetch `resource` through the online source and pin the result.
    async fn download(&self, resource: &Resource) -> Response {
        let response = self.online.fetch(resource).await;
        if response.is_error() {
            debug!(url = %resource.url(), "Offline download failed");
            return response;
        }
        let (done, stored) = oneshot::channel();
        let job = Job::Store {
            resource: resource.clone(),
            response: response.clone(),
            done,
        };
        if self.jobs.send(job).is_err() {
            return Response::error(ResponseErrorKind::Other, "offline worker stopped");
        }
        match stored.await {
            Ok(Ok(())) => response,
            Ok(Err(err)) => {
                warn!(url = %resource.url(), error = ?err, "Failed to store offline resource");
                let kind = match &*err {
                    CacheErrorKind::EntryTooLarge { .. } => ResponseErrorKind::EntryTooLarge,
                    _ => ResponseErrorKind::Other,
                };
                Response::error(kind, err.to_string())
            },
            Err(_) => Response::error(ResponseErrorKind::Other, "offline worker stopped"),
        }
    }

    /// Sprites, glyph ranges and tiles, without duplicates.
    fn resources(&self, manifest: &StyleManifest, tilesets: &[Tileset], region: &OfflineRegion) -> Vec<Resource> {
        let ratio = self.options.pixel_ratio;
        let mut resources = Vec::new();
        for base in manifest.sprite_bases() {
            resources.push(Resource::sprite_json(&base, ratio));
            resources.push(Resource::sprite_image(&base, ratio));
        }
        if let Some(template) = &manifest.glyphs {
            for fontstack in manifest.fontstacks() {
                resources.extend(
                    (0..GLYPH_RANGES).map(|range| Resource::glyphs(template, &fontstack, range * GLYPH_RANGE_SIZE)),
                );
            }
        }
        for tileset in tilesets {
            let min_zoom = region.min_zoom.max(tileset.min_zoom);
            let max_zoom = region.max_zoom.min(tileset.max_zoom);
            if min_zoom > max_zoom {
                continue;
            }
            let tiles = self.tiles.tiles(&region.bounds, min_zoom, max_zoom);
            resources.extend(tiles.into_iter().map(|tile| Resource::tile(&tileset.template, tile, ratio)));
        }
        let mut seen = HashSet::new();
        resources.retain(|resource| seen.insert(resource.url().to_string()));
        resources
    }
}

impl DownloadProgress {
    /// Count `response`; returns `true` if it is a failure.
    fn record(&mut self, response: &Response) -> bool {
        match response.is_error() {
            true => self.failed += 1,
            false => self.completed += 1,
        }
        response.is_error()
    }
}
