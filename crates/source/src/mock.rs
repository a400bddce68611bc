//! Test doubles for the network, the clock and tile enumeration.

use crate::clock::Clock;
use crate::offline::TileEnumerator;
use crate::online::{FetchRequest, NetworkFetcher};
use crate::request::Callback;
use async_trait::async_trait;
use cartage_resource::{LatLngBounds, Response, ResponseErrorKind, TileId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use time::{Duration, UtcDateTime};
use tokio::sync::{oneshot, watch};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A callback that forwards its response to the returned receiver. If the
/// callback is dropped without being called, the receiver yields an error.
pub fn capture() -> (Callback, oneshot::Receiver<Response>) {
    let (tx, rx) = oneshot::channel();
    let callback: Callback = Box::new(move |response| {
        let _ = tx.send(response);
    });
    (callback, rx)
}

/// A scripted network.
///
/// Answers each URL with the response registered for it, else with the
/// fallback response, else with HTTP 404. Every fetch is recorded before it
/// is answered. A [gated](Self::gated) fetcher holds every answer back until
/// [`open`](Self::open) is called.
///
/// # Examples
///
/// ```
/// use cartage_resource::{Resource, Response};
/// use cartage_source::mock::MockFetcher;
/// use cartage_source::online::{FetchRequest, NetworkFetcher};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let fetcher = MockFetcher::default().with_response("https://example.com/style.json", Response::ok("{}"));
/// let request = FetchRequest::new(Resource::style("https://example.com/style.json"));
/// assert_eq!(fetcher.fetch(request).await.bytes(), Some(b"{}".as_slice()));
/// assert_eq!(fetcher.calls(), 1);
/// # }
/// ```
pub struct MockFetcher {
    responses: Mutex<HashMap<String, Response>>,
    fallback: Option<Response>,
    requests: Mutex<Vec<FetchRequest>>,
    calls: watch::Sender<usize>,
    gate: Option<watch::Sender<bool>>,
}

impl Default for MockFetcher {
    fn default() -> Self {
        Self {
            responses: Mutex::default(),
            fallback: None,
            requests: Mutex::default(),
            calls: watch::Sender::new(0),
            gate: None,
        }
    }
}

impl MockFetcher {
    /// A fetcher that answers nothing until [`open`](Self::open) is called.
    pub fn gated() -> Self {
        Self {
            gate: Some(watch::Sender::new(false)),
            ..Self::default()
        }
    }

    pub fn with_response(self, url: impl Into<String>, response: Response) -> Self {
        self.respond(url, response);
        self
    }

    /// Answer every URL without a registered response with `response`.
    pub fn with_fallback(mut self, response: Response) -> Self {
        self.fallback = Some(response);
        self
    }

    /// Register (or replace) the answer for `url`.
    pub fn respond(&self, url: impl Into<String>, response: Response) {
        lock(&self.responses).insert(url.into(), response);
    }

    /// Release every held and future answer of a gated fetcher.
    pub fn open(&self) {
        if let Some(gate) = &self.gate {
            gate.send_replace(true);
        }
    }

    pub fn calls(&self) -> usize {
        lock(&self.requests).len()
    }

    pub fn calls_for(&self, url: &str) -> usize {
        lock(&self.requests).iter().filter(|request| request.resource.url() == url).count()
    }

    pub fn requests(&self) -> Vec<FetchRequest> {
        lock(&self.requests).clone()
    }

    /// Wait until at least `count` fetches have been recorded.
    pub async fn wait_for_calls(&self, count: usize) {
        let mut calls = self.calls.subscribe();
        let _ = calls.wait_for(|calls| *calls >= count).await;
    }
}

#[async_trait]
impl NetworkFetcher for MockFetcher {
    async fn fetch(&self, request: FetchRequest) -> Response {
        let url = request.resource.url().to_string();
        let gate = self.gate.as_ref().map(watch::Sender::subscribe);
        lock(&self.requests).push(request);
        self.calls.send_modify(|calls| *calls += 1);
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }
        lock(&self.responses)
            .get(&url)
            .or(self.fallback.as_ref())
            .cloned()
            .unwrap_or_else(|| Response::error(ResponseErrorKind::HttpStatus { code: 404 }, format!("no response for {url}")))
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<UtcDateTime>,
}

impl ManualClock {
    pub fn new(now: UtcDateTime) -> Self {
        Self { now: Mutex::new(now) }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = lock(&self.now);
        *now = *now + by;
    }

    pub fn set(&self, now: UtcDateTime) {
        *lock(&self.now) = now;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> UtcDateTime {
        *lock(&self.now)
    }
}

/// Enumerates a fixed square of tiles at every zoom level instead of
/// covering the bounds: `x` and `y` both range over `0..min(width, 2^z)`.
/// Empty bounds produce no tiles.
#[derive(Debug, Clone, Copy)]
pub struct GridEnumerator {
    pub width: u32,
}

impl GridEnumerator {
    pub fn new(width: u32) -> Self {
        Self { width }
    }
}

impl TileEnumerator for GridEnumerator {
    fn tiles(&self, bounds: &LatLngBounds, min_zoom: f64, max_zoom: f64) -> Vec<TileId> {
        if bounds.is_empty() || min_zoom > max_zoom {
            return Vec::new();
        }
        let (min_zoom, max_zoom) = (min_zoom.floor().max(0.0) as u8, max_zoom.floor().min(30.0) as u8);
        let mut tiles = Vec::new();
        for z in min_zoom..=max_zoom {
            let side = self.width.min(1 << z);
            for x in 0..side {
                for y in 0..side {
                    tiles.push(TileId::new(z, x, y));
                }
            }
        }
        tiles
    }
}
