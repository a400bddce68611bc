//! The task that owns the offline database.
//!
//! Every read and write of the pinned partition goes through one queue and
//! is executed in order, one job at a time. The worker stops once every
//! sender is gone.

use crate::request::Responder;
use cartage_cache::SharedCache;
use cartage_cache::error::Result as CacheResult;
use cartage_resource::{Resource, Response, ResponseErrorKind};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

pub(crate) type JobSender = mpsc::UnboundedSender<Job>;

pub(crate) enum Job {
    /// Answer a request from the pinned partition.
    Read { resource: Resource, responder: Responder },
    /// Pin a downloaded resource.
    Store {
        resource: Resource,
        response: Response,
        done: oneshot::Sender<CacheResult<()>>,
    },
    Count { done: oneshot::Sender<CacheResult<u64>> },
    Contains {
        resource: Resource,
        done: oneshot::Sender<CacheResult<bool>>,
    },
}

pub(crate) fn spawn(store: Arc<SharedCache>, runtime: &Handle) -> JobSender {
    let (jobs, queue) = mpsc::unbounded_channel();
    runtime.spawn(run(store, queue));
    jobs
}

async fn run(store: Arc<SharedCache>, mut queue: mpsc::UnboundedReceiver<Job>) {
    debug!(path = %store.path().display(), "Offline worker started");
    while let Some(job) = queue.recv().await {
        match job {
            Job::Read { resource, responder } => {
                if responder.is_cancelled() {
                    trace!(url = %resource.url(), "Skipping cancelled offline read");
                    continue;
                }
                responder.deliver(read(&store, &resource).await);
            },
            Job::Store { resource, response, done } => {
                let _ = done.send(store.pin(&resource, &response).await);
            },
            Job::Count { done } => {
                let _ = done.send(store.pinned_count().await);
            },
            Job::Contains { resource, done } => {
                let _ = done.send(store.contains_pinned(&resource).await);
            },
        }
    }
    debug!("Offline worker stopped");
}

async fn read(store: &SharedCache, resource: &Resource) -> Response {
    match store.read_pinned(resource).await {
        Ok(Some(response)) => response,
        Ok(None) => Response::not_found(format!("{} is not available offline", resource.url())),
        Err(err) => {
            warn!(url = %resource.url(), error = ?err, "Offline read failed");
            Response::error(ResponseErrorKind::Other, err.to_string())
        },
    }
}
