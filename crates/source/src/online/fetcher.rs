use async_trait::async_trait;
use cartage_resource::{Resource, Response};
use std::sync::Arc;
use time::UtcDateTime;

/// One network fetch, carrying the validators of a stale cached copy (if
/// any) so the server can answer "not modified".
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub resource: Resource,
    pub etag: Option<String>,
    pub modified: Option<UtcDateTime>,
    pub access_token: Option<String>,
}

impl FetchRequest {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            etag: None,
            modified: None,
            access_token: None,
        }
    }

    /// Whether the server may answer with a not-modified response.
    pub fn is_conditional(&self) -> bool {
        self.etag.is_some() || self.modified.is_some()
    }
}

/// The transport behind the online source.
///
/// Implementations deliver every failure as an error [`Response`]
/// ([`ConnectionError`](cartage_resource::ResponseErrorKind::ConnectionError)
/// or [`HttpStatus`](cartage_resource::ResponseErrorKind::HttpStatus)) and
/// set [`not_modified`](Response::not_modified) when a conditional request
/// was answered without a body. Cancellation is by dropping the future.
#[async_trait]
pub trait NetworkFetcher: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Response;
}

pub type FetcherHandle = Arc<dyn NetworkFetcher>;
