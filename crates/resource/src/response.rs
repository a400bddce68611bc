use derive_more::Display;
use std::sync::Arc;
use time::UtcDateTime;

/// Failure categories a source can deliver.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseErrorKind {
    /// Asset missing, or the offline database has no entry.
    #[display("not found")]
    NotFound,
    /// Transport-level failure.
    #[display("connection error")]
    ConnectionError,
    /// The server rejected the fetch.
    #[display("HTTP status {code}")]
    HttpStatus { code: u16 },
    /// A write was rejected by a per-entry size limit.
    #[display("entry too large")]
    EntryTooLarge,
    /// Local storage failure that is none of the above.
    #[display("other")]
    Other,
}

/// The error half of a [`Response`].
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display("{kind}: {message}")]
pub struct ResponseError {
    pub kind: ResponseErrorKind,
    pub message: String,
}
impl ResponseError {
    pub fn new(kind: ResponseErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// What a source delivers for one logical request.
///
/// Exactly one `Response` (success or error) is delivered per request unless
/// the request handle was dropped first. `data` is reference counted so the
/// same payload can be handed to the caller and written to a cache without
/// copying.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub data: Option<Arc<Vec<u8>>>,
    pub error: Option<ResponseError>,
    pub expires: Option<UtcDateTime>,
    pub modified: Option<UtcDateTime>,
    pub etag: Option<String>,
    /// Set by a network fetcher answering a conditional request with "your
    /// copy is still good". Sources never deliver this to callers; they
    /// substitute the cached data instead.
    pub not_modified: bool,
}
impl Response {
    /// A successful response carrying `data`.
    pub fn ok(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Some(Arc::new(data.into())),
            ..Self::default()
        }
    }

    /// A failed response.
    pub fn error(kind: ResponseErrorKind, message: impl Into<String>) -> Self {
        Self {
            error: Some(ResponseError::new(kind, message)),
            ..Self::default()
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::error(ResponseErrorKind::NotFound, message)
    }

    /// A successful revalidation without a body.
    pub fn not_modified() -> Self {
        Self { not_modified: true, ..Self::default() }
    }

    pub fn with_expires(mut self, expires: UtcDateTime) -> Self {
        self.expires = Some(expires);
        self
    }

    pub fn with_modified(mut self, modified: UtcDateTime) -> Self {
        self.modified = Some(modified);
        self
    }

    pub fn with_etag(mut self, etag: impl Into<String>) -> Self {
        self.etag = Some(etag.into());
        self
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_kind(&self) -> Option<ResponseErrorKind> {
        self.error.as_ref().map(|e| e.kind)
    }

    /// Borrow the payload, if any.
    pub fn bytes(&self) -> Option<&[u8]> {
        self.data.as_deref().map(Vec::as_slice)
    }

    /// Payload size in bytes (zero when there is no payload).
    pub fn size(&self) -> u64 {
        self.bytes().map_or(0, |d| d.len() as u64)
    }

    /// `true` when the response has an expiry and it lies after `now`.
    /// Responses without an expiry are never fresh: they must be revalidated.
    pub fn is_fresh(&self, now: UtcDateTime) -> bool {
        self.expires.is_some_and(|expires| expires > now)
    }
}
