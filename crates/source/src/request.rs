//! Request handles and single-shot delivery.
//!
//! Every request returns a [`FileRequest`]. The handle *is* the request's
//! lifetime: dropping it silences the callback (even if a response has
//! already been computed), aborts the task driving the request and drops
//! every child handle it owns. There is no separate `cancel()`.
//!
//! The other side of a handle is a [`Responder`] (or a [`ProgressSink`] for
//! download sessions) which only holds a weak reference to the callback.
//! Delivering through it after the handle is gone is a checked no-op.

use crate::offline::Milestone;
use cartage_resource::{Response, ResponseErrorKind};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::task::AbortHandle;

/// Receives the single [`Response`] of a request.
///
/// Invoked at most once, never after the owning [`FileRequest`] has been
/// dropped and never while an internal lock is held, so a callback may drop
/// other handles or issue new requests. Callbacks run on whatever task
/// produced the response and must not block.
pub type Callback = Box<dyn FnOnce(Response) + Send + 'static>;

/// Receives every [`Milestone`] of a download session.
pub type ProgressCallback = Box<dyn FnMut(Milestone) + Send + 'static>;

/// A callback parked until delivery or cancellation.
struct Slot<F> {
    callback: Mutex<Option<F>>,
    cancelled: AtomicBool,
}
impl<F> Slot<F> {
    fn new(callback: F) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
            cancelled: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<F>> {
        // The lock is only ever held to move the callback in or out.
        self.callback.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self) -> Option<F> {
        self.lock().take()
    }

    /// Put a multi-shot callback back after invoking it, unless the handle
    /// was dropped in the meantime.
    fn restore(&self, callback: F) {
        let mut slot = self.lock();
        if !self.cancelled.load(Ordering::SeqCst) {
            *slot = Some(callback);
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Type-erased cancellation, so one handle type serves both callback kinds.
trait Cancel: Send + Sync {
    fn cancel(&self);
}
impl<F: Send> Cancel for Slot<F> {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        // Dropped after the guard is released: dropping a callback may drop
        // other handles.
        let callback = self.take();
        drop(callback);
    }
}

/// Child handles owned by a composite request.
#[derive(Default)]
pub(crate) struct Children(Mutex<Vec<FileRequest>>);

/// Hand a child over to the composite behind `children`. If the composite has
/// already been dropped, the child is dropped (and thereby cancelled)
/// immediately.
pub(crate) fn attach(children: &Weak<Children>, child: FileRequest) {
    if let Some(children) = children.upgrade() {
        children.0.lock().unwrap_or_else(PoisonError::into_inner).push(child);
    }
}

/// Cancellable handle of an in-flight request or download session.
///
/// # Examples
///
/// ```
/// use cartage_resource::Response;
/// use cartage_source::FileRequest;
///
/// let (handle, responder) = FileRequest::channel(Box::new(|_: Response| unreachable!()));
/// drop(handle);
/// assert!(responder.is_cancelled());
/// // Silently ignored: the handle is gone.
/// responder.deliver(Response::not_found("nothing here"));
/// ```
#[must_use = "dropping a FileRequest cancels it"]
pub struct FileRequest {
    slot: Option<Arc<dyn Cancel>>,
    task: Option<AbortHandle>,
    children: Option<Arc<Children>>,
}

impl FileRequest {
    /// A handle owning `callback`, and the single-shot [`Responder`] that
    /// delivers to it.
    pub fn channel(callback: Callback) -> (Self, Responder) {
        let slot = Arc::new(Slot::new(callback));
        let responder = Responder { slot: Arc::downgrade(&slot) };
        (Self::with_slot(slot), responder)
    }

    /// A handle owning a session's `progress` callback, and the
    /// [`ProgressSink`] that reports to it.
    pub fn progress(progress: ProgressCallback) -> (Self, ProgressSink) {
        let slot = Arc::new(Slot::new(progress));
        let sink = ProgressSink { slot: Arc::downgrade(&slot) };
        (Self::with_slot(slot), sink)
    }

    fn with_slot(slot: Arc<dyn Cancel>) -> Self {
        Self { slot: Some(slot), task: None, children: None }
    }

    /// Abort `task` when this handle is dropped.
    pub fn with_task(mut self, task: AbortHandle) -> Self {
        self.task = Some(task);
        self
    }

    /// Take ownership of a child handle; it lives exactly as long as this one.
    pub fn adopt(&mut self, child: FileRequest) {
        attach(&self.children(), child);
    }

    /// Weak reference to this handle's children, for callbacks that create
    /// children later.
    pub(crate) fn children(&mut self) -> Weak<Children> {
        Arc::downgrade(self.children.get_or_insert_with(Default::default))
    }
}

impl Drop for FileRequest {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
        // Children are cancelled by their own drops.
        drop(self.children.take());
    }
}

impl Debug for FileRequest {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let children = self
            .children
            .as_ref()
            .map_or(0, |c| c.0.lock().unwrap_or_else(PoisonError::into_inner).len());
        f.debug_struct("FileRequest")
            .field("task", &self.task.is_some())
            .field("children", &children)
            .finish_non_exhaustive()
    }
}

/// Delivers the one response of a request to its [`Callback`].
///
/// Consumed by [`deliver`](Self::deliver). A responder dropped without
/// delivering (for example because the task driving it panicked) delivers an
/// [`Other`](ResponseErrorKind::Other) error instead, so a live handle always
/// hears back exactly once.
pub struct Responder {
    slot: Weak<Slot<Callback>>,
}

impl Responder {
    /// Deliver `response`. Returns `false` if the handle was already dropped.
    pub fn deliver(self, response: Response) -> bool {
        self.fire(response)
    }

    /// `true` once the handle has been dropped; the work behind it can stop.
    pub fn is_cancelled(&self) -> bool {
        self.slot.upgrade().is_none_or(|slot| slot.is_cancelled())
    }

    fn fire(&self, response: Response) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };
        let Some(callback) = slot.take() else {
            return false;
        };
        // Keep the slot alive (but unlocked) while the callback runs.
        callback(response);
        drop(slot);
        true
    }
}

impl Drop for Responder {
    fn drop(&mut self) {
        self.fire(Response::error(ResponseErrorKind::Other, "request abandoned before completion"));
    }
}

impl Debug for Responder {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Responder").field("cancelled", &self.is_cancelled()).finish()
    }
}

/// Reports milestones of a download session to its [`ProgressCallback`].
pub struct ProgressSink {
    slot: Weak<Slot<ProgressCallback>>,
}

impl ProgressSink {
    /// Report one milestone. Returns `false` once the handle has been
    /// dropped, after which the session should stop.
    pub fn report(&mut self, milestone: Milestone) -> bool {
        let Some(slot) = self.slot.upgrade() else {
            return false;
        };
        let Some(mut progress) = slot.take() else {
            return false;
        };
        progress(milestone);
        slot.restore(progress);
        !slot.is_cancelled()
    }

    pub fn is_cancelled(&self) -> bool {
        self.slot.upgrade().is_none_or(|slot| slot.is_cancelled())
    }
}
