//! Queue of outstanding cloud correction requests.
//!
//! Requests are appended in submission order and executed concurrently by a
//! bounded [`WorkerPool`](crate::worker). The queue itself only tracks
//! membership: structural changes (enqueue, pop front/back) take the
//! exclusive side of an `RwLock`, enumeration takes the shared side through
//! [`RequestQueue::read_lock`]. Each request is reference counted, so a
//! worker still fetching for a request that has been popped keeps it alive
//! until the callback has run.
//!
//! Response publication is independent of the queue lock: the payload lives
//! in a `OnceLock`, so `responded()` can only become true once the full
//! payload is visible.
//!
//! Delivery order follows fetch completion, not submission.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::worker::{Job, WorkerPool};
use crate::Config;

/// Process-unique, strictly increasing identifier of a request.
pub type RequestId = u64;

/// Source of cloud responses.
///
/// Implementations may block for as long as they like; there is no timeout
/// here. They must tolerate concurrent calls from several worker threads.
pub trait Fetcher: Send + Sync {
    fn fetch(&self, payload: &str) -> String;
}

impl<F> Fetcher for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn fetch(&self, payload: &str) -> String {
        self(payload)
    }
}

/// Lifecycle of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Enqueued, not yet picked up by a worker.
    Created,
    /// A worker is running the fetcher.
    Fetching,
    /// Response stored, callback not yet finished.
    Responded,
    /// Callback has run.
    Delivered,
    /// Cancelled before the fetch started. The callback still runs once.
    Cancelled,
    /// Removed from the queue.
    Retired,
}

const CREATED: u8 = 0;
const FETCHING: u8 = 1;
const RESPONDED: u8 = 2;
const DELIVERED: u8 = 3;
const CANCELLED: u8 = 4;

/// One cloud lookup.
#[derive(Debug)]
pub struct CloudRequest {
    id: RequestId,
    request: String,
    response: OnceLock<String>,
    state: AtomicU8,
    retired: AtomicBool,
}

impl CloudRequest {
    fn new(id: RequestId, request: String) -> Self {
        Self {
            id,
            request,
            response: OnceLock::new(),
            state: AtomicU8::new(CREATED),
            retired: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn request_payload(&self) -> &str {
        &self.request
    }

    /// The response, once the fetch has completed.
    pub fn response_payload(&self) -> Option<&str> {
        self.response.get().map(String::as_str)
    }

    pub fn responded(&self) -> bool {
        self.response.get().is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.load(Ordering::Acquire) == CANCELLED
    }

    pub fn state(&self) -> RequestState {
        if self.retired.load(Ordering::Acquire) {
            return RequestState::Retired;
        }
        match self.state.load(Ordering::Acquire) {
            CREATED => RequestState::Created,
            FETCHING => RequestState::Fetching,
            RESPONDED => RequestState::Responded,
            DELIVERED => RequestState::Delivered,
            _ => RequestState::Cancelled,
        }
    }

    /// Cancel the request if no worker has started on it yet.
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(CREATED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Claim the request for fetching. False if it was cancelled.
    pub(crate) fn begin_fetch(&self) -> bool {
        self.state
            .compare_exchange(CREATED, FETCHING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn publish(&self, body: String) {
        if self.response.set(body).is_err() {
            debug!(id = self.id, "response already published, ignoring");
            return;
        }
        self.state.store(RESPONDED, Ordering::Release);
    }

    pub(crate) fn mark_delivered(&self) {
        let _ = self.state.compare_exchange(
            RESPONDED,
            DELIVERED,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    fn retire(&self) {
        self.retired.store(true, Ordering::Release);
    }
}

/// Why a request could not be submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// The worker backlog is saturated (only from `try_enqueue`).
    Full,
    /// The queue has been shut down.
    Closed,
}

impl fmt::Display for QueueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueueError::Full => f.write_str("request backlog is full"),
            QueueError::Closed => f.write_str("request queue is shut down"),
        }
    }
}

impl std::error::Error for QueueError {}

#[derive(Debug, Default)]
struct Requests {
    items: VecDeque<Arc<CloudRequest>>,
    next_id: RequestId,
}

/// Ordered, concurrently accessible set of cloud requests.
pub struct RequestQueue {
    requests: RwLock<Requests>,
    pool: WorkerPool,
}

impl RequestQueue {
    /// Create a queue and start its workers.
    ///
    /// Fails only if the worker threads cannot be spawned.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = WorkerPool::new(config.worker_threads, config.max_pending_requests)?;
        debug!(
            workers = config.worker_threads,
            backlog = config.max_pending_requests,
            "request queue started"
        );
        Ok(Self {
            requests: RwLock::new(Requests::default()),
            pool,
        })
    }

    pub fn with_defaults() -> anyhow::Result<Self> {
        Self::new(&Config::default())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Requests> {
        self.requests.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Submit a request.
    ///
    /// The request is appended to the back of the queue and handed to a
    /// worker, which calls `fetcher` with `payload` and then `callback`
    /// exactly once. Returns as soon as the job is accepted; blocks only
    /// while the worker backlog is saturated.
    ///
    /// On a queue that is already shut down nothing is appended and
    /// `QueueError::Closed` is returned. If shutdown happens while this call
    /// waits for backlog space, the request is settled as cancelled (its
    /// callback runs on the calling thread) and removed from the queue
    /// before the error is returned.
    ///
    /// Called from a worker thread (typically inside a callback), this never
    /// blocks: it behaves like [`try_enqueue`](Self::try_enqueue), since the
    /// caller may be the only worker able to drain the backlog.
    pub fn enqueue<C>(
        &self,
        payload: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        callback: C,
    ) -> Result<RequestId, QueueError>
    where
        C: FnOnce(&CloudRequest) + Send + 'static,
    {
        if self.pool.is_closed() {
            return Err(QueueError::Closed);
        }
        if crate::worker::on_worker_thread() {
            return self.try_enqueue(payload, fetcher, callback);
        }
        let request = {
            let mut requests = self.write();
            let request = Arc::new(CloudRequest::new(requests.next_id, payload.into()));
            requests.next_id += 1;
            requests.items.push_back(Arc::clone(&request));
            request
        };
        let id = request.id();
        debug!(id, "cloud request enqueued");

        let job = Job {
            request,
            fetcher,
            callback: Box::new(callback),
        };
        match self.pool.submit(job) {
            Ok(()) => Ok(id),
            Err((err, job)) => {
                self.settle_rejected(job);
                Err(err)
            }
        }
    }

    /// Deliver a job the pool refused as cancelled and drop it from the queue.
    fn settle_rejected(&self, job: Job) {
        let request = Arc::clone(&job.request);
        request.cancel();
        crate::worker::run_job(job);
        self.write().items.retain(|r| r.id() != request.id());
        request.retire();
        debug!(id = request.id(), "cloud request rejected by closed pool");
    }

    /// Submit a request without ever blocking.
    ///
    /// Returns `QueueError::Full` when the backlog is saturated; nothing is
    /// appended and the callback is dropped without running in that case.
    pub fn try_enqueue<C>(
        &self,
        payload: impl Into<String>,
        fetcher: Arc<dyn Fetcher>,
        callback: C,
    ) -> Result<RequestId, QueueError>
    where
        C: FnOnce(&CloudRequest) + Send + 'static,
    {
        let mut requests = self.write();
        let request = Arc::new(CloudRequest::new(requests.next_id, payload.into()));
        let id = request.id();
        requests.items.push_back(Arc::clone(&request));

        let job = Job {
            request,
            fetcher,
            callback: Box::new(callback),
        };
        match self.pool.try_submit(job) {
            Ok(()) => {
                requests.next_id += 1;
                debug!(id, "cloud request enqueued");
                Ok(id)
            }
            Err((err, _job)) => {
                requests.items.pop_back();
                debug!(id, error = %err, "cloud request rejected");
                Err(err)
            }
        }
    }

    /// Take the shared lock for enumeration. Dropping the guard releases it.
    pub fn read_lock(&self) -> RequestsReadGuard<'_> {
        RequestsReadGuard {
            guard: self.requests.read().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Number of queued requests (takes and releases the shared lock).
    pub fn request_count(&self) -> usize {
        self.read_lock().len()
    }

    /// Pop the oldest request. `None` on an empty queue.
    pub fn remove_first_request(&self) -> Option<Arc<CloudRequest>> {
        let removed = self.write().items.pop_front();
        if let Some(request) = &removed {
            request.retire();
            debug!(id = request.id(), "cloud request retired from front");
        }
        removed
    }

    /// Pop the newest request. `None` on an empty queue.
    pub fn remove_last_request(&self) -> Option<Arc<CloudRequest>> {
        let removed = self.write().items.pop_back();
        if let Some(request) = &removed {
            request.retire();
            debug!(id = request.id(), "cloud request retired from back");
        }
        removed
    }

    /// Cancel a queued request that has not started fetching.
    pub fn cancel(&self, id: RequestId) -> bool {
        let guard = self.read_lock();
        let cancelled = guard
            .iter()
            .find(|r| r.id() == id)
            .map(|r| r.cancel())
            .unwrap_or(false);
        cancelled
    }

    /// Stop accepting requests and wait for workers to drain the backlog.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl Drop for RequestQueue {
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}

impl fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestQueue")
            .field("requests", &self.request_count())
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}

/// Shared view of the queue. Indices are only meaningful while it is held.
pub struct RequestsReadGuard<'a> {
    guard: RwLockReadGuard<'a, Requests>,
}

impl RequestsReadGuard<'_> {
    pub fn len(&self) -> usize {
        self.guard.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Arc<CloudRequest>> {
        self.guard.items.get(index)
    }

    pub fn first(&self) -> Option<&Arc<CloudRequest>> {
        self.guard.items.front()
    }

    pub fn last(&self) -> Option<&Arc<CloudRequest>> {
        self.guard.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CloudRequest>> {
        self.guard.items.iter()
    }
}
