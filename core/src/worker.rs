//! Bounded worker pool that runs cloud fetches off the input path.
//!
//! A fixed number of threads drain a bounded `crossbeam-channel`. Each job
//! runs its fetcher, publishes the response into the shared request, and
//! then invokes the completion callback exactly once on the same thread.

use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::Context;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::{debug, error};

use crate::request_queue::{CloudRequest, Fetcher, QueueError};

thread_local! {
    static IN_WORKER: Cell<bool> = const { Cell::new(false) };
}

/// True on a pool worker thread, where blocking on the backlog could wait on
/// the calling thread itself.
pub(crate) fn on_worker_thread() -> bool {
    IN_WORKER.with(Cell::get)
}

pub(crate) type Callback = Box<dyn FnOnce(&CloudRequest) + Send + 'static>;

pub(crate) struct Job {
    pub(crate) request: Arc<CloudRequest>,
    pub(crate) fetcher: Arc<dyn Fetcher>,
    pub(crate) callback: Callback,
}

pub(crate) struct WorkerPool {
    sender: Mutex<Option<Sender<Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn `threads` workers sharing a backlog of `capacity` jobs.
    ///
    /// Both values are clamped to at least 1.
    pub(crate) fn new(threads: usize, capacity: usize) -> anyhow::Result<Self> {
        let (sender, receiver) = bounded::<Job>(capacity.max(1));
        let mut handles = Vec::with_capacity(threads.max(1));
        for i in 0..threads.max(1) {
            let rx = receiver.clone();
            let handle = thread::Builder::new()
                .name(format!("cloud-fetch-{}", i))
                .spawn(move || worker_loop(rx))
                .with_context(|| format!("spawn cloud fetch worker {}", i))?;
            handles.push(handle);
        }
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handles: Mutex::new(handles),
        })
    }

    fn sender(&self) -> Option<Sender<Job>> {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Hand a job to the pool, blocking while the backlog is full.
    ///
    /// On failure the job is given back so the caller can still settle it.
    pub(crate) fn submit(&self, job: Job) -> Result<(), (QueueError, Job)> {
        let Some(sender) = self.sender() else {
            return Err((QueueError::Closed, job));
        };
        sender.send(job).map_err(|e| (QueueError::Closed, e.into_inner()))
    }

    /// Hand a job to the pool without blocking.
    pub(crate) fn try_submit(&self, job: Job) -> Result<(), (QueueError, Job)> {
        let Some(sender) = self.sender() else {
            return Err((QueueError::Closed, job));
        };
        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(job) => (QueueError::Full, job),
            TrySendError::Disconnected(job) => (QueueError::Closed, job),
        })
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Close the backlog and wait for queued jobs to finish.
    ///
    /// Safe to call from inside a callback: the calling worker is not joined.
    pub(crate) fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let handles: Vec<_> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        let current = thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("cloud fetch worker exited with a panic");
            }
        }
    }
}

fn worker_loop(rx: Receiver<Job>) {
    IN_WORKER.with(|flag| flag.set(true));
    for job in rx.iter() {
        run_job(job);
    }
}

pub(crate) fn run_job(job: Job) {
    let Job {
        request,
        fetcher,
        callback,
    } = job;
    let id = request.id();

    if request.begin_fetch() {
        let started = Instant::now();
        let body = match panic::catch_unwind(AssertUnwindSafe(|| {
            fetcher.fetch(request.request_payload())
        })) {
            Ok(body) => body,
            Err(_) => {
                error!(id, "fetcher panicked, publishing empty response");
                String::new()
            }
        };
        debug!(
            id,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "cloud request responded"
        );
        request.publish(body);
    } else {
        debug!(id, "cloud request cancelled before fetch");
    }

    if panic::catch_unwind(AssertUnwindSafe(|| callback(&request))).is_err() {
        error!(id, "response callback panicked");
    }
    request.mark_delivered();
}
