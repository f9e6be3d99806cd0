//! FIFO request queue for the queued dispatch strategies
//!
//! Submitters push requests at the tail; the active dispatcher pulls from the
//! head. A partially served request can be put back at the head so it stays
//! first in line, which is how simple dispatch serves one segment per pass.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::request::Request;
use crate::status::BlockError;

/// Request queue shared between submitters and the dispatcher
#[derive(Debug, Default)]
pub struct RequestQueue {
    pending: Mutex<VecDeque<Request>>,
    /// Serializes draining so only one dispatcher runs at a time
    dispatch_lock: Mutex<()>,
    stopped: AtomicBool,
}

impl RequestQueue {
    /// Create an empty, running queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a request; a stopped queue hands it back
    pub fn push(&self, request: Request) -> Result<(), Request> {
        if self.is_stopped() {
            return Err(request);
        }
        self.pending.lock().push_back(request);
        Ok(())
    }

    /// Put a partially served request back at the head
    pub(crate) fn requeue_front(&self, request: Request) {
        self.pending.lock().push_front(request);
    }

    /// Fetch the next request
    pub fn fetch(&self) -> Option<Request> {
        self.pending.lock().pop_front()
    }

    /// Number of queued requests
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Whether no request is queued
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Run `drain` with exclusive dispatch rights
    ///
    /// Dispatch for one device is serialized here; concurrent callers wait.
    pub(crate) fn run_exclusive<R>(&self, drain: impl FnOnce(&Self) -> R) -> R {
        let _dispatching = self.dispatch_lock.lock();
        drain(self)
    }

    /// Stop accepting requests and fail everything still queued
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        let drained: Vec<Request> = self.pending.lock().drain(..).collect();
        for request in drained {
            request.fail(BlockError::NotReady);
        }
    }

    /// Check if the queue is stopped
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
