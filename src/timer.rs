//! Timer service used by the lifecycle manager
//!
//! The idle-invalidation timer is scheduled through a [`TimerService`], so the
//! device never owns a thread of its own. Two implementations are provided:
//!
//! - [`ThreadTimer`]: a background thread with a deadline heap, fed over a
//!   channel
//! - [`ManualTimer`]: a virtual clock advanced explicitly, for deterministic
//!   tests
//!
//! Every scheduled callback is represented by a [`TimerHandle`] that can cancel
//! it, either without waiting ([`TimerHandle::cancel`]) or waiting for an
//! already-running callback to return ([`TimerHandle::cancel_sync`]).

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, RecvTimeoutError, Sender};
use parking_lot::{Condvar, Mutex};

/// Queue length above which cancelled entries are swept from the thread heap
const PURGE_THRESHOLD: usize = 64;

/// Callback run when a timer expires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// Schedules one-shot callbacks
pub trait TimerService: Send + Sync + 'static {
    /// Run `callback` once after `delay`, unless cancelled first
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryState {
    Pending,
    Running,
    Fired,
    Cancelled,
}

struct TimerEntry {
    state: Mutex<EntryState>,
    done: Condvar,
    callback: Mutex<Option<TimerCallback>>,
}

impl TimerEntry {
    fn new(callback: TimerCallback) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(EntryState::Pending),
            done: Condvar::new(),
            callback: Mutex::new(Some(callback)),
        })
    }

    fn is_pending(&self) -> bool {
        *self.state.lock() == EntryState::Pending
    }

    /// Run the callback if still pending; returns whether it ran
    fn fire(&self) -> bool {
        {
            let mut state = self.state.lock();
            if *state != EntryState::Pending {
                return false;
            }
            *state = EntryState::Running;
        }

        // Marks the entry fired even if the callback unwinds
        let _fired = FiredOnDrop(self);
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
        true
    }
}

struct FiredOnDrop<'a>(&'a TimerEntry);

impl Drop for FiredOnDrop<'_> {
    fn drop(&mut self) {
        *self.0.state.lock() = EntryState::Fired;
        self.0.done.notify_all();
    }
}

/// Handle to one scheduled callback
#[derive(Clone)]
pub struct TimerHandle {
    entry: Arc<TimerEntry>,
}

impl TimerHandle {
    fn new(entry: Arc<TimerEntry>) -> Self {
        Self { entry }
    }

    /// Prevent the callback from starting
    ///
    /// Returns `true` if the callback had not started yet. Does not wait for a
    /// callback that is already running.
    pub fn cancel(&self) -> bool {
        let mut state = self.entry.state.lock();
        if *state != EntryState::Pending {
            return false;
        }
        *state = EntryState::Cancelled;
        drop(state);
        self.entry.callback.lock().take();
        true
    }

    /// Cancel, and wait for a running callback to return
    ///
    /// After this returns the callback is guaranteed not to be running and
    /// never to run. Must not be called from inside the callback itself.
    pub fn cancel_sync(&self) -> bool {
        let mut state = self.entry.state.lock();
        loop {
            match *state {
                EntryState::Pending => {
                    *state = EntryState::Cancelled;
                    drop(state);
                    self.entry.callback.lock().take();
                    return true;
                }
                EntryState::Running => self.entry.done.wait(&mut state),
                EntryState::Fired | EntryState::Cancelled => return false,
            }
        }
    }

    /// Whether the callback is still waiting to run
    pub fn is_pending(&self) -> bool {
        self.entry.is_pending()
    }

    /// Whether the callback ran to completion
    pub fn has_fired(&self) -> bool {
        *self.entry.state.lock() == EntryState::Fired
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerHandle")
            .field("state", &*self.entry.state.lock())
            .finish()
    }
}

/// Heap entry ordered by deadline, then by scheduling order
struct Scheduled<T> {
    deadline: T,
    seq: u64,
    entry: Arc<TimerEntry>,
}

impl<T: Ord> PartialEq for Scheduled<T> {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == CmpOrdering::Equal
    }
}

impl<T: Ord> Eq for Scheduled<T> {}

impl<T: Ord> PartialOrd for Scheduled<T> {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for Scheduled<T> {
    // Reversed so `BinaryHeap` pops the earliest deadline first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .deadline
            .cmp(&self.deadline)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Timer service backed by one background thread
pub struct ThreadTimer {
    tx: Option<Sender<Scheduled<Instant>>>,
    handle: Option<JoinHandle<()>>,
    seq: Mutex<u64>,
}

impl ThreadTimer {
    /// Start the timer thread
    pub fn new() -> Self {
        let (tx, rx) = unbounded::<Scheduled<Instant>>();

        let handle = thread::spawn(move || {
            let mut heap: BinaryHeap<Scheduled<Instant>> = BinaryHeap::new();
            loop {
                let received = match heap.peek() {
                    Some(next) => {
                        let wait = next.deadline.saturating_duration_since(Instant::now());
                        rx.recv_timeout(wait)
                    }
                    None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
                };

                match received {
                    Ok(scheduled) => {
                        // Cancelled entries stay queued until their deadline
                        // unless swept here
                        if heap.len() >= PURGE_THRESHOLD {
                            heap.retain(|s| s.entry.is_pending());
                        }
                        heap.push(scheduled);
                    }
                    Err(RecvTimeoutError::Timeout) => {}
                    // Pending timers are discarded on shutdown
                    Err(RecvTimeoutError::Disconnected) => break,
                }

                let now = Instant::now();
                while heap.peek().is_some_and(|next| next.deadline <= now) {
                    if let Some(due) = heap.pop() {
                        let fired =
                            panic::catch_unwind(AssertUnwindSafe(|| due.entry.fire()));
                        if fired.is_err() {
                            tracing::error!("timer callback panicked");
                        }
                    }
                }
            }
        });

        Self {
            tx: Some(tx),
            handle: Some(handle),
            seq: Mutex::new(0),
        }
    }
}

impl Default for ThreadTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for ThreadTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let entry = TimerEntry::new(callback);
        let handle = TimerHandle::new(Arc::clone(&entry));

        let seq = {
            let mut seq = self.seq.lock();
            *seq += 1;
            *seq
        };
        // A deadline past the clock's range never arrives
        let Some(deadline) = Instant::now().checked_add(delay) else {
            return handle;
        };
        let scheduled = Scheduled {
            deadline,
            seq,
            entry,
        };

        let sent = self
            .tx
            .as_ref()
            .is_some_and(|tx| tx.send(scheduled).is_ok());
        if !sent {
            handle.cancel();
        }
        handle
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

struct ManualInner {
    now: Duration,
    seq: u64,
    heap: BinaryHeap<Scheduled<Duration>>,
}

/// Timer service driven by an explicit virtual clock
///
/// Callbacks run on the thread calling [`ManualTimer::advance`].
pub struct ManualTimer {
    inner: Mutex<ManualInner>,
}

impl ManualTimer {
    /// Create a timer whose clock reads zero
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ManualInner {
                now: Duration::ZERO,
                seq: 0,
                heap: BinaryHeap::new(),
            }),
        }
    }

    /// Current virtual time
    pub fn now(&self) -> Duration {
        self.inner.lock().now
    }

    /// Number of callbacks still waiting to run
    pub fn pending(&self) -> usize {
        self.inner
            .lock()
            .heap
            .iter()
            .filter(|s| s.entry.is_pending())
            .count()
    }

    /// Move the clock forward, running every callback that falls due
    ///
    /// Returns the number of callbacks that ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.inner.lock().now.saturating_add(by);
        let mut fired = 0;

        loop {
            let due = {
                let mut inner = self.inner.lock();
                if inner.heap.peek().is_some_and(|next| next.deadline <= target) {
                    let due = inner.heap.pop();
                    if let Some(due) = due.as_ref() {
                        inner.now = inner.now.max(due.deadline);
                    }
                    due
                } else {
                    inner.now = target;
                    None
                }
            };

            match due {
                Some(due) => {
                    if due.entry.fire() {
                        fired += 1;
                    }
                }
                None => break fired,
            }
        }
    }
}

impl Default for ManualTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerService for ManualTimer {
    fn schedule(&self, delay: Duration, callback: TimerCallback) -> TimerHandle {
        let entry = TimerEntry::new(callback);
        let handle = TimerHandle::new(Arc::clone(&entry));

        let mut inner = self.inner.lock();
        let Some(deadline) = inner.now.checked_add(delay) else {
            return handle;
        };
        inner.seq += 1;
        let scheduled = Scheduled {
            deadline,
            seq: inner.seq,
            entry,
        };
        inner.heap.push(scheduled);
        handle
    }
}
