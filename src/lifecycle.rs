//! Open/close reference counting and simulated media changes
//!
//! The lifecycle manager tracks openers of a device. When the last opener goes
//! away an idle timer is armed; if it expires before anyone opens the device
//! again, the media is flagged as changed. The next first open (or an explicit
//! [`Lifecycle::revalidate`]) observes the flag and wipes the backing store.
//!
//! # Locking
//!
//! The guard protects `open_count`, `media_changed` and the armed timer. It is
//! never held while waiting on the timer: open disarms with a non-blocking
//! cancel and bumps the arming generation, so a callback that already started
//! finds a stale generation and does nothing.
//!
//! The wipe itself runs after the guard is released. The store write lock is
//! taken while the guard is still held, so the bookkeeping and the wipe appear
//! as one step to transfers: a transfer issued after `open` returns waits for
//! the wipe. Other openers are not blocked by the wipe. Lock order is
//! guard, then store.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::stats::DeviceStats;
use crate::status::BlockError;
use crate::store::BackingStore;
use crate::timer::{TimerHandle, TimerService};

#[derive(Debug)]
struct Armed {
    generation: u64,
    handle: TimerHandle,
}

#[derive(Debug, Default)]
struct LifecycleState {
    open_count: u32,
    media_changed: bool,
    armed: Option<Armed>,
    generation: u64,
    shut_down: bool,
}

/// Lifecycle manager for one device
pub struct Lifecycle {
    name: String,
    guard: Mutex<LifecycleState>,
    idle_delay: Duration,
    timer: Arc<dyn TimerService>,
    store: Arc<BackingStore>,
    stats: Arc<DeviceStats>,
}

impl Lifecycle {
    /// Create a lifecycle manager with no openers and no media change pending
    pub fn new(
        name: impl Into<String>,
        idle_delay: Duration,
        timer: Arc<dyn TimerService>,
        store: Arc<BackingStore>,
        stats: Arc<DeviceStats>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            guard: Mutex::new(LifecycleState::default()),
            idle_delay,
            timer,
            store,
            stats,
        })
    }

    /// Register an opener
    ///
    /// Cancels a pending idle timer. The first opener revalidates the media
    /// before the open completes.
    pub fn open(&self) -> Result<(), BlockError> {
        let mut state = self.guard.lock();
        if state.shut_down {
            return Err(BlockError::NotReady);
        }

        self.disarm(&mut state);

        let first = state.open_count == 0;
        state.open_count = state
            .open_count
            .checked_add(1)
            .ok_or(BlockError::InvalidArgument("too many openers"))?;

        if first {
            self.revalidate_locked(state);
        }
        Ok(())
    }

    /// Drop an opener; the last one arms the idle timer
    pub fn close(self: &Arc<Self>) -> Result<(), BlockError> {
        let mut state = self.guard.lock();
        if state.open_count == 0 {
            if tracing::enabled!(tracing::Level::WARN) {
                tracing::warn!(device = %self.name, "close without matching open");
            }
            return Err(BlockError::InvalidArgument("close without matching open"));
        }

        state.open_count -= 1;
        if state.open_count == 0 && !state.shut_down {
            self.arm(&mut state);
        }
        Ok(())
    }

    /// Wipe the store if a media change is pending; returns whether it did
    pub fn revalidate(&self) -> bool {
        let state = self.guard.lock();
        self.revalidate_locked(state)
    }

    /// Media-change probe
    pub fn media_changed(&self) -> bool {
        self.guard.lock().media_changed
    }

    /// Current number of openers
    pub fn open_count(&self) -> u32 {
        self.guard.lock().open_count
    }

    /// Whether the idle timer is armed
    pub fn is_armed(&self) -> bool {
        self.guard
            .lock()
            .armed
            .as_ref()
            .is_some_and(|armed| armed.handle.is_pending())
    }

    /// Idle delay before a media change is simulated
    pub fn idle_delay(&self) -> Duration {
        self.idle_delay
    }

    /// Stop arming timers and synchronously cancel the pending one
    ///
    /// On return no idle callback is running and none will run. Idempotent.
    pub fn shutdown(&self) {
        let armed = {
            let mut state = self.guard.lock();
            state.shut_down = true;
            state.generation = state.generation.wrapping_add(1);
            state.armed.take()
        };

        if let Some(armed) = armed {
            armed.handle.cancel_sync();
        }
    }

    fn arm(self: &Arc<Self>, state: &mut LifecycleState) {
        state.generation = state.generation.wrapping_add(1);
        let generation = state.generation;
        let weak: Weak<Self> = Arc::downgrade(self);

        let handle = self.timer.schedule(
            self.idle_delay,
            Box::new(move || {
                if let Some(lifecycle) = weak.upgrade() {
                    lifecycle.on_idle_timeout(generation);
                }
            }),
        );
        state.armed = Some(Armed { generation, handle });

        if tracing::enabled!(tracing::Level::DEBUG) {
            tracing::debug!(
                device = %self.name,
                generation,
                delay_ms = self.idle_delay.as_millis() as u64,
                "idle timer armed"
            );
        }
    }

    fn disarm(&self, state: &mut LifecycleState) {
        state.generation = state.generation.wrapping_add(1);
        if let Some(armed) = state.armed.take() {
            armed.handle.cancel();
            if tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(device = %self.name, generation = armed.generation, "idle timer cancelled");
            }
        }
    }

    /// Idle-timer expiry; runs on the timer service's thread
    fn on_idle_timeout(&self, generation: u64) {
        let mut state = self.guard.lock();

        let current = state
            .armed
            .as_ref()
            .is_some_and(|armed| armed.generation == generation);
        if !current {
            if tracing::enabled!(tracing::Level::DEBUG) {
                tracing::debug!(device = %self.name, generation, "stale idle timer ignored");
            }
            return;
        }
        state.armed = None;

        if state.open_count != 0 || !self.store.is_present() {
            self.stats.record_consistency_violation();
            let violation = BlockError::ConsistencyViolation(if state.open_count != 0 {
                "idle timer fired while device is open"
            } else {
                "idle timer fired without backing store"
            });
            tracing::error!(
                device = %self.name,
                open_count = state.open_count,
                error = %violation,
                "idle timer consistency check failed"
            );
            return;
        }

        if !state.media_changed {
            state.media_changed = true;
            self.stats.record_media_change();
            if tracing::enabled!(tracing::Level::INFO) {
                tracing::info!(device = %self.name, "simulating media change");
            }
        }
    }

    fn revalidate_locked(&self, mut state: parking_lot::MutexGuard<'_, LifecycleState>) -> bool {
        if !state.media_changed {
            return false;
        }
        state.media_changed = false;

        let mut data = self.store.write();
        drop(state);

        if let Some(data) = data.as_mut() {
            data.fill(0);
        }
        drop(data);

        self.stats.record_revalidation();
        if tracing::enabled!(tracing::Level::INFO) {
            tracing::info!(device = %self.name, bytes = self.store.capacity(), "media revalidated, store wiped");
        }
        true
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lifecycle")
            .field("name", &self.name)
            .field("state", &*self.guard.lock())
            .field("idle_delay", &self.idle_delay)
            .finish()
    }
}
