//! Memory-backed disk
//!
//! [`RamDisk`] ties the backing store, the request queue, the configured
//! dispatcher, the lifecycle manager and the geometry responder together
//! behind the host-facing operations: `open`, `close`, `submit`, `control`
//! and the media-change probe.
//!
//! # Synchronization
//!
//! The lifecycle guard covers only open/close bookkeeping. Store access is
//! covered separately by the store's read-write lock, so concurrent dispatch,
//! byte-level access and revalidation never observe a half-copied sector
//! range.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::channel::bounded;

use crate::config::RamDiskConfig;
use crate::device::SyncStorageDevice;
use crate::dispatch::{self, direct, DispatchStrategy, Target};
use crate::geometry::{self, ControlQuery, ControlResponse, Geometry};
use crate::lifecycle::Lifecycle;
use crate::queue::RequestQueue;
use crate::request::{Bio, Request, Segment};
use crate::stats::DeviceStats;
use crate::status::BlockError;
use crate::store::BackingStore;
use crate::timer::TimerService;
use crate::transfer::KERNEL_SECTOR_SIZE;

/// Memory-backed block device
pub struct RamDisk {
    config: RamDiskConfig,
    capacity: usize,
    store: Arc<BackingStore>,
    stats: Arc<DeviceStats>,
    queue: RequestQueue,
    lifecycle: Arc<Lifecycle>,
    shut_down: AtomicBool,
}

impl RamDisk {
    /// Build a device from `config`, scheduling idle timers on `timer`
    ///
    /// Fails with [`BlockError::InvalidArgument`] for invalid configuration and
    /// [`BlockError::AllocationFailure`] when the backing store cannot be
    /// obtained.
    pub fn new(config: RamDiskConfig, timer: Arc<dyn TimerService>) -> Result<Self, BlockError> {
        let capacity = config.validate()?;
        let store = Arc::new(BackingStore::allocate(capacity)?);
        let stats = Arc::new(DeviceStats::new());
        let lifecycle = Lifecycle::new(
            config.name.clone(),
            config.idle_delay,
            timer,
            Arc::clone(&store),
            Arc::clone(&stats),
        );

        if tracing::enabled!(tracing::Level::INFO) {
            tracing::info!(
                device = %config.name,
                sectors = config.sector_count,
                sector_size = config.sector_size,
                dispatch = %config.dispatch,
                "ramdisk created"
            );
        }

        Ok(Self {
            config,
            capacity,
            store,
            stats,
            queue: RequestQueue::new(),
            lifecycle,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Device configuration
    pub fn config(&self) -> &RamDiskConfig {
        &self.config
    }

    /// Capacity in bytes
    pub fn capacity_bytes(&self) -> u64 {
        self.capacity as u64
    }

    /// Sector size in bytes
    pub fn sector_size(&self) -> usize {
        self.config.sector_size
    }

    /// Capacity in device sectors
    pub fn sector_count(&self) -> u64 {
        self.config.sector_count
    }

    /// Capacity in 512-byte host sectors
    pub fn capacity_kernel_sectors(&self) -> u64 {
        self.capacity_bytes() / KERNEL_SECTOR_SIZE as u64
    }

    /// Configured dispatch strategy
    pub fn dispatch(&self) -> DispatchStrategy {
        self.config.dispatch
    }

    /// Device statistics
    pub fn stats(&self) -> &DeviceStats {
        &self.stats
    }

    /// Current number of openers
    pub fn open_count(&self) -> u32 {
        self.lifecycle.open_count()
    }

    /// Whether the idle timer is armed
    pub fn is_idle_timer_armed(&self) -> bool {
        self.lifecycle.is_armed()
    }

    /// Register an opener; see [`Lifecycle::open`]
    pub fn open(&self) -> Result<(), BlockError> {
        self.lifecycle.open()
    }

    /// Drop an opener; see [`Lifecycle::close`]
    pub fn close(&self) -> Result<(), BlockError> {
        self.lifecycle.close()
    }

    /// Media-change probe
    pub fn media_changed(&self) -> bool {
        self.lifecycle.media_changed()
    }

    /// Wipe the store if a media change is pending
    pub fn revalidate(&self) -> bool {
        self.lifecycle.revalidate()
    }

    fn target(&self) -> Target<'_> {
        Target {
            name: &self.config.name,
            store: &self.store,
            sector_size: self.config.sector_size,
            stats: &self.stats,
        }
    }

    /// Submit a request; completions are delivered through its callback
    ///
    /// Queued strategies drain the queue on the submitting thread before
    /// returning; direct dispatch never enqueues. Per-request failures are
    /// reported only through that request's completions. Completion callbacks
    /// must not submit to the same device.
    pub fn submit(&self, request: Request) {
        if self.is_shut_down() {
            request.fail(BlockError::NotReady);
            return;
        }

        match self.config.dispatch {
            DispatchStrategy::Direct => direct::submit(self.target(), request),
            strategy => {
                if let Err(request) = self.queue.push(request) {
                    request.fail(BlockError::NotReady);
                    return;
                }
                dispatch::drain(strategy, &self.queue, self.target());
            }
        }
    }

    /// Transfer a single bio synchronously, returning the sectors moved
    ///
    /// With direct dispatch the bio is handled in place. Queued strategies
    /// wrap it in a one-segment request and wait for its completion.
    pub fn submit_bio(&self, bio: &mut Bio) -> Result<u64, BlockError> {
        if self.is_shut_down() {
            return Err(BlockError::NotReady);
        }
        if self.config.dispatch == DispatchStrategy::Direct {
            return direct::make_request(self.target(), bio);
        }

        let (tx, rx) = bounded(1);
        let segment = Segment {
            buf: std::mem::take(&mut bio.buf),
            direction: bio.direction,
        };
        self.submit(
            Request::filesystem(0, bio.sector)
                .with_segment(segment)
                .with_channel(tx),
        );

        let mut completion = rx.recv().map_err(|_| BlockError::NotReady)?;
        if let Some(segment) = completion.segments.pop() {
            bio.buf = segment.buf;
        }
        completion.result.map(|()| completion.sectors)
    }

    /// Answer an out-of-band control query
    pub fn control(&self, query: ControlQuery) -> Result<ControlResponse, BlockError> {
        geometry::respond(query, self.capacity_bytes(), self.config.sector_size as u64)
    }

    /// Answer a control query given as a raw code
    pub fn control_code(&self, code: u32) -> Result<ControlResponse, BlockError> {
        self.control(ControlQuery::from_code(code))
    }

    /// Synthetic geometry
    pub fn geometry(&self) -> Geometry {
        Geometry::for_capacity(self.capacity_bytes(), self.config.sector_size as u64)
    }

    /// Whether the device has been shut down
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Tear the device down
    ///
    /// Stops the queue, synchronously cancels the idle timer and releases the
    /// backing store. Idempotent; also run on drop.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        self.queue.stop();
        self.lifecycle.shutdown();
        self.store.release();

        if tracing::enabled!(tracing::Level::INFO) {
            tracing::info!(device = %self.config.name, "ramdisk shut down");
        }
    }

    fn check_aligned(&self, offset: u64, len: usize) -> io::Result<u64> {
        let sector_size = self.config.sector_size;
        if offset % sector_size as u64 != 0 || len % sector_size != 0 {
            return Err(BlockError::InvalidArgument("unaligned byte access").into());
        }
        Ok(offset / sector_size as u64)
    }
}

impl Drop for RamDisk {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for RamDisk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RamDisk")
            .field("config", &self.config)
            .field("lifecycle", &self.lifecycle)
            .field("store", &self.store)
            .finish()
    }
}

impl SyncStorageDevice for RamDisk {
    fn read_sync(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let sector = self.check_aligned(offset, buf.len())?;
        let mut bio = Bio::read(sector, buf.len());
        self.submit_bio(&mut bio)?;
        buf.copy_from_slice(&bio.buf);
        Ok(buf.len())
    }

    fn write_sync(&self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let sector = self.check_aligned(offset, buf.len())?;
        let mut bio = Bio::write(sector, buf);
        self.submit_bio(&mut bio)?;
        Ok(buf.len())
    }

    fn flush_sync(&self) -> io::Result<()> {
        // Volatile device, nothing to flush
        Ok(())
    }

    fn size_sync(&self) -> io::Result<u64> {
        Ok(self.capacity_bytes())
    }

    fn sector_size(&self) -> usize {
        self.config.sector_size
    }
}
