//! cryptrd - a memory-backed block device emulator
//!
//! The device keeps its whole capacity in memory and serves block I/O through
//! a submission/completion interface:
//!
//! - **Transfer engine**: bounds-checked sector copies to and from the store
//! - **Dispatchers**: simple (one segment per pass), clustered (whole request
//!   per pass) and direct (no queue) request processing
//! - **Lifecycle**: open/close reference counting, an idle timer that
//!   simulates a media change, and revalidation that wipes the store
//! - **Geometry**: synthetic cylinder/head/sector answers to control queries
//!
//! Nothing is encrypted or persisted; the device is volatile.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use cryptrd::{Bio, RamDisk, RamDiskConfig, ThreadTimer};
//!
//! let timer = Arc::new(ThreadTimer::new());
//! let disk = RamDisk::new(RamDiskConfig::default(), timer)?;
//!
//! disk.open()?;
//! let mut write = Bio::write(0, vec![0xAB; 512]);
//! disk.submit_bio(&mut write)?;
//! disk.close()?;
//! # Ok::<(), cryptrd::BlockError>(())
//! ```

#![warn(missing_docs)]

pub mod config;
pub mod device;
pub mod dispatch;
pub mod geometry;
pub mod lifecycle;
pub mod queue;
pub mod request;
pub mod stats;
pub mod status;
pub mod store;
pub mod timer;
pub mod transfer;

// Re-exports for convenience
pub use config::{ConfigError, CryptrdConfig, RamDiskConfig};
pub use device::{RamDisk, StorageDevice, SyncStorageDevice};
pub use dispatch::DispatchStrategy;
pub use geometry::{ControlQuery, ControlResponse, Geometry};
pub use request::{Bio, Completion, Request, RequestId, RequestKind, Segment};
pub use stats::{DeviceStats, StatsSnapshot};
pub use status::{BlockError, Status};
pub use timer::{ManualTimer, ThreadTimer, TimerHandle, TimerService};
pub use transfer::{Direction, KERNEL_SECTOR_SIZE};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::config::RamDiskConfig;
    pub use crate::device::RamDisk;
    pub use crate::dispatch::DispatchStrategy;
    pub use crate::request::{Bio, Completion, Request, Segment};
    pub use crate::status::{BlockError, Status};
    pub use crate::timer::{ManualTimer, ThreadTimer, TimerService};
    pub use crate::transfer::Direction;
}
