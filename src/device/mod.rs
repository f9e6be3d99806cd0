//! The memory-backed block device
//!
//! This module provides [`RamDisk`] and the byte-addressed storage traits it
//! implements.

mod ramdisk;
mod traits;

pub use ramdisk::RamDisk;
pub use traits::{StorageDevice, SyncStorageDevice};
