//! Backing store for the memory-backed disk
//!
//! A fixed-size byte buffer standing in for physical media. The buffer is
//! guarded by a read-write lock so transfers and the revalidation wipe never
//! interleave within a single sector range.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::status::BlockError;

/// Fixed-capacity, zero-initialized byte buffer
pub struct BackingStore {
    /// `None` once the store has been released at shutdown
    data: RwLock<Option<Box<[u8]>>>,
    capacity: usize,
}

impl BackingStore {
    /// Allocate a zeroed store of `capacity` bytes
    ///
    /// Allocation is fallible: an unobtainable buffer is reported as
    /// [`BlockError::AllocationFailure`] instead of aborting the process.
    pub fn allocate(capacity: usize) -> Result<Self, BlockError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|_| BlockError::AllocationFailure { bytes: capacity })?;
        buf.resize(capacity, 0u8);

        Ok(Self {
            data: RwLock::new(Some(buf.into_boxed_slice())),
            capacity,
        })
    }

    /// Capacity in bytes
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether the buffer is still present
    pub fn is_present(&self) -> bool {
        self.data.read().is_some()
    }

    /// Shared access for reads
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Option<Box<[u8]>>> {
        self.data.read()
    }

    /// Exclusive access for writes and wipes
    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Option<Box<[u8]>>> {
        self.data.write()
    }

    /// Zero the entire store
    pub fn wipe(&self) {
        if let Some(data) = self.data.write().as_mut() {
            data.fill(0);
        }
    }

    /// Release the buffer; later transfers fail with [`BlockError::NotReady`]
    pub fn release(&self) {
        self.data.write().take();
    }
}

impl std::fmt::Debug for BackingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackingStore")
            .field("capacity", &self.capacity)
            .field("present", &self.is_present())
            .finish()
    }
}
