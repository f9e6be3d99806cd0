//! Byte-addressed storage traits
//!
//! These traits expose a block device as a plain byte-addressed store, so a
//! [`RamDisk`](crate::RamDisk) can stand in wherever a storage device is
//! expected. Offsets and lengths must be sector-aligned.

use std::future::Future;
use std::io;
use std::pin::Pin;

/// Async storage device trait
pub trait StorageDevice: Send + Sync + 'static {
    /// Read data from the device
    ///
    /// Reads `buf.len()` bytes from `offset` into `buf`.
    fn read(
        &self,
        offset: u64,
        buf: &mut [u8],
    ) -> Pin<Box<dyn Future<Output = io::Result<usize>> + Send + '_>>;

    /// Write data to the device
    ///
    /// Writes `buf` to `offset`.
    fn write(
        &self,
        offset: u64,
        buf: &[u8],
    ) -> Pin<Box<dyn Future<Output = io::Result<usize>> + Send + '_>>;

    /// Flush any buffered writes
    fn flush(&self) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>>;

    /// Get the size of the device in bytes
    fn size(&self) -> io::Result<u64>;

    /// Get the sector size
    fn sector_size(&self) -> usize {
        512
    }
}

/// Synchronous storage device trait
pub trait SyncStorageDevice: Send + Sync + 'static {
    /// Read data synchronously
    fn read_sync(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Write data synchronously
    fn write_sync(&self, offset: u64, buf: &[u8]) -> io::Result<usize>;

    /// Flush synchronously
    fn flush_sync(&self) -> io::Result<()>;

    /// Get the size in bytes
    fn size_sync(&self) -> io::Result<u64>;

    /// Get sector size
    fn sector_size(&self) -> usize {
        512
    }
}

/// Implement async trait for sync devices
impl<T: SyncStorageDevice> StorageDevice for T {
    fn read(
        &self,
        offset: u64,
        buf: &mut [u8],
    ) -> Pin<Box<dyn Future<Output = io::Result<usize>> + Send + '_>> {
        let result = self.read_sync(offset, buf);
        Box::pin(async move { result })
    }

    fn write(
        &self,
        offset: u64,
        buf: &[u8],
    ) -> Pin<Box<dyn Future<Output = io::Result<usize>> + Send + '_>> {
        let result = self.write_sync(offset, buf);
        Box::pin(async move { result })
    }

    fn flush(&self) -> Pin<Box<dyn Future<Output = io::Result<()>> + Send + '_>> {
        let result = self.flush_sync();
        Box::pin(async move { result })
    }

    fn size(&self) -> io::Result<u64> {
        self.size_sync()
    }

    fn sector_size(&self) -> usize {
        SyncStorageDevice::sector_size(self)
    }
}
