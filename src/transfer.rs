//! Sector transfer engine
//!
//! Bounds-checked byte-range copy between the backing store and a
//! caller-supplied buffer. A transfer is all-or-nothing: when the computed
//! range does not fit in the device, the store is left untouched.

use std::ops::Range;

use crate::status::BlockError;
use crate::store::BackingStore;

/// Host sector size in bytes; device sector sizes must be a multiple of it
pub const KERNEL_SECTOR_SIZE: usize = 512;

/// Direction of a data transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Copy from the store into the caller's buffer
    Read,
    /// Copy from the caller's buffer into the store
    Write,
}

impl Direction {
    /// Whether this is a write
    #[inline]
    pub const fn is_write(&self) -> bool {
        matches!(self, Direction::Write)
    }
}

/// Compute the byte range covered by `sector_count` sectors at `sector_offset`
///
/// Returns [`BlockError::OutOfBounds`] when the range does not lie within
/// `[0, capacity)`, including when the arithmetic overflows.
pub fn byte_range(
    sector_offset: u64,
    sector_count: u64,
    sector_size: usize,
    capacity: usize,
) -> Result<Range<usize>, BlockError> {
    let size = sector_size as u64;
    let capacity = capacity as u64;

    let offset = sector_offset.checked_mul(size);
    let len = sector_count.checked_mul(size);
    let end = offset.zip(len).and_then(|(o, l)| o.checked_add(l));

    match (offset, end) {
        (Some(offset), Some(end)) if end <= capacity => Ok(offset as usize..end as usize),
        _ => Err(BlockError::OutOfBounds {
            offset: offset.unwrap_or(u64::MAX),
            len: len.unwrap_or(u64::MAX),
            capacity,
        }),
    }
}

/// Copy `sector_count` sectors between `store` and `buf`
///
/// `buf` must be exactly `sector_count * sector_size` bytes long. A zero-length
/// transfer succeeds without touching the store.
pub fn transfer(
    store: &BackingStore,
    sector_size: usize,
    sector_offset: u64,
    sector_count: u64,
    buf: &mut [u8],
    direction: Direction,
) -> Result<(), BlockError> {
    let range = byte_range(sector_offset, sector_count, sector_size, store.capacity())?;
    if buf.len() != range.len() {
        return Err(BlockError::InvalidArgument(
            "buffer length does not match sector count",
        ));
    }
    if range.is_empty() {
        return Ok(());
    }

    match direction {
        Direction::Read => {
            let data = store.read();
            let data = data.as_ref().ok_or(BlockError::NotReady)?;
            buf.copy_from_slice(&data[range]);
        }
        Direction::Write => {
            let mut data = store.write();
            let data = data.as_mut().ok_or(BlockError::NotReady)?;
            data[range].copy_from_slice(buf);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECTOR: usize = 512;

    fn store(sectors: usize) -> BackingStore {
        BackingStore::allocate(sectors * SECTOR).unwrap()
    }

    #[test]
    fn test_write_then_read() {
        let store = store(8);
        let mut data = vec![0x5Au8; 2 * SECTOR];
        transfer(&store, SECTOR, 3, 2, &mut data, Direction::Write).unwrap();

        let mut out = vec![0u8; 2 * SECTOR];
        transfer(&store, SECTOR, 3, 2, &mut out, Direction::Read).unwrap();
        assert_eq!(out, data);

        // Neighbouring sectors are untouched
        let mut before = vec![0xFFu8; SECTOR];
        transfer(&store, SECTOR, 2, 1, &mut before, Direction::Read).unwrap();
        assert!(before.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_last_sector_in_bounds() {
        let store = store(4);
        let mut buf = vec![1u8; SECTOR];
        assert!(transfer(&store, SECTOR, 3, 1, &mut buf, Direction::Write).is_ok());
    }

    #[test]
    fn test_out_of_bounds_rejected() {
        let store = store(4);
        let mut buf = vec![1u8; 2 * SECTOR];
        let err = transfer(&store, SECTOR, 3, 2, &mut buf, Direction::Write).unwrap_err();
        assert_eq!(
            err,
            BlockError::OutOfBounds {
                offset: 3 * SECTOR as u64,
                len: 2 * SECTOR as u64,
                capacity: 4 * SECTOR as u64,
            }
        );
        assert!(store.read().as_ref().unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_overflowing_offset_rejected() {
        let store = store(4);
        let mut buf = vec![0u8; SECTOR];
        let err = transfer(&store, SECTOR, u64::MAX, 1, &mut buf, Direction::Read).unwrap_err();
        assert!(matches!(err, BlockError::OutOfBounds { .. }));
    }

    #[test]
    fn test_zero_length() {
        let store = store(4);
        let mut buf = Vec::new();
        assert!(transfer(&store, SECTOR, 4, 0, &mut buf, Direction::Write).is_ok());
        assert!(transfer(&store, SECTOR, 0, 0, &mut buf, Direction::Read).is_ok());
    }

    #[test]
    fn test_buffer_length_mismatch() {
        let store = store(4);
        let mut buf = vec![0u8; 100];
        let err = transfer(&store, SECTOR, 0, 1, &mut buf, Direction::Read).unwrap_err();
        assert!(matches!(err, BlockError::InvalidArgument(_)));
    }

    #[test]
    fn test_released_store() {
        let store = store(4);
        store.release();
        let mut buf = vec![0u8; SECTOR];
        let err = transfer(&store, SECTOR, 0, 1, &mut buf, Direction::Read).unwrap_err();
        assert_eq!(err, BlockError::NotReady);
    }
}
