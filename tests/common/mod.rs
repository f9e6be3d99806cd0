//! Shared test utilities for device, dispatch and lifecycle tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cryptrd::{
    Completion, DispatchStrategy, ManualTimer, RamDisk, RamDiskConfig, Request, Segment,
    SyncStorageDevice,
};

/// Idle delay used by lifecycle tests driven by a [`ManualTimer`].
pub const IDLE_DELAY: Duration = Duration::from_secs(30);

/// Build a disk with a manual timer.
pub fn manual_disk(strategy: DispatchStrategy, sectors: u64) -> (RamDisk, Arc<ManualTimer>) {
    let timer = Arc::new(ManualTimer::new());
    let config = RamDiskConfig::new()
        .with_sector_count(sectors)
        .with_dispatch(strategy)
        .with_idle_delay(IDLE_DELAY);
    let disk = RamDisk::new(config, timer.clone()).expect("create ramdisk");
    (disk, timer)
}

/// Deterministic RNG for reproducible randomized tests.
pub fn rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Random bytes of the given length.
pub fn random_bytes(rng: &mut StdRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.gen()).collect()
}

/// Copy of the whole device contents.
pub fn contents(disk: &RamDisk) -> Vec<u8> {
    let mut buf = vec![0u8; disk.capacity_bytes() as usize];
    disk.read_sync(0, &mut buf).expect("read whole device");
    buf
}

/// Attach a channel to a request and return the receiving end.
pub fn with_receiver(request: Request) -> (Request, Receiver<Completion>) {
    let (tx, rx) = unbounded();
    (request.with_channel(tx), rx)
}

/// Drain every completion currently buffered in `rx`.
pub fn drain(rx: &Receiver<Completion>) -> Vec<Completion> {
    rx.try_iter().collect()
}

/// Description of a request, replayable against several devices.
#[derive(Debug, Clone)]
pub struct RequestSpec {
    pub id: u64,
    pub sector: u64,
    pub segments: Vec<Vec<u8>>,
}

impl RequestSpec {
    /// Build a write request from this description.
    pub fn to_write(&self) -> Request {
        Request::filesystem(self.id, self.sector)
            .with_segments(self.segments.iter().cloned().map(Segment::write))
    }

    /// Sectors covered by this request; partial sectors round down.
    pub fn sectors(&self, sector_size: usize) -> u64 {
        self.segments
            .iter()
            .map(|s| (s.len() / sector_size) as u64)
            .sum()
    }

    /// Whether any segment is not a whole number of sectors.
    pub fn has_misaligned(&self, sector_size: usize) -> bool {
        self.segments.iter().any(|s| s.len() % sector_size != 0)
    }
}

/// Random multi-segment write requests
///
/// Some requests deliberately run past the end, and roughly one segment in
/// six is not a whole number of sectors.
pub fn random_write_stream(
    rng: &mut StdRng,
    count: usize,
    device_sectors: u64,
    sector_size: usize,
) -> Vec<RequestSpec> {
    (0..count as u64)
        .map(|id| {
            let segments: Vec<Vec<u8>> = (0..rng.gen_range(1..=4))
                .map(|_| {
                    if rng.gen_ratio(1, 6) {
                        let len = rng.gen_range(0..=2) * sector_size
                            + rng.gen_range(1..sector_size);
                        random_bytes(rng, len)
                    } else {
                        let sectors = rng.gen_range(1..=3);
                        random_bytes(rng, sectors * sector_size)
                    }
                })
                .collect();
            let sector = rng.gen_range(0..device_sectors + 4);
            RequestSpec {
                id,
                sector,
                segments,
            }
        })
        .collect()
}
