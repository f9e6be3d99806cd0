//! Request dispatch strategies
//!
//! Three interchangeable ways of resolving I/O work into transfer calls:
//!
//! - [`DispatchStrategy::Simple`]: one segment per pass, completed immediately
//! - [`DispatchStrategy::Clustered`]: every segment of a request in one pass,
//!   completed once with the aggregate sector count
//! - [`DispatchStrategy::Direct`]: no queue; each unit is transferred and
//!   completed synchronously on the submitter's thread
//!
//! The strategy is fixed when the device is created.

pub mod clustered;
pub mod direct;
pub mod simple;

use std::fmt;
use std::str::FromStr;

use crate::queue::RequestQueue;
use crate::request::{Completion, Request, Segment};
use crate::stats::DeviceStats;
use crate::status::BlockError;
use crate::store::BackingStore;
use crate::transfer::{self, Direction};

/// Request dispatch strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DispatchStrategy {
    /// One segment per dispatch iteration
    #[default]
    Simple,
    /// Whole request per dispatch iteration
    Clustered,
    /// Bypass the queue entirely
    Direct,
}

impl DispatchStrategy {
    /// All strategies
    pub const ALL: [DispatchStrategy; 3] = [
        DispatchStrategy::Simple,
        DispatchStrategy::Clustered,
        DispatchStrategy::Direct,
    ];

    /// Resolve a legacy request-mode code (0 simple, 1 full, 2 no-queue)
    pub fn from_code(code: u8) -> Result<Self, BlockError> {
        match code {
            0 => Ok(DispatchStrategy::Simple),
            1 => Ok(DispatchStrategy::Clustered),
            2 => Ok(DispatchStrategy::Direct),
            _ => Err(BlockError::InvalidArgument("unknown request mode")),
        }
    }

    /// Legacy request-mode code
    pub const fn code(&self) -> u8 {
        match self {
            DispatchStrategy::Simple => 0,
            DispatchStrategy::Clustered => 1,
            DispatchStrategy::Direct => 2,
        }
    }

    /// Strategy name
    pub const fn as_str(&self) -> &'static str {
        match self {
            DispatchStrategy::Simple => "simple",
            DispatchStrategy::Clustered => "clustered",
            DispatchStrategy::Direct => "direct",
        }
    }

    /// Whether requests go through the request queue
    pub const fn is_queued(&self) -> bool {
        !matches!(self, DispatchStrategy::Direct)
    }
}

impl fmt::Display for DispatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchStrategy {
    type Err = BlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(DispatchStrategy::Simple),
            "clustered" | "full" => Ok(DispatchStrategy::Clustered),
            "direct" | "noqueue" | "no_queue" => Ok(DispatchStrategy::Direct),
            other => match other.parse::<u8>() {
                Ok(code) => Self::from_code(code),
                Err(_) => Err(BlockError::InvalidArgument("unknown dispatch strategy")),
            },
        }
    }
}

/// Everything a dispatcher needs to resolve work against one device
#[derive(Clone, Copy)]
pub(crate) struct Target<'a> {
    pub(crate) name: &'a str,
    pub(crate) store: &'a BackingStore,
    pub(crate) sector_size: usize,
    pub(crate) stats: &'a DeviceStats,
}

impl<'a> Target<'a> {
    /// Transfer one buffer at `sector`, returning the sectors moved
    pub(crate) fn transfer(
        &self,
        sector: u64,
        buf: &mut [u8],
        direction: Direction,
    ) -> Result<u64, BlockError> {
        if buf.len() % self.sector_size != 0 {
            self.stats.record_failed();
            return Err(BlockError::InvalidArgument(
                "segment length is not a multiple of the sector size",
            ));
        }
        let sectors = (buf.len() / self.sector_size) as u64;

        match transfer::transfer(self.store, self.sector_size, sector, sectors, buf, direction) {
            Ok(()) => {
                self.stats.record_transfer(direction, sectors);
                Ok(sectors)
            }
            Err(err @ BlockError::OutOfBounds { offset, len, .. }) => {
                self.stats.record_out_of_bounds();
                if tracing::enabled!(tracing::Level::WARN) {
                    tracing::warn!(
                        device = self.name,
                        offset,
                        bytes = len,
                        write = direction.is_write(),
                        "beyond-end transfer"
                    );
                }
                Err(err)
            }
            Err(err) => {
                self.stats.record_failed();
                Err(err)
            }
        }
    }

    /// Transfer a segment of a queued request
    pub(crate) fn transfer_segment(
        &self,
        sector: u64,
        segment: &mut Segment,
    ) -> Result<u64, BlockError> {
        self.transfer(sector, &mut segment.buf, segment.direction)
    }

    /// Sectors a segment spans, rounding partial sectors down
    pub(crate) fn span(&self, segment: &Segment) -> u64 {
        (segment.len() / self.sector_size) as u64
    }

    /// Reject a request that is not a plain filesystem read/write
    pub(crate) fn reject(&self, request: Request) {
        self.stats.record_rejected();
        self.stats.record_completion();
        if tracing::enabled!(tracing::Level::WARN) {
            tracing::warn!(
                device = self.name,
                request = request.id(),
                "skip non-fs request"
            );
        }
        request.fail(BlockError::UnsupportedRequestKind);
    }

    /// Deliver a completion event for `request`
    pub(crate) fn complete(&self, request: &mut Request, completion: Completion) {
        self.stats.record_completion();
        request.complete(completion);
    }
}

/// Drain `queue` with a queued strategy, returning the dispatch iterations run
///
/// Direct dispatch never queues, so draining with it is a no-op.
pub(crate) fn drain(strategy: DispatchStrategy, queue: &RequestQueue, target: Target<'_>) -> usize {
    queue.run_exclusive(|queue| {
        let mut iterations = 0;
        loop {
            let progressed = match strategy {
                DispatchStrategy::Simple => simple::dispatch_one(queue, target),
                DispatchStrategy::Clustered => clustered::dispatch_one(queue, target),
                DispatchStrategy::Direct => false,
            };
            if !progressed {
                break iterations;
            }
            iterations += 1;
        }
    })
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_code() {
        assert_eq!(DispatchStrategy::from_code(0).unwrap(), DispatchStrategy::Simple);
        assert_eq!(DispatchStrategy::from_code(1).unwrap(), DispatchStrategy::Clustered);
        assert_eq!(DispatchStrategy::from_code(2).unwrap(), DispatchStrategy::Direct);
        assert!(DispatchStrategy::from_code(3).is_err());
        for strategy in DispatchStrategy::ALL {
            assert_eq!(DispatchStrategy::from_code(strategy.code()).unwrap(), strategy);
        }
    }

    #[test]
    fn test_from_str() {
        assert_eq!("simple".parse::<DispatchStrategy>().unwrap(), DispatchStrategy::Simple);
        assert_eq!("Full".parse::<DispatchStrategy>().unwrap(), DispatchStrategy::Clustered);
        assert_eq!("noqueue".parse::<DispatchStrategy>().unwrap(), DispatchStrategy::Direct);
        assert_eq!("2".parse::<DispatchStrategy>().unwrap(), DispatchStrategy::Direct);
        assert!("elevator".parse::<DispatchStrategy>().is_err());
        assert!("7".parse::<DispatchStrategy>().is_err());
    }

    #[test]
    fn test_default_is_simple() {
        assert_eq!(DispatchStrategy::default(), DispatchStrategy::Simple);
        assert!(DispatchStrategy::Clustered.is_queued());
        assert!(!DispatchStrategy::Direct.is_queued());
    }

    #[test]
    fn test_target_misaligned_buffer() {
        let fixture = test_util::Fixture::new(4);
        let mut buf = vec![0u8; 100];
        let err = fixture
            .target()
            .transfer(0, &mut buf, Direction::Write)
            .unwrap_err();
        assert!(matches!(err, BlockError::InvalidArgument(_)));
        assert_eq!(fixture.stats.snapshot().failed_transfers, 1);
    }

    #[test]
    fn test_target_out_of_bounds_counts() {
        let fixture = test_util::Fixture::new(4);
        let mut buf = vec![0u8; 1024];
        let err = fixture
            .target()
            .transfer(3, &mut buf, Direction::Write)
            .unwrap_err();
        assert!(matches!(err, BlockError::OutOfBounds { .. }));
        assert_eq!(fixture.stats.snapshot().out_of_bounds, 1);
    }
}
