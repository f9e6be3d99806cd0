//! Per-device statistics
//!
//! Lock-free counters updated on the data path and by the lifecycle manager.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::transfer::Direction;

/// Counters for one device
#[derive(Debug, Default)]
pub struct DeviceStats {
    /// Successful read transfers
    pub reads: AtomicU64,
    /// Successful write transfers
    pub writes: AtomicU64,
    /// Sectors read
    pub sectors_read: AtomicU64,
    /// Sectors written
    pub sectors_written: AtomicU64,
    /// Transfers rejected for exceeding capacity
    pub out_of_bounds: AtomicU64,
    /// Requests rejected for their kind
    pub rejected_requests: AtomicU64,
    /// Transfers failed for any other reason
    pub failed_transfers: AtomicU64,
    /// Completion events delivered
    pub completions: AtomicU64,
    /// Simulated media changes raised by the idle timer
    pub media_changes: AtomicU64,
    /// Revalidation wipes performed
    pub revalidations: AtomicU64,
    /// Idle-timer consistency violations observed
    pub consistency_violations: AtomicU64,
}

impl DeviceStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful transfer
    pub fn record_transfer(&self, direction: Direction, sectors: u64) {
        match direction {
            Direction::Read => {
                self.reads.fetch_add(1, Ordering::Relaxed);
                self.sectors_read.fetch_add(sectors, Ordering::Relaxed);
            }
            Direction::Write => {
                self.writes.fetch_add(1, Ordering::Relaxed);
                self.sectors_written.fetch_add(sectors, Ordering::Relaxed);
            }
        }
    }

    /// Record a beyond-end transfer
    pub fn record_out_of_bounds(&self) {
        self.out_of_bounds.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a request rejected for its kind
    pub fn record_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a transfer failed for another reason
    pub fn record_failed(&self) {
        self.failed_transfers.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a delivered completion event
    pub fn record_completion(&self) {
        self.completions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a simulated media change
    pub fn record_media_change(&self) {
        self.media_changes.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a revalidation wipe
    pub fn record_revalidation(&self) {
        self.revalidations.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an idle-timer consistency violation
    pub fn record_consistency_violation(&self) {
        self.consistency_violations.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            sectors_read: self.sectors_read.load(Ordering::Relaxed),
            sectors_written: self.sectors_written.load(Ordering::Relaxed),
            out_of_bounds: self.out_of_bounds.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            failed_transfers: self.failed_transfers.load(Ordering::Relaxed),
            completions: self.completions.load(Ordering::Relaxed),
            media_changes: self.media_changes.load(Ordering::Relaxed),
            revalidations: self.revalidations.load(Ordering::Relaxed),
            consistency_violations: self.consistency_violations.load(Ordering::Relaxed),
        }
    }

    /// Reset every counter to zero
    pub fn reset(&self) {
        for counter in [
            &self.reads,
            &self.writes,
            &self.sectors_read,
            &self.sectors_written,
            &self.out_of_bounds,
            &self.rejected_requests,
            &self.failed_transfers,
            &self.completions,
            &self.media_changes,
            &self.revalidations,
            &self.consistency_violations,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

/// Plain copy of [`DeviceStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Successful read transfers
    pub reads: u64,
    /// Successful write transfers
    pub writes: u64,
    /// Sectors read
    pub sectors_read: u64,
    /// Sectors written
    pub sectors_written: u64,
    /// Transfers rejected for exceeding capacity
    pub out_of_bounds: u64,
    /// Requests rejected for their kind
    pub rejected_requests: u64,
    /// Transfers failed for any other reason
    pub failed_transfers: u64,
    /// Completion events delivered
    pub completions: u64,
    /// Simulated media changes
    pub media_changes: u64,
    /// Revalidation wipes
    pub revalidations: u64,
    /// Idle-timer consistency violations
    pub consistency_violations: u64,
}

impl StatsSnapshot {
    /// Total sectors moved in either direction
    pub fn total_sectors(&self) -> u64 {
        self.sectors_read + self.sectors_written
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_snapshot() {
        let stats = DeviceStats::new();
        stats.record_transfer(Direction::Read, 4);
        stats.record_transfer(Direction::Write, 2);
        stats.record_transfer(Direction::Write, 1);
        stats.record_out_of_bounds();
        stats.record_media_change();

        let snap = stats.snapshot();
        assert_eq!(snap.reads, 1);
        assert_eq!(snap.writes, 2);
        assert_eq!(snap.sectors_read, 4);
        assert_eq!(snap.sectors_written, 3);
        assert_eq!(snap.total_sectors(), 7);
        assert_eq!(snap.out_of_bounds, 1);
        assert_eq!(snap.media_changes, 1);
    }

    #[test]
    fn test_reset() {
        let stats = DeviceStats::new();
        stats.record_completion();
        stats.record_revalidation();
        stats.reset();
        assert_eq!(stats.snapshot(), StatsSnapshot::default());
    }
}
