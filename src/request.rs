//! I/O request shapes consumed by the dispatchers
//!
//! A [`Request`] covers a contiguous sector range split into ordered
//! [`Segment`]s, each carrying its own buffer and direction. Results flow back
//! to the submitter as [`Completion`]s through the request's completion
//! callback. A [`Bio`] is the single-buffer unit handled by direct dispatch.

use std::collections::VecDeque;
use std::fmt;

use crossbeam::channel::Sender;

use crate::status::{BlockError, Status};
use crate::transfer::Direction;

/// Identifier chosen by the submitter
pub type RequestId = u64;

/// Completion callback, invoked once per completion event
pub type CompletionFn = Box<dyn FnMut(Completion) + Send + 'static>;

/// Kind of a queued request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Plain filesystem read/write
    FilesystemIo,
    /// Anything else (packet commands, driver-private requests)
    Other,
}

/// Contiguous sub-range of a request's data
#[derive(Clone, PartialEq, Eq)]
pub struct Segment {
    /// Data buffer; filled in on read, consumed on write
    pub buf: Vec<u8>,
    /// Transfer direction
    pub direction: Direction,
}

impl Segment {
    /// A read segment of `len` bytes
    pub fn read(len: usize) -> Self {
        Self {
            buf: vec![0u8; len],
            direction: Direction::Read,
        }
    }

    /// A write segment carrying `data`
    pub fn write(data: impl Into<Vec<u8>>) -> Self {
        Self {
            buf: data.into(),
            direction: Direction::Write,
        }
    }

    /// Length in bytes
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether the segment carries no data
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Length in sectors; fails when not a whole number of sectors
    pub fn sectors(&self, sector_size: usize) -> Result<u64, BlockError> {
        if self.buf.len() % sector_size != 0 {
            return Err(BlockError::InvalidArgument(
                "segment length is not a multiple of the sector size",
            ));
        }
        Ok((self.buf.len() / sector_size) as u64)
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("len", &self.buf.len())
            .field("direction", &self.direction)
            .finish()
    }
}

/// Result of (part of) a request, handed back to the submitter
#[derive(Debug)]
pub struct Completion {
    /// Request this completion belongs to
    pub request: RequestId,
    /// First sector covered by this completion
    pub sector: u64,
    /// Sectors successfully transferred
    pub sectors: u64,
    /// Outcome
    pub result: Result<(), BlockError>,
    /// Segment buffers retired by this completion, in order
    pub segments: Vec<Segment>,
    /// Whether the request is fully retired
    pub finished: bool,
}

impl Completion {
    /// Status code for this completion
    pub fn status(&self) -> Status {
        self.result.into()
    }
}

/// Block I/O request
pub struct Request {
    id: RequestId,
    kind: RequestKind,
    /// Sector of the first segment still pending
    sector: u64,
    segments: VecDeque<Segment>,
    on_complete: Option<CompletionFn>,
}

impl Request {
    /// Create an empty request of the given kind starting at `sector`
    pub fn new(id: RequestId, kind: RequestKind, sector: u64) -> Self {
        Self {
            id,
            kind,
            sector,
            segments: VecDeque::new(),
            on_complete: None,
        }
    }

    /// Create a filesystem read/write request starting at `sector`
    pub fn filesystem(id: RequestId, sector: u64) -> Self {
        Self::new(id, RequestKind::FilesystemIo, sector)
    }

    /// Append a segment
    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segments.push_back(segment);
        self
    }

    /// Append several segments
    pub fn with_segments(mut self, segments: impl IntoIterator<Item = Segment>) -> Self {
        self.segments.extend(segments);
        self
    }

    /// Set the completion callback
    pub fn with_completion(mut self, complete: CompletionFn) -> Self {
        self.on_complete = Some(complete);
        self
    }

    /// Deliver completions into a channel
    pub fn with_channel(self, tx: Sender<Completion>) -> Self {
        self.with_completion(Box::new(move |completion| {
            // The submitter may have stopped listening
            let _ = tx.send(completion);
        }))
    }

    /// Request identifier
    #[inline]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Request kind
    #[inline]
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Whether this is a plain filesystem read/write
    #[inline]
    pub fn is_filesystem(&self) -> bool {
        self.kind == RequestKind::FilesystemIo
    }

    /// Sector the next pending segment starts at
    #[inline]
    pub fn sector(&self) -> u64 {
        self.sector
    }

    /// Number of segments still pending
    #[inline]
    pub fn remaining_segments(&self) -> usize {
        self.segments.len()
    }

    /// Total bytes still pending
    pub fn remaining_bytes(&self) -> usize {
        self.segments.iter().map(Segment::len).sum()
    }

    /// Take the current (first pending) segment
    pub(crate) fn pop_segment(&mut self) -> Option<Segment> {
        self.segments.pop_front()
    }

    /// Take every pending segment
    pub(crate) fn take_segments(&mut self) -> Vec<Segment> {
        self.segments.drain(..).collect()
    }

    /// Move the start sector past `sectors` transferred sectors
    pub(crate) fn advance(&mut self, sectors: u64) {
        self.sector = self.sector.saturating_add(sectors);
    }

    /// Deliver a completion event to the submitter
    pub(crate) fn complete(&mut self, completion: Completion) {
        if let Some(complete) = self.on_complete.as_mut() {
            complete(completion);
        }
    }

    /// Retire the whole request with `result` without transferring anything
    pub(crate) fn fail(mut self, result: BlockError) {
        let segments = self.take_segments();
        let completion = Completion {
            request: self.id,
            sector: self.sector,
            sectors: 0,
            result: Err(result),
            segments,
            finished: true,
        };
        self.complete(completion);
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("sector", &self.sector)
            .field("segments", &self.segments)
            .finish()
    }
}

/// Single buffered I/O operation handled by direct dispatch
#[derive(Clone, PartialEq, Eq)]
pub struct Bio {
    /// Starting sector
    pub sector: u64,
    /// Data buffer
    pub buf: Vec<u8>,
    /// Transfer direction
    pub direction: Direction,
}

impl Bio {
    /// A read of `len` bytes at `sector`
    pub fn read(sector: u64, len: usize) -> Self {
        Self {
            sector,
            buf: vec![0u8; len],
            direction: Direction::Read,
        }
    }

    /// A write of `data` at `sector`
    pub fn write(sector: u64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            sector,
            buf: data.into(),
            direction: Direction::Write,
        }
    }

    pub(crate) fn from_segment(sector: u64, segment: Segment) -> Self {
        Self {
            sector,
            buf: segment.buf,
            direction: segment.direction,
        }
    }

    pub(crate) fn into_segment(self) -> Segment {
        Segment {
            buf: self.buf,
            direction: self.direction,
        }
    }
}

impl fmt::Debug for Bio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bio")
            .field("sector", &self.sector)
            .field("len", &self.buf.len())
            .field("direction", &self.direction)
            .finish()
    }
}
