//! Status codes and errors for block device operations
//!
//! This module defines the error taxonomy shared by the transfer engine,
//! the request dispatchers, the lifecycle manager and the control path.

use std::fmt;
use std::io;

/// Errors produced by block device operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BlockError {
    /// The request's byte range exceeds the device capacity
    #[error("request out of bounds: offset {offset} + {len} bytes exceeds capacity {capacity}")]
    OutOfBounds {
        /// Byte offset the request started at (saturated on overflow)
        offset: u64,
        /// Byte length of the request
        len: u64,
        /// Device capacity in bytes
        capacity: u64,
    },
    /// The request is not a plain filesystem read/write
    #[error("unsupported request kind")]
    UnsupportedRequestKind,
    /// The backing store could not be allocated
    #[error("failed to allocate {bytes} bytes of backing store")]
    AllocationFailure {
        /// Requested capacity in bytes
        bytes: usize,
    },
    /// An internal invariant of the lifecycle state machine did not hold
    #[error("consistency violation: {0}")]
    ConsistencyViolation(&'static str),
    /// A control query other than geometry was issued
    #[error("unsupported control query {code:#06x}")]
    UnsupportedControlQuery {
        /// Raw control code
        code: u32,
    },
    /// Malformed argument (misaligned segment, bad configuration)
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// The device has been shut down
    #[error("device not ready")]
    NotReady,
}

impl BlockError {
    /// Completion status code corresponding to this error
    pub const fn status(&self) -> Status {
        match self {
            BlockError::OutOfBounds { .. } | BlockError::UnsupportedRequestKind => Status::IoError,
            BlockError::AllocationFailure { .. } => Status::OutOfMemory,
            BlockError::ConsistencyViolation(_) => Status::Corruption,
            BlockError::UnsupportedControlQuery { .. } => Status::NotSupported,
            BlockError::InvalidArgument(_) => Status::InvalidArgument,
            BlockError::NotReady => Status::NotReady,
        }
    }
}

impl From<BlockError> for io::Error {
    fn from(err: BlockError) -> Self {
        let kind = match err {
            BlockError::OutOfBounds { .. } => io::ErrorKind::UnexpectedEof,
            BlockError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            BlockError::UnsupportedRequestKind | BlockError::UnsupportedControlQuery { .. } => {
                io::ErrorKind::Unsupported
            }
            BlockError::AllocationFailure { .. } => io::ErrorKind::OutOfMemory,
            BlockError::NotReady => io::ErrorKind::NotConnected,
            BlockError::ConsistencyViolation(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}

/// Completion status reported to the submitter of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Status {
    /// Transfer completed successfully
    #[default]
    Ok = 0,
    /// I/O error (out of bounds, rejected request kind)
    IoError = 1,
    /// Out of memory
    OutOfMemory = 2,
    /// Internal state was found inconsistent
    Corruption = 3,
    /// Feature or query not supported
    NotSupported = 4,
    /// Invalid argument provided
    InvalidArgument = 5,
    /// Device is shut down
    NotReady = 6,
}

impl Status {
    /// Check if the status indicates success
    #[inline]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    /// Check if the status indicates an error
    #[inline]
    pub const fn is_error(&self) -> bool {
        !self.is_ok()
    }

    /// Get the status as a string
    pub const fn as_str(&self) -> &'static str {
        match self {
            Status::Ok => "Ok",
            Status::IoError => "IoError",
            Status::OutOfMemory => "OutOfMemory",
            Status::Corruption => "Corruption",
            Status::NotSupported => "NotSupported",
            Status::InvalidArgument => "InvalidArgument",
            Status::NotReady => "NotReady",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<Result<(), BlockError>> for Status {
    fn from(result: Result<(), BlockError>) -> Self {
        match result {
            Ok(()) => Status::Ok,
            Err(err) => err.status(),
        }
    }
}
