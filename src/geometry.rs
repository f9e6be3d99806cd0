//! Synthetic disk geometry for legacy control queries

use crate::status::BlockError;

/// Legacy `HDIO_GETGEO` control code
pub const HDIO_GETGEO: u32 = 0x0301;

/// Fixed head count reported by the device
pub const HEADS: u8 = 4;
/// Fixed sectors-per-track reported by the device
pub const SECTORS_PER_TRACK: u8 = 16;
/// Fixed start sector reported by the device
pub const START: u64 = 4;

/// Cylinder/head/sector description of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Cylinder count
    pub cylinders: u64,
    /// Head count
    pub heads: u8,
    /// Sectors per track
    pub sectors_per_track: u8,
    /// Start sector
    pub start: u64,
}

impl Geometry {
    /// Derive the synthetic geometry for a device
    ///
    /// Cylinders are the effective sector count floored to a multiple of 64
    /// and divided by 64.
    pub const fn for_capacity(capacity_bytes: u64, sector_size: u64) -> Self {
        let effective_sectors = if sector_size == 0 {
            0
        } else {
            capacity_bytes / sector_size
        };
        Self {
            cylinders: (effective_sectors & !0x3f) >> 6,
            heads: HEADS,
            sectors_per_track: SECTORS_PER_TRACK,
            start: START,
        }
    }
}

/// Out-of-band control query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlQuery {
    /// Report the synthetic geometry
    GetGeometry,
    /// Any other control code
    Other(u32),
}

impl ControlQuery {
    /// Map a raw control code
    pub const fn from_code(code: u32) -> Self {
        match code {
            HDIO_GETGEO => ControlQuery::GetGeometry,
            other => ControlQuery::Other(other),
        }
    }

    /// Raw control code
    pub const fn code(&self) -> u32 {
        match self {
            ControlQuery::GetGeometry => HDIO_GETGEO,
            ControlQuery::Other(code) => *code,
        }
    }
}

/// Response to a control query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlResponse {
    /// Geometry report
    Geometry(Geometry),
}

/// Answer a control query for a device of the given size
pub fn respond(
    query: ControlQuery,
    capacity_bytes: u64,
    sector_size: u64,
) -> Result<ControlResponse, BlockError> {
    match query {
        ControlQuery::GetGeometry => Ok(ControlResponse::Geometry(Geometry::for_capacity(
            capacity_bytes,
            sector_size,
        ))),
        ControlQuery::Other(code) => Err(BlockError::UnsupportedControlQuery { code }),
    }
}
