//! Region Module
//!
//! One backing file multiplexing a 32×32 grid of independently sized,
//! compressed cells.
//!
//! ## Responsibilities
//! - Parse and validate the header, replaying it into the sector allocator
//! - Read, write and remove cells, spilling oversized ones to overflow files
//! - Delegate every format anomaly to a pluggable repair strategy
//! - Pad or truncate the file to whole sectors on flush
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Sector 0: Location table                                 │
//! │   1024 × u32 BE, index = localX + localZ·32              │
//! │   entry = (offset24 << 8) | count8, 0 = absent           │
//! ├──────────────────────────────────────────────────────────┤
//! │ Sector 1: Timestamp table                                │
//! │   1024 × u32 BE seconds since epoch                      │
//! ├──────────────────────────────────────────────────────────┤
//! │ Sector N..N+count: Cell                                  │
//! │ ┌───────────┬───────────┬──────────────────┬──────────┐  │
//! │ │ Size (4)  │ Flags (1) │ Payload (size-1) │ Padding  │  │
//! │ └───────────┴───────────┴──────────────────┴──────────┘  │
//! │   flags bit7 = payload lives in overflow file            │
//! │   flags bits0-6 = compression id (1 gzip, 2 zlib, 3 raw) │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Overflow files (`c.<x>.<z>.mcc`, absolute cell coordinates) sit next to
//! the region file and hold the raw compressed payload with no header.

mod file;
mod fixer;
mod header;
mod sector;
mod writer;

pub use file::{CellEntry, RegionFile};
pub use fixer::{empty_reader, ChunkReader, RegionFixer, SilentFixer, VerboseFixer};
pub use header::{cell_index, Location, RegionHeader};
pub use sector::SectorAllocator;
pub use writer::ChunkWriter;

use crate::config::RegionFormat;

// =============================================================================
// Shared Constants
// =============================================================================

/// Allocation unit of a region file
pub const SECTOR_SIZE: usize = 4096;

/// Entries per header table
pub const SECTOR_INTS: usize = SECTOR_SIZE / 4;

/// Sectors permanently reserved for the header
pub const HEADER_SECTORS: usize = 2;

/// Header size: location table + timestamp table = 8192 bytes
pub const HEADER_SIZE: usize = SECTOR_SIZE * HEADER_SECTORS;

/// Cell header size: size (4) + flags (1)
pub const CHUNK_HEADER_SIZE: usize = 5;

/// Flags bit marking a cell whose payload lives in an overflow file
pub const EXTERNAL_FLAG: u8 = 0b1000_0000;

/// Flags bits holding the compression id
pub const COMPRESSION_MASK: u8 = 0b0111_1111;

/// Cells needing this many sectors or more go to an overflow file
pub const OVERFLOW_THRESHOLD: usize = 256;

// =============================================================================
// File Naming
// =============================================================================

/// Region file name for grid coordinates: `r.<x>.<z>.<mca|mcr>`
pub fn region_file_name(region_x: i32, region_z: i32, format: RegionFormat) -> String {
    format!("r.{}.{}.{}", region_x, region_z, format.extension())
}

/// Overflow file name for absolute cell coordinates: `c.<x>.<z>.mcc`
pub fn overflow_file_name(x: i32, z: i32) -> String {
    format!("c.{}.{}.mcc", x, z)
}

/// Number of sectors needed to hold `bytes`
pub fn sectors_for(bytes: usize) -> usize {
    (bytes + SECTOR_SIZE - 1) / SECTOR_SIZE
}
