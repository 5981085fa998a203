//! Region header
//!
//! Two 1024-entry tables (locations, timestamps) kept as owned arrays and
//! serialized into one contiguous 8 KiB page on write.

use bytes::{Buf, BufMut};

use super::{HEADER_SIZE, SECTOR_INTS};

/// Packed `(offset << 8) | count` descriptor of a cell's inline sectors
///
/// A raw value of 0 means the cell is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location(u32);

impl Location {
    /// The absent cell
    pub const EMPTY: Location = Location(0);

    /// Pack an offset (24 bits) and a sector count (8 bits)
    pub fn new(offset: usize, count: usize) -> Self {
        Location(((offset as u32 & 0xFF_FFFF) << 8) | (count as u32 & 0xFF))
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// First sector of the cell
    pub fn offset(self) -> usize {
        ((self.0 >> 8) & 0xFF_FFFF) as usize
    }

    /// Number of sectors the cell spans
    pub fn count(self) -> usize {
        (self.0 & 0xFF) as usize
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// In-memory image of the region header
#[derive(Debug, Clone)]
pub struct RegionHeader {
    locations: Box<[u32; SECTOR_INTS]>,
    timestamps: Box<[u32; SECTOR_INTS]>,
}

impl Default for RegionHeader {
    fn default() -> Self {
        Self {
            locations: Box::new([0; SECTOR_INTS]),
            timestamps: Box::new([0; SECTOR_INTS]),
        }
    }
}

impl RegionHeader {
    /// Parse a full 8 KiB header page (big-endian entries)
    pub fn decode(mut page: &[u8]) -> Self {
        debug_assert!(page.len() >= HEADER_SIZE);

        let mut header = Self::default();
        for slot in header.locations.iter_mut() {
            *slot = page.get_u32();
        }
        for slot in header.timestamps.iter_mut() {
            *slot = page.get_u32();
        }
        header
    }

    /// Serialize both tables into one contiguous page
    pub fn encode(&self) -> Vec<u8> {
        let mut page = Vec::with_capacity(HEADER_SIZE);
        for &loc in self.locations.iter() {
            page.put_u32(loc);
        }
        for &ts in self.timestamps.iter() {
            page.put_u32(ts);
        }
        page
    }

    pub fn location(&self, index: usize) -> Location {
        Location(self.locations[index])
    }

    pub fn set_location(&mut self, index: usize, location: Location) {
        self.locations[index] = location.raw();
    }

    pub fn timestamp(&self, index: usize) -> u32 {
        self.timestamps[index]
    }

    pub fn set_timestamp(&mut self, index: usize, timestamp: u32) {
        self.timestamps[index] = timestamp;
    }
}

/// Table index of a cell: low 5 bits of each absolute coordinate
pub fn cell_index(x: i32, z: i32) -> usize {
    let local_x = (x & 0x1F) as usize;
    let local_z = (z & 0x1F) as usize;
    local_x + local_z * 32
}
