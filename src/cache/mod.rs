//! Cache Module
//!
//! Bounded, least-recently-used registry of open region files, addressed by
//! absolute (unbounded) cell coordinates.
//!
//! ## Responsibilities
//! - Map absolute cell coordinates to the region file holding them
//! - Open region files lazily, named from grid coordinates and format era
//! - Close the least recently used files beyond the configured capacity
//! - Pass cell reads, writes, probes and removals through to region files
//!
//! ## Addressing
//! ```text
//!   cell (x, z) ──► region (x >> 5, z >> 5) ──► r.<rx>.<rz>.mca
//!                └► local  (x & 31, z & 31) ──► header index
//! ```

mod region_cache;

pub use region_cache::{RegionCache, RegionPos};
