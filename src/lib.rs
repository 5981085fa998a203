//! # regionstore
//!
//! Persistence layer for region files: fixed 32×32 grids of independently
//! sized, compressed cells multiplexed into sector-allocated backing files.
//! - First-fit sector allocation with in-place shrinking
//! - Overflow files for cells of 256 sectors or more
//! - Strict or lenient decoding with pluggable repair strategies
//! - Bounded LRU cache of open region files
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Region Cache                           │
//! │        (absolute cell coords → open region file, LRU)        │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                       Region File                            │
//! │       (header image, cell read/write/remove, flush)          │
//! └──────┬──────────────────┬───────────────────┬───────────────┘
//!        │                  │                   │
//!        ▼                  ▼                   ▼
//! ┌─────────────┐   ┌───────────────┐   ┌─────────────────┐
//! │   Sector    │   │    Repair     │   │   Compression   │
//! │  Allocator  │   │   Strategy    │   │ (gzip/zlib/raw) │
//! └─────────────┘   └───────────────┘   └─────────────────┘
//!                          │
//!                          ▼
//!              backing file  /  overflow files
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod compression;
pub mod region;
pub mod cache;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use cache::{RegionCache, RegionPos};
pub use compression::Compression;
pub use config::{CacheConfig, OpenFlags, RegionConfig, RegionFormat};
pub use error::{RegionError, Result};
pub use region::{ChunkReader, ChunkWriter, RegionFile, RegionFixer, SilentFixer, VerboseFixer};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of regionstore
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
