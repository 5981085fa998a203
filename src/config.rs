//! Configuration for regionstore
//!
//! Centralized configuration with sensible defaults. Region files can be
//! configured either through [`RegionConfig`] or through the packed
//! [`OpenFlags`] bitmask, which is what the on-disk tooling passes around.

use std::ops::{BitOr, BitOrAssign};
use std::path::PathBuf;

use crate::compression::Compression;

// =============================================================================
// Open Flags
// =============================================================================

/// Bitmask of region file open options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OpenFlags(u32);

impl OpenFlags {
    /// No options: strict, read header, gzip
    pub const NONE: OpenFlags = OpenFlags(0);

    /// Repair malformed parts through the repair strategy instead of failing
    pub const LENIENT: OpenFlags = OpenFlags(0b1);

    /// Start from an empty header, ignoring any existing file contents
    pub const CREATE: OpenFlags = OpenFlags(0b10);

    /// Sync file data after every positioned write
    pub const DSYNC: OpenFlags = OpenFlags(0b100);

    /// Default compression: gzip
    pub const GZIP: OpenFlags = OpenFlags(0b01000);

    /// Default compression: zlib
    pub const DEFLATE: OpenFlags = OpenFlags(0b10000);

    /// Default compression: none. Shares bits with GZIP and DEFLATE
    pub const UNCOMPRESSED: OpenFlags = OpenFlags(0b11000);

    /// Wrap cell streams in buffered readers/writers
    pub const BUFFERED: OpenFlags = OpenFlags(0b100000);

    /// Report anomalies through the diagnostic repair strategy (implies LENIENT)
    pub const VERBOSE: OpenFlags = OpenFlags(0b1000000 | 0b1);

    const VERBOSE_RAW: u32 = 0b1000000;
    const COMPRESSION_MASK: u32 = 0b11000;
    const COMPRESSION_SHIFT: u32 = 3;

    /// Build from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        OpenFlags(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether every bit of `other` is set
    pub const fn contains(self, other: OpenFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// The compression selected by bits 3-4; gzip when none is selected
    pub fn compression(self) -> Compression {
        let id = (self.0 & Self::COMPRESSION_MASK) >> Self::COMPRESSION_SHIFT;
        Compression::from_id(id as u8).unwrap_or_default()
    }

    fn is_verbose(self) -> bool {
        self.0 & Self::VERBOSE_RAW != 0
    }
}

impl BitOr for OpenFlags {
    type Output = OpenFlags;

    fn bitor(self, rhs: OpenFlags) -> OpenFlags {
        OpenFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for OpenFlags {
    fn bitor_assign(&mut self, rhs: OpenFlags) {
        self.0 |= rhs.0;
    }
}

// =============================================================================
// Region File Configuration
// =============================================================================

/// Options for opening a single region file
#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// Delegate format anomalies to the repair strategy instead of failing
    pub lenient: bool,

    /// Skip reading the header and treat every cell as absent
    pub create: bool,

    /// Sync data after every write to the backing file
    pub sync_writes: bool,

    /// Compression used for newly written cells
    pub compression: Compression,

    /// Wrap cell streams in `BufReader`/`BufWriter`
    pub buffered: bool,

    /// Use the diagnostic repair strategy when no custom one is supplied.
    /// Implies `lenient`.
    pub verbose: bool,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            lenient: false,
            create: false,
            sync_writes: false,
            compression: Compression::Gzip,
            buffered: false,
            verbose: false,
        }
    }
}

impl RegionConfig {
    /// Create a new config builder
    pub fn builder() -> RegionConfigBuilder {
        RegionConfigBuilder::default()
    }

    /// Pack this config back into open flags
    pub fn to_flags(&self) -> OpenFlags {
        let mut flags = OpenFlags::NONE;
        if self.lenient {
            flags |= OpenFlags::LENIENT;
        }
        if self.create {
            flags |= OpenFlags::CREATE;
        }
        if self.sync_writes {
            flags |= OpenFlags::DSYNC;
        }
        flags |= OpenFlags::from_bits(
            (self.compression.id() as u32) << OpenFlags::COMPRESSION_SHIFT,
        );
        if self.buffered {
            flags |= OpenFlags::BUFFERED;
        }
        if self.verbose {
            flags |= OpenFlags::VERBOSE;
        }
        flags
    }
}

impl From<OpenFlags> for RegionConfig {
    fn from(flags: OpenFlags) -> Self {
        Self {
            lenient: flags.contains(OpenFlags::LENIENT),
            create: flags.contains(OpenFlags::CREATE),
            sync_writes: flags.contains(OpenFlags::DSYNC),
            compression: flags.compression(),
            buffered: flags.contains(OpenFlags::BUFFERED),
            verbose: flags.is_verbose(),
        }
    }
}

/// Builder for RegionConfig
#[derive(Default)]
pub struct RegionConfigBuilder {
    config: RegionConfig,
}

impl RegionConfigBuilder {
    /// Repair anomalies instead of failing
    pub fn lenient(mut self, lenient: bool) -> Self {
        self.config.lenient = lenient;
        self
    }

    /// Start from an empty header
    pub fn create(mut self, create: bool) -> Self {
        self.config.create = create;
        self
    }

    /// Sync data after every write
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    /// Set the default compression for new cells
    pub fn compression(mut self, compression: Compression) -> Self {
        self.config.compression = compression;
        self
    }

    /// Buffer cell streams
    pub fn buffered(mut self, buffered: bool) -> Self {
        self.config.buffered = buffered;
        self
    }

    /// Report anomalies verbosely (also enables leniency)
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.config.verbose = verbose;
        if verbose {
            self.config.lenient = true;
        }
        self
    }

    pub fn build(self) -> RegionConfig {
        self.config
    }
}

// =============================================================================
// Cache Configuration
// =============================================================================

/// On-disk era of region files, selecting the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RegionFormat {
    /// `r.<x>.<z>.mca`
    #[default]
    Anvil,
    /// `r.<x>.<z>.mcr`
    McRegion,
}

impl RegionFormat {
    /// File extension, without the dot
    pub fn extension(self) -> &'static str {
        match self {
            RegionFormat::Anvil => "mca",
            RegionFormat::McRegion => "mcr",
        }
    }
}

/// Configuration for a [`RegionCache`](crate::cache::RegionCache)
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Directory holding region files and overflow files
    pub directory: PathBuf,

    /// Maximum number of region files kept open
    pub capacity: usize,

    /// Region file naming era
    pub format: RegionFormat,

    /// Options applied to every region file the cache opens
    pub region: RegionConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./region"),
            capacity: 256,
            format: RegionFormat::Anvil,
            region: RegionConfig::default(),
        }
    }
}

impl CacheConfig {
    /// Create a new config builder
    pub fn builder() -> CacheConfigBuilder {
        CacheConfigBuilder::default()
    }
}

/// Builder for CacheConfig
#[derive(Default)]
pub struct CacheConfigBuilder {
    config: CacheConfig,
}

impl CacheConfigBuilder {
    /// Set the region directory
    pub fn directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.directory = path.into();
        self
    }

    /// Set the maximum number of open region files
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    /// Set the region file naming era
    pub fn format(mut self, format: RegionFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Set the options used for every opened region file
    pub fn region(mut self, region: RegionConfig) -> Self {
        self.config.region = region;
        self
    }

    pub fn build(self) -> CacheConfig {
        self.config
    }
}
