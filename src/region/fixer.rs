//! Repair strategies
//!
//! A region file opened leniently does not fail on format anomalies. It calls
//! one hook of its [`RegionFixer`] per anomaly instead and continues with
//! whatever the hook hands back.
//!
//! ## Hook outcomes
//! - Header hooks return `()`: the offending entry is treated as absent.
//! - Cell hooks may return a substitute decoded stream, or a compression
//!   override. `None` from [`RegionFixer::unknown_compression`] means "give
//!   up", and the cell reads as empty.
//!
//! Every hook has a harmless default, so a custom strategy only overrides the
//! cases it can actually recover from (e.g. by consulting a backup).

use std::io::{self, Read, Write};
use std::path::Path;

use parking_lot::Mutex;

use crate::compression::Compression;
use crate::error::Result;

/// Decoded cell stream handed out by read operations
pub type ChunkReader = Box<dyn Read + Send>;

/// A stream that yields no bytes
pub fn empty_reader() -> ChunkReader {
    Box::new(io::empty())
}

/// Policy invoked for each distinct anomaly kind
pub trait RegionFixer: Send + Sync {
    // -------------------------------------------------------------------------
    // Header anomalies
    // -------------------------------------------------------------------------

    /// The file holds some bytes but fewer than a full header. Parsing stops
    /// and every cell is treated as absent.
    fn truncated_header(&self, _found: usize, _required: usize) -> Result<()> {
        Ok(())
    }

    /// A location entry points into the header sectors
    fn chunk_overlaps_header(&self, _index: usize) -> Result<()> {
        Ok(())
    }

    /// A location entry starts beyond the end of the file
    fn chunk_out_of_file_size(&self, _index: usize) -> Result<()> {
        Ok(())
    }

    /// A location entry has an offset but spans zero sectors. Warn-only.
    fn zero_sector_chunk(&self, _index: usize) -> Result<()> {
        Ok(())
    }

    /// A location entry shares sectors with an earlier entry. Warn-only; the
    /// entry is kept.
    fn chunks_share_sectors(&self, _index: usize) -> Result<()> {
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Cell anomalies
    // -------------------------------------------------------------------------

    /// Fewer than 5 bytes of cell header could be read
    fn truncated_chunk_header(
        &self,
        _x: i32,
        _z: i32,
        _found: usize,
        _required: usize,
    ) -> Result<ChunkReader> {
        Ok(empty_reader())
    }

    /// The cell's size field is 0. Warn-only; the cell reads as empty.
    fn zero_chunk_size(&self, _x: i32, _z: i32) -> Result<()> {
        Ok(())
    }

    /// The cell's size field is negative
    fn negative_chunk_size(&self, _x: i32, _z: i32, _size: i32) -> Result<ChunkReader> {
        Ok(empty_reader())
    }

    /// The cell names a compression id outside 1..=3. Returning a mode
    /// decodes the cell with it; `None` makes the cell read as empty.
    fn unknown_compression(
        &self,
        _x: i32,
        _z: i32,
        _id: u8,
        _default: Compression,
    ) -> Result<Option<Compression>> {
        Ok(None)
    }

    /// The cell is flagged as overflow but the overflow file does not exist.
    /// Any inline payload is read instead.
    fn missing_overflow_file(&self, _x: i32, _z: i32, _path: &Path) -> Result<()> {
        Ok(())
    }

    /// The cell is flagged as overflow but also carries an inline payload.
    /// The overflow file wins when present.
    fn conflicting_payload(&self, _x: i32, _z: i32, _inline_len: usize) -> Result<()> {
        Ok(())
    }

    /// The cell's size field claims more bytes than its sectors hold
    fn truncated_payload(
        &self,
        _x: i32,
        _z: i32,
        _found: usize,
        _required: usize,
    ) -> Result<ChunkReader> {
        Ok(empty_reader())
    }
}

// =============================================================================
// Silent Strategy
// =============================================================================

/// Repairs every anomaly with the harmless default and reports nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentFixer;

impl RegionFixer for SilentFixer {}

// =============================================================================
// Diagnostic Strategy
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Severity {
    Warn,
    Error,
}

enum Sink {
    Tracing,
    Writer(Mutex<Box<dyn Write + Send>>),
}

/// Same repairs as [`SilentFixer`], but every anomaly is described first
///
/// By default descriptions go to `tracing` (target `regionstore::repair`);
/// [`VerboseFixer::with_writer`] sends one line per anomaly to any writer.
pub struct VerboseFixer {
    sink: Sink,
}

impl Default for VerboseFixer {
    fn default() -> Self {
        Self::new()
    }
}

impl VerboseFixer {
    /// Report through `tracing`
    pub fn new() -> Self {
        Self { sink: Sink::Tracing }
    }

    /// Report to a writer, one line per anomaly
    pub fn with_writer<W: Write + Send + 'static>(writer: W) -> Self {
        Self {
            sink: Sink::Writer(Mutex::new(Box::new(writer))),
        }
    }

    fn report(&self, severity: Severity, message: &str) -> Result<()> {
        match &self.sink {
            Sink::Tracing => match severity {
                Severity::Warn => tracing::warn!(target: "regionstore::repair", "{}", message),
                Severity::Error => tracing::error!(target: "regionstore::repair", "{}", message),
            },
            Sink::Writer(writer) => {
                let label = match severity {
                    Severity::Warn => "WARN",
                    Severity::Error => "ERROR",
                };
                let mut writer = writer.lock();
                writeln!(writer, "[region {}] {}", label, message)?;
            }
        }
        Ok(())
    }
}

impl RegionFixer for VerboseFixer {
    fn truncated_header(&self, found: usize, required: usize) -> Result<()> {
        self.report(
            Severity::Error,
            &format!("truncated header: {} of {} bytes present", found, required),
        )
    }

    fn chunk_overlaps_header(&self, index: usize) -> Result<()> {
        self.report(
            Severity::Error,
            &format!("cell #{} points into the header sectors", index),
        )
    }

    fn chunk_out_of_file_size(&self, index: usize) -> Result<()> {
        self.report(
            Severity::Error,
            &format!("cell #{} starts beyond the end of the file", index),
        )
    }

    fn zero_sector_chunk(&self, index: usize) -> Result<()> {
        self.report(
            Severity::Warn,
            &format!("cell #{} has an offset but spans zero sectors", index),
        )
    }

    fn chunks_share_sectors(&self, index: usize) -> Result<()> {
        self.report(
            Severity::Warn,
            &format!("cell #{} shares sectors with another cell", index),
        )
    }

    fn truncated_chunk_header(
        &self,
        x: i32,
        z: i32,
        found: usize,
        required: usize,
    ) -> Result<ChunkReader> {
        self.report(
            Severity::Error,
            &format!(
                "cell [{}, {}] header is truncated: {} of {} bytes present",
                x, z, found, required
            ),
        )?;
        Ok(empty_reader())
    }

    fn zero_chunk_size(&self, x: i32, z: i32) -> Result<()> {
        self.report(
            Severity::Warn,
            &format!("cell [{}, {}] is present but has no payload", x, z),
        )
    }

    fn negative_chunk_size(&self, x: i32, z: i32, size: i32) -> Result<ChunkReader> {
        self.report(
            Severity::Error,
            &format!("cell [{}, {}] has negative payload size {}", x, z, size),
        )?;
        Ok(empty_reader())
    }

    fn unknown_compression(
        &self,
        x: i32,
        z: i32,
        id: u8,
        _default: Compression,
    ) -> Result<Option<Compression>> {
        self.report(
            Severity::Error,
            &format!("cell [{}, {}] has unknown compression id {}", x, z, id),
        )?;
        Ok(None)
    }

    fn missing_overflow_file(&self, x: i32, z: i32, path: &Path) -> Result<()> {
        self.report(
            Severity::Error,
            &format!(
                "cell [{}, {}] overflow file {} does not exist",
                x,
                z,
                path.display()
            ),
        )
    }

    fn conflicting_payload(&self, x: i32, z: i32, inline_len: usize) -> Result<()> {
        self.report(
            Severity::Error,
            &format!(
                "cell [{}, {}] has both an overflow file and {} inline bytes",
                x, z, inline_len
            ),
        )
    }

    fn truncated_payload(
        &self,
        x: i32,
        z: i32,
        found: usize,
        required: usize,
    ) -> Result<ChunkReader> {
        self.report(
            Severity::Error,
            &format!(
                "cell [{}, {}] payload is truncated: {} of {} bytes present",
                x, z, found, required
            ),
        )?;
        Ok(empty_reader())
    }
}
