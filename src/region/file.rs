//! Region File
//!
//! Owns one backing file and the header image describing its 1024 cells.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Buf;
use parking_lot::Mutex;
use tempfile::NamedTempFile;

use crate::compression::Compression;
use crate::config::{OpenFlags, RegionConfig};
use crate::error::{RegionError, Result};

use super::fixer::{empty_reader, ChunkReader, RegionFixer, SilentFixer, VerboseFixer};
use super::header::{cell_index, Location, RegionHeader};
use super::sector::SectorAllocator;
use super::writer::{ChunkWriter, Target};
use super::{
    overflow_file_name, sectors_for, CHUNK_HEADER_SIZE, COMPRESSION_MASK, EXTERNAL_FLAG,
    HEADER_SECTORS, HEADER_SIZE, OVERFLOW_THRESHOLD, SECTOR_INTS, SECTOR_SIZE,
};

/// Backing file handle plus the header image it persists.
/// Guarded together so a header write always sees a consistent table.
struct RegionIo {
    file: File,
    header: RegionHeader,
}

/// A present cell, as listed by [`RegionFile::entries`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellEntry {
    pub local_x: usize,
    pub local_z: usize,
    pub location: Location,
    pub timestamp: u32,
}

/// An open region file
///
/// ## Concurrency:
/// - `io`: one lock serializing every positioned read/write and header access.
///   Calls from several threads are safe but do not run in parallel.
/// - `sectors`: the allocator's own lock, independent of `io`. A reallocation
///   and the header write recording it are not one transaction; concurrent
///   writers to the same cell are not supported.
///
/// ## Lifecycle:
/// [`RegionFile::close`] flushes and reports errors. Dropping an unclosed file
/// flushes as well, logging any failure.
pub struct RegionFile {
    /// Directory for overflow files and staging temp files
    directory: PathBuf,

    /// Path of the backing file
    path: PathBuf,

    /// Compression for newly written cells
    compression: Compression,

    buffered: bool,
    lenient: bool,
    sync_writes: bool,

    fixer: Arc<dyn RegionFixer>,

    io: Mutex<RegionIo>,
    sectors: SectorAllocator,

    closed: AtomicBool,
}

impl RegionFile {
    // =========================================================================
    // Opening
    // =========================================================================

    /// Open or create a region file
    ///
    /// Uses the diagnostic repair strategy when `config.verbose` is set and the
    /// silent one otherwise. Fails with `Malformed` on a bad header unless
    /// `config.lenient` or `config.verbose` is set.
    pub fn open(directory: &Path, path: &Path, config: &RegionConfig) -> Result<Self> {
        let fixer: Arc<dyn RegionFixer> = if config.verbose {
            Arc::new(VerboseFixer::new())
        } else {
            Arc::new(SilentFixer)
        };
        let lenient = config.lenient || config.verbose;
        Self::open_inner(directory, path, config, lenient, fixer)
    }

    /// Open with a packed flag set
    pub fn open_with_flags(directory: &Path, path: &Path, flags: OpenFlags) -> Result<Self> {
        Self::open(directory, path, &RegionConfig::from(flags))
    }

    /// Open with a custom repair strategy. Always lenient.
    pub fn open_with_fixer(
        directory: &Path,
        path: &Path,
        config: &RegionConfig,
        fixer: Arc<dyn RegionFixer>,
    ) -> Result<Self> {
        Self::open_inner(directory, path, config, true, fixer)
    }

    fn open_inner(
        directory: &Path,
        path: &Path,
        config: &RegionConfig,
        lenient: bool,
        fixer: Arc<dyn RegionFixer>,
    ) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let sectors = SectorAllocator::new();
        sectors.allocate(0, HEADER_SECTORS);

        let mut io = RegionIo {
            file,
            header: RegionHeader::default(),
        };

        if !config.create {
            // On error the file handle drops with `io`, nothing leaks
            read_header(&mut io, &sectors, lenient, fixer.as_ref())?;
        }

        Ok(Self {
            directory: directory.to_path_buf(),
            path: path.to_path_buf(),
            compression: config.compression,
            buffered: config.buffered,
            lenient,
            sync_writes: config.sync_writes,
            fixer,
            io: Mutex::new(io),
            sectors,
            closed: AtomicBool::new(false),
        })
    }

    // =========================================================================
    // Flushing and Closing
    // =========================================================================

    /// Persist the header, pad or truncate to whole sectors, sync to disk
    ///
    /// Sync runs even when the header write or resize fails.
    pub fn flush(&self) -> Result<()> {
        let mut io = self.io.lock();

        let result = self
            .write_header(&mut io)
            .and_then(|_| self.fit_to_sectors(&mut io.file));
        let synced = io.file.sync_all();

        result?;
        synced?;
        Ok(())
    }

    /// Flush and release the file handle
    pub fn close(self) -> Result<()> {
        let result = self.flush();
        self.closed.store(true, Ordering::Release);
        result
    }

    /// Pad the last sector with a trailing zero byte, or cut off trailing
    /// sectors nothing occupies any more
    fn fit_to_sectors(&self, file: &mut File) -> Result<()> {
        let current = file.metadata()?.len();
        let padded = (self.sectors.sector_space() * SECTOR_SIZE) as u64;

        if current < padded {
            self.write_at(file, padded - 1, &[0])?;
        } else if current > padded {
            file.set_len(padded)?;
        }
        Ok(())
    }

    fn write_header(&self, io: &mut RegionIo) -> Result<()> {
        let page = io.header.encode();
        self.write_at(&mut io.file, 0, &page)
    }

    fn write_at(&self, file: &mut File, pos: u64, data: &[u8]) -> Result<()> {
        file.seek(SeekFrom::Start(pos))?;
        file.write_all(data)?;
        if self.sync_writes {
            file.sync_data()?;
        }
        Ok(())
    }

    // =========================================================================
    // Reading a Cell
    // =========================================================================

    /// Open a decoded stream over the cell at absolute coordinates `(x, z)`
    ///
    /// Absent cells yield an empty stream. Coordinates must be absolute since
    /// overflow files are named after them.
    pub fn read_chunk(&self, x: i32, z: i32) -> Result<ChunkReader> {
        let index = cell_index(x, z);

        let buf = {
            let mut io = self.io.lock();
            let loc = io.header.location(index);
            if loc.is_empty() {
                return Ok(empty_reader());
            }

            let mut buf = vec![0u8; loc.count() * SECTOR_SIZE];
            let read = read_at(&mut io.file, sector_pos(loc.offset()), &mut buf)?;
            buf.truncate(read);
            buf
        };

        self.decode_chunk(x, z, buf)
    }

    /// Read and decode a whole cell
    pub fn read_chunk_to_vec(&self, x: i32, z: i32) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.read_chunk(x, z)?.read_to_end(&mut out)?;
        Ok(out)
    }

    fn decode_chunk(&self, x: i32, z: i32, buf: Vec<u8>) -> Result<ChunkReader> {
        if buf.len() < CHUNK_HEADER_SIZE {
            if self.lenient {
                return self
                    .fixer
                    .truncated_chunk_header(x, z, buf.len(), CHUNK_HEADER_SIZE);
            }
            return Err(malformed(format!(
                "cell [{}, {}] header is truncated: {} of {} bytes present",
                x,
                z,
                buf.len(),
                CHUNK_HEADER_SIZE
            )));
        }

        let mut cursor = &buf[..];
        let size = cursor.get_i32();

        // An empty cell carries no information, so this is never fatal
        if size == 0 {
            if self.lenient {
                self.fixer.zero_chunk_size(x, z)?;
            }
            return Ok(empty_reader());
        }

        if size < 0 {
            if self.lenient {
                return self.fixer.negative_chunk_size(x, z, size);
            }
            return Err(malformed(format!(
                "cell [{}, {}] has negative size {}",
                x, z, size
            )));
        }

        let flags = cursor.get_u8();
        let external = flags & EXTERNAL_FLAG != 0;
        let id = flags & COMPRESSION_MASK;
        let payload_len = (size - 1) as usize;

        let compression = match Compression::from_id(id) {
            Some(compression) => compression,
            None if self.lenient => {
                match self.fixer.unknown_compression(x, z, id, self.compression)? {
                    Some(compression) => compression,
                    None => return Ok(empty_reader()),
                }
            }
            None => {
                return Err(malformed(format!(
                    "cell [{}, {}] has unknown compression id {}",
                    x, z, id
                )))
            }
        };

        if external {
            if payload_len > 0 {
                if !self.lenient {
                    return Err(malformed(format!(
                        "cell [{}, {}] has both inline and overflow payload",
                        x, z
                    )));
                }
                self.fixer.conflicting_payload(x, z, payload_len)?;
            }

            let path = self.overflow_path(x, z);
            if path.is_file() {
                let file = File::open(&path)?;
                return Ok(self.wrap_reader(compression, file));
            }

            if !self.lenient {
                return Err(malformed(format!(
                    "overflow file for cell [{}, {}] does not exist",
                    x, z
                )));
            }
            self.fixer.missing_overflow_file(x, z, &path)?;

            if payload_len == 0 {
                return Ok(empty_reader());
            }
            // Otherwise fall back to the inline payload
        }

        let available = buf.len() - CHUNK_HEADER_SIZE;
        if payload_len > available {
            if self.lenient {
                return self.fixer.truncated_payload(x, z, available, payload_len);
            }
            return Err(malformed(format!(
                "cell [{}, {}] payload is truncated: {} of {} bytes present",
                x, z, available, payload_len
            )));
        }

        let mut buf = buf;
        buf.truncate(CHUNK_HEADER_SIZE + payload_len);
        let mut inline = Cursor::new(buf);
        inline.set_position(CHUNK_HEADER_SIZE as u64);

        Ok(self.wrap_reader(compression, inline))
    }

    fn wrap_reader<R: Read + Send + 'static>(&self, compression: Compression, source: R) -> ChunkReader {
        let decoded = compression.wrap_reader(source);
        if self.buffered {
            Box::new(BufReader::new(decoded))
        } else {
            decoded
        }
    }

    // =========================================================================
    // Validating a Cell
    // =========================================================================

    /// Best-effort probe of the 5-byte cell header
    ///
    /// Returns false on any I/O error, truncation, non-positive size or
    /// unknown compression. Overflow cells defer to the overflow file's
    /// existence. The payload itself is not validated.
    pub fn chunk_exists(&self, x: i32, z: i32) -> bool {
        let index = cell_index(x, z);
        let mut header = [0u8; CHUNK_HEADER_SIZE];

        let (loc, read) = {
            let mut io = self.io.lock();
            let loc = io.header.location(index);
            if loc.is_empty() {
                return false;
            }
            match read_at(&mut io.file, sector_pos(loc.offset()), &mut header) {
                Ok(read) => (loc, read),
                Err(_) => return false,
            }
        };

        if read < CHUNK_HEADER_SIZE {
            return false;
        }

        let mut cursor = &header[..];
        let size = cursor.get_i32();
        if size <= 0 {
            return false;
        }

        let flags = cursor.get_u8();
        if Compression::from_id(flags & COMPRESSION_MASK).is_none() {
            return false;
        }

        let payload_len = (size - 1) as usize;
        if flags & EXTERNAL_FLAG != 0 {
            if payload_len > 0 {
                return false;
            }
            return self.overflow_path(x, z).is_file();
        }

        payload_len <= loc.count() * SECTOR_SIZE
    }

    /// Whether the header has an entry for the cell (no payload check)
    pub fn has_chunk(&self, x: i32, z: i32) -> bool {
        !self.io.lock().header.location(cell_index(x, z)).is_empty()
    }

    /// Last write time of the cell in seconds since epoch, 0 if absent
    pub fn timestamp(&self, x: i32, z: i32) -> u32 {
        self.io.lock().header.timestamp(cell_index(x, z))
    }

    /// Location entry of the cell
    pub fn location(&self, x: i32, z: i32) -> Location {
        self.io.lock().header.location(cell_index(x, z))
    }

    /// Every present cell, in table order
    pub fn entries(&self) -> Vec<CellEntry> {
        let io = self.io.lock();
        (0..SECTOR_INTS)
            .filter_map(|index| {
                let location = io.header.location(index);
                (!location.is_empty()).then(|| CellEntry {
                    local_x: index % 32,
                    local_z: index / 32,
                    location,
                    timestamp: io.header.timestamp(index),
                })
            })
            .collect()
    }

    // =========================================================================
    // Writing a Cell
    // =========================================================================

    /// Open a writer for the cell using this file's default compression
    ///
    /// Nothing reaches the file until [`ChunkWriter::finish`].
    pub fn write_chunk(&self, x: i32, z: i32) -> ChunkWriter<'_> {
        self.write_chunk_with(x, z, self.compression)
    }

    /// Open a writer for the cell with an explicit compression mode
    pub fn write_chunk_with(&self, x: i32, z: i32, compression: Compression) -> ChunkWriter<'_> {
        ChunkWriter::new(Target::Borrowed(self), x, z, compression, self.buffered)
    }

    /// Encode and store a whole cell
    pub fn write_chunk_bytes(&self, x: i32, z: i32, data: &[u8]) -> Result<()> {
        let mut writer = self.write_chunk(x, z);
        writer.write_all(data)?;
        writer.finish()
    }

    /// Place an encoded cell buffer
    ///
    /// `buf` is `[size placeholder (4)][compression id (1)][payload]`.
    ///
    /// Commit order:
    /// 1. inline bytes (full cell or overflow stub) at the reallocated offset
    /// 2. header entry and timestamp, then the header page
    /// 3. rename the staged overflow file into place, or delete a stale one
    ///
    /// A crash between 2 and 3 leaves the header pointing at an overflow file
    /// that is not yet in place.
    pub(crate) fn commit_chunk(
        &self,
        x: i32,
        z: i32,
        compression: Compression,
        mut buf: Vec<u8>,
    ) -> Result<()> {
        let index = cell_index(x, z);
        let old = self.io.lock().header.location(index);
        let needed = sectors_for(buf.len());
        let overflow_path = self.overflow_path(x, z);

        if needed >= OVERFLOW_THRESHOLD {
            let offset = self.sectors.reallocate(old.offset(), old.count(), 1);

            // Stage next to the final name so the rename stays atomic. The
            // temp file is removed on drop if anything below fails.
            let mut staged = NamedTempFile::new_in(&self.directory)?;
            staged.write_all(&buf[CHUNK_HEADER_SIZE..])?;
            staged.flush()?;

            let stub = overflow_stub(compression);
            self.store(index, offset, 1, &stub)?;

            staged.persist(&overflow_path).map_err(|e| e.error)?;
        } else {
            let size = (buf.len() - 4) as u32;
            buf[..4].copy_from_slice(&size.to_be_bytes());

            let offset = self.sectors.reallocate(old.offset(), old.count(), needed);
            self.store(index, offset, needed, &buf)?;

            remove_if_exists(&overflow_path)?;
        }

        Ok(())
    }

    /// Steps 1 and 2 of a commit, under the I/O lock
    fn store(&self, index: usize, offset: usize, count: usize, inline: &[u8]) -> Result<()> {
        let mut io = self.io.lock();
        self.write_at(&mut io.file, sector_pos(offset), inline)?;

        io.header.set_location(index, Location::new(offset, count));
        io.header.set_timestamp(index, seconds_since_epoch());
        self.write_header(&mut io)
    }

    // =========================================================================
    // Removing a Cell
    // =========================================================================

    /// Free the cell's sectors, zero its entries and delete any overflow file
    ///
    /// The header is persisted even if deleting the overflow file fails.
    pub fn remove_chunk(&self, x: i32, z: i32) -> Result<()> {
        let index = cell_index(x, z);
        let mut io = self.io.lock();

        let loc = io.header.location(index);
        if loc.is_empty() {
            return Ok(());
        }

        self.sectors.free(loc.offset(), loc.count());
        io.header.set_location(index, Location::EMPTY);
        io.header.set_timestamp(index, 0);

        let removed = remove_if_exists(&self.overflow_path(x, z));
        let written = self.write_header(&mut io);

        removed?;
        written
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding overflow files
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Compression used for new cells
    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient
    }

    pub fn is_buffered(&self) -> bool {
        self.buffered
    }

    /// One past the highest occupied sector
    pub fn sector_space(&self) -> usize {
        self.sectors.sector_space()
    }

    /// Whether a sector is currently occupied
    pub fn is_sector_allocated(&self, sector: usize) -> bool {
        self.sectors.is_allocated(sector)
    }

    /// Path of the overflow file for absolute cell coordinates
    pub fn overflow_path(&self, x: i32, z: i32) -> PathBuf {
        self.directory.join(overflow_file_name(x, z))
    }
}

impl Drop for RegionFile {
    fn drop(&mut self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        if let Err(e) = self.flush() {
            tracing::warn!("Failed to flush region file {} on drop: {}", self.path.display(), e);
        }
    }
}

impl fmt::Debug for RegionFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegionFile")
            .field("path", &self.path)
            .field("compression", &self.compression)
            .field("lenient", &self.lenient)
            .field("buffered", &self.buffered)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Header Parsing
// =============================================================================

/// Read the header page and replay live entries into the allocator
///
/// An empty file is a new region and has nothing to read.
fn read_header(
    io: &mut RegionIo,
    sectors: &SectorAllocator,
    lenient: bool,
    fixer: &dyn RegionFixer,
) -> Result<()> {
    let mut page = vec![0u8; HEADER_SIZE];
    let read = read_at(&mut io.file, 0, &mut page)?;

    if read == 0 {
        return Ok(());
    }

    if read < HEADER_SIZE {
        if !lenient {
            return Err(malformed(format!(
                "truncated header: {} of {} bytes present",
                read, HEADER_SIZE
            )));
        }
        fixer.truncated_header(read, HEADER_SIZE)?;
        return Ok(());
    }

    let file_size = io.file.metadata()?.len();
    io.header = RegionHeader::decode(&page);

    for index in 0..SECTOR_INTS {
        let loc = io.header.location(index);
        if loc.is_empty() {
            continue;
        }

        if loc.offset() < HEADER_SECTORS {
            if !lenient {
                return Err(malformed(format!(
                    "cell #{} offset {} overlaps the header",
                    index,
                    loc.offset()
                )));
            }
            fixer.chunk_overlaps_header(index)?;
            io.header.set_location(index, Location::EMPTY);
        } else if loc.count() == 0 {
            if lenient {
                fixer.zero_sector_chunk(index)?;
            }
            io.header.set_location(index, Location::EMPTY);
        } else if sector_pos(loc.offset()) > file_size {
            if !lenient {
                return Err(malformed(format!(
                    "cell #{} starts at sector {}, beyond the file size of {} bytes",
                    index,
                    loc.offset(),
                    file_size
                )));
            }
            fixer.chunk_out_of_file_size(index)?;
            io.header.set_location(index, Location::EMPTY);
        } else if !sectors.allocate(loc.offset(), loc.count()) && lenient {
            fixer.chunks_share_sectors(index)?;
        }
    }

    Ok(())
}

// =============================================================================
// Private Helpers
// =============================================================================

fn malformed(message: String) -> RegionError {
    RegionError::Malformed(message)
}

fn sector_pos(sector: usize) -> u64 {
    (sector * SECTOR_SIZE) as u64
}

/// Fill as much of `buf` as the file holds from `pos`; returns bytes read
fn read_at(file: &mut File, pos: u64, buf: &mut [u8]) -> io::Result<usize> {
    file.seek(SeekFrom::Start(pos))?;

    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Inline stub of an overflow cell: size 1, external flag, compression id
fn overflow_stub(compression: Compression) -> [u8; CHUNK_HEADER_SIZE] {
    let mut stub = [0u8; CHUNK_HEADER_SIZE];
    stub[..4].copy_from_slice(&1u32.to_be_bytes());
    stub[4] = compression.id() | EXTERNAL_FLAG;
    stub
}

fn seconds_since_epoch() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
