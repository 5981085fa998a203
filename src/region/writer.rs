//! Cell writer
//!
//! Buffers an encoded cell in memory. The final size decides how many sectors
//! the cell needs, so nothing is placed until [`ChunkWriter::finish`].

use std::io::{self, BufWriter, Write};
use std::ops::Deref;
use std::sync::Arc;

use crate::compression::{Compression, Encoder};
use crate::error::Result;

use super::file::RegionFile;
use super::{CHUNK_HEADER_SIZE, SECTOR_SIZE};

/// Region file a writer commits to: borrowed from the caller, or shared with
/// a cache
pub(crate) enum Target<'a> {
    Borrowed(&'a RegionFile),
    Shared(Arc<RegionFile>),
}

impl Deref for Target<'_> {
    type Target = RegionFile;

    fn deref(&self) -> &RegionFile {
        match self {
            Target::Borrowed(file) => file,
            Target::Shared(file) => file,
        }
    }
}

enum Stream {
    Plain(Encoder<Vec<u8>>),
    Buffered(BufWriter<Encoder<Vec<u8>>>),
}

/// Write half of a cell
///
/// Bytes written are compressed into an in-memory buffer. [`finish`](Self::finish)
/// is the commit point; dropping the writer without finishing discards the
/// buffered cell and leaves the region file untouched.
pub struct ChunkWriter<'a> {
    target: Target<'a>,
    x: i32,
    z: i32,
    compression: Compression,
    stream: Option<Stream>,
}

impl<'a> ChunkWriter<'a> {
    pub(crate) fn new(
        target: Target<'a>,
        x: i32,
        z: i32,
        compression: Compression,
        buffered: bool,
    ) -> Self {
        // Size field is filled in on commit
        let mut buf = Vec::with_capacity(2 * SECTOR_SIZE);
        buf.extend_from_slice(&[0u8; 4]);
        buf.push(compression.id());
        debug_assert_eq!(buf.len(), CHUNK_HEADER_SIZE);

        let encoder = compression.wrap_writer(buf);
        let stream = if buffered {
            Stream::Buffered(BufWriter::new(encoder))
        } else {
            Stream::Plain(encoder)
        };

        Self {
            target,
            x,
            z,
            compression,
            stream: Some(stream),
        }
    }

    /// Absolute X of the cell
    pub fn x(&self) -> i32 {
        self.x
    }

    /// Absolute Z of the cell
    pub fn z(&self) -> i32 {
        self.z
    }

    /// Compression this cell is written with
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Finish the compressed stream and place the cell in the region file
    pub fn finish(mut self) -> Result<()> {
        let encoder = match self.stream.take() {
            Some(Stream::Plain(encoder)) => encoder,
            Some(Stream::Buffered(writer)) => writer.into_inner().map_err(|e| e.into_error())?,
            None => return Ok(()),
        };
        let buf = encoder.finish()?;

        self.target.commit_chunk(self.x, self.z, self.compression, buf)
    }

    fn stream(&mut self) -> io::Result<&mut Stream> {
        self.stream
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "cell writer already finished"))
    }
}

impl Write for ChunkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.stream()? {
            Stream::Plain(encoder) => encoder.write(buf),
            Stream::Buffered(writer) => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.stream()? {
            Stream::Plain(encoder) => encoder.flush(),
            Stream::Buffered(writer) => writer.flush(),
        }
    }
}

impl Drop for ChunkWriter<'_> {
    fn drop(&mut self) {
        if self.stream.is_some() {
            tracing::debug!(
                "Discarding unfinished write of cell [{}, {}] to {}",
                self.x,
                self.z,
                self.target.path().display()
            );
        }
    }
}

impl ChunkWriter<'static> {
    /// Writer holding a shared handle, for callers that outlive a borrow
    pub(crate) fn shared(
        file: Arc<RegionFile>,
        x: i32,
        z: i32,
        compression: Compression,
    ) -> Self {
        let buffered = file.is_buffered();
        ChunkWriter::new(Target::Shared(file), x, z, compression, buffered)
    }
}
