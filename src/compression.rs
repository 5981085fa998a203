//! Cell compression modes
//!
//! A region file tags every cell with a one-byte compression id. The region
//! layer never interprets payloads; it only asks this module to wrap a raw
//! byte stream for reading or writing.
//!
//! | Id | Mode          | Stream format     |
//! |----|---------------|-------------------|
//! | 1  | Gzip          | RFC 1952          |
//! | 2  | Zlib          | RFC 1950 (deflate)|
//! | 3  | Uncompressed  | raw bytes         |

use std::fmt;
use std::io::{self, Read, Write};

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};

use crate::error::{RegionError, Result};

/// Compression mode of a single cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Compression {
    /// Gzip stream (the default for new cells)
    #[default]
    Gzip = 1,
    /// Zlib-wrapped deflate stream
    Zlib = 2,
    /// No compression
    Uncompressed = 3,
}

impl Compression {
    /// All modes, in id order
    pub const ALL: [Compression; 3] = [
        Compression::Gzip,
        Compression::Zlib,
        Compression::Uncompressed,
    ];

    /// Convert from the on-disk id
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(Compression::Gzip),
            2 => Some(Compression::Zlib),
            3 => Some(Compression::Uncompressed),
            _ => None,
        }
    }

    /// Like [`Compression::from_id`], but fails with `UnknownCompression`
    pub fn try_from_id(id: u8) -> Result<Self> {
        Self::from_id(id).ok_or(RegionError::UnknownCompression(id))
    }

    /// The on-disk id (1..=3)
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Wrap a compressed stream so that reads yield decoded bytes
    pub fn wrap_reader<'a, R>(self, inner: R) -> Box<dyn Read + Send + 'a>
    where
        R: Read + Send + 'a,
    {
        match self {
            Compression::Gzip => Box::new(GzDecoder::new(inner)),
            Compression::Zlib => Box::new(ZlibDecoder::new(inner)),
            Compression::Uncompressed => Box::new(inner),
        }
    }

    /// Wrap a sink so that writes are encoded with this mode
    pub fn wrap_writer<W: Write>(self, inner: W) -> Encoder<W> {
        match self {
            Compression::Gzip => Encoder::Gzip(GzEncoder::new(inner, flate2::Compression::default())),
            Compression::Zlib => {
                Encoder::Zlib(ZlibEncoder::new(inner, flate2::Compression::default()))
            }
            Compression::Uncompressed => Encoder::Raw(inner),
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compression::Gzip => "gzip",
            Compression::Zlib => "zlib",
            Compression::Uncompressed => "uncompressed",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Compression {
    type Err = RegionError;

    /// Accepts a mode name or its on-disk id
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(id) = s.parse::<u8>() {
            return Self::try_from_id(id);
        }

        match s.to_ascii_lowercase().as_str() {
            "gzip" | "gz" => Ok(Compression::Gzip),
            "zlib" | "deflate" => Ok(Compression::Zlib),
            "none" | "raw" | "uncompressed" => Ok(Compression::Uncompressed),
            other => Err(RegionError::Config(format!(
                "unknown compression mode '{}'",
                other
            ))),
        }
    }
}

/// Encoding writer returned by [`Compression::wrap_writer`]
///
/// Compressed modes need a trailer, so callers must call [`Encoder::finish`]
/// to get the inner sink back with a complete stream in it.
pub enum Encoder<W: Write> {
    Gzip(GzEncoder<W>),
    Zlib(ZlibEncoder<W>),
    Raw(W),
}

impl<W: Write> Encoder<W> {
    /// Write any trailer and return the inner sink
    pub fn finish(self) -> io::Result<W> {
        match self {
            Encoder::Gzip(e) => e.finish(),
            Encoder::Zlib(e) => e.finish(),
            Encoder::Raw(w) => Ok(w),
        }
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Encoder::Gzip(e) => e.write(buf),
            Encoder::Zlib(e) => e.write(buf),
            Encoder::Raw(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Encoder::Gzip(e) => e.flush(),
            Encoder::Zlib(e) => e.flush(),
            Encoder::Raw(w) => w.flush(),
        }
    }
}

/// Compress a whole buffer
pub fn compress(data: &[u8], mode: Compression) -> Result<Vec<u8>> {
    let mut encoder = mode.wrap_writer(Vec::with_capacity(data.len()));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Decompress a whole buffer
pub fn decompress(data: &[u8], mode: Compression) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    mode.wrap_reader(data).read_to_end(&mut out)?;
    Ok(out)
}
