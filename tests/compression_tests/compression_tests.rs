//! Tests for cell compression modes
//!
//! These tests verify:
//! - Stream formats per mode (gzip magic, zlib header, raw identity)
//! - Streaming encode through `wrap_writer` and decode through `wrap_reader`
//! - Id and name parsing used by open flags and the CLI
//! - Corrupt input surfaces as an I/O error

use std::io::{Read, Write};

use proptest::prelude::*;
use regionstore::compression::{compress, decompress};
use regionstore::{Compression, RegionError};

// =============================================================================
// Stream Format Tests
// =============================================================================

#[test]
fn test_gzip_stream_has_magic() {
    let encoded = compress(b"hello", Compression::Gzip).unwrap();
    assert_eq!(&encoded[..2], &[0x1f, 0x8b]);
}

#[test]
fn test_zlib_stream_has_header() {
    let encoded = compress(b"hello", Compression::Zlib).unwrap();
    // CMF byte for deflate with a 32K window
    assert_eq!(encoded[0], 0x78);
    assert_eq!(((encoded[0] as u16) << 8 | encoded[1] as u16) % 31, 0);
}

#[test]
fn test_uncompressed_is_identity() {
    let data = b"left exactly as written";
    assert_eq!(compress(data, Compression::Uncompressed).unwrap(), data.to_vec());
    assert_eq!(decompress(data, Compression::Uncompressed).unwrap(), data.to_vec());
}

#[test]
fn test_repetitive_data_shrinks() {
    let data = vec![7u8; 64 * 1024];
    for mode in [Compression::Gzip, Compression::Zlib] {
        let encoded = compress(&data, mode).unwrap();
        assert!(encoded.len() < data.len() / 10, "{} did not compress", mode);
    }
}

#[test]
fn test_empty_input_round_trips() {
    for mode in Compression::ALL {
        let encoded = compress(&[], mode).unwrap();
        assert!(decompress(&encoded, mode).unwrap().is_empty());
    }
}

// =============================================================================
// Streaming Tests
// =============================================================================

#[test]
fn test_streaming_encode_matches_whole_buffer_decode() {
    let parts: [&[u8]; 3] = [b"first part, ", b"second part, ", b"third part"];

    for mode in Compression::ALL {
        let mut encoder = mode.wrap_writer(Vec::new());
        for part in parts {
            encoder.write_all(part).unwrap();
        }
        let encoded = encoder.finish().unwrap();

        let mut decoded = Vec::new();
        mode.wrap_reader(&encoded[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, parts.concat());
    }
}

#[test]
fn test_encoder_writes_after_existing_prefix() {
    let mut prefix = vec![0u8, 0, 0, 0];
    prefix.push(Compression::Zlib.id());

    let mut encoder = Compression::Zlib.wrap_writer(prefix);
    encoder.write_all(b"cell body").unwrap();
    let buf = encoder.finish().unwrap();

    assert_eq!(&buf[..5], &[0, 0, 0, 0, 2]);
    assert_eq!(decompress(&buf[5..], Compression::Zlib).unwrap(), b"cell body");
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_corrupt_gzip_is_io_error() {
    let result = decompress(b"definitely not gzip", Compression::Gzip);
    assert!(matches!(result, Err(RegionError::Io(_))));
}

#[test]
fn test_gzip_reader_rejects_zlib_stream() {
    let encoded = compress(b"wrong wrapper", Compression::Zlib).unwrap();
    assert!(decompress(&encoded, Compression::Gzip).is_err());
}

// =============================================================================
// Naming Tests
// =============================================================================

#[test]
fn test_ids() {
    for mode in Compression::ALL {
        assert_eq!(Compression::from_id(mode.id()), Some(mode));
    }
    assert!(matches!(
        Compression::try_from_id(0),
        Err(RegionError::UnknownCompression(0))
    ));
}

#[test]
fn test_display_parses_back() {
    for mode in Compression::ALL {
        assert_eq!(mode.to_string().parse::<Compression>().unwrap(), mode);
    }
}

#[test]
fn test_parse_aliases() {
    assert_eq!("GZ".parse::<Compression>().unwrap(), Compression::Gzip);
    assert_eq!("deflate".parse::<Compression>().unwrap(), Compression::Zlib);
    assert_eq!("raw".parse::<Compression>().unwrap(), Compression::Uncompressed);
    assert!(matches!(
        "brotli".parse::<Compression>(),
        Err(RegionError::Config(_))
    ));
}

#[test]
fn test_parse_numeric_ids() {
    assert_eq!("1".parse::<Compression>().unwrap(), Compression::Gzip);
    assert_eq!("2".parse::<Compression>().unwrap(), Compression::Zlib);
    assert_eq!("3".parse::<Compression>().unwrap(), Compression::Uncompressed);
    assert!(matches!(
        "0".parse::<Compression>(),
        Err(RegionError::UnknownCompression(0))
    ));
    assert!(matches!(
        "7".parse::<Compression>(),
        Err(RegionError::UnknownCompression(7))
    ));
}

// =============================================================================
// Property Tests
// =============================================================================

proptest! {
    #[test]
    fn prop_decode_inverts_encode(data in prop::collection::vec(any::<u8>(), 0..4096), id in 1u8..=3) {
        let mode = Compression::from_id(id).unwrap();
        let encoded = compress(&data, mode).unwrap();
        prop_assert_eq!(decompress(&encoded, mode).unwrap(), data);
    }
}
