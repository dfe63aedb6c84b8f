//! Compression for bulky payloads (full chunk snapshots).
//!
//! Snapshot bytes are deflated and then base64 encoded so they can travel
//! inside a JSON packet.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::ProtoError;

/// Default deflate level for snapshots.
pub const DEFAULT_LEVEL: u32 = 6;

/// Deflate-compress raw bytes.
pub fn compress(data: &[u8], level: u32) -> Result<Vec<u8>, ProtoError> {
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(level));
    encoder
        .write_all(data)
        .map_err(|e| ProtoError::CompressError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| ProtoError::CompressError(e.to_string()))
}

/// Inflate deflate-compressed bytes.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>, ProtoError> {
    use flate2::read::DeflateDecoder;
    use std::io::Read;

    let mut decoder = DeflateDecoder::new(data);
    let mut output = Vec::new();
    decoder
        .read_to_end(&mut output)
        .map_err(|e| ProtoError::DecompressError(e.to_string()))?;
    Ok(output)
}

/// Compress and base64 encode.
pub fn pack(data: &[u8]) -> Result<String, ProtoError> {
    Ok(STANDARD.encode(compress(data, DEFAULT_LEVEL)?))
}

/// Reverse of [`pack`].
pub fn unpack(encoded: &str) -> Result<Vec<u8>, ProtoError> {
    let compressed = STANDARD
        .decode(encoded)
        .map_err(|e| ProtoError::Base64(e.to_string()))?;
    decompress(&compressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deflate_roundtrip() {
        let data = b"Hello, chunk! Hello, chunk! Hello, chunk!";
        let compressed = compress(data, DEFAULT_LEVEL).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(&compressed).unwrap(), data);
    }

    #[test]
    fn pack_is_ascii() {
        let packed = pack(&[0u8; 1024]).unwrap();
        assert!(packed.is_ascii());
        assert_eq!(unpack(&packed).unwrap(), vec![0u8; 1024]);
    }

    #[test]
    fn unpack_rejects_bad_base64() {
        assert!(matches!(unpack("!!!"), Err(ProtoError::Base64(_))));
    }

    #[test]
    fn empty_roundtrip() {
        let packed = pack(b"").unwrap();
        assert!(unpack(&packed).unwrap().is_empty());
    }
}
