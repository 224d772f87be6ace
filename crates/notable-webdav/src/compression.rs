//! Gzip framing for payloads on the wire
//!
//! Uploads are always compressed. Downloads sniff the gzip magic number so
//! files written by older clients without compression still read back.

use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn is_gzip(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[..2] == GZIP_MAGIC
}

pub fn compress(bytes: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}

/// Inflate gzip data; anything else is returned unchanged
pub fn decompress_if_gzip(bytes: Vec<u8>) -> std::io::Result<Vec<u8>> {
    if !is_gzip(&bytes) {
        return Ok(bytes);
    }
    let mut out = Vec::with_capacity(bytes.len() * 4);
    GzDecoder::new(bytes.as_slice()).read_to_end(&mut out)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compressed_payload_starts_with_magic() {
        let packed = compress(br#"{"page":{}}"#).unwrap();
        assert!(is_gzip(&packed));
        assert_eq!(decompress_if_gzip(packed).unwrap(), br#"{"page":{}}"#);
    }

    #[test]
    fn plain_payload_passes_through() {
        let legacy = b"{\"legacy\":true}".to_vec();
        assert_eq!(decompress_if_gzip(legacy.clone()).unwrap(), legacy);
        assert_eq!(decompress_if_gzip(Vec::new()).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn truncated_gzip_is_an_error() {
        let mut packed = compress(&[7u8; 512]).unwrap();
        packed.truncate(12);
        assert!(decompress_if_gzip(packed).is_err());
    }
}
