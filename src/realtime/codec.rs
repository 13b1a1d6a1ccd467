//! zlib payload codec
//!
//! Every payload on the wire is zlib-compressed in both directions.

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

/// Compress at the maximum compression level
pub fn compress(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::with_capacity(payload.len() / 2), Compression::best());
    encoder.write_all(payload)?;
    encoder.finish()
}

pub fn decompress(payload: &[u8]) -> io::Result<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(payload);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
