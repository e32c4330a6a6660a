//! Gzip encoding for cache entry files.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::{Error, Result};

/// Compress `raw` with gzip at `level` (0-9, clamped).
pub fn compress(raw: &[u8], level: u32) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(
        Vec::with_capacity(raw.len() / 4),
        Compression::new(level.min(9)),
    );
    encoder
        .write_all(raw)
        .map_err(|e| Error::Compression(format!("Failed to compress entry: {e}")))?;
    encoder
        .finish()
        .map_err(|e| Error::Compression(format!("Failed to finish gzip stream: {e}")))
}

/// Decompress a gzip stream produced by [`compress`].
pub fn decompress(compressed: &[u8]) -> Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(compressed);
    let mut raw = Vec::with_capacity(compressed.len() * 4);
    decoder
        .read_to_end(&mut raw)
        .map_err(|e| Error::Compression(format!("Failed to decompress entry: {e}")))?;
    Ok(raw)
}
