//! Single-process path: the whole file in memory, one codec call.
//!
//! Its output is the reference the parallel path must reproduce byte for byte.

use anyhow::Result;
use std::path::Path;
use tracing::info;

use super::rle;
use crate::io;

/// Compress `input` into `output`. Returns (input bytes, output bytes).
pub(super) fn compress_file(input: &Path, output: &Path) -> Result<(u64, u64)> {
    let data = io::read_file(input)?;
    info!("Read {} bytes from {:?}", data.len(), input);
    let encoded = rle::encode(&data);
    io::write_file(output, &encoded)?;
    Ok((data.len() as u64, encoded.len() as u64))
}

/// Decompress `input` into `output`. Returns (input bytes, output bytes).
pub(super) fn decompress_file(input: &Path, output: &Path) -> Result<(u64, u64)> {
    let encoded = io::read_file(input)?;
    info!("Read {} bytes from {:?}", encoded.len(), input);
    let decoded = rle::decode(&encoded);
    io::write_file(output, &decoded)?;
    Ok((encoded.len() as u64, decoded.len() as u64))
}
