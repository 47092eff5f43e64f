//! File access: whole-file helpers for the sequential path and per-rank
//! chunk reads for the parallel path.

mod chunk;

pub use chunk::{ChunkLayout, RawChunk};

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// Read an entire file into memory.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to open input file: {:?}", path))
}

/// Create (or truncate) `path` and write `data` to it.
pub fn write_file(path: &Path, data: &[u8]) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create output file: {:?}", path))?;
    let mut writer = std::io::BufWriter::with_capacity(4 * 1024 * 1024, file);
    writer
        .write_all(data)
        .with_context(|| format!("Failed to write output file: {:?}", path))?;
    writer
        .flush()
        .with_context(|| format!("Failed to write output file: {:?}", path))?;
    Ok(())
}
