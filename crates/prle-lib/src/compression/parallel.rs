//! Per-rank pipelines for the parallel path.
//!
//! Compression: read chunk (1-byte lookahead) → encode → reconcile boundaries
//! → gather at root.
//! Decompression: read chunk (2-byte lookahead) → resolve token boundary →
//! decode → gather at root.

use anyhow::Result;
use std::path::Path;
use tracing::debug;

use super::{boundary, collector, resync, rle};
use crate::comm::Communicator;
use crate::io::RawChunk;

/// Lookahead needed to see whether the last run continues.
pub const COMPRESS_LOOKAHEAD: usize = 1;

/// What one rank contributed to a parallel run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(super) struct RankSummary {
    /// Size of the whole input file.
    pub file_size: u64,
    /// Bytes written by this rank (non-zero only at the root).
    pub written: u64,
}

pub(super) fn compress_rank(comm: &Communicator, input: &Path, output: &Path) -> Result<RankSummary> {
    let chunk = RawChunk::read(input, comm.rank(), comm.size(), COMPRESS_LOOKAHEAD)?;
    let layout = *chunk.layout();

    let mut local = rle::encode(chunk.owned());
    let encoded_len = local.len();
    let fusion = boundary::reconcile(comm, &chunk, &mut local)?;
    debug!(
        offset = layout.offset_start,
        chunk_size = layout.chunk_size,
        encoded_len,
        reconciled_len = local.len(),
        to_prev = fusion.fusion_length_to_prev,
        from_next = fusion.fusion_length_from_next,
        "chunk compressed"
    );

    let written = collector::gather_and_write(comm, local, output)?;
    Ok(RankSummary { file_size: layout.file_size, written: written as u64 })
}

pub(super) fn decompress_rank(comm: &Communicator, input: &Path, output: &Path) -> Result<RankSummary> {
    let chunk = RawChunk::read(input, comm.rank(), comm.size(), resync::DECOMPRESS_LOOKAHEAD)?;
    let layout = *chunk.layout();

    let entry = resync::resolve_entry(comm, &chunk)?;
    let local = resync::decode_range(&chunk, entry);
    debug!(
        offset = layout.offset_start,
        chunk_size = layout.chunk_size,
        entry,
        decoded_len = local.len(),
        "chunk decompressed"
    );

    let written = collector::gather_and_write(comm, local, output)?;
    Ok(RankSummary { file_size: layout.file_size, written: written as u64 })
}
