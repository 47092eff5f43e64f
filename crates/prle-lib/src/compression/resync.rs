//! Token resynchronization for parallel decompression.
//!
//! The compressed file is split at arbitrary byte offsets, so a rank's range
//! may start in the middle of a token. Tokens are not self-synchronizing
//! (`FE FF 03 41` reads differently from each offset), so a rank cannot find
//! the first token boundary by scanning its own bytes. Instead:
//!
//! - every rank walks its range once for each possible *entry offset* (the
//!   number of its leading bytes covered by a token started earlier, at most
//!   `MAX_TOKEN_LEN - 1`) and records the matching *exit offset*;
//! - entry offsets are then resolved left to right: rank 0 enters at 0, and
//!   each rank looks up its exit for the entry it received and passes it on;
//! - each rank decodes the tokens that start inside its range, reading the
//!   tail of the last one from the lookahead.
//!
//! The walks run in parallel; the left-to-right pass is one table lookup per
//! rank.

use anyhow::Result;
use tracing::debug;

use super::token::{encoded_len_from_control, Token, MAX_TOKEN_LEN};
use crate::comm::{Communicator, Message};
use crate::io::RawChunk;

/// Lookahead needed to finish the last token of a range.
pub const DECOMPRESS_LOOKAHEAD: usize = MAX_TOKEN_LEN - 1;

/// Exit offset of `range` when its first `entry` bytes belong to an earlier
/// token: how far past the end of the range the last token starting inside
/// it extends.
pub fn exit_offset(range: &[u8], entry: usize) -> usize {
    let mut pos = entry;
    while pos < range.len() {
        pos += encoded_len_from_control(range[pos]);
    }
    pos - range.len()
}

/// Exit offsets for every possible entry offset.
pub fn exit_table(range: &[u8]) -> [usize; MAX_TOKEN_LEN] {
    std::array::from_fn(|entry| exit_offset(range, entry))
}

/// Resolve this rank's entry offset with its neighbours.
pub fn resolve_entry(comm: &Communicator, chunk: &RawChunk) -> Result<usize> {
    let owned = chunk.owned();
    let exits = exit_table(owned);

    let entry = match comm.prev() {
        Some(prev) => comm.recv_entry_offset(prev)? as usize,
        None => 0,
    };
    let exit = match exits.get(entry) {
        Some(&exit) => exit,
        None => anyhow::bail!("rank {}: entry offset {} exceeds the longest token", comm.rank(), entry),
    };
    debug!(entry, exit, "token boundary resolved");

    if let Some(next) = comm.next() {
        comm.send(next, Message::EntryOffset(exit as u64))?;
    }
    Ok(entry)
}

/// Decode the tokens that start inside this rank's range.
///
/// A token cut short by the end of the file is dropped, as in sequential
/// decoding.
pub fn decode_range(chunk: &RawChunk, entry: usize) -> Vec<u8> {
    let bytes = chunk.bytes();
    let owned_len = chunk.owned().len();
    let mut decoded = Vec::with_capacity(owned_len * 2);
    let mut pos = entry;

    while pos < owned_len {
        let Some(token) = Token::parse(&bytes[pos..]) else {
            break;
        };
        token.expand_into(&mut decoded);
        pos += token.encoded_len();
    }
    decoded
}
