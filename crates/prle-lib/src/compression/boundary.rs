//! Boundary reconciliation between neighbouring ranks.
//!
//! Each rank compresses its chunk on its own, so a run that crosses a chunk
//! split comes out as two (or more) partial encodings. The rank where the run
//! starts takes ownership of the whole run: it extends its trailing tokens by
//! the number of bytes its right neighbour reports, and every rank that holds
//! a continuation drops those leading tokens. After this, concatenating the
//! buffers in rank order gives exactly the single-process encoding.
//!
//! Per rank, the exchange is:
//! 1. last raw byte → right neighbour, `last_byte_prev` ← left neighbour;
//! 2. `fusion_length_to_prev` = length of the leading run if it continues the
//!    left neighbour's last byte;
//! 3. `fusion_length_to_prev` → left neighbour, `fusion_length_from_next` ←
//!    right neighbour;
//! 4. tail extension by `fusion_length_from_next`;
//! 5. head trimming of `fusion_length_to_prev` bytes.
//!
//! A chunk that is a single run continuing on both sides owns none of it. It
//! forwards its own length plus whatever its right neighbour reported, so only
//! such fully covered ranks wait on their right neighbour before sending left.

use anyhow::Result;
use tracing::debug;

use super::token::{run_tokens, Token, TokenIter};
use crate::comm::{Communicator, Message};
use crate::io::RawChunk;

/// What one rank learned about its two boundaries during reconciliation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FusionDescriptor {
    /// Last raw byte of the left neighbour's chunk.
    pub last_byte_prev: Option<u8>,
    /// First raw byte of the right neighbour's chunk (from the lookahead).
    pub first_byte_next: Option<u8>,
    /// Leading bytes handed over to the rank that owns the run, including any
    /// forwarded from further right.
    pub fusion_length_to_prev: u64,
    /// Bytes of this rank's trailing run that live in later chunks.
    pub fusion_length_from_next: u64,
}

/// Reconcile this rank's compressed buffer with its neighbours.
///
/// `local` must be the encoding of `chunk.owned()`. Single-rank jobs are
/// left untouched.
pub fn reconcile(comm: &Communicator, chunk: &RawChunk, local: &mut Vec<u8>) -> Result<FusionDescriptor> {
    if comm.size() == 1 {
        return Ok(FusionDescriptor::default());
    }

    let owned = chunk.owned();

    // Step 1: boundary bytes travel left to right
    if let Some(next) = comm.next() {
        comm.send(next, Message::BoundaryByte(chunk.last_byte()))?;
    }
    let last_byte_prev = match comm.prev() {
        Some(prev) => comm.recv_boundary_byte(prev)?,
        None => None,
    };

    // Step 2: how much of our head continues the left neighbour's run
    let leading = match (last_byte_prev, chunk.first_byte()) {
        (Some(prev_byte), Some(first)) if prev_byte == first => leading_run_len(owned) as u64,
        _ => 0,
    };
    let first_byte_next = chunk.lookahead_byte();
    let continues_into_next = first_byte_next.is_some() && first_byte_next == chunk.last_byte();
    let fully_covered = leading > 0 && leading == owned.len() as u64;

    // Step 3: fusion lengths travel right to left
    let (fusion_length_to_prev, fusion_length_from_next) = if fully_covered && continues_into_next {
        let from_next = recv_from_next(comm)?;
        let to_prev = leading + from_next;
        send_to_prev(comm, to_prev)?;
        (to_prev, from_next)
    } else {
        send_to_prev(comm, leading)?;
        (leading, recv_from_next(comm)?)
    };

    if continues_into_next != (fusion_length_from_next > 0) {
        anyhow::bail!(
            "rank {}: right neighbour reported {} fused bytes but the lookahead says the run {}",
            comm.rank(),
            fusion_length_from_next,
            if continues_into_next { "continues" } else { "ends here" }
        );
    }

    let descriptor = FusionDescriptor {
        last_byte_prev,
        first_byte_next,
        fusion_length_to_prev,
        fusion_length_from_next,
    };
    debug!(?descriptor, "boundary exchange complete");

    // Steps 4 and 5 on the token list
    let mut tokens: Vec<Token> = TokenIter::new(local.as_slice()).collect();
    if let Some(last) = chunk.last_byte() {
        extend_tail(&mut tokens, last, fusion_length_from_next);
    }
    trim_head(&mut tokens, fusion_length_to_prev);

    local.clear();
    for token in tokens {
        token.write_to(local);
    }

    Ok(descriptor)
}

fn send_to_prev(comm: &Communicator, len: u64) -> Result<()> {
    match comm.prev() {
        Some(prev) => comm.send(prev, Message::FusionLength(len)),
        None => Ok(()),
    }
}

fn recv_from_next(comm: &Communicator) -> Result<u64> {
    match comm.next() {
        Some(next) => comm.recv_fusion_length(next),
        None => Ok(0),
    }
}

/// Length of the run of `data[0]` at the start of `data`.
pub fn leading_run_len(data: &[u8]) -> usize {
    match data.first() {
        Some(&first) => data.iter().take_while(|&&b| b == first).count(),
        None => 0,
    }
}

/// Absorb `extra` more copies of `value` into the trailing run.
///
/// The trailing tokens that expand to `value` (run tokens and plain or escaped
/// literals alike) are replaced by the canonical encoding of the combined
/// length, so a run that grows past 255 is split the same way the encoder
/// splits it.
pub fn extend_tail(tokens: &mut Vec<Token>, value: u8, extra: u64) {
    if extra == 0 {
        return;
    }

    let tail_start = tokens
        .iter()
        .rposition(|t| t.value() != value)
        .map_or(0, |i| i + 1);
    let tail_len: usize = tokens[tail_start..].iter().map(|t| t.decoded_len()).sum();
    tokens.truncate(tail_start);
    tokens.extend(run_tokens(value, tail_len + extra as usize));
}

/// Drop whole tokens from the front until at least `absorbed` raw bytes have
/// been removed, or the buffer is empty. Returns the bytes actually removed.
pub fn trim_head(tokens: &mut Vec<Token>, absorbed: u64) -> u64 {
    let mut removed = 0u64;
    let mut count = 0;
    for token in tokens.iter() {
        if removed >= absorbed {
            break;
        }
        removed += token.decoded_len() as u64;
        count += 1;
    }
    tokens.drain(..count);
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm;
    use crate::compression::rle;
    use crate::compression::token::{FLAG_ESCAPE, FLAG_RUN};

    /// Compress `data` across `size` ranks through the full exchange and
    /// return the concatenated result.
    fn compress_split(data: &[u8], size: usize) -> Vec<u8> {
        let results = comm::launch(size, |comm| {
            let chunk = RawChunk::from_file_bytes(data, comm.rank(), comm.size(), 1);
            let mut local = rle::encode(chunk.owned());
            reconcile(&comm, &chunk, &mut local)?;
            Ok(local)
        });
        comm::first_failure(results).unwrap().concat()
    }

    fn assert_matches_sequential(data: &[u8], max_ranks: usize) {
        let expected = rle::encode(data);
        for size in 1..=max_ranks {
            assert_eq!(compress_split(data, size), expected, "mismatch with {} ranks for {:?}", size, data);
        }
    }

    #[test]
    fn test_leading_run_len() {
        assert_eq!(leading_run_len(&[]), 0);
        assert_eq!(leading_run_len(&[5]), 1);
        assert_eq!(leading_run_len(&[5, 5, 5, 6, 5]), 3);
    }

    #[test]
    fn test_extend_tail_run_token() {
        let mut tokens = vec![Token::LiteralByte(1), Token::Run { count: 4, value: 2 }];
        extend_tail(&mut tokens, 2, 3);
        assert_eq!(tokens, vec![Token::LiteralByte(1), Token::Run { count: 7, value: 2 }]);
    }

    #[test]
    fn test_extend_tail_literals_become_run() {
        let mut tokens = vec![Token::LiteralByte(1), Token::LiteralByte(2), Token::LiteralByte(2)];
        extend_tail(&mut tokens, 2, 1);
        assert_eq!(tokens, vec![Token::LiteralByte(1), Token::Run { count: 3, value: 2 }]);
    }

    #[test]
    fn test_extend_tail_stays_literal_below_threshold() {
        let mut tokens = vec![Token::Escaped(FLAG_ESCAPE)];
        extend_tail(&mut tokens, FLAG_ESCAPE, 1);
        assert_eq!(tokens, vec![Token::Escaped(FLAG_ESCAPE), Token::Escaped(FLAG_ESCAPE)]);
    }

    #[test]
    fn test_extend_tail_splits_past_255() {
        let mut tokens = vec![Token::Run { count: 200, value: 9 }];
        extend_tail(&mut tokens, 9, 100);
        assert_eq!(
            tokens,
            vec![Token::Run { count: 255, value: 9 }, Token::Run { count: 45, value: 9 }]
        );
    }

    #[test]
    fn test_extend_tail_merges_split_run() {
        // 256 copies encode as Run(255) + literal; both belong to the tail
        let mut tokens: Vec<Token> = TokenIter::new(&rle::encode(&[9u8; 256])).collect();
        extend_tail(&mut tokens, 9, 2);
        assert_eq!(tokens, vec![Token::Run { count: 255, value: 9 }, Token::Run { count: 3, value: 9 }]);
    }

    #[test]
    fn test_trim_head() {
        let mut tokens = vec![
            Token::Run { count: 5, value: 1 },
            Token::Escaped(FLAG_RUN),
            Token::LiteralByte(3),
        ];
        assert_eq!(trim_head(&mut tokens, 5), 5);
        assert_eq!(tokens, vec![Token::Escaped(FLAG_RUN), Token::LiteralByte(3)]);
        assert_eq!(trim_head(&mut tokens, 0), 0);
        assert_eq!(trim_head(&mut tokens, 10), 2);
        assert!(tokens.is_empty());
    }

    #[test]
    fn test_boundary_in_middle_of_run() {
        // AAAA BBB AA
        assert_matches_sequential(&[65, 65, 65, 65, 66, 66, 66, 65, 65], 9);
    }

    #[test]
    fn test_boundary_between_runs() {
        let data = [65, 65, 65, 65, 66, 66, 66, 66];
        assert_eq!(compress_split(&data, 2), [FLAG_RUN, 4, 65, FLAG_RUN, 4, 66]);
        assert_matches_sequential(&data, 8);
    }

    #[test]
    fn test_boundary_cases_from_reference_suite() {
        let cases: [&[u8]; 5] = [
            &[66, 66, 66, 66, 66, 66],
            &[65, 65, 66, 66, 66],
            &[66, 66, 66, 65, 65],
            &[65, 65, 65, 65, 65, 65],
            &[67, 65, 66, 66, 66, 67],
        ];
        for data in cases {
            assert_matches_sequential(data, 8);
        }
    }

    #[test]
    fn test_run_spanning_many_ranks() {
        let mut data = vec![7u8; 40];
        data.push(8);
        data.extend(std::iter::repeat(7u8).take(2));
        assert_matches_sequential(&data, 16);
    }

    #[test]
    fn test_run_longer_than_255_across_boundary() {
        let mut data = vec![1u8, 2];
        data.extend(std::iter::repeat(3u8).take(700));
        data.extend_from_slice(&[FLAG_RUN, FLAG_RUN, 4]);
        let expected = rle::encode(&data);
        for size in [2, 3, 4, 5, 7, 11] {
            assert_eq!(compress_split(&data, size), expected, "{} ranks", size);
        }
    }

    #[test]
    fn test_flag_bytes_at_boundaries() {
        let data = [FLAG_RUN, FLAG_RUN, FLAG_ESCAPE, FLAG_ESCAPE, FLAG_ESCAPE, FLAG_RUN, 0, FLAG_ESCAPE, FLAG_ESCAPE];
        assert_matches_sequential(&data, 9);
    }

    #[test]
    fn test_more_ranks_than_bytes() {
        assert_matches_sequential(&[4, 4, 4], 6);
        assert_matches_sequential(&[], 3);
    }

    #[test]
    fn test_descriptor_reports_fusion() {
        // AAA|AAB with 2 ranks: rank 1 hands 2 bytes to rank 0
        let data = [65, 65, 65, 65, 65, 66];
        let results = comm::launch(2, |comm| {
            let chunk = RawChunk::from_file_bytes(&data, comm.rank(), comm.size(), 1);
            let mut local = rle::encode(chunk.owned());
            reconcile(&comm, &chunk, &mut local)
        });
        let descriptors = comm::first_failure(results).unwrap();
        assert_eq!(descriptors[0].fusion_length_from_next, 2);
        assert_eq!(descriptors[0].first_byte_next, Some(65));
        assert_eq!(descriptors[1].fusion_length_to_prev, 2);
        assert_eq!(descriptors[1].last_byte_prev, Some(65));
    }
}
