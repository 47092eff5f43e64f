//! Run-Length Encoding (RLE) for arbitrary bytes
//!
//! Runs of 3 or more identical bytes become `[FF count value]` tokens;
//! shorter runs are written as literals, with the two flag values escaped.

use super::token::{Token, TokenIter, MAX_RUN, RUN_THRESHOLD};

/// Apply run-length encoding to a byte buffer.
///
/// Runs longer than 255 are split: the scan takes at most 255 copies, then
/// re-enters at the remainder, which is encoded on its own merits.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(data.len() / 2 + 16);
    encode_into(data, &mut encoded);
    encoded
}

/// Same as [`encode`], appending to an existing buffer.
pub fn encode_into(data: &[u8], encoded: &mut Vec<u8>) {
    let mut i = 0;

    while i < data.len() {
        let value = data[i];
        let run_length = data[i..]
            .iter()
            .take(MAX_RUN)
            .take_while(|&&b| b == value)
            .count();

        if run_length >= RUN_THRESHOLD {
            Token::Run { count: run_length as u8, value }.write_to(encoded);
        } else {
            for _ in 0..run_length {
                Token::literal(value).write_to(encoded);
            }
        }

        i += run_length;
    }
}

/// Decode a run-length encoded buffer.
///
/// A trailing token cut short by the end of the buffer is dropped; decoding
/// stops there and returns what was decoded so far.
pub fn decode(encoded: &[u8]) -> Vec<u8> {
    let mut decoded = Vec::with_capacity(encoded.len() * 2);
    for token in TokenIter::new(encoded) {
        token.expand_into(&mut decoded);
    }
    decoded
}

/// Decoded size of an encoded buffer, without materializing it.
pub fn decoded_len(encoded: &[u8]) -> usize {
    TokenIter::new(encoded).map(Token::decoded_len).sum()
}
