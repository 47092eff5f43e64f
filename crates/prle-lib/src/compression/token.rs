//! Token model for the RLE stream.
//!
//! The stream has no header. Each token is identified by its first byte:
//! - `FF count value` is `count` copies of `value`
//! - `FE byte` is `byte` taken verbatim (used for the two flag values)
//! - any other byte is the byte itself
//!
//! Encoder, boundary reconciliation and decompression resynchronization all
//! go through this module, so it is the only place the flag values appear.

/// First byte of a run token: `[FLAG_RUN] [count] [value]`.
pub const FLAG_RUN: u8 = 0xFF;
/// First byte of an escaped literal: `[FLAG_ESCAPE] [byte]`.
pub const FLAG_ESCAPE: u8 = 0xFE;
/// Minimum run length emitted as a run token.
pub const RUN_THRESHOLD: usize = 3;
/// Maximum repetitions a single run token can carry.
pub const MAX_RUN: usize = u8::MAX as usize;
/// Longest encoded token, in bytes.
pub const MAX_TOKEN_LEN: usize = 3;

/// Returns true if `byte` collides with one of the flag values.
#[inline]
pub fn is_flag(byte: u8) -> bool {
    byte == FLAG_RUN || byte == FLAG_ESCAPE
}

/// Encoded size of the token whose first byte is `control`.
#[inline]
pub fn encoded_len_from_control(control: u8) -> usize {
    match control {
        FLAG_RUN => 3,
        FLAG_ESCAPE => 2,
        _ => 1,
    }
}

/// One unit of the compressed format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token {
    /// `count` consecutive copies of `value`.
    Run { count: u8, value: u8 },
    /// A literal byte equal to a flag value.
    Escaped(u8),
    /// A literal byte that needs no escaping.
    LiteralByte(u8),
}

impl Token {
    /// Literal token for a single byte, escaped if needed.
    #[inline]
    pub fn literal(byte: u8) -> Self {
        if is_flag(byte) {
            Token::Escaped(byte)
        } else {
            Token::LiteralByte(byte)
        }
    }

    /// The byte value this token expands to.
    #[inline]
    pub fn value(self) -> u8 {
        match self {
            Token::Run { value, .. } => value,
            Token::Escaped(byte) | Token::LiteralByte(byte) => byte,
        }
    }

    /// Number of raw bytes this token expands to.
    #[inline]
    pub fn decoded_len(self) -> usize {
        match self {
            Token::Run { count, .. } => count as usize,
            Token::Escaped(_) | Token::LiteralByte(_) => 1,
        }
    }

    /// Number of bytes this token occupies in the stream.
    #[inline]
    pub fn encoded_len(self) -> usize {
        match self {
            Token::Run { .. } => 3,
            Token::Escaped(_) => 2,
            Token::LiteralByte(_) => 1,
        }
    }

    /// Append the encoded form of this token to `out`.
    pub fn write_to(self, out: &mut Vec<u8>) {
        match self {
            Token::Run { count, value } => out.extend_from_slice(&[FLAG_RUN, count, value]),
            Token::Escaped(byte) => out.extend_from_slice(&[FLAG_ESCAPE, byte]),
            Token::LiteralByte(byte) => out.push(byte),
        }
    }

    /// Append the raw bytes this token stands for to `out`.
    pub fn expand_into(self, out: &mut Vec<u8>) {
        match self {
            Token::Run { count, value } => out.resize(out.len() + count as usize, value),
            Token::Escaped(byte) | Token::LiteralByte(byte) => out.push(byte),
        }
    }

    /// Parse the token at the start of `data`.
    ///
    /// Returns `None` when `data` is empty or ends before the token does.
    pub fn parse(data: &[u8]) -> Option<Self> {
        match *data {
            [FLAG_RUN, count, value, ..] => Some(Token::Run { count, value }),
            [FLAG_RUN, ..] => None,
            [FLAG_ESCAPE, byte, ..] => Some(Token::Escaped(byte)),
            [FLAG_ESCAPE] => None,
            [byte, ..] => Some(Token::LiteralByte(byte)),
            [] => None,
        }
    }
}

/// Iterator over the tokens of an encoded buffer.
///
/// Stops at the end of the buffer or at a trailing token that is cut short.
#[derive(Clone, Debug)]
pub struct TokenIter<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> TokenIter<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Offset of the next token to be parsed.
    pub fn position(&self) -> usize {
        self.pos
    }
}

impl Iterator for TokenIter<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        let token = Token::parse(self.data.get(self.pos..)?)?;
        self.pos += token.encoded_len();
        Some(token)
    }
}

/// Canonical tokens for one maximal run of `length` copies of `value`.
///
/// Yields 255-sized run tokens while at least 255 copies remain, then one run
/// token for a remainder of 3 or more, or individual literals for a shorter
/// remainder. This is exactly what the encoder produces for such a run.
pub fn run_tokens(value: u8, length: usize) -> RunTokens {
    RunTokens { value, remaining: length }
}

#[derive(Clone, Debug)]
pub struct RunTokens {
    value: u8,
    remaining: usize,
}

impl Iterator for RunTokens {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        match self.remaining {
            0 => None,
            n if n >= RUN_THRESHOLD => {
                let count = n.min(MAX_RUN);
                self.remaining -= count;
                Some(Token::Run { count: count as u8, value: self.value })
            }
            _ => {
                self.remaining -= 1;
                Some(Token::literal(self.value))
            }
        }
    }
}
