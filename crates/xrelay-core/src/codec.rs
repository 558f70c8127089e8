//! Word-aligned encoding of notification data
//!
//! Notification data blobs use the contract ABI layout: static values are
//! single 32-byte words, a dynamic byte sequence is `offset | length | bytes`
//! right-padded to a word boundary.

use crate::error::{CodecError, Result};
use crate::types::Word;

/// Size of one ABI word
pub const WORD_SIZE: usize = 32;

/// Encode a single dynamic byte sequence
pub fn encode_bytes(data: &[u8]) -> Vec<u8> {
    let padded_len = data.len().div_ceil(WORD_SIZE) * WORD_SIZE;
    let mut out = Vec::with_capacity(2 * WORD_SIZE + padded_len);
    out.extend_from_slice(&Word::from_u64(WORD_SIZE as u64).0);
    out.extend_from_slice(&Word::from_u64(data.len() as u64).0);
    out.extend_from_slice(data);
    out.resize(2 * WORD_SIZE + padded_len, 0);
    out
}

/// Decode a blob holding exactly one dynamic byte sequence
pub fn decode_bytes(blob: &[u8]) -> Result<Vec<u8>> {
    let offset = to_usize(read_word(blob, 0)?.to_u64()?)?;
    let length = to_usize(read_word(blob, offset)?.to_u64()?)?;
    let start = offset
        .checked_add(WORD_SIZE)
        .ok_or_else(|| malformed("offset overflow"))?;
    let end = start
        .checked_add(length)
        .ok_or_else(|| malformed("length overflow"))?;
    if end > blob.len() {
        return Err(malformed(format!(
            "byte sequence of {} bytes runs past blob end ({} bytes)",
            length,
            blob.len()
        )));
    }
    Ok(blob[start..end].to_vec())
}

/// Decode a blob holding exactly one static word
pub fn decode_word(blob: &[u8]) -> Result<Word> {
    if blob.len() != WORD_SIZE {
        return Err(CodecError::InvalidLength {
            what: "word",
            expected: WORD_SIZE,
            actual: blob.len(),
        });
    }
    read_word(blob, 0)
}

fn read_word(blob: &[u8], at: usize) -> Result<Word> {
    let end = at
        .checked_add(WORD_SIZE)
        .ok_or_else(|| malformed("word offset overflow"))?;
    let slice = blob
        .get(at..end)
        .ok_or_else(|| malformed(format!("no word at offset {}", at)))?;
    Word::from_slice(slice)
}

fn to_usize(value: u64) -> Result<usize> {
    usize::try_from(value).map_err(|_| malformed(format!("{} does not fit in usize", value)))
}

fn malformed(message: impl Into<String>) -> CodecError {
    CodecError::MalformedBytes {
        message: message.into(),
    }
}
