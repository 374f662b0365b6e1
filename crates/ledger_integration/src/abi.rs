//! Minimal Solidity ABI codec for the two ledger getters the board reads.

use alloy_primitives::{keccak256, Address, U256};
use thiserror::Error;

use crate::RawRecord;

pub const WORD_LEN: usize = 32;
pub const RECORD_COUNT_SIGNATURE: &str = "challengeNonce()";
pub const RECORD_AT_SIGNATURE: &str = "challenges(uint256)";
/// `(address, uint256, string, string, uint256, uint256)`
const RECORD_HEAD_WORDS: usize = 6;
const ADDRESS_PADDING: usize = WORD_LEN - 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AbiError {
    #[error("payload truncated: need {needed} bytes, got {actual}")]
    Truncated { needed: usize, actual: usize },
    #[error("address word carries non-zero padding")]
    DirtyAddressPadding,
    #[error("{field} offset {value} is out of range")]
    OutOfRange { field: &'static str, value: String },
    #[error("{field} is not valid utf-8")]
    InvalidUtf8 { field: &'static str },
}

pub fn selector(signature: &str) -> [u8; 4] {
    let digest = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest[..4]);
    out
}

/// Calldata for a function taking only static uint256 arguments.
pub fn encode_call(signature: &str, args: &[U256]) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + args.len() * WORD_LEN);
    data.extend_from_slice(&selector(signature));
    for arg in args {
        data.extend_from_slice(&arg.to_be_bytes::<WORD_LEN>());
    }
    data
}

pub fn decode_uint(data: &[u8]) -> Result<U256, AbiError> {
    read_word(data, 0)
}

pub fn decode_record(data: &[u8]) -> Result<RawRecord, AbiError> {
    ensure_len(data, RECORD_HEAD_WORDS * WORD_LEN)?;
    Ok(RawRecord {
        creator: read_address(data, 0)?,
        id: read_word(data, WORD_LEN)?,
        // Assumes (creator, id, title, body, reward, expires_at); a contract that
        // returns the theorem statement before its name swaps these two slots.
        title: read_string(data, 2 * WORD_LEN, "title")?,
        body: read_string(data, 3 * WORD_LEN, "body")?,
        reward: read_word(data, 4 * WORD_LEN)?,
        expires_at: read_word(data, 5 * WORD_LEN)?,
    })
}

fn ensure_len(data: &[u8], needed: usize) -> Result<(), AbiError> {
    if data.len() < needed {
        return Err(AbiError::Truncated {
            needed,
            actual: data.len(),
        });
    }
    Ok(())
}

fn read_word(data: &[u8], start: usize) -> Result<U256, AbiError> {
    let end = start.checked_add(WORD_LEN).ok_or(AbiError::OutOfRange {
        field: "word",
        value: start.to_string(),
    })?;
    ensure_len(data, end)?;
    Ok(U256::from_be_slice(&data[start..end]))
}

fn read_address(data: &[u8], start: usize) -> Result<Address, AbiError> {
    ensure_len(data, start + WORD_LEN)?;
    let word = &data[start..start + WORD_LEN];
    if word[..ADDRESS_PADDING].iter().any(|byte| *byte != 0) {
        return Err(AbiError::DirtyAddressPadding);
    }
    Ok(Address::from_slice(&word[ADDRESS_PADDING..]))
}

fn to_usize(value: U256, field: &'static str) -> Result<usize, AbiError> {
    usize::try_from(value).map_err(|_| AbiError::OutOfRange {
        field,
        value: value.to_string(),
    })
}

fn read_string(data: &[u8], head: usize, field: &'static str) -> Result<String, AbiError> {
    let offset = to_usize(read_word(data, head)?, field)?;
    let length = to_usize(read_word(data, offset)?, field)?;
    let start = offset + WORD_LEN;
    let end = start.checked_add(length).ok_or(AbiError::OutOfRange {
        field,
        value: length.to_string(),
    })?;
    ensure_len(data, end)?;
    String::from_utf8(data[start..end].to_vec()).map_err(|_| AbiError::InvalidUtf8 { field })
}

#[cfg(test)]
#[path = "tests/abi_tests.rs"]
mod tests;
