//! Minimal Solidity ABI codec for the deal registry contract.
//!
//! Only the shapes the contract uses are supported: `string`, `uint256`
//! and dynamic arrays of `(uint256 id, string selectorPath)` tuples.

use sha3::{Digest, Keccak256};

use super::models::LedgerFact;
use crate::deals::DealId;
use crate::error::LedgerError;

pub const ADD_DEALS_SIGNATURE: &str = "addDeals(string,(uint256,string)[])";
pub const LATEST_N_DEALS_SIGNATURE: &str = "latestNDeals(string,uint256)";

const WORD: usize = 32;

/// First four bytes of the Keccak-256 hash of a canonical signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let digest = Keccak256::digest(signature.as_bytes());
    [digest[0], digest[1], digest[2], digest[3]]
}

fn uint_word(value: u64) -> [u8; WORD] {
    let mut word = [0u8; WORD];
    word[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    word
}

fn offset_word(value: usize) -> [u8; WORD] {
    uint_word(value as u64)
}

fn padded_len(len: usize) -> usize {
    len.div_ceil(WORD) * WORD
}

/// Length word followed by the right-padded payload.
fn encode_string(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(WORD + padded_len(bytes.len()));
    out.extend_from_slice(&offset_word(bytes.len()));
    out.extend_from_slice(bytes);
    out.resize(WORD + padded_len(bytes.len()), 0);
    out
}

fn encode_fact(fact: &LedgerFact) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&uint_word(fact.deal_id.0));
    out.extend_from_slice(&offset_word(2 * WORD));
    out.extend_from_slice(&encode_string(&fact.selector_path));
    out
}

fn encode_fact_array(facts: &[LedgerFact]) -> Vec<u8> {
    let encoded: Vec<Vec<u8>> = facts.iter().map(encode_fact).collect();

    let mut out = Vec::new();
    out.extend_from_slice(&offset_word(facts.len()));

    let mut offset = facts.len() * WORD;
    for element in &encoded {
        out.extend_from_slice(&offset_word(offset));
        offset += element.len();
    }
    for element in encoded {
        out.extend_from_slice(&element);
    }
    out
}

/// Calldata for `addDeals(pub, deals)`.
pub fn encode_add_deals(publisher: &str, facts: &[LedgerFact]) -> Vec<u8> {
    let publisher = encode_string(publisher);
    let deals = encode_fact_array(facts);

    let mut out = Vec::with_capacity(4 + 2 * WORD + publisher.len() + deals.len());
    out.extend_from_slice(&selector(ADD_DEALS_SIGNATURE));
    out.extend_from_slice(&offset_word(2 * WORD));
    out.extend_from_slice(&offset_word(2 * WORD + publisher.len()));
    out.extend_from_slice(&publisher);
    out.extend_from_slice(&deals);
    out
}

/// Calldata for `latestNDeals(pub, n)`.
pub fn encode_latest_n_deals(publisher: &str, n: u64) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&selector(LATEST_N_DEALS_SIGNATURE));
    out.extend_from_slice(&offset_word(2 * WORD));
    out.extend_from_slice(&uint_word(n));
    out.extend_from_slice(&encode_string(publisher));
    out
}

fn word_at(data: &[u8], at: usize) -> Result<&[u8], LedgerError> {
    at.checked_add(WORD)
        .and_then(|end| data.get(at..end))
        .ok_or_else(|| LedgerError::Abi(format!("word at {} out of bounds ({} bytes)", at, data.len())))
}

fn u64_at(data: &[u8], at: usize) -> Result<u64, LedgerError> {
    let word = word_at(data, at)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(LedgerError::Abi(format!("value at {} exceeds 64 bits", at)));
    }
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&word[WORD - 8..]);
    Ok(u64::from_be_bytes(raw))
}

fn usize_at(data: &[u8], at: usize) -> Result<usize, LedgerError> {
    let value = u64_at(data, at)?;
    usize::try_from(value).map_err(|_| LedgerError::Abi(format!("offset {} too large", value)))
}

fn relative(base: usize, offset: usize) -> Result<usize, LedgerError> {
    base.checked_add(offset)
        .ok_or_else(|| LedgerError::Abi("offset overflow".to_string()))
}

fn string_at(data: &[u8], at: usize) -> Result<String, LedgerError> {
    let len = usize_at(data, at)?;
    let start = relative(at, WORD)?;
    let bytes = relative(start, len)
        .ok()
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| LedgerError::Abi(format!("string at {} out of bounds", at)))?;
    String::from_utf8(bytes.to_vec()).map_err(|e| LedgerError::Abi(format!("string at {}: {}", at, e)))
}

/// Decode the `(uint256,string)[]` returned by `latestNDeals`.
pub fn decode_fact_array_output(data: &[u8]) -> Result<Vec<LedgerFact>, LedgerError> {
    let array_at = usize_at(data, 0)?;
    let count = usize_at(data, array_at)?;
    if count > data.len() / WORD {
        return Err(LedgerError::Abi(format!("array length {} exceeds payload", count)));
    }

    let elements_at = relative(array_at, WORD)?;
    let mut facts = Vec::with_capacity(count);
    for index in 0..count {
        let tuple_at = relative(elements_at, usize_at(data, elements_at + index * WORD)?)?;
        let deal_id = u64_at(data, tuple_at)?;
        let path_at = relative(tuple_at, usize_at(data, relative(tuple_at, WORD)?)?)?;
        facts.push(LedgerFact {
            deal_id: DealId(deal_id),
            selector_path: string_at(data, path_at)?,
        });
    }
    Ok(facts)
}
