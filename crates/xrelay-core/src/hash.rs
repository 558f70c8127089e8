//! Hashing utilities for xrelay
//!
//! All protocol hashes are Keccak-256 over word-encoded fields.

use sha3::{Digest, Keccak256};

use crate::codec::encode_bytes;
use crate::types::{ActionId, Address, ChainId, Fingerprint, Selector, Word};

/// Compute Keccak-256 hash of data
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    Keccak256::digest(data).into()
}

/// Compute hash of multiple items
pub fn keccak_all(items: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for item in items {
        hasher.update(item);
    }
    hasher.finalize().into()
}

/// Topic identifying a notification by its canonical signature
pub fn signature_topic(signature: &str) -> Word {
    Word(keccak256(signature.as_bytes()))
}

impl Selector {
    /// First four bytes of the Keccak-256 of a function signature,
    /// e.g. `Selector::from_signature("increment(uint256)")`
    pub fn from_signature(signature: &str) -> Self {
        let hash = keccak256(signature.as_bytes());
        Self([hash[0], hash[1], hash[2], hash[3]])
    }
}

/// Inputs to the action identifier derivation
#[derive(Debug, Clone, Copy)]
pub struct ActionIdInput<'a> {
    pub chain_id: ChainId,
    pub contract: Address,
    pub initiator: Address,
    pub timestamp: u64,
    /// Per-initiator sequence number kept by the endpoint
    pub nonce: u64,
    pub payload: &'a [u8],
}

/// Derive the identifier of a locally created action
pub fn derive_action_id(input: &ActionIdInput<'_>) -> ActionId {
    let payload = encode_bytes(input.payload);
    ActionId(keccak_all(&[
        &Word::from_u64(input.chain_id).0,
        &Word::from(input.contract).0,
        &Word::from(input.initiator).0,
        &Word::from_u64(input.timestamp).0,
        &Word::from_u64(input.nonce).0,
        &payload,
    ]))
}

/// Fingerprint of an attestation, scoped to the origin it claims
pub fn proof_fingerprint(
    origin_chain_id: ChainId,
    origin_contract: Address,
    attestation: &[u8],
) -> Fingerprint {
    Fingerprint(keccak_all(&[
        &Word::from_u64(origin_chain_id).0,
        &Word::from(origin_contract).0,
        attestation,
    ]))
}
