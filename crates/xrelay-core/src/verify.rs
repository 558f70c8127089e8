//! Attestation verification seam
//!
//! The proof format is opaque to the protocol: a verifier turns attestation
//! bytes into the origin and raw log they vouch for, or rejects them.

use thiserror::Error;

use crate::types::{Address, ChainId, Word};

/// Log contents vouched for by a verified attestation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedLog {
    pub origin_chain_id: ChainId,
    pub origin_contract: Address,
    pub topics: Vec<Word>,
    pub data: Vec<u8>,
}

/// Reasons a verifier rejects attestation bytes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("Attestation could not be parsed: {message}")]
    Unparsable { message: String },

    #[error("Attestation is not in canonical encoding")]
    NonCanonical,

    #[error("Attestation signature invalid")]
    BadSignature,

    #[error("Attestation signed by untrusted key {signer}")]
    UntrustedSigner { signer: String },

    #[error("Attestation covers log {actual}, caller asked for {expected}")]
    PositionMismatch { expected: u32, actual: u32 },
}

/// Turns opaque attestation bytes into a verified log
pub trait AttestationVerifier: Send + Sync {
    fn verify(
        &self,
        position_in_block: u32,
        attestation: &[u8],
    ) -> std::result::Result<VerifiedLog, VerifyError>;
}
