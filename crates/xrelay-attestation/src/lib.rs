//! xrelay Attestation - Proof generation and verification
//!
//! The relayer never inspects proofs. It asks a `ProofService` for an
//! attestation of one source log, polls until the job settles, and hands the
//! decoded bytes to the destination endpoint, whose `AttestationVerifier`
//! decides whether they are sound.
//!
//! This crate provides:
//! - `ProofService`: the asynchronous job API (request, then poll)
//! - `HttpProofService`: client for a remote attestation service
//! - `LocalProver`: in-process service signing logs read from local endpoints
//! - `SignedAttestation` / `SignedAttestationVerifier`: ed25519-signed log attestations

pub mod http;
pub mod local;
pub mod service;
pub mod signed;

pub use http::HttpProofService;
pub use local::LocalProver;
pub use service::{decode_proof, encode_proof, JobId, ProofRequest, ProofService, ProofStatus};
pub use signed::{AttestationSigner, SignedAttestation, SignedAttestationVerifier};

use thiserror::Error;
use xrelay_core::ChainId;

/// Proof service errors
#[derive(Error, Debug)]
pub enum ProofServiceError {
    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Proof service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid proof service response: {0}")]
    InvalidResponse(String),

    #[error("Unknown proof job: {0}")]
    UnknownJob(JobId),

    #[error("No source endpoint registered for chain {0}")]
    UnknownChain(ChainId),

    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

pub type Result<T> = std::result::Result<T, ProofServiceError>;
