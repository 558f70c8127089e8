//! xrelay Relayer - Off-chain relay orchestrator
//!
//! One monitor runs per direction. Each watches its source endpoint for
//! `Initiated` notifications and, for every one it has not handled yet:
//!
//! 1. requests an attestation of the log's `(block, position)` coordinate
//! 2. polls the proof job with a bounded attempt budget
//! 3. submits the attestation to the destination's validator
//! 4. executes the destination-side action named by the `Validated` log
//!
//! Chained continuations are not re-relayed by hand: chaining emits a fresh
//! `Initiated` log on the destination, which the reverse monitor picks up
//! from the shared notification bus.
//!
//! # Safety
//!
//! The relayer holds no protocol state. A lost race against another relayer
//! surfaces as `ReplayedProof` from the destination, never as a double
//! execution. The dedupe set only avoids repeated work within one process.

pub mod client;
pub mod config;
pub mod dedupe;
pub mod metrics;
pub mod relayer;

pub use client::LedgerClient;
pub use self::config::{LoggingConfig, PollingConfig, ProofServiceConfig, RelaySettings, RelayerConfig};
pub use dedupe::SeenLogs;
pub use metrics::{RelayerMetrics, RelayerMetricsSnapshot};
pub use relayer::{RelayLink, RelayReport, Relayer};

use thiserror::Error;
use xrelay_attestation::{JobId, ProofServiceError};
use xrelay_ledger::EndpointError;

/// Reasons a single relay attempt is abandoned
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Proof request failed: {0}")]
    ProofRequest(#[from] ProofServiceError),

    #[error("Proof job {job_id} failed: {reason}")]
    ProofFailed { job_id: JobId, reason: String },

    #[error("Proof job {job_id} not ready after {attempts} polls")]
    ProofTimeout { job_id: JobId, attempts: u32 },

    #[error("Proof of job {job_id} is not valid base64: {reason}")]
    ProofDecode { job_id: JobId, reason: String },

    #[error("Validation rejected: {0}")]
    Submission(EndpointError),

    #[error("Validation committed without a Validated notification")]
    MissingValidation,

    #[error("Execution rejected: {0}")]
    Execution(EndpointError),

    #[error("Relay attempt cancelled")]
    Cancelled,
}

impl RelayError {
    /// Whether another relayer already consumed this proof
    pub fn is_replay(&self) -> bool {
        matches!(self, RelayError::Submission(EndpointError::ReplayedProof { .. }))
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
