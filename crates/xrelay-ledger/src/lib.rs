//! xrelay Ledger - In-process endpoint for the cross-chain action relay
//!
//! An endpoint is:
//! - An Action Registry keyed by `ActionId`
//! - A Proof Validator turning attestations into single-use pending records
//! - An Executor dispatching payloads to registered handlers, with chaining
//! - A block/log producer publishing notifications on a shared bus
//!
//! # Invariants
//!
//! 1. A proof fingerprint is consumed at most once and never pruned
//! 2. A settled record is never returned to a prior state
//! 3. Every call either commits all of its effects as one block or none
//! 4. Handler side effects are staged and discarded on failure

pub mod bus;
pub mod chain;
pub mod endpoint;
pub mod handler;
pub mod registry;

pub use bus::NotificationBus;
pub use chain::TxReceipt;
pub use endpoint::{Endpoint, EndpointConfig, ExecutionFailure, ExecutionReceipt, Validation};
pub use handler::{ActionHandler, ExecutionContext, HandlerError, HandlerSet};
pub use registry::ActionRegistry;

use thiserror::Error;
use xrelay_core::{ActionId, ActionState, Fingerprint, Selector};

/// Errors returned by endpoint operations
///
/// Every variant is terminal for the call that produced it and leaves the
/// endpoint unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Configuration error: selector {selector} is not registered for cross-chain calls")]
    Configuration { selector: Selector },

    #[error("Action payload must not be empty")]
    EmptyPayload,

    #[error("Attestation invalid: {reason}")]
    AttestationInvalid { reason: String },

    #[error("Malformed notification: {reason}")]
    MalformedNotification { reason: String },

    #[error("Proof {fingerprint} was already used")]
    ReplayedProof { fingerprint: Fingerprint },

    #[error("Action {action_id} is in state {state}, expected an executable PENDING record")]
    InvalidActionState {
        action_id: ActionId,
        state: ActionState,
    },

    #[error("Action id {action_id} collides with a settled record")]
    ActionIdCollision { action_id: ActionId },
}

pub type Result<T> = std::result::Result<T, EndpointError>;
