//! xrelay Core - Canonical types for the cross-chain action relay
//!
//! This crate implements the foundational primitives shared by endpoints,
//! provers and relayers:
//! - Identity types: `Address`, `EndpointId`, `ActionId`, `Selector`, `Fingerprint`
//! - `ActionRecord`: the tracked lifecycle of one cross-chain action
//! - `Notification` / `LogEntry`: what endpoints emit and relayers consume
//! - Keccak-256 derivations for action ids, proof fingerprints and topics
//! - The `AttestationVerifier` seam used by proof validation
//!
//! # Protocol Invariants
//!
//! 1. A proof fingerprint validates at most one action, ever
//! 2. Action state only advances `None -> Pending -> {Completed | Chaining}`
//! 3. Topic positions of the `Initiated` notification are fixed:
//!    `[signature, action_id, initiator, selector]`

pub mod codec;
pub mod error;
pub mod hash;
pub mod notification;
pub mod record;
pub mod types;
pub mod verify;

pub use codec::*;
pub use error::*;
pub use hash::*;
pub use notification::*;
pub use record::*;
pub use types::*;
pub use verify::*;
