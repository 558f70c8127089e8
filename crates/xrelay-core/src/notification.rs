//! Protocol notifications and the logs that carry them
//!
//! Notifications are emitted by endpoints as topic/data logs. The relayer and
//! the attestation service only ever see the log form; `Notification` is the
//! typed view over it.

use serde::{Deserialize, Serialize};

use crate::codec::{decode_bytes, decode_word, encode_bytes};
use crate::error::{CodecError, Result};
use crate::hash::signature_topic;
use crate::types::{ActionId, Address, ChainId, EndpointId, Fingerprint, Selector, TxHash, Word};

/// Canonical signature of the initiated notification
pub const INITIATED_SIGNATURE: &str = "ActionInitiated(bytes32,address,bytes4,bytes)";
/// Canonical signature of the validated notification
pub const VALIDATED_SIGNATURE: &str = "ActionValidated(bytes32,address,bytes32)";
/// Canonical signature of the completed notification
pub const COMPLETED_SIGNATURE: &str = "ActionCompleted(bytes32,bool)";
/// Canonical signature of the chained notification
pub const CHAINED_SIGNATURE: &str = "ActionChained(bytes32,bytes32,address,bytes4)";

/// Topics carried by an `Initiated` log: signature plus three indexed fields
pub const INITIATED_TOPIC_COUNT: usize = 4;

/// Notifications produced at the protocol boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Notification {
    /// A new action was created and awaits relay
    Initiated {
        action_id: ActionId,
        initiator: Address,
        selector: Selector,
        payload: Vec<u8>,
    },

    /// An attestation was accepted and a pending record stored
    Validated {
        action_id: ActionId,
        initiator: Address,
        proof_fingerprint: Fingerprint,
    },

    /// Execution finished; `success == false` means the record was deleted
    Completed { action_id: ActionId, success: bool },

    /// Execution spawned a follow-on action
    Chained {
        previous_id: ActionId,
        next_id: ActionId,
        initiator: Address,
        next_selector: Selector,
    },
}

impl Notification {
    pub fn name(&self) -> &'static str {
        match self {
            Notification::Initiated { .. } => "Initiated",
            Notification::Validated { .. } => "Validated",
            Notification::Completed { .. } => "Completed",
            Notification::Chained { .. } => "Chained",
        }
    }

    /// The action this notification is primarily about
    pub fn action_id(&self) -> ActionId {
        match self {
            Notification::Initiated { action_id, .. }
            | Notification::Validated { action_id, .. }
            | Notification::Completed { action_id, .. } => *action_id,
            Notification::Chained { previous_id, .. } => *previous_id,
        }
    }

    /// Encode into indexed topics and a data blob
    pub fn encode(&self) -> (Vec<Word>, Vec<u8>) {
        match self {
            Notification::Initiated {
                action_id,
                initiator,
                selector,
                payload,
            } => (
                vec![
                    signature_topic(INITIATED_SIGNATURE),
                    Word::from(*action_id),
                    Word::from(*initiator),
                    Word::from(*selector),
                ],
                encode_bytes(payload),
            ),
            Notification::Validated {
                action_id,
                initiator,
                proof_fingerprint,
            } => (
                vec![
                    signature_topic(VALIDATED_SIGNATURE),
                    Word::from(*action_id),
                    Word::from(*initiator),
                ],
                Word::from(*proof_fingerprint).0.to_vec(),
            ),
            Notification::Completed { action_id, success } => (
                vec![signature_topic(COMPLETED_SIGNATURE), Word::from(*action_id)],
                Word::from_bool(*success).0.to_vec(),
            ),
            Notification::Chained {
                previous_id,
                next_id,
                initiator,
                next_selector,
            } => (
                vec![
                    signature_topic(CHAINED_SIGNATURE),
                    Word::from(*previous_id),
                    Word::from(*next_id),
                    Word::from(*initiator),
                ],
                Word::from(*next_selector).0.to_vec(),
            ),
        }
    }

    /// Decode a log back into a typed notification
    pub fn decode(topics: &[Word], data: &[u8]) -> Result<Self> {
        let signature = topics.first().ok_or(CodecError::TopicCount {
            name: "any",
            expected: 1,
            actual: 0,
        })?;

        if *signature == signature_topic(INITIATED_SIGNATURE) {
            expect_topics("Initiated", topics, INITIATED_TOPIC_COUNT)?;
            Ok(Notification::Initiated {
                action_id: topics[1].to_action_id(),
                initiator: topics[2].to_address()?,
                selector: topics[3].to_selector()?,
                payload: decode_bytes(data)?,
            })
        } else if *signature == signature_topic(VALIDATED_SIGNATURE) {
            expect_topics("Validated", topics, 3)?;
            Ok(Notification::Validated {
                action_id: topics[1].to_action_id(),
                initiator: topics[2].to_address()?,
                proof_fingerprint: decode_word(data)?.to_fingerprint(),
            })
        } else if *signature == signature_topic(COMPLETED_SIGNATURE) {
            expect_topics("Completed", topics, 2)?;
            Ok(Notification::Completed {
                action_id: topics[1].to_action_id(),
                success: decode_word(data)?.to_bool()?,
            })
        } else if *signature == signature_topic(CHAINED_SIGNATURE) {
            expect_topics("Chained", topics, 4)?;
            Ok(Notification::Chained {
                previous_id: topics[1].to_action_id(),
                next_id: topics[2].to_action_id(),
                initiator: topics[3].to_address()?,
                next_selector: decode_word(data)?.to_selector()?,
            })
        } else {
            Err(CodecError::UnknownSignature {
                topic: signature.to_string(),
            })
        }
    }
}

fn expect_topics(name: &'static str, topics: &[Word], expected: usize) -> Result<()> {
    if topics.len() != expected {
        return Err(CodecError::TopicCount {
            name,
            expected,
            actual: topics.len(),
        });
    }
    Ok(())
}

// ============================================================================
// Logs
// ============================================================================

/// Where a log sits on its ledger; unique per emitted notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogCoordinate {
    pub chain_id: ChainId,
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub log_index: u32,
}

/// A notification as committed by an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub emitter: EndpointId,
    pub block_number: u64,
    pub tx_hash: TxHash,
    /// Position of the log within its block
    pub log_index: u32,
    pub topics: Vec<Word>,
    pub data: Vec<u8>,
}

impl LogEntry {
    pub fn coordinate(&self) -> LogCoordinate {
        LogCoordinate {
            chain_id: self.emitter.chain_id,
            block_number: self.block_number,
            tx_hash: self.tx_hash,
            log_index: self.log_index,
        }
    }

    pub fn notification(&self) -> Result<Notification> {
        Notification::decode(&self.topics, &self.data)
    }
}
