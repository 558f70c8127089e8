//! Block and log production for an in-process endpoint
//!
//! Each committed call becomes one block holding one transaction; the
//! notifications it emits are that block's logs, indexed by position.

use serde::{Deserialize, Serialize};
use xrelay_core::{keccak_all, ActionId, EndpointId, LogEntry, Notification, TxHash, Word};

/// Result of one committed endpoint call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub block_number: u64,
    pub tx_hash: TxHash,
    pub logs: Vec<LogEntry>,
}

impl TxReceipt {
    /// Decoded notifications, skipping logs that do not decode
    pub fn notifications(&self) -> Vec<Notification> {
        self.logs
            .iter()
            .filter_map(|log| log.notification().ok())
            .collect()
    }

    /// Destination-side id carried by a `Validated` log, if any
    pub fn validated_action(&self) -> Option<ActionId> {
        self.notifications().into_iter().find_map(|n| match n {
            Notification::Validated { action_id, .. } => Some(action_id),
            _ => None,
        })
    }

    /// `(previous, next)` ids carried by a `Chained` log, if any
    pub fn chained_action(&self) -> Option<(ActionId, ActionId)> {
        self.notifications().into_iter().find_map(|n| match n {
            Notification::Chained {
                previous_id,
                next_id,
                ..
            } => Some((previous_id, next_id)),
            _ => None,
        })
    }
}

/// Append-only block history
#[derive(Debug)]
pub(crate) struct ChainLog {
    emitter: EndpointId,
    blocks: Vec<Vec<LogEntry>>,
}

impl ChainLog {
    pub(crate) fn new(emitter: EndpointId) -> Self {
        Self {
            emitter,
            blocks: Vec::new(),
        }
    }

    /// Number of the latest block; `0` before the first commit
    pub(crate) fn head(&self) -> u64 {
        self.blocks.len() as u64
    }

    /// Seal `notifications` into the next block
    pub(crate) fn commit(&mut self, call: &str, notifications: Vec<Notification>) -> TxReceipt {
        let block_number = self.head() + 1;
        let tx_hash = TxHash(keccak_all(&[
            &Word::from_u64(self.emitter.chain_id).0,
            &Word::from(self.emitter.contract).0,
            &Word::from_u64(block_number).0,
            call.as_bytes(),
        ]));

        let logs: Vec<LogEntry> = notifications
            .iter()
            .enumerate()
            .map(|(index, notification)| {
                let (topics, data) = notification.encode();
                LogEntry {
                    emitter: self.emitter,
                    block_number,
                    tx_hash,
                    log_index: index as u32,
                    topics,
                    data,
                }
            })
            .collect();

        self.blocks.push(logs.clone());
        TxReceipt {
            block_number,
            tx_hash,
            logs,
        }
    }

    /// All logs in blocks `from_block..=head`
    pub(crate) fn logs_since(&self, from_block: u64) -> Vec<LogEntry> {
        let start = from_block.saturating_sub(1) as usize;
        self.blocks
            .iter()
            .skip(start)
            .flat_map(|block| block.iter().cloned())
            .collect()
    }

    pub(crate) fn log_at(&self, block_number: u64, log_index: u32) -> Option<LogEntry> {
        let block = block_number.checked_sub(1)?;
        self.blocks
            .get(block as usize)?
            .get(log_index as usize)
            .cloned()
    }
}
