//! Endpoint - registry, proof validator and executor behind one commit lock
//!
//! All state of an endpoint sits behind a single write lock. A call takes the
//! lock, performs every fallible check, then applies its effects and seals
//! them into one block. A call that returns an error has changed nothing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use xrelay_core::{
    decode_bytes, derive_action_id, proof_fingerprint, signature_topic, ActionId, ActionIdInput,
    ActionRecord, ActionState, Address, AttestationVerifier, EndpointId, Fingerprint, LogEntry,
    Notification, Selector, INITIATED_SIGNATURE, INITIATED_TOPIC_COUNT,
};

use crate::bus::NotificationBus;
use crate::chain::{ChainLog, TxReceipt};
use crate::handler::{ExecutionContext, HandlerSet, StagedWrites};
use crate::registry::ActionRegistry;
use crate::{EndpointError, Result};

/// Static configuration of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// This endpoint
    pub id: EndpointId,
    /// Destination of bridged actions and the only accepted attestation origin
    pub peer: EndpointId,
}

/// Why an execution settled as a failure
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionFailure {
    #[error("No handler registered for selector {selector}")]
    UnknownSelector { selector: Selector },

    #[error("Chained selector {selector} is not registered")]
    UnregisteredChainTarget { selector: Selector },

    #[error("Handler failed: {message}")]
    Handler { message: String },
}

/// Outcome of a committed `execute` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReceipt {
    pub action_id: ActionId,
    pub success: bool,
    pub failure: Option<ExecutionFailure>,
    /// Id of the follow-on action created by chaining
    pub chained: Option<ActionId>,
    pub tx: TxReceipt,
}

/// Outcome of a committed `validate` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Validation {
    pub action_id: ActionId,
    pub proof_fingerprint: Fingerprint,
    pub tx: TxReceipt,
}

#[derive(Debug)]
struct EndpointState {
    registry: ActionRegistry,
    /// Global replay set; grows monotonically
    used_proofs: HashSet<Fingerprint>,
    /// Application storage mutated by handlers
    storage: BTreeMap<String, Vec<u8>>,
    nonces: HashMap<Address, u64>,
    chain: ChainLog,
}

impl EndpointState {
    fn local_action_id(
        &self,
        endpoint: EndpointId,
        initiator: Address,
        timestamp: u64,
        payload: &[u8],
    ) -> (ActionId, u64) {
        let nonce = self.nonces.get(&initiator).copied().unwrap_or(0);
        let id = derive_action_id(&ActionIdInput {
            chain_id: endpoint.chain_id,
            contract: endpoint.contract,
            initiator,
            timestamp,
            nonce,
            payload,
        });
        (id, nonce)
    }

    fn consume_nonce(&mut self, initiator: Address, nonce: u64) {
        self.nonces.insert(initiator, nonce + 1);
    }

    fn apply(&mut self, writes: StagedWrites) {
        for (key, value) in writes {
            match value {
                Some(value) => {
                    self.storage.insert(key, value);
                }
                None => {
                    self.storage.remove(&key);
                }
            }
        }
    }
}

/// One ledger participating in the relay
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Endpoint {
    config: EndpointConfig,
    handlers: Arc<HandlerSet>,
    verifier: Arc<dyn AttestationVerifier>,
    bus: NotificationBus,
    state: Arc<RwLock<EndpointState>>,
}

impl Endpoint {
    pub fn new(
        config: EndpointConfig,
        handlers: HandlerSet,
        verifier: Arc<dyn AttestationVerifier>,
        bus: NotificationBus,
    ) -> Self {
        info!(
            endpoint = %config.id,
            peer = %config.peer,
            selectors = handlers.selectors().len(),
            "endpoint created"
        );
        Self {
            config,
            handlers: Arc::new(handlers),
            verifier,
            bus,
            state: Arc::new(RwLock::new(EndpointState {
                registry: ActionRegistry::new(),
                used_proofs: HashSet::new(),
                storage: BTreeMap::new(),
                nonces: HashMap::new(),
                chain: ChainLog::new(config.id),
            })),
        }
    }

    pub fn id(&self) -> EndpointId {
        self.config.id
    }

    pub fn peer(&self) -> EndpointId {
        self.config.peer
    }

    pub fn bus(&self) -> &NotificationBus {
        &self.bus
    }

    /// Whether `selector` is on the cross-chain allow-list
    pub fn is_registered(&self, selector: &Selector) -> bool {
        self.handlers.contains(selector)
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Initiate an action toward the peer endpoint
    pub async fn bridge(
        &self,
        initiator: Address,
        selector: Selector,
        payload: Vec<u8>,
    ) -> Result<ActionId> {
        if !self.handlers.contains(&selector) {
            return Err(EndpointError::Configuration { selector });
        }
        if payload.is_empty() {
            return Err(EndpointError::EmptyPayload);
        }

        let mut state = self.state.write().await;
        let timestamp = now();
        let (action_id, nonce) =
            state.local_action_id(self.config.id, initiator, timestamp, &payload);
        state.registry.ensure_can_create(&action_id)?;

        let record = ActionRecord {
            source_endpoint: self.config.id,
            destination_endpoint: self.config.peer,
            initiator,
            payload: payload.clone(),
            state: ActionState::Pending,
            timestamp,
            proof_fingerprint: Fingerprint::zero(),
            selector,
            next: None,
        };
        state.registry.create(action_id, record)?;
        state.consume_nonce(initiator, nonce);

        let receipt = state.chain.commit(
            "bridge",
            vec![Notification::Initiated {
                action_id,
                initiator,
                selector,
                payload,
            }],
        );
        self.bus.publish(&receipt.logs);

        info!(
            endpoint = %self.config.id,
            action_id = %action_id,
            selector = %selector,
            block = receipt.block_number,
            "action initiated"
        );
        Ok(action_id)
    }

    /// Validate an attestation and store the action it proves as pending
    pub async fn validate(&self, position_in_block: u32, attestation: &[u8]) -> Result<ActionId> {
        self.validate_with_receipt(position_in_block, attestation)
            .await
            .map(|v| v.action_id)
    }

    /// `validate`, also returning the committed transaction
    pub async fn validate_with_receipt(
        &self,
        position_in_block: u32,
        attestation: &[u8],
    ) -> Result<Validation> {
        let verified = self
            .verifier
            .verify(position_in_block, attestation)
            .map_err(|e| EndpointError::AttestationInvalid {
                reason: e.to_string(),
            })?;

        let origin = EndpointId::new(verified.origin_chain_id, verified.origin_contract);
        if origin != self.config.peer {
            return Err(EndpointError::AttestationInvalid {
                reason: format!("origin {} is not the trusted peer {}", origin, self.config.peer),
            });
        }

        let topics = &verified.topics;
        if topics.len() < INITIATED_TOPIC_COUNT {
            return Err(EndpointError::MalformedNotification {
                reason: format!(
                    "expected at least {} topics, got {}",
                    INITIATED_TOPIC_COUNT,
                    topics.len()
                ),
            });
        }
        if topics[0] != signature_topic(INITIATED_SIGNATURE) {
            return Err(EndpointError::MalformedNotification {
                reason: format!("topic {} is not an initiated notification", topics[0]),
            });
        }

        let fingerprint = proof_fingerprint(origin.chain_id, origin.contract, attestation);

        let mut state = self.state.write().await;
        if state.used_proofs.contains(&fingerprint) {
            warn!(
                endpoint = %self.config.id,
                fingerprint = %fingerprint,
                "replayed proof rejected"
            );
            return Err(EndpointError::ReplayedProof { fingerprint });
        }

        // Fixed positions: [signature, action_id, initiator, selector]
        let action_id = topics[1].to_action_id();
        let initiator = topics[2].to_address().map_err(malformed)?;
        let selector = topics[3].to_selector().map_err(malformed)?;
        let payload = decode_bytes(&verified.data).map_err(malformed)?;

        let record = ActionRecord {
            source_endpoint: origin,
            destination_endpoint: self.config.id,
            initiator,
            payload,
            state: ActionState::Pending,
            timestamp: now(),
            proof_fingerprint: fingerprint,
            selector,
            next: None,
        };
        if let Some(previous) = state.registry.create(action_id, record)? {
            warn!(
                endpoint = %self.config.id,
                action_id = %action_id,
                previous_fingerprint = %previous.proof_fingerprint,
                "pending record overwritten by validation"
            );
        }
        state.used_proofs.insert(fingerprint);

        let tx = state.chain.commit(
            "validate",
            vec![Notification::Validated {
                action_id,
                initiator,
                proof_fingerprint: fingerprint,
            }],
        );
        self.bus.publish(&tx.logs);

        info!(
            endpoint = %self.config.id,
            action_id = %action_id,
            fingerprint = %fingerprint,
            block = tx.block_number,
            "action validated"
        );
        Ok(Validation {
            action_id,
            proof_fingerprint: fingerprint,
            tx,
        })
    }

    /// Execute a validated action, chaining if the handler asks for it
    ///
    /// Handler failures are committed outcomes: the record is deleted and a
    /// `Completed(id, false)` notification emitted.
    pub async fn execute(&self, action_id: ActionId) -> Result<ExecutionReceipt> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let record = match state.registry.get(&action_id) {
            Some(record) if record.is_executable() => record.clone(),
            other => {
                return Err(EndpointError::InvalidActionState {
                    action_id,
                    state: other.map(|r| r.state).unwrap_or(ActionState::None),
                })
            }
        };

        let outcome = match self.handlers.get(&record.selector) {
            None => Err(ExecutionFailure::UnknownSelector {
                selector: record.selector,
            }),
            Some(handler) => {
                let mut ctx = ExecutionContext::new(
                    action_id,
                    record.initiator,
                    record.source_endpoint,
                    &state.storage,
                );
                match handler.handle(&mut ctx, &record.payload) {
                    Ok(()) => {
                        let (writes, next) = ctx.into_effects();
                        match next {
                            Some(next) if !self.handlers.contains(&next.selector) => {
                                Err(ExecutionFailure::UnregisteredChainTarget {
                                    selector: next.selector,
                                })
                            }
                            next => Ok((writes, next)),
                        }
                    }
                    Err(e) => Err(ExecutionFailure::Handler {
                        message: e.to_string(),
                    }),
                }
            }
        };

        let (writes, next) = match outcome {
            Ok(effects) => effects,
            Err(failure) => {
                state.registry.remove(&action_id);
                let tx = state.chain.commit(
                    "execute",
                    vec![Notification::Completed {
                        action_id,
                        success: false,
                    }],
                );
                self.bus.publish(&tx.logs);
                warn!(
                    endpoint = %self.config.id,
                    action_id = %action_id,
                    failure = %failure,
                    "action execution failed, record deleted"
                );
                return Ok(ExecutionReceipt {
                    action_id,
                    success: false,
                    failure: Some(failure),
                    chained: None,
                    tx,
                });
            }
        };

        let mut notifications = Vec::new();
        let chained = match next {
            Some(next) => {
                let timestamp = now();
                let (next_id, nonce) = state.local_action_id(
                    self.config.id,
                    record.initiator,
                    timestamp,
                    &next.payload,
                );
                state.registry.ensure_can_create(&next_id)?;

                let next_record = ActionRecord {
                    source_endpoint: self.config.id,
                    destination_endpoint: record.source_endpoint,
                    initiator: record.initiator,
                    payload: next.payload.clone(),
                    state: ActionState::Pending,
                    timestamp,
                    proof_fingerprint: Fingerprint::zero(),
                    selector: next.selector,
                    next: None,
                };

                state.apply(writes);
                state.registry.set_next(&action_id, next.clone());
                state.registry.advance(&action_id, ActionState::Chaining)?;
                state.registry.create(next_id, next_record)?;
                state.consume_nonce(record.initiator, nonce);

                notifications.push(Notification::Chained {
                    previous_id: action_id,
                    next_id,
                    initiator: record.initiator,
                    next_selector: next.selector,
                });
                notifications.push(Notification::Initiated {
                    action_id: next_id,
                    initiator: record.initiator,
                    selector: next.selector,
                    payload: next.payload,
                });
                Some(next_id)
            }
            None => {
                state.apply(writes);
                state.registry.advance(&action_id, ActionState::Completed)?;
                None
            }
        };
        notifications.push(Notification::Completed {
            action_id,
            success: true,
        });

        let tx = state.chain.commit("execute", notifications);
        self.bus.publish(&tx.logs);

        match chained {
            Some(next_id) => info!(
                endpoint = %self.config.id,
                action_id = %action_id,
                next_id = %next_id,
                "action executed and chained"
            ),
            None => info!(
                endpoint = %self.config.id,
                action_id = %action_id,
                "action executed"
            ),
        }
        Ok(ExecutionReceipt {
            action_id,
            success: true,
            failure: None,
            chained,
            tx,
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub async fn action(&self, action_id: &ActionId) -> Option<ActionRecord> {
        self.state.read().await.registry.get(action_id).cloned()
    }

    pub async fn action_state(&self, action_id: &ActionId) -> ActionState {
        self.state.read().await.registry.state(action_id)
    }

    pub async fn actions_in_state(&self, action_state: ActionState) -> Vec<ActionId> {
        self.state.read().await.registry.ids_in_state(action_state)
    }

    pub async fn is_proof_used(&self, fingerprint: &Fingerprint) -> bool {
        self.state.read().await.used_proofs.contains(fingerprint)
    }

    pub async fn storage(&self, key: &str) -> Option<Vec<u8>> {
        self.state.read().await.storage.get(key).cloned()
    }

    pub async fn head_block(&self) -> u64 {
        self.state.read().await.chain.head()
    }

    pub async fn logs_since(&self, from_block: u64) -> Vec<LogEntry> {
        let logs = self.state.read().await.chain.logs_since(from_block);
        debug!(endpoint = %self.config.id, from_block, count = logs.len(), "logs read");
        logs
    }

    pub async fn log_at(&self, block_number: u64, log_index: u32) -> Option<LogEntry> {
        self.state.read().await.chain.log_at(block_number, log_index)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("config", &self.config)
            .field("handlers", &self.handlers)
            .finish()
    }
}

fn now() -> u64 {
    u64::try_from(Utc::now().timestamp()).unwrap_or(0)
}

fn malformed(e: xrelay_core::CodecError) -> EndpointError {
    EndpointError::MalformedNotification {
        reason: e.to_string(),
    }
}
