//! Action records and their lifecycle

use serde::{Deserialize, Serialize};

use crate::types::{Address, EndpointId, Fingerprint, Selector};

/// Lifecycle state of an action record
///
/// ```text
/// None -[bridge/validate]-> Pending -[execute ok]-> Completed
///                                   -[execute ok, chain]-> Chaining (+ new Pending)
///                                   -[execute failed]-> record deleted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionState {
    None,
    Pending,
    Completed,
    Chaining,
}

impl ActionState {
    /// Whether moving from `self` to `next` is a forward transition
    pub fn can_advance_to(self, next: ActionState) -> bool {
        matches!(
            (self, next),
            (ActionState::None, ActionState::Pending)
                | (ActionState::Pending, ActionState::Completed)
                | (ActionState::Pending, ActionState::Chaining)
        )
    }

    /// Terminal states; a settled record is never rewritten
    pub fn is_settled(self) -> bool {
        matches!(self, ActionState::Completed | ActionState::Chaining)
    }
}

impl std::fmt::Display for ActionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionState::None => "NONE",
            ActionState::Pending => "PENDING",
            ActionState::Completed => "COMPLETED",
            ActionState::Chaining => "CHAINING",
        };
        f.write_str(name)
    }
}

/// Follow-on action requested by a handler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextAction {
    pub selector: Selector,
    pub payload: Vec<u8>,
}

/// One cross-chain action, keyed by its `ActionId` in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub source_endpoint: EndpointId,
    pub destination_endpoint: EndpointId,
    pub initiator: Address,
    pub payload: Vec<u8>,
    pub state: ActionState,
    /// Creation or validation time (unix seconds)
    pub timestamp: u64,
    /// Zero until the record is created by proof validation
    pub proof_fingerprint: Fingerprint,
    pub selector: Selector,
    /// Populated only once execution requested chaining
    pub next: Option<NextAction>,
}

impl ActionRecord {
    /// Preconditions for `execute`
    pub fn is_executable(&self) -> bool {
        self.state == ActionState::Pending
            && !self.proof_fingerprint.is_zero()
            && !self.payload.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(state: ActionState, fingerprint: Fingerprint, payload: Vec<u8>) -> ActionRecord {
        ActionRecord {
            source_endpoint: EndpointId::new(1, Address([1; 20])),
            destination_endpoint: EndpointId::new(2, Address([2; 20])),
            initiator: Address([3; 20]),
            payload,
            state,
            timestamp: 0,
            proof_fingerprint: fingerprint,
            selector: Selector([0; 4]),
            next: None,
        }
    }

    #[test]
    fn test_state_only_moves_forward() {
        assert!(ActionState::None.can_advance_to(ActionState::Pending));
        assert!(ActionState::Pending.can_advance_to(ActionState::Completed));
        assert!(ActionState::Pending.can_advance_to(ActionState::Chaining));
        assert!(!ActionState::Completed.can_advance_to(ActionState::Pending));
        assert!(!ActionState::Chaining.can_advance_to(ActionState::Completed));
        assert!(!ActionState::None.can_advance_to(ActionState::Completed));
    }

    #[test]
    fn test_executable_requires_all_preconditions() {
        let fp = Fingerprint([9; 32]);
        assert!(record(ActionState::Pending, fp, vec![1]).is_executable());
        assert!(!record(ActionState::Pending, Fingerprint::zero(), vec![1]).is_executable());
        assert!(!record(ActionState::Pending, fp, vec![]).is_executable());
        assert!(!record(ActionState::Completed, fp, vec![1]).is_executable());
    }

    #[test]
    fn test_state_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&ActionState::Chaining).unwrap(),
            "\"CHAINING\""
        );
    }
}
