//! Action Registry - keyed store of action records

use std::collections::HashMap;

use xrelay_core::{ActionId, ActionRecord, ActionState, NextAction};

use crate::{EndpointError, Result};

/// Records by action id
///
/// Creation is last-write-wins for records that have not settled yet.
/// The only deletion path is a failed execution.
#[derive(Debug, Default, Clone)]
pub struct ActionRegistry {
    records: HashMap<ActionId, ActionRecord>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails if `action_id` is held by a settled record
    pub fn ensure_can_create(&self, action_id: &ActionId) -> Result<()> {
        match self.records.get(action_id) {
            Some(existing) if existing.state.is_settled() => Err(EndpointError::ActionIdCollision {
                action_id: *action_id,
            }),
            _ => Ok(()),
        }
    }

    /// Store a record, returning the pending record it replaced
    pub fn create(&mut self, action_id: ActionId, record: ActionRecord) -> Result<Option<ActionRecord>> {
        self.ensure_can_create(&action_id)?;
        Ok(self.records.insert(action_id, record))
    }

    pub fn get(&self, action_id: &ActionId) -> Option<&ActionRecord> {
        self.records.get(action_id)
    }

    /// State of a record, `None` when absent
    pub fn state(&self, action_id: &ActionId) -> ActionState {
        self.records
            .get(action_id)
            .map(|r| r.state)
            .unwrap_or(ActionState::None)
    }

    /// Move a record forward; backwards or sideways moves are rejected
    pub fn advance(&mut self, action_id: &ActionId, next: ActionState) -> Result<()> {
        let current = self.state(action_id);
        if !current.can_advance_to(next) {
            return Err(EndpointError::InvalidActionState {
                action_id: *action_id,
                state: current,
            });
        }
        if let Some(record) = self.records.get_mut(action_id) {
            record.state = next;
        }
        Ok(())
    }

    /// Record the follow-on action of a chaining execution
    pub fn set_next(&mut self, action_id: &ActionId, next: NextAction) {
        if let Some(record) = self.records.get_mut(action_id) {
            record.next = Some(next);
        }
    }

    pub fn remove(&mut self, action_id: &ActionId) -> Option<ActionRecord> {
        self.records.remove(action_id)
    }

    /// Ids of records currently in `state`
    pub fn ids_in_state(&self, state: ActionState) -> Vec<ActionId> {
        self.records
            .iter()
            .filter(|(_, r)| r.state == state)
            .map(|(id, _)| *id)
            .collect()
    }
}
