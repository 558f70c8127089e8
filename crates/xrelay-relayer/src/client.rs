//! Relayer view of an endpoint

use async_trait::async_trait;
use tokio::sync::broadcast;
use xrelay_core::{ActionId, EndpointId, LogEntry};
use xrelay_ledger::{Endpoint, EndpointError, ExecutionReceipt, Validation};

/// The calls a relayer makes against one endpoint
#[async_trait]
pub trait LedgerClient: Send + Sync {
    fn endpoint(&self) -> EndpointId;

    /// Live notification stream; may carry logs of other endpoints
    fn subscribe(&self) -> broadcast::Receiver<LogEntry>;

    /// Committed logs from `from_block` onward
    async fn logs_since(&self, from_block: u64) -> Vec<LogEntry>;

    async fn submit_validation(
        &self,
        position_in_block: u32,
        attestation: &[u8],
    ) -> Result<Validation, EndpointError>;

    async fn submit_execution(&self, action_id: ActionId)
        -> Result<ExecutionReceipt, EndpointError>;
}

#[async_trait]
impl LedgerClient for Endpoint {
    fn endpoint(&self) -> EndpointId {
        self.id()
    }

    fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.bus().subscribe()
    }

    async fn logs_since(&self, from_block: u64) -> Vec<LogEntry> {
        Endpoint::logs_since(self, from_block).await
    }

    async fn submit_validation(
        &self,
        position_in_block: u32,
        attestation: &[u8],
    ) -> Result<Validation, EndpointError> {
        self.validate_with_receipt(position_in_block, attestation).await
    }

    async fn submit_execution(
        &self,
        action_id: ActionId,
    ) -> Result<ExecutionReceipt, EndpointError> {
        self.execute(action_id).await
    }
}
