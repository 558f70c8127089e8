//! Proof job API shared by the remote and in-process services

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use xrelay_core::ChainId;

use crate::Result;

/// Request for an attestation of one source log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofRequest {
    pub source_chain_id: ChainId,
    pub destination_chain_id: ChainId,
    pub block_number: u64,
    pub log_index: u32,
}

/// Opaque job identifier issued by a proof service
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// State of a proof job as reported by the service
///
/// On the wire: `{"status": "pending"}`, `{"status": "ready", "proof": "<base64>"}`
/// or `{"status": "failed", "error": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProofStatus {
    Pending,
    Ready { proof: String },
    Failed { error: String },
}

/// Response to a proof request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct JobCreated {
    pub job_id: JobId,
}

/// Asynchronous attestation service
#[async_trait]
pub trait ProofService: Send + Sync {
    /// Start a proof job for the log at `request`'s coordinate
    async fn request_proof(&self, request: &ProofRequest) -> Result<JobId>;

    /// Current state of a job
    async fn query_proof(&self, job_id: &JobId) -> Result<ProofStatus>;
}

pub fn encode_proof(attestation: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(attestation)
}

/// Decode the base64 proof of a ready job into attestation bytes
pub fn decode_proof(proof: &str) -> std::result::Result<Vec<u8>, base64::DecodeError> {
    base64::engine::general_purpose::STANDARD.decode(proof)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = ProofRequest {
            source_chain_id: 1,
            destination_chain_id: 2,
            block_number: 10,
            log_index: 3,
        };
        let json = serde_json::to_value(request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "sourceChainId": 1,
                "destinationChainId": 2,
                "blockNumber": 10,
                "logIndex": 3
            })
        );
    }

    #[test]
    fn test_status_wire_shape() {
        let ready: ProofStatus =
            serde_json::from_str(r#"{"status":"ready","proof":"AQID"}"#).unwrap();
        assert_eq!(
            ready,
            ProofStatus::Ready {
                proof: "AQID".to_string()
            }
        );
        assert_eq!(decode_proof("AQID").unwrap(), vec![1, 2, 3]);

        let pending: ProofStatus = serde_json::from_str(r#"{"status":"pending"}"#).unwrap();
        assert_eq!(pending, ProofStatus::Pending);

        let failed = serde_json::to_value(ProofStatus::Failed {
            error: "no such log".to_string(),
        })
        .unwrap();
        assert_eq!(failed, serde_json::json!({"status": "failed", "error": "no such log"}));
    }

    #[test]
    fn test_job_created_shape() {
        let created: JobCreated = serde_json::from_str(r#"{"jobId":"job-1"}"#).unwrap();
        assert_eq!(created.job_id, JobId("job-1".to_string()));
    }
}
