//! In-process proof service
//!
//! Reads logs straight from registered source endpoints and signs them. A job
//! answers `pending` for a configurable number of polls before settling, so
//! the relayer's polling path is exercised the same way a remote prover
//! exercises it.

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info, warn};
use xrelay_core::ChainId;
use xrelay_ledger::Endpoint;

use crate::service::{encode_proof, JobId, ProofRequest, ProofService, ProofStatus};
use crate::signed::{AttestationSigner, SignedAttestationVerifier};
use crate::{ProofServiceError, Result};

#[derive(Debug, Clone)]
struct LocalJob {
    request: ProofRequest,
    polls: u32,
}

pub struct LocalProver {
    signer: AttestationSigner,
    sources: DashMap<ChainId, Endpoint>,
    jobs: DashMap<JobId, LocalJob>,
    ready_after_polls: u32,
}

impl LocalProver {
    /// `ready_after_polls` queries answer `pending` before a job settles
    pub fn new(signer: AttestationSigner, ready_after_polls: u32) -> Self {
        Self {
            signer,
            sources: DashMap::new(),
            jobs: DashMap::new(),
            ready_after_polls,
        }
    }

    /// Make an endpoint's logs provable
    pub fn register(&self, endpoint: Endpoint) {
        info!(endpoint = %endpoint.id(), "prover source registered");
        self.sources.insert(endpoint.id().chain_id, endpoint);
    }

    /// Verifier trusting this prover's signatures
    pub fn verifier(&self) -> SignedAttestationVerifier {
        SignedAttestationVerifier::new(self.signer.verifying_key())
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    async fn settle(&self, request: &ProofRequest) -> ProofStatus {
        let endpoint = match self.sources.get(&request.source_chain_id) {
            Some(endpoint) => endpoint.value().clone(),
            None => {
                return ProofStatus::Failed {
                    error: format!("no source endpoint for chain {}", request.source_chain_id),
                }
            }
        };

        match endpoint
            .log_at(request.block_number, request.log_index)
            .await
        {
            Some(log) => ProofStatus::Ready {
                proof: encode_proof(&self.signer.attest(&log).to_bytes()),
            },
            None => {
                warn!(
                    source_chain_id = request.source_chain_id,
                    block = request.block_number,
                    log_index = request.log_index,
                    "requested log does not exist"
                );
                ProofStatus::Failed {
                    error: format!(
                        "no log {} in block {} on chain {}",
                        request.log_index, request.block_number, request.source_chain_id
                    ),
                }
            }
        }
    }
}

#[async_trait]
impl ProofService for LocalProver {
    async fn request_proof(&self, request: &ProofRequest) -> Result<JobId> {
        if !self.sources.contains_key(&request.source_chain_id) {
            return Err(ProofServiceError::UnknownChain(request.source_chain_id));
        }
        let job_id = JobId(uuid::Uuid::new_v4().to_string());
        self.jobs.insert(
            job_id.clone(),
            LocalJob {
                request: *request,
                polls: 0,
            },
        );
        debug!(job_id = %job_id, block = request.block_number, "local proof job created");
        Ok(job_id)
    }

    async fn query_proof(&self, job_id: &JobId) -> Result<ProofStatus> {
        // The guard must be released before awaiting the endpoint
        let (request, polls) = {
            let mut job = self
                .jobs
                .get_mut(job_id)
                .ok_or_else(|| ProofServiceError::UnknownJob(job_id.clone()))?;
            job.polls += 1;
            (job.request, job.polls)
        };

        if polls <= self.ready_after_polls {
            return Ok(ProofStatus::Pending);
        }
        Ok(self.settle(&request).await)
    }
}

impl std::fmt::Debug for LocalProver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalProver")
            .field("signer", &self.signer)
            .field("sources", &self.sources.len())
            .field("jobs", &self.jobs.len())
            .field("ready_after_polls", &self.ready_after_polls)
            .finish()
    }
}
