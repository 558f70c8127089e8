//! HTTP client for a remote attestation service

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::service::{JobCreated, JobId, ProofRequest, ProofService, ProofStatus};
use crate::{ProofServiceError, Result};

/// Talks to `POST {base}/v1/proofs` and `GET {base}/v1/proofs/{jobId}`
pub struct HttpProofService {
    base_url: String,
    client: reqwest::Client,
}

impl HttpProofService {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProofServiceError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl ProofService for HttpProofService {
    async fn request_proof(&self, request: &ProofRequest) -> Result<JobId> {
        let response = self
            .client
            .post(format!("{}/v1/proofs", self.base_url))
            .json(request)
            .send()
            .await?;
        let created: JobCreated = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ProofServiceError::InvalidResponse(e.to_string()))?;

        debug!(
            job_id = %created.job_id,
            source_chain_id = request.source_chain_id,
            block = request.block_number,
            log_index = request.log_index,
            "proof job created"
        );
        Ok(created.job_id)
    }

    async fn query_proof(&self, job_id: &JobId) -> Result<ProofStatus> {
        let response = self
            .client
            .get(format!("{}/v1/proofs/{}", self.base_url, job_id))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ProofServiceError::UnknownJob(job_id.clone()));
        }
        Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| ProofServiceError::InvalidResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_is_normalized() {
        let service = HttpProofService::new("http://prover.local:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(service.base_url(), "http://prover.local:8080");
    }
}
