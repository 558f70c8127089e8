//! Relay orchestrator
//!
//! A `Relayer` owns its dedupe set, metrics and proof service handle. It runs
//! one monitor per `RelayLink`; each monitor spawns a task per new `Initiated`
//! log, bounded by a per-direction semaphore.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use xrelay_attestation::{decode_proof, JobId, ProofRequest, ProofService, ProofStatus};
use xrelay_core::{ActionId, EndpointId, Fingerprint, LogEntry, Notification};

use crate::client::LedgerClient;
use crate::config::{PollingConfig, RelaySettings, RelayerConfig};
use crate::dedupe::SeenLogs;
use crate::metrics::{RelayerMetrics, RelayerMetricsSnapshot};
use crate::{RelayError, Result};

/// One monitored direction
#[derive(Clone)]
pub struct RelayLink {
    pub source: Arc<dyn LedgerClient>,
    pub destination: Arc<dyn LedgerClient>,
}

impl RelayLink {
    pub fn new(source: Arc<dyn LedgerClient>, destination: Arc<dyn LedgerClient>) -> Self {
        Self {
            source,
            destination,
        }
    }

    /// The opposite direction
    pub fn reversed(&self) -> Self {
        Self {
            source: self.destination.clone(),
            destination: self.source.clone(),
        }
    }

    /// Both directions between two endpoints
    pub fn pair(a: Arc<dyn LedgerClient>, b: Arc<dyn LedgerClient>) -> Vec<Self> {
        let forward = Self::new(a, b);
        let backward = forward.reversed();
        vec![forward, backward]
    }
}

impl std::fmt::Debug for RelayLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayLink")
            .field("source", &self.source.endpoint())
            .field("destination", &self.destination.endpoint())
            .finish()
    }
}

/// Outcome of one completed relay attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReport {
    pub source: EndpointId,
    pub destination: EndpointId,
    /// Destination-side action id
    pub action_id: ActionId,
    pub proof_fingerprint: Fingerprint,
    pub validated_block: u64,
    pub executed_block: u64,
    /// Whether the handler succeeded
    pub success: bool,
    pub chained: Option<ActionId>,
}

/// Off-chain relay orchestrator
///
/// Cheap to clone; clones share the dedupe set and metrics.
#[derive(Clone)]
pub struct Relayer {
    polling: PollingConfig,
    settings: RelaySettings,
    proof_service: Arc<dyn ProofService>,
    seen: Arc<SeenLogs>,
    metrics: Arc<RelayerMetrics>,
}

impl Relayer {
    pub fn new(config: &RelayerConfig, proof_service: Arc<dyn ProofService>) -> Self {
        Self {
            polling: config.polling.clone(),
            settings: config.relay.clone(),
            proof_service,
            seen: Arc::new(SeenLogs::new()),
            metrics: Arc::new(RelayerMetrics::new()),
        }
    }

    pub fn metrics(&self) -> RelayerMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn seen(&self) -> &SeenLogs {
        &self.seen
    }

    /// Run monitors for `links` until `cancel` fires
    pub async fn run(&self, links: Vec<RelayLink>, cancel: CancellationToken) {
        let handles: Vec<JoinHandle<()>> = links
            .into_iter()
            .map(|link| self.spawn_monitor(link, cancel.clone()))
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "monitor task failed");
            }
        }
    }

    pub fn spawn_monitor(&self, link: RelayLink, cancel: CancellationToken) -> JoinHandle<()> {
        let relayer = self.clone();
        tokio::spawn(async move { relayer.monitor(link, cancel).await })
    }

    async fn monitor(self, link: RelayLink, cancel: CancellationToken) {
        let source = link.source.endpoint();
        let destination = link.destination.endpoint();
        let semaphore = Arc::new(Semaphore::new(self.settings.max_in_flight.max(1)));
        let mut attempts = JoinSet::new();

        // Subscribe before the backfill so nothing falls in between
        let mut notifications = link.source.subscribe();

        info!(
            source = %source,
            destination = %destination,
            from_block = self.settings.from_block,
            "monitor started"
        );

        for entry in link.source.logs_since(self.settings.from_block).await {
            if !self
                .dispatch(&link, entry, &semaphore, &mut attempts, &cancel)
                .await
            {
                break;
            }
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = notifications.recv() => match received {
                    Ok(entry) => {
                        if !self.dispatch(&link, entry, &semaphore, &mut attempts, &cancel).await {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(source = %source, skipped, "notification stream lagged, rescanning");
                        for entry in link.source.logs_since(self.settings.from_block).await {
                            if !self.dispatch(&link, entry, &semaphore, &mut attempts, &cancel).await {
                                break;
                            }
                        }
                    }
                    Err(RecvError::Closed) => {
                        warn!(source = %source, "notification stream closed");
                        break;
                    }
                },
                Some(joined) = attempts.join_next() => {
                    if let Err(e) = joined {
                        error!(source = %source, error = %e, "relay attempt panicked");
                    }
                }
            }
        }

        while let Some(joined) = attempts.join_next().await {
            if let Err(e) = joined {
                error!(source = %source, error = %e, "relay attempt panicked");
            }
        }
        info!(source = %source, destination = %destination, "monitor stopped");
    }

    /// Hand a log to a new relay attempt if it is an unseen `Initiated` log of
    /// the link's source. Returns `false` once cancelled.
    async fn dispatch(
        &self,
        link: &RelayLink,
        entry: LogEntry,
        semaphore: &Arc<Semaphore>,
        attempts: &mut JoinSet<()>,
        cancel: &CancellationToken,
    ) -> bool {
        if entry.emitter != link.source.endpoint() {
            return true;
        }
        match entry.notification() {
            Ok(Notification::Initiated { .. }) => {}
            _ => return true,
        }
        self.metrics.record_seen();

        if !self.seen.mark(entry.coordinate()) {
            debug!(
                block = entry.block_number,
                log_index = entry.log_index,
                "notification already handled"
            );
            return true;
        }

        let permit = tokio::select! {
            _ = cancel.cancelled() => return false,
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return false,
            },
        };

        let relayer = self.clone();
        let link = link.clone();
        let cancel = cancel.clone();
        attempts.spawn(async move {
            let _permit = permit;
            relayer.attempt(&link, &entry, &cancel).await;
        });
        true
    }

    async fn attempt(&self, link: &RelayLink, entry: &LogEntry, cancel: &CancellationToken) {
        match self.relay_one(link, entry, cancel).await {
            Ok(report) => {
                self.metrics.record_relayed(report.chained.is_some());
                info!(
                    source = %report.source,
                    destination = %report.destination,
                    action_id = %report.action_id,
                    success = report.success,
                    chained = report.chained.is_some(),
                    "relay attempt finished"
                );
            }
            Err(RelayError::Cancelled) => {
                debug!(block = entry.block_number, "relay attempt cancelled");
            }
            Err(e) => {
                self.metrics.record_failed();
                if e.is_replay() {
                    self.metrics.record_replay();
                }
                if matches!(e, RelayError::ProofTimeout { .. }) {
                    self.metrics.record_timeout();
                }
                warn!(
                    source = %link.source.endpoint(),
                    block = entry.block_number,
                    log_index = entry.log_index,
                    error = %e,
                    "relay attempt abandoned"
                );
            }
        }
    }

    /// Relay one `Initiated` log: prove, validate, execute
    pub async fn relay_one(
        &self,
        link: &RelayLink,
        entry: &LogEntry,
        cancel: &CancellationToken,
    ) -> Result<RelayReport> {
        let source = link.source.endpoint();
        let destination = link.destination.endpoint();

        let request = ProofRequest {
            source_chain_id: source.chain_id,
            destination_chain_id: destination.chain_id,
            block_number: entry.block_number,
            log_index: entry.log_index,
        };
        let job_id = self.proof_service.request_proof(&request).await?;
        debug!(job_id = %job_id, block = entry.block_number, "proof requested");

        let attestation = self.await_proof(&job_id, cancel).await?;

        let validation = link
            .destination
            .submit_validation(entry.log_index, &attestation)
            .await
            .map_err(RelayError::Submission)?;
        let action_id = validation
            .tx
            .validated_action()
            .ok_or(RelayError::MissingValidation)?;

        let receipt = link
            .destination
            .submit_execution(action_id)
            .await
            .map_err(RelayError::Execution)?;

        if let Some(next_id) = receipt.chained {
            debug!(
                action_id = %action_id,
                next_id = %next_id,
                "chained action left for the reverse monitor"
            );
        }

        Ok(RelayReport {
            source,
            destination,
            action_id,
            proof_fingerprint: validation.proof_fingerprint,
            validated_block: validation.tx.block_number,
            executed_block: receipt.tx.block_number,
            success: receipt.success,
            chained: receipt.chained,
        })
    }

    /// Poll a proof job until it settles or the attempt budget runs out
    async fn await_proof(&self, job_id: &JobId, cancel: &CancellationToken) -> Result<Vec<u8>> {
        pause(self.polling.initial_delay(), cancel).await?;

        let max_attempts = self.polling.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            match self.proof_service.query_proof(job_id).await {
                Ok(ProofStatus::Ready { proof }) => {
                    return decode_proof(&proof).map_err(|e| RelayError::ProofDecode {
                        job_id: job_id.clone(),
                        reason: e.to_string(),
                    });
                }
                Ok(ProofStatus::Failed { error }) => {
                    return Err(RelayError::ProofFailed {
                        job_id: job_id.clone(),
                        reason: error,
                    });
                }
                Ok(ProofStatus::Pending) => {
                    debug!(job_id = %job_id, attempt, "proof pending");
                }
                Err(e) => {
                    warn!(job_id = %job_id, attempt, error = %e, "proof query failed");
                }
            }
            if attempt < max_attempts {
                pause(self.polling.interval(), cancel).await?;
            }
        }

        Err(RelayError::ProofTimeout {
            job_id: job_id.clone(),
            attempts: max_attempts,
        })
    }
}

impl std::fmt::Debug for Relayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relayer")
            .field("polling", &self.polling)
            .field("settings", &self.settings)
            .field("seen", &self.seen.len())
            .finish()
    }
}

async fn pause(duration: Duration, cancel: &CancellationToken) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(RelayError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use xrelay_attestation::{AttestationSigner, ProofServiceError, SignedAttestationVerifier};
    use xrelay_core::{Address, Selector};
    use xrelay_ledger::{Endpoint, EndpointConfig, HandlerSet, NotificationBus};

    /// Answers with a fixed sequence of statuses, repeating the last one
    struct ScriptedProver {
        script: Vec<ProofStatus>,
        polls: AtomicU32,
        reject_requests: bool,
    }

    impl ScriptedProver {
        fn new(script: Vec<ProofStatus>) -> Self {
            Self {
                script,
                polls: AtomicU32::new(0),
                reject_requests: false,
            }
        }

        fn rejecting() -> Self {
            Self {
                reject_requests: true,
                ..Self::new(vec![ProofStatus::Pending])
            }
        }
    }

    #[async_trait]
    impl ProofService for ScriptedProver {
        async fn request_proof(
            &self,
            _request: &ProofRequest,
        ) -> std::result::Result<JobId, ProofServiceError> {
            if self.reject_requests {
                return Err(ProofServiceError::Status {
                    status: 503,
                    body: "prover unavailable".to_string(),
                });
            }
            Ok(JobId("job".to_string()))
        }

        async fn query_proof(
            &self,
            _job_id: &JobId,
        ) -> std::result::Result<ProofStatus, ProofServiceError> {
            let poll = self.polls.fetch_add(1, Ordering::SeqCst) as usize;
            let index = poll.min(self.script.len() - 1);
            Ok(self.script[index].clone())
        }
    }

    fn relayer(script: Vec<ProofStatus>, max_attempts: u32) -> (Relayer, Arc<ScriptedProver>) {
        let mut config = RelayerConfig::development();
        config.polling = PollingConfig {
            initial_delay_ms: 1,
            interval_ms: 1,
            max_attempts,
        };
        let prover = Arc::new(ScriptedProver::new(script));
        (Relayer::new(&config, prover.clone()), prover)
    }

    #[tokio::test]
    async fn test_await_proof_decodes_ready_proof() {
        let (relayer, prover) = relayer(
            vec![
                ProofStatus::Pending,
                ProofStatus::Ready {
                    proof: "AQID".to_string(),
                },
            ],
            5,
        );

        let proof = relayer
            .await_proof(&JobId("job".to_string()), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(proof, vec![1, 2, 3]);
        assert_eq!(prover.polls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_await_proof_times_out() {
        let (relayer, prover) = relayer(vec![ProofStatus::Pending], 3);

        let result = relayer
            .await_proof(&JobId("job".to_string()), &CancellationToken::new())
            .await;

        assert!(matches!(
            result,
            Err(RelayError::ProofTimeout { attempts: 3, .. })
        ));
        assert_eq!(prover.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_await_proof_reports_failed_job_and_bad_base64() {
        let (relayer, _) = relayer(
            vec![ProofStatus::Failed {
                error: "no such log".to_string(),
            }],
            3,
        );
        let result = relayer
            .await_proof(&JobId("job".to_string()), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(RelayError::ProofFailed { .. })));

        let (relayer, _) = relayer_with_ready("not base64!");
        let result = relayer
            .await_proof(&JobId("job".to_string()), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(RelayError::ProofDecode { .. })));
    }

    fn relayer_with_ready(proof: &str) -> (Relayer, Arc<ScriptedProver>) {
        relayer(
            vec![ProofStatus::Ready {
                proof: proof.to_string(),
            }],
            1,
        )
    }

    #[tokio::test]
    async fn test_rejected_proof_request_fails_attempt() {
        let signer = AttestationSigner::generate();
        let verifier = Arc::new(SignedAttestationVerifier::new(signer.verifying_key()));
        let bus = NotificationBus::default();
        let a_id = EndpointId::new(1, Address([0xa; 20]));
        let b_id = EndpointId::new(2, Address([0xb; 20]));
        let store = Selector::from_signature("store(bytes)");
        let handlers = || {
            HandlerSet::new().with_fn(store, |ctx, payload| {
                ctx.put("last", payload.to_vec());
                Ok(())
            })
        };
        let a = Endpoint::new(
            EndpointConfig { id: a_id, peer: b_id },
            handlers(),
            verifier.clone(),
            bus.clone(),
        );
        let b = Endpoint::new(
            EndpointConfig { id: b_id, peer: a_id },
            handlers(),
            verifier,
            bus,
        );
        a.bridge(Address([0x11; 20]), store, b"x".to_vec())
            .await
            .unwrap();
        let entry = a.logs_since(0).await.remove(0);

        let mut config = RelayerConfig::development();
        config.polling.initial_delay_ms = 1;
        let prover = Arc::new(ScriptedProver::rejecting());
        let relayer = Relayer::new(&config, prover.clone());
        let link = RelayLink::new(Arc::new(a), Arc::new(b.clone()));
        let cancel = CancellationToken::new();

        let result = relayer.relay_one(&link, &entry, &cancel).await;
        assert!(matches!(
            result,
            Err(RelayError::ProofRequest(ProofServiceError::Status { status: 503, .. }))
        ));

        relayer.attempt(&link, &entry, &cancel).await;
        let metrics = relayer.metrics();
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.relayed, 0);
        assert_eq!(prover.polls.load(Ordering::SeqCst), 0);
        assert_eq!(b.head_block().await, 0);
    }

    #[tokio::test]
    async fn test_await_proof_stops_on_cancel() {
        let (relayer, _) = relayer(vec![ProofStatus::Pending], 1_000);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = relayer.await_proof(&JobId("job".to_string()), &cancel).await;

        assert!(matches!(result, Err(RelayError::Cancelled)));
    }
}
