//! In-process relay demo
//!
//! Two endpoints share one notification bus. Endpoint A hosts a counter,
//! endpoint B answers pings by chaining a pong back to A.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use colored::*;
use tokio_util::sync::CancellationToken;
use xrelay_attestation::{
    AttestationSigner, HttpProofService, LocalProver, ProofService, SignedAttestationVerifier,
};
use xrelay_core::{ActionId, ActionState, Address, AttestationVerifier, EndpointId, Notification, Selector};
use xrelay_ledger::{Endpoint, EndpointConfig, HandlerError, HandlerSet, NotificationBus};
use xrelay_relayer::{RelayLink, Relayer, RelayerConfig};

use crate::Scenario;

const COUNTER_KEY: &str = "counter";
const PONG_KEY: &str = "last_pong";

fn increment() -> Selector {
    Selector::from_signature("increment(uint64)")
}

fn ping() -> Selector {
    Selector::from_signature("ping(bytes)")
}

fn pong() -> Selector {
    Selector::from_signature("pong(bytes)")
}

/// Handlers shared by both demo endpoints
fn handlers() -> HandlerSet {
    HandlerSet::new()
        .with_fn(increment(), |ctx, payload| {
            let bytes: [u8; 8] = payload
                .try_into()
                .map_err(|_| HandlerError::new("increment expects an 8-byte amount"))?;
            let current = match ctx.get(COUNTER_KEY) {
                Some(raw) => u64::from_be_bytes(
                    raw.try_into()
                        .map_err(|_| HandlerError::new("corrupt counter"))?,
                ),
                None => 0,
            };
            let next = current
                .checked_add(u64::from_be_bytes(bytes))
                .ok_or_else(|| HandlerError::new("counter overflow"))?;
            ctx.put(COUNTER_KEY, next.to_be_bytes().to_vec());
            Ok(())
        })
        .with_fn(ping(), |ctx, payload| {
            ctx.chain(pong(), payload.to_vec());
            Ok(())
        })
        .with_fn(pong(), |ctx, payload| {
            ctx.put(PONG_KEY, payload.to_vec());
            Ok(())
        })
}

pub async fn run(config: &RelayerConfig, scenario: Scenario, relayer_count: usize) -> Result<()> {
    tracing::info!(?scenario, relayers = relayer_count, "demo starting");
    let bus = NotificationBus::default();
    let a_id = EndpointId::new(1, Address([0xa1; 20]));
    let b_id = EndpointId::new(2, Address([0xb2; 20]));

    let local_prover;
    let (service, verifier): (Arc<dyn ProofService>, Arc<dyn AttestationVerifier>) =
        match &config.proof_service.base_url {
            Some(base_url) => {
                let key = config
                    .proof_service
                    .trusted_key
                    .as_deref()
                    .context("proof_service.trusted_key is required with a remote prover")?;
                let verifier = SignedAttestationVerifier::from_hex(key)
                    .context("Invalid proof_service.trusted_key")?;
                let service =
                    HttpProofService::new(base_url, config.proof_service.request_timeout())
                        .context("Failed to build proof service client")?;
                println!("{} {}", "Proof service:".bold(), base_url);
                local_prover = None;
                let service: Arc<dyn ProofService> = Arc::new(service);
                let verifier: Arc<dyn AttestationVerifier> = Arc::new(verifier);
                (service, verifier)
            }
            None => {
                let prover = Arc::new(LocalProver::new(AttestationSigner::generate(), 1));
                let verifier = Arc::new(prover.verifier());
                println!("{} in-process prover", "Proof service:".bold());
                local_prover = Some(prover.clone());
                let service: Arc<dyn ProofService> = prover;
                let verifier: Arc<dyn AttestationVerifier> = verifier;
                (service, verifier)
            }
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
    if let Some(prover) = &local_prover {
        prover.register(a.clone());
        prover.register(b.clone());
    }

    let cancel = CancellationToken::new();
    let relayers: Vec<Relayer> = (0..relayer_count)
        .map(|_| Relayer::new(config, service.clone()))
        .collect();
    let runs: Vec<_> = relayers
        .iter()
        .map(|relayer| {
            let relayer = relayer.clone();
            let links = RelayLink::pair(Arc::new(a.clone()), Arc::new(b.clone()));
            let cancel = cancel.clone();
            tokio::spawn(async move { relayer.run(links, cancel).await })
        })
        .collect();

    let budget = settle_budget(config, scenario);
    let initiator = Address([0x42; 20]);
    let outcome = match scenario {
        Scenario::Simple => simple(&a, &b, initiator, budget).await,
        Scenario::Chained => chained(&a, &b, initiator, budget).await,
    };

    cancel.cancel();
    for run in runs {
        run.await.context("Relayer task failed")?;
    }

    println!();
    for (index, relayer) in relayers.iter().enumerate() {
        let metrics = relayer.metrics();
        println!(
            "{} relayed={} chained={} failed={} replays={} timeouts={}",
            format!("Relayer #{}:", index + 1).bold(),
            metrics.relayed,
            metrics.chained,
            metrics.failed,
            metrics.replay_rejections,
            metrics.proof_timeouts,
        );
    }
    outcome
}

async fn simple(a: &Endpoint, b: &Endpoint, initiator: Address, budget: Duration) -> Result<()> {
    let amount: u64 = 42;
    let action_id = a
        .bridge(initiator, increment(), amount.to_be_bytes().to_vec())
        .await
        .context("Bridge failed")?;
    println!("{} {} on {}", "Initiated".cyan(), action_id, a.id());

    settle(b, action_id, ActionState::Completed, budget).await?;
    let counter = b
        .storage(COUNTER_KEY)
        .await
        .and_then(|raw| raw.try_into().ok().map(u64::from_be_bytes))
        .unwrap_or(0);

    println!("{} {} on {}", "Completed".green(), action_id, b.id());
    println!("  counter on {} = {}", b.id(), counter);
    println!(
        "  source record on {} stays {}",
        a.id(),
        a.action_state(&action_id).await
    );
    Ok(())
}

async fn chained(a: &Endpoint, b: &Endpoint, initiator: Address, budget: Duration) -> Result<()> {
    let first = a
        .bridge(initiator, ping(), b"hello from A".to_vec())
        .await
        .context("Bridge failed")?;
    println!("{} {} on {}", "Initiated".cyan(), first, a.id());

    settle(b, first, ActionState::Chaining, budget).await?;
    let second = b
        .logs_since(0)
        .await
        .iter()
        .find_map(|log| match log.notification() {
            Ok(Notification::Chained {
                previous_id,
                next_id,
                ..
            }) if previous_id == first => Some(next_id),
            _ => None,
        })
        .context("Chained notification missing")?;
    println!("{} {} -> {} on {}", "Chained".yellow(), first, second, b.id());

    settle(a, second, ActionState::Completed, budget).await?;
    let reply = a.storage(PONG_KEY).await.unwrap_or_default();
    println!("{} {} on {}", "Completed".green(), second, a.id());
    println!("  pong on {} = {:?}", a.id(), String::from_utf8_lossy(&reply));
    Ok(())
}

async fn settle(
    endpoint: &Endpoint,
    action_id: ActionId,
    state: ActionState,
    budget: Duration,
) -> Result<()> {
    let reached = tokio::time::timeout(budget, async {
        while endpoint.action_state(&action_id).await != state {
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
    })
    .await;
    if reached.is_err() {
        bail!(
            "{} did not reach {} on {} within {:?}",
            action_id,
            state,
            endpoint.id(),
            budget
        );
    }
    Ok(())
}

/// Worst-case time for every hop of a scenario to be proven
fn settle_budget(config: &RelayerConfig, scenario: Scenario) -> Duration {
    let polling = &config.polling;
    let per_hop = polling.initial_delay()
        + polling.interval() * polling.max_attempts
        + Duration::from_secs(2);
    match scenario {
        Scenario::Simple => per_hop,
        Scenario::Chained => per_hop * 2,
    }
}
