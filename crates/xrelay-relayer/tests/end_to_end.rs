//! Two in-process endpoints, a local prover and live relayers

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use xrelay_attestation::{AttestationSigner, LocalProver, ProofService};
use xrelay_core::{ActionId, ActionState, Address, EndpointId, Notification, Selector};
use xrelay_ledger::{Endpoint, EndpointConfig, HandlerSet, NotificationBus};
use xrelay_relayer::{PollingConfig, RelayLink, Relayer, RelayerConfig};

fn store() -> Selector {
    Selector::from_signature("store(bytes)")
}

fn ping() -> Selector {
    Selector::from_signature("ping(bytes)")
}

fn pong() -> Selector {
    Selector::from_signature("pong(bytes)")
}

fn handlers() -> HandlerSet {
    HandlerSet::new()
        .with_fn(store(), |ctx, payload| {
            ctx.put("last", payload.to_vec());
            Ok(())
        })
        .with_fn(ping(), |ctx, payload| {
            ctx.chain(pong(), payload.to_vec());
            Ok(())
        })
        .with_fn(pong(), |ctx, payload| {
            ctx.put("pong", payload.to_vec());
            Ok(())
        })
}

struct Harness {
    a: Endpoint,
    b: Endpoint,
    prover: Arc<LocalProver>,
}

impl Harness {
    fn new(ready_after_polls: u32) -> Self {
        Self::with_bus(ready_after_polls, NotificationBus::default())
    }

    fn with_bus(ready_after_polls: u32, bus: NotificationBus) -> Self {
        let prover = Arc::new(LocalProver::new(
            AttestationSigner::generate(),
            ready_after_polls,
        ));
        let verifier = Arc::new(prover.verifier());

        let a_id = EndpointId::new(1, Address([0xa; 20]));
        let b_id = EndpointId::new(2, Address([0xb; 20]));
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
        prover.register(a.clone());
        prover.register(b.clone());
        Self { a, b, prover }
    }

    fn relayer(&self, max_attempts: u32) -> Relayer {
        let mut config = RelayerConfig::development();
        config.polling = PollingConfig {
            initial_delay_ms: 5,
            interval_ms: 5,
            max_attempts,
        };
        let service: Arc<dyn ProofService> = self.prover.clone();
        Relayer::new(&config, service)
    }

    fn forward(&self) -> RelayLink {
        RelayLink::new(Arc::new(self.a.clone()), Arc::new(self.b.clone()))
    }

    fn both_directions(&self) -> Vec<RelayLink> {
        RelayLink::pair(Arc::new(self.a.clone()), Arc::new(self.b.clone()))
    }
}

fn alice() -> Address {
    Address([0x11; 20])
}

async fn wait_for_state(endpoint: &Endpoint, action_id: ActionId, state: ActionState) {
    let reached = timeout(Duration::from_secs(10), async {
        while endpoint.action_state(&action_id).await != state {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(
        reached.is_ok(),
        "action {} never reached {} on {}",
        action_id,
        state,
        endpoint.id()
    );
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
    let reached = timeout(Duration::from_secs(10), async {
        while !condition() {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(reached.is_ok(), "condition never held");
}

async fn chained_from(endpoint: &Endpoint, previous: ActionId) -> ActionId {
    endpoint
        .logs_since(0)
        .await
        .iter()
        .find_map(|log| match log.notification() {
            Ok(Notification::Chained {
                previous_id,
                next_id,
                ..
            }) if previous_id == previous => Some(next_id),
            _ => None,
        })
        .expect("no chained notification")
}

#[tokio::test]
async fn test_scenario_a_relays_and_completes() {
    let harness = Harness::new(2);
    let relayer = harness.relayer(50);
    let cancel = CancellationToken::new();
    let run = {
        let relayer = relayer.clone();
        let links = harness.both_directions();
        let cancel = cancel.clone();
        tokio::spawn(async move { relayer.run(links, cancel).await })
    };

    let action_id = harness
        .a
        .bridge(alice(), store(), b"payload-1".to_vec())
        .await
        .unwrap();

    wait_for_state(&harness.b, action_id, ActionState::Completed).await;

    assert_eq!(harness.b.storage("last").await, Some(b"payload-1".to_vec()));
    // Only the destination advances
    assert_eq!(harness.a.action_state(&action_id).await, ActionState::Pending);
    let record = harness.b.action(&action_id).await.unwrap();
    assert_eq!(record.source_endpoint, harness.a.id());
    assert!(!record.proof_fingerprint.is_zero());
    assert!(harness.b.is_proof_used(&record.proof_fingerprint).await);

    cancel.cancel();
    timeout(Duration::from_secs(5), run).await.unwrap().unwrap();

    let metrics = relayer.metrics();
    assert_eq!(metrics.relayed, 1);
    assert_eq!(metrics.failed, 0);
}

#[tokio::test]
async fn test_scenario_b_chains_back_to_source() {
    let harness = Harness::new(1);
    let relayer = harness.relayer(50);
    let cancel = CancellationToken::new();
    let run = {
        let relayer = relayer.clone();
        let links = harness.both_directions();
        let cancel = cancel.clone();
        tokio::spawn(async move { relayer.run(links, cancel).await })
    };

    let first = harness
        .a
        .bridge(alice(), ping(), b"round-trip".to_vec())
        .await
        .unwrap();

    wait_for_state(&harness.b, first, ActionState::Chaining).await;
    let second = chained_from(&harness.b, first).await;
    wait_for_state(&harness.a, second, ActionState::Completed).await;

    // The chained record stays PENDING on the endpoint that emitted it
    assert_eq!(harness.b.action_state(&second).await, ActionState::Pending);
    let spawned = harness.b.action(&second).await.unwrap();
    assert_eq!(spawned.selector, pong());
    assert_eq!(spawned.payload, b"round-trip".to_vec());
    assert_eq!(spawned.destination_endpoint, harness.a.id());

    assert_eq!(harness.a.storage("pong").await, Some(b"round-trip".to_vec()));
    assert_eq!(harness.a.action_state(&first).await, ActionState::Pending);

    cancel.cancel();
    timeout(Duration::from_secs(5), run).await.unwrap().unwrap();

    let metrics = relayer.metrics();
    assert_eq!(metrics.relayed, 2);
    assert_eq!(metrics.chained, 1);
}

#[tokio::test]
async fn test_racing_relay_attempts_validate_once() {
    let harness = Harness::new(0);
    let first = harness.relayer(20);
    let second = harness.relayer(20);
    let link = harness.forward();

    let action_id = harness
        .a
        .bridge(alice(), store(), b"contested".to_vec())
        .await
        .unwrap();
    let entry = harness
        .a
        .logs_since(0)
        .await
        .into_iter()
        .find(|log| matches!(log.notification(), Ok(Notification::Initiated { .. })))
        .unwrap();

    let cancel = CancellationToken::new();
    let (left, right) = tokio::join!(
        first.relay_one(&link, &entry, &cancel),
        second.relay_one(&link, &entry, &cancel)
    );

    let outcomes = [left, right];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    let replays = outcomes
        .iter()
        .filter(|r| matches!(r, Err(e) if e.is_replay()))
        .count();
    assert_eq!(winners, 1);
    assert_eq!(replays, 1);

    let validated = harness
        .b
        .logs_since(0)
        .await
        .iter()
        .filter(|log| matches!(log.notification(), Ok(Notification::Validated { .. })))
        .count();
    assert_eq!(validated, 1);
    assert_eq!(harness.b.action_state(&action_id).await, ActionState::Completed);
}

#[tokio::test]
async fn test_independent_relayers_race_without_double_execution() {
    let harness = Harness::new(1);
    let first = harness.relayer(50);
    let second = harness.relayer(50);
    let cancel = CancellationToken::new();
    let handles = vec![
        first.spawn_monitor(harness.forward(), cancel.clone()),
        second.spawn_monitor(harness.forward(), cancel.clone()),
    ];

    let action_id = harness
        .a
        .bridge(alice(), store(), b"twice".to_vec())
        .await
        .unwrap();

    wait_for_state(&harness.b, action_id, ActionState::Completed).await;
    wait_until(|| {
        let (m1, m2) = (first.metrics(), second.metrics());
        m1.relayed + m2.relayed + m1.failed + m2.failed == 2
    })
    .await;

    let (m1, m2) = (first.metrics(), second.metrics());
    assert_eq!(m1.relayed + m2.relayed, 1);
    assert_eq!(m1.replay_rejections + m2.replay_rejections, 1);

    cancel.cancel();
    for handle in handles {
        timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}

#[tokio::test]
async fn test_proof_timeout_abandons_attempt() {
    let harness = Harness::new(1_000);
    let relayer = harness.relayer(3);
    let cancel = CancellationToken::new();
    let handle = relayer.spawn_monitor(harness.forward(), cancel.clone());

    let action_id = harness
        .a
        .bridge(alice(), store(), b"slow".to_vec())
        .await
        .unwrap();

    wait_until(|| relayer.metrics().proof_timeouts == 1).await;

    assert_eq!(harness.b.action_state(&action_id).await, ActionState::None);
    assert_eq!(harness.a.action_state(&action_id).await, ActionState::Pending);
    assert_eq!(relayer.metrics().failed, 1);

    cancel.cancel();
    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_lagging_monitor_rescans_without_gaps() {
    // A one-slot bus drops notifications whenever the monitor falls behind
    let harness = Harness::with_bus(0, NotificationBus::new(1));
    let relayer = harness.relayer(20);
    let cancel = CancellationToken::new();
    let handle = relayer.spawn_monitor(harness.forward(), cancel.clone());
    sleep(Duration::from_millis(20)).await;

    let mut ids = Vec::new();
    for round in 0..8u8 {
        let id = harness
            .a
            .bridge(alice(), store(), vec![round])
            .await
            .unwrap();
        ids.push(id);
    }

    for id in &ids {
        wait_for_state(&harness.b, *id, ActionState::Completed).await;
    }
    wait_until(|| relayer.metrics().relayed == 8).await;

    let metrics = relayer.metrics();
    assert_eq!(metrics.failed, 0);
    assert_eq!(relayer.seen().len(), 8);

    cancel.cancel();
    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_backfill_picks_up_earlier_notifications() {
    let harness = Harness::new(0);
    let action_id = harness
        .a
        .bridge(alice(), store(), b"before start".to_vec())
        .await
        .unwrap();

    let relayer = harness.relayer(20);
    let cancel = CancellationToken::new();
    let handle = relayer.spawn_monitor(harness.forward(), cancel.clone());

    wait_for_state(&harness.b, action_id, ActionState::Completed).await;
    assert_eq!(relayer.seen().len(), 1);

    cancel.cancel();
    timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
}
