//! Signed attestations presented to a live endpoint

use std::sync::Arc;

use xrelay_attestation::{AttestationSigner, SignedAttestation, SignedAttestationVerifier};
use xrelay_core::{ActionId, ActionState, Address, EndpointId, LogEntry, Notification, Selector};
use xrelay_ledger::{Endpoint, EndpointConfig, EndpointError, HandlerError, HandlerSet, NotificationBus};

fn store() -> Selector {
    Selector::from_signature("store(bytes)")
}

fn flaky() -> Selector {
    Selector::from_signature("flaky(bytes)")
}

fn arm() -> Selector {
    Selector::from_signature("arm(bytes)")
}

fn handlers() -> HandlerSet {
    HandlerSet::new()
        .with_fn(arm(), |ctx, _| {
            ctx.put("armed", vec![1]);
            Ok(())
        })
        .with_fn(store(), |ctx, payload| {
            ctx.put("last", payload.to_vec());
            Ok(())
        })
        .with_fn(flaky(), |ctx, payload| {
            if ctx.get("armed").is_none() {
                return Err(HandlerError::new("not armed"));
            }
            ctx.put("flaky_ran", payload.to_vec());
            Ok(())
        })
}

fn endpoints(signer: &AttestationSigner) -> (Endpoint, Endpoint) {
    let bus = NotificationBus::default();
    let verifier = Arc::new(SignedAttestationVerifier::new(signer.verifying_key()));
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
    (a, b)
}

async fn initiated_log(endpoint: &Endpoint, action_id: ActionId) -> LogEntry {
    endpoint
        .logs_since(0)
        .await
        .into_iter()
        .find(|log| {
            matches!(
                log.notification(),
                Ok(Notification::Initiated { action_id: id, .. }) if id == action_id
            )
        })
        .unwrap()
}

fn validated_count(logs: &[LogEntry], action_id: ActionId) -> usize {
    logs.iter()
        .filter(|log| {
            matches!(
                log.notification(),
                Ok(Notification::Validated { action_id: id, .. }) if id == action_id
            )
        })
        .count()
}

fn reencodings(attestation: &SignedAttestation) -> Vec<Vec<u8>> {
    let canonical = String::from_utf8(attestation.to_bytes()).unwrap();
    let mut upper = attestation.clone();
    upper.signature = upper.signature.to_uppercase();
    vec![
        serde_json::to_vec_pretty(attestation).unwrap(),
        format!(" {}", canonical).into_bytes(),
        canonical.replacen("\"data\":\"0x", "\"data\":\"", 1).into_bytes(),
        upper.to_bytes(),
    ]
}

#[tokio::test]
async fn test_reencoded_attestation_cannot_validate_twice() {
    let signer = AttestationSigner::generate();
    let (a, b) = endpoints(&signer);
    let id = a.bridge(Address([0x11; 20]), store(), b"once".to_vec()).await.unwrap();
    let log = initiated_log(&a, id).await;
    let attestation = signer.attest(&log);

    b.validate(log.log_index, &attestation.to_bytes()).await.unwrap();
    let head = b.head_block().await;

    for bytes in reencodings(&attestation) {
        let result = b.validate(log.log_index, &bytes).await;
        assert!(
            matches!(result, Err(EndpointError::AttestationInvalid { .. })),
            "re-encoded attestation accepted: {:?}",
            result
        );
    }
    assert!(matches!(
        b.validate(log.log_index, &attestation.to_bytes()).await,
        Err(EndpointError::ReplayedProof { .. })
    ));
    assert_eq!(b.head_block().await, head);
    assert_eq!(validated_count(&b.logs_since(0).await, id), 1);
}

#[tokio::test]
async fn test_failed_action_cannot_be_revived_with_reencoded_proof() {
    let signer = AttestationSigner::generate();
    let (a, b) = endpoints(&signer);
    let id = a.bridge(Address([0x11; 20]), flaky(), b"x".to_vec()).await.unwrap();
    let log = initiated_log(&a, id).await;
    let attestation = signer.attest(&log);

    let dest_id = b.validate(log.log_index, &attestation.to_bytes()).await.unwrap();
    let receipt = b.execute(dest_id).await.unwrap();
    assert!(!receipt.success);
    assert_eq!(b.action_state(&dest_id).await, ActionState::None);

    // Arm the handler so a revived record would now succeed
    let arm_id = a.bridge(Address([0x11; 20]), arm(), vec![1]).await.unwrap();
    let arm_log = initiated_log(&a, arm_id).await;
    let arm_dest = b
        .validate(arm_log.log_index, &signer.attest(&arm_log).to_bytes())
        .await
        .unwrap();
    assert!(b.execute(arm_dest).await.unwrap().success);

    for bytes in reencodings(&attestation) {
        assert!(b.validate(log.log_index, &bytes).await.is_err());
    }
    assert_eq!(b.action_state(&dest_id).await, ActionState::None);
    assert_eq!(b.storage("flaky_ran").await, None);
    assert_eq!(validated_count(&b.logs_since(0).await, dest_id), 1);
}
