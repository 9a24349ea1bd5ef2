mod common;

use chrono::Utc;
use collector_sync::application::ports::TransactionStore;
use collector_sync::domain::entities::{
    LifecycleEvent, PaymentReference, PendingTransaction, TransactionState,
};
use collector_sync::domain::value_objects::{IdempotencyKey, ReferenceCode};
use common::mocks::Scripted;
use common::{payload, setup_sync};

#[tokio::test]
async fn lost_response_retry_reuses_reference() {
    let ctx = setup_sync().await;
    ctx.go_online().await;
    let key = ctx.capture(50_000).await;
    ctx.gateway.script(Scripted::LoseResponse);

    let report = ctx.drain().await;
    assert_eq!(report.retried, 1);
    assert_eq!(ctx.transaction(&key).await.state, TransactionState::Queued);
    assert!(ctx.store.get_reference(&key).await.unwrap().is_none());

    ctx.make_due(&key).await;
    let report = ctx.drain().await;
    assert_eq!(report.submitted, 1);

    let stored = ctx.store.get_reference(&key).await.unwrap().unwrap();
    assert_eq!(Some(stored.reference_code), ctx.gateway.reference_for(&key));
    assert_eq!(ctx.gateway.initialize_calls(&key), 2);
    assert_eq!(ctx.gateway.issued_count(), 1);
}

#[tokio::test]
async fn overlapping_drains_submit_each_key_once() {
    let ctx = setup_sync().await;
    ctx.go_online().await;
    let key = ctx.capture(10_000).await;

    let (a, b) = tokio::join!(ctx.reconciler.drain(), ctx.reconciler.drain());
    let ran = [a.unwrap(), b.unwrap()]
        .iter()
        .filter(|report| report.is_some())
        .count();

    assert!(ran >= 1);
    assert_eq!(ctx.gateway.initialize_calls(&key), 1);
    assert_eq!(ctx.gateway.issued_count(), 1);
}

#[tokio::test]
async fn many_captures_are_each_submitted_once() {
    let ctx = setup_sync().await;
    ctx.go_online().await;

    let mut keys = Vec::new();
    for i in 0..12 {
        keys.push(ctx.capture(1_000 + i).await);
    }

    let report = ctx.drain().await;
    assert_eq!(report.submitted, 12);

    for key in &keys {
        assert_eq!(ctx.gateway.initialize_calls(key), 1);
        assert_eq!(
            ctx.transaction(key).await.state,
            TransactionState::AwaitingConfirmation
        );
    }
    assert_eq!(ctx.gateway.issued_count(), 12);
}

#[tokio::test]
async fn interrupted_submission_is_recovered() {
    let ctx = setup_sync().await;
    ctx.go_online().await;

    let key = IdempotencyKey::generate();
    let mut txn = PendingTransaction::new(key.clone(), payload(7_500, Utc::now()));
    txn.apply(LifecycleEvent::SubmitStarted, Utc::now()).unwrap();
    ctx.store.put(&txn).await.unwrap();

    let report = ctx.drain().await;
    assert_eq!(report.submitted, 1);

    let txn = ctx.transaction(&key).await;
    assert_eq!(txn.state, TransactionState::AwaitingConfirmation);
    assert_eq!(txn.attempt_count, 2);
    assert_eq!(ctx.gateway.initialize_calls(&key), 1);
}

#[tokio::test]
async fn recorded_reference_skips_resubmission() {
    let ctx = setup_sync().await;
    ctx.go_online().await;
    let key = ctx.capture(4_000).await;

    let reference = PaymentReference::issued(
        ReferenceCode::new("RRR-900".into()).unwrap(),
        key.clone(),
        None,
        None,
        Utc::now(),
    );
    ctx.store.insert_reference_if_absent(&reference).await.unwrap();

    ctx.drain().await;
    assert_eq!(ctx.gateway.initialize_calls(&key), 0);
    assert_eq!(
        ctx.transaction(&key).await.state,
        TransactionState::AwaitingConfirmation
    );
}

#[tokio::test]
async fn first_stored_reference_wins() {
    let ctx = setup_sync().await;
    let key = ctx.capture(4_000).await;

    let first = PaymentReference::issued(
        ReferenceCode::new("RRR-1".into()).unwrap(),
        key.clone(),
        None,
        None,
        Utc::now(),
    );
    let second = PaymentReference::issued(
        ReferenceCode::new("RRR-2".into()).unwrap(),
        key.clone(),
        None,
        None,
        Utc::now(),
    );

    ctx.store.insert_reference_if_absent(&first).await.unwrap();
    let kept = ctx.store.insert_reference_if_absent(&second).await.unwrap();
    assert_eq!(kept.reference_code.as_str(), "RRR-1");
}
