mod common;

use common::{order, orchestrator, orchestrator_with_gateway, subscription, top_up};
use gaspay::application::orchestrator::PaymentOutcome;
use gaspay::domain::intent::PaymentMethod;
use gaspay::domain::ports::PaymentBackend;
use gaspay::domain::session::Credential;
use gaspay::domain::state::OrchestratorState;
use gaspay::domain::wallet::Balance;
use gaspay::error::PaymentError;
use gaspay::infrastructure::gateway::{PopupGateway, SandboxBehavior};
use gaspay::infrastructure::in_memory::InMemoryBackend;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn test_wallet_top_up_through_gateway() {
    let (orchestrator, backend) = orchestrator(dec!(0), SandboxBehavior::Approve);

    let outcome = orchestrator.pay(top_up(dec!(5000))).await.unwrap();

    let PaymentOutcome::Settled(settlement) = outcome else {
        panic!("popup top-up should settle");
    };
    assert_eq!(settlement.amount, dec!(5000));
    assert_eq!(settlement.wallet_balance, Some(Balance::new(dec!(5000))));
    assert_eq!(backend.balance().await, Balance::new(dec!(5000)));

    let calls = backend.calls().await;
    assert_eq!(calls.initialize, 1);
    assert_eq!(calls.verify.len(), 1);
    assert_eq!(calls.balance, 1);
    assert_eq!(
        orchestrator.session().cached_balance().await,
        Some(Balance::new(dec!(5000)))
    );
}

#[tokio::test]
async fn test_closed_subscription_popup_never_verifies() {
    let (orchestrator, backend) = orchestrator(dec!(750), SandboxBehavior::Cancel);

    let err = orchestrator.pay(subscription(dec!(4500))).await.unwrap_err();

    assert_eq!(err, PaymentError::UserCancelled);
    let calls = backend.calls().await;
    assert_eq!(calls.initialize, 1);
    assert!(calls.verify.is_empty());
    assert_eq!(calls.balance, 0);
    assert_eq!(backend.balance().await, Balance::new(dec!(750)));
    assert_eq!(
        orchestrator.session().cached_balance().await,
        Some(Balance::new(dec!(750)))
    );
}

#[tokio::test]
async fn test_gateway_success_without_confirmation_fails() {
    let (orchestrator, backend) = orchestrator(dec!(0), SandboxBehavior::Decline);

    let err = orchestrator
        .pay(order(dec!(1200), PaymentMethod::Gateway))
        .await
        .unwrap_err();

    assert!(matches!(
        &err,
        PaymentError::VerificationFailed { reason, .. } if reason == "Declined by issuer"
    ));
    assert!(!err.is_retryable());
    assert!(matches!(
        orchestrator.state(),
        OrchestratorState::Failed(PaymentError::VerificationFailed { .. })
    ));
    assert_eq!(backend.calls().await.verify.len(), 1);
}

#[tokio::test]
async fn test_retry_requests_fresh_reference() {
    let (orchestrator, backend) = orchestrator(dec!(0), SandboxBehavior::Approve);

    let first = orchestrator.pay(top_up(dec!(100))).await.unwrap();
    let second = orchestrator.pay(top_up(dec!(100))).await.unwrap();

    let (PaymentOutcome::Settled(first), PaymentOutcome::Settled(second)) = (first, second) else {
        panic!("both top-ups should settle");
    };
    assert_ne!(first.reference, second.reference);
    assert_eq!(backend.calls().await.initialize, 2);
    assert_eq!(backend.balance().await, Balance::new(dec!(200)));
}

#[tokio::test]
async fn test_verification_is_idempotent() {
    let (orchestrator, backend) = orchestrator(dec!(0), SandboxBehavior::Approve);
    let PaymentOutcome::Settled(settlement) = orchestrator.pay(top_up(dec!(5000))).await.unwrap()
    else {
        panic!("top-up should settle");
    };
    let reference = settlement.reference.unwrap();

    let credential = Credential::bearer(common::TOKEN);
    let first = backend.verify(&credential, &reference).await.unwrap();
    let second = backend.verify(&credential, &reference).await.unwrap();

    assert_eq!(first, second);
    // Re-verifying a top-up never credits the wallet twice.
    assert_eq!(backend.balance().await, Balance::new(dec!(5000)));
}

#[tokio::test]
async fn test_popup_attempt_blocks_new_submission_until_closed() {
    let backend = InMemoryBackend::new(Balance::ZERO).with_token(common::TOKEN);
    let (popup, mut opened) = PopupGateway::new();
    let orchestrator = Arc::new(orchestrator_with_gateway(
        &backend,
        Box::new(popup.clone()),
        Some(dec!(0)),
    ));

    let pending = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.pay(subscription(dec!(4500))).await })
    };
    let checkout = opened.recv().await.unwrap();
    assert_eq!(checkout.amount_minor, 450_000);
    assert_eq!(
        orchestrator.state(),
        OrchestratorState::AwaitingGatewayOrWallet
    );
    assert!(!orchestrator.reset());

    let rejected = orchestrator.pay(top_up(dec!(100))).await;
    assert_eq!(rejected, Err(PaymentError::AttemptInProgress));

    assert!(popup.close(&checkout.reference).await);
    assert_eq!(pending.await.unwrap(), Err(PaymentError::UserCancelled));
    assert!(backend.calls().await.verify.is_empty());
}

#[tokio::test]
async fn test_abandoned_popup_attempt_leaves_nothing_pending() {
    let backend = InMemoryBackend::new(Balance::ZERO).with_token(common::TOKEN);
    let (popup, _opened) = PopupGateway::new();
    let orchestrator = orchestrator_with_gateway(&backend, Box::new(popup.clone()), Some(dec!(0)));

    let result = tokio::time::timeout(
        std::time::Duration::from_millis(50),
        orchestrator.pay(subscription(dec!(4500))),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    assert_eq!(popup.open_count().await, 0);
}

#[tokio::test]
async fn test_popup_completion_settles_after_verification() {
    let backend = InMemoryBackend::new(Balance::ZERO).with_token(common::TOKEN);
    let (popup, mut opened) = PopupGateway::new();
    let orchestrator = Arc::new(orchestrator_with_gateway(
        &backend,
        Box::new(popup.clone()),
        Some(dec!(0)),
    ));

    let pending = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.pay(top_up(dec!(2500))).await })
    };
    let checkout = opened.recv().await.unwrap();
    backend.record_charge(&checkout.reference).await;
    assert!(popup.complete(&checkout.reference).await);

    let outcome = pending.await.unwrap().unwrap();
    assert!(matches!(outcome, PaymentOutcome::Settled(_)));
    assert_eq!(backend.calls().await.verify_count(checkout.reference.as_str()), 1);
    assert_eq!(backend.balance().await, Balance::new(dec!(2500)));
}

#[tokio::test]
async fn test_expired_session_fails_before_initialize() {
    let backend = InMemoryBackend::new(Balance::ZERO);
    let (popup, _opened) = PopupGateway::new();
    let expired = Credential::bearer(common::TOKEN)
        .expiring_at(chrono::Utc::now() - chrono::Duration::hours(1));
    let orchestrator = gaspay::application::orchestrator::PaymentOrchestrator::new(
        Box::new(backend.clone()),
        Box::new(popup),
        gaspay::domain::session::Session::new(Some(expired)),
    );

    let err = orchestrator.pay(top_up(dec!(100))).await.unwrap_err();

    assert!(matches!(err, PaymentError::Unauthenticated(_)));
    assert_eq!(backend.calls().await.total(), 0);
}
