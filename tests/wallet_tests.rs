mod common;

use common::{order, orchestrator, orchestrator_with_gateway};
use gaspay::application::orchestrator::PaymentOutcome;
use gaspay::domain::intent::PaymentMethod;
use gaspay::domain::state::OrchestratorState;
use gaspay::domain::wallet::Balance;
use gaspay::error::PaymentError;
use gaspay::infrastructure::gateway::{SandboxBehavior, SandboxGateway};
use gaspay::infrastructure::in_memory::InMemoryBackend;
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_insufficient_cached_balance_makes_no_calls() {
    let mut rng = rand::thread_rng();
    for _ in 0..25 {
        let balance = Decimal::new(rng.gen_range(0..100_000), 2);
        let excess = Decimal::new(rng.gen_range(1..100_000), 2);
        let (orchestrator, backend) = orchestrator(balance, SandboxBehavior::Approve);

        let err = orchestrator
            .pay(order(balance + excess, PaymentMethod::Wallet))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::InsufficientFunds(_)));
        assert_eq!(backend.calls().await.total(), 0);
    }
}

#[tokio::test]
async fn test_order_with_insufficient_wallet_leaves_balance() {
    let (orchestrator, backend) = orchestrator(dec!(200), SandboxBehavior::Approve);

    let err = orchestrator
        .pay(order(dec!(1000), PaymentMethod::Wallet))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::InsufficientFunds(_)));
    assert_eq!(backend.balance().await, Balance::new(dec!(200)));
    assert_eq!(
        orchestrator.session().cached_balance().await,
        Some(Balance::new(dec!(200)))
    );
    assert!(matches!(
        orchestrator.state(),
        OrchestratorState::Failed(PaymentError::InsufficientFunds(_))
    ));
}

#[tokio::test]
async fn test_wallet_debit_refreshes_balance_from_backend() {
    let (orchestrator, backend) = orchestrator(dec!(2500), SandboxBehavior::Approve);

    let outcome = orchestrator
        .pay(order(dec!(1000), PaymentMethod::Wallet))
        .await
        .unwrap();

    let PaymentOutcome::Settled(settlement) = outcome else {
        panic!("wallet payments settle immediately");
    };
    assert_eq!(settlement.reference, None);
    assert_eq!(settlement.wallet_balance, Some(Balance::new(dec!(1500))));
    assert_eq!(orchestrator.state(), OrchestratorState::Settled);

    let calls = backend.calls().await;
    assert_eq!(calls.debit, 1);
    // The post-debit balance came from a fresh read, not from arithmetic.
    assert_eq!(calls.balance, 1);
    assert!(calls.verify.is_empty());
    assert_eq!(
        orchestrator.session().cached_balance().await,
        Some(Balance::new(dec!(1500)))
    );
}

#[tokio::test]
async fn test_server_side_insufficient_funds_is_authoritative() {
    // The session still believes 2500 is available; another tab spent most of it.
    let (orchestrator, backend) = orchestrator(dec!(2500), SandboxBehavior::Approve);
    backend.set_balance(Balance::new(dec!(300))).await;

    let err = orchestrator
        .pay(order(dec!(1000), PaymentMethod::Wallet))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::InsufficientFunds(_)));
    let calls = backend.calls().await;
    assert_eq!(calls.debit, 1);
    assert_eq!(calls.balance, 1);
    assert_eq!(
        orchestrator.session().cached_balance().await,
        Some(Balance::new(dec!(300)))
    );
}

#[tokio::test]
async fn test_uncached_balance_is_fetched_before_check() {
    let backend = InMemoryBackend::new(Balance::new(dec!(200))).with_token(common::TOKEN);
    let orchestrator = orchestrator_with_gateway(
        &backend,
        Box::new(SandboxGateway::new(backend.clone(), SandboxBehavior::Approve)),
        None,
    );

    let err = orchestrator
        .pay(order(dec!(1000), PaymentMethod::Wallet))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::InsufficientFunds(_)));
    let calls = backend.calls().await;
    assert_eq!(calls.balance, 1);
    assert_eq!(calls.debit, 0);
}

#[tokio::test]
async fn test_concurrent_wallet_attempts_are_rejected() {
    let backend = InMemoryBackend::new(Balance::new(dec!(1000)))
        .with_token(common::TOKEN)
        .with_latency(Duration::from_millis(100));
    let orchestrator = Arc::new(orchestrator_with_gateway(
        &backend,
        Box::new(SandboxGateway::new(backend.clone(), SandboxBehavior::Approve)),
        Some(dec!(1000)),
    ));

    let first = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move { orchestrator.pay(order(dec!(800), PaymentMethod::Wallet)).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let second = orchestrator
        .pay(order(dec!(800), PaymentMethod::Wallet))
        .await;
    assert_eq!(second, Err(PaymentError::AttemptInProgress));

    let first = first.await.unwrap();
    assert!(matches!(first, Ok(PaymentOutcome::Settled(_))));
    assert_eq!(backend.calls().await.debit, 1);
    assert_eq!(backend.balance().await, Balance::new(dec!(200)));
}

#[tokio::test]
async fn test_rejected_token_is_unauthenticated() {
    let backend = InMemoryBackend::new(Balance::new(dec!(1000))).with_token("someone-else");
    let orchestrator = orchestrator_with_gateway(
        &backend,
        Box::new(SandboxGateway::new(backend.clone(), SandboxBehavior::Approve)),
        Some(dec!(1000)),
    );

    let err = orchestrator
        .pay(order(dec!(100), PaymentMethod::Wallet))
        .await
        .unwrap_err();

    assert!(matches!(err, PaymentError::Unauthenticated(_)));
    assert!(err.is_fatal());
    // One debit attempt, no automatic retry.
    assert_eq!(backend.calls().await.debit, 1);
}
