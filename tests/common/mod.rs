#![allow(dead_code)]

use gaspay::application::orchestrator::PaymentOrchestrator;
use gaspay::domain::intent::{IntentKind, PaymentIntent, PaymentMethod};
use gaspay::domain::ports::GatewayClientBox;
use gaspay::domain::session::{Credential, Session};
use gaspay::domain::wallet::{Amount, Balance};
use gaspay::infrastructure::gateway::{SandboxBehavior, SandboxGateway};
use gaspay::infrastructure::in_memory::InMemoryBackend;
use rust_decimal::Decimal;

pub const TOKEN: &str = "session-token";
pub const EMAIL: &str = "ada@example.com";

pub fn session(cached: Option<Decimal>) -> Session {
    let session = Session::new(Some(Credential::bearer(TOKEN)));
    match cached {
        Some(balance) => session.with_cached_balance(Balance::new(balance)),
        None => session,
    }
}

/// An orchestrator over a sandbox ledger holding `balance`, whose session has
/// already cached that balance.
pub fn orchestrator(
    balance: Decimal,
    behavior: SandboxBehavior,
) -> (PaymentOrchestrator, InMemoryBackend) {
    let backend = InMemoryBackend::new(Balance::new(balance)).with_token(TOKEN);
    let gateway = SandboxGateway::new(backend.clone(), behavior);
    let orchestrator =
        PaymentOrchestrator::new(Box::new(backend.clone()), Box::new(gateway), session(Some(balance)));
    (orchestrator, backend)
}

pub fn orchestrator_with_gateway(
    backend: &InMemoryBackend,
    gateway: GatewayClientBox,
    cached: Option<Decimal>,
) -> PaymentOrchestrator {
    PaymentOrchestrator::new(Box::new(backend.clone()), gateway, session(cached))
}

pub fn order(amount: Decimal, method: PaymentMethod) -> PaymentIntent {
    PaymentIntent::new(
        IntentKind::Order,
        Some("order-1001".to_string()),
        Amount::new(amount).unwrap(),
        EMAIL,
        method,
    )
    .unwrap()
}

pub fn subscription(amount: Decimal) -> PaymentIntent {
    PaymentIntent::new(
        IntentKind::Subscription,
        Some("plan-monthly-12kg".to_string()),
        Amount::new(amount).unwrap(),
        EMAIL,
        PaymentMethod::Gateway,
    )
    .unwrap()
}

pub fn top_up(amount: Decimal) -> PaymentIntent {
    PaymentIntent::top_up(Amount::new(amount).unwrap(), EMAIL).unwrap()
}
