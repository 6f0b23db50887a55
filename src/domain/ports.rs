use super::intent::IntentKind;
use super::session::Credential;
use super::verification::{InitializedPayment, PaymentReference, VerificationResult};
use super::wallet::{Amount, Balance};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::oneshot;

/// Request to open a gateway transaction. The amount is already in minor units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializeRequest {
    pub kind: IntentKind,
    pub subject_id: Option<String>,
    pub amount_minor: i64,
    pub email: String,
    pub callback_url: Option<String>,
}

/// Backend payment API: gateway bookkeeping and the wallet ledger.
#[async_trait]
pub trait PaymentBackend: Send + Sync {
    async fn initialize(
        &self,
        credential: &Credential,
        request: InitializeRequest,
    ) -> Result<InitializedPayment>;

    async fn verify(
        &self,
        credential: &Credential,
        reference: &PaymentReference,
    ) -> Result<VerificationResult>;

    /// Debits the wallet and returns the ledger's new balance.
    async fn debit_wallet(
        &self,
        credential: &Credential,
        kind: IntentKind,
        subject_id: Option<&str>,
        amount: Amount,
    ) -> Result<Balance>;

    async fn wallet_balance(&self, credential: &Credential) -> Result<Balance>;
}

/// Everything the payment widget needs to present a checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayCheckout {
    pub reference: PaymentReference,
    pub authorization_url: String,
    pub amount_minor: i64,
    pub payer_email: String,
}

/// Terminal callback of an interactive gateway session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    Success(PaymentReference),
    Cancelled,
}

/// Emitting half of a gateway session. Consumed by whichever event fires.
#[derive(Debug)]
pub struct GatewayCallback(oneshot::Sender<GatewayEvent>);

impl GatewayCallback {
    /// Delivers success. Returns false if the attempt was already abandoned.
    pub fn success(self, reference: PaymentReference) -> bool {
        self.0.send(GatewayEvent::Success(reference)).is_ok()
    }

    /// Delivers cancellation. Returns false if the attempt was already abandoned.
    pub fn cancelled(self) -> bool {
        self.0.send(GatewayEvent::Cancelled).is_ok()
    }

    /// Whether the waiting attempt has gone away.
    pub fn is_abandoned(&self) -> bool {
        self.0.is_closed()
    }
}

/// Receiving half of a gateway session: resolves exactly once.
#[derive(Debug)]
pub struct GatewaySignal(oneshot::Receiver<GatewayEvent>);

impl GatewaySignal {
    pub fn channel() -> (GatewayCallback, GatewaySignal) {
        let (tx, rx) = oneshot::channel();
        (GatewayCallback(tx), GatewaySignal(rx))
    }

    /// Waits for the widget's terminal event. A widget that goes away without
    /// reporting anything is treated as closed.
    pub async fn outcome(self) -> GatewayEvent {
        match self.0.await {
            Ok(event) => event,
            Err(_) => {
                tracing::warn!("gateway widget closed without reporting an outcome");
                GatewayEvent::Cancelled
            }
        }
    }
}

/// How control was handed to the gateway.
#[derive(Debug)]
pub enum GatewayHandoff {
    /// Widget runs alongside us; its outcome arrives on the signal.
    Embedded(GatewaySignal),
    /// The payer left for the hosted page; the outcome arrives on the return URL.
    Redirected { authorization_url: String },
}

#[async_trait]
pub trait GatewayClient: Send + Sync {
    fn name(&self) -> &'static str;

    async fn open(&self, checkout: GatewayCheckout) -> Result<GatewayHandoff>;
}

pub type PaymentBackendBox = Box<dyn PaymentBackend>;
pub type GatewayClientBox = Box<dyn GatewayClient>;
