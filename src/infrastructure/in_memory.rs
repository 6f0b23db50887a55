use crate::domain::intent::IntentKind;
use crate::domain::ports::{InitializeRequest, PaymentBackend};
use crate::domain::session::Credential;
use crate::domain::verification::{InitializedPayment, PaymentReference, VerificationResult};
use crate::domain::wallet::{Amount, Balance};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Every request the sandbox backend has received, in arrival order per kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallLog {
    pub initialize: usize,
    pub verify: Vec<PaymentReference>,
    pub debit: usize,
    pub balance: usize,
}

impl CallLog {
    pub fn total(&self) -> usize {
        self.initialize + self.verify.len() + self.debit + self.balance
    }

    pub fn verify_count(&self, reference: &str) -> usize {
        self.verify.iter().filter(|r| r.as_str() == reference).count()
    }
}

#[derive(Debug, Clone)]
struct SandboxTransaction {
    kind: IntentKind,
    amount: Decimal,
    charged: bool,
    declined: Option<String>,
    verdict: Option<VerificationResult>,
}

#[derive(Debug, Default)]
struct Ledger {
    balance: Balance,
    transactions: HashMap<PaymentReference, SandboxTransaction>,
    calls: CallLog,
}

/// A sandbox stand-in for the backend payment API.
///
/// Keeps a wallet ledger and gateway transactions in memory behind
/// `Arc<RwLock<..>>`, so clones share state. Backs the CLI's `--sandbox` mode
/// and the test suite, which inspects [`CallLog`] to assert on network usage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    ledger: Arc<RwLock<Ledger>>,
    accepted_token: Option<String>,
    latency: Option<Duration>,
}

impl InMemoryBackend {
    /// Creates a sandbox ledger holding `balance` that accepts any token.
    pub fn new(balance: Balance) -> Self {
        Self {
            ledger: Arc::new(RwLock::new(Ledger {
                balance,
                ..Ledger::default()
            })),
            accepted_token: None,
            latency: None,
        }
    }

    /// Only `token` will be accepted; anything else is rejected as unauthenticated.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.accepted_token = Some(token.into());
        self
    }

    /// Delays every response, simulating a slow network.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn calls(&self) -> CallLog {
        self.ledger.read().await.calls.clone()
    }

    pub async fn balance(&self) -> Balance {
        self.ledger.read().await.balance
    }

    /// Changes the balance behind the client's back, as another tab would.
    pub async fn set_balance(&self, balance: Balance) {
        self.ledger.write().await.balance = balance;
    }

    /// Marks a reference as charged by the gateway. Returns false if unknown.
    pub async fn record_charge(&self, reference: &PaymentReference) -> bool {
        let mut ledger = self.ledger.write().await;
        match ledger.transactions.get_mut(reference) {
            Some(tx) => {
                tx.charged = true;
                true
            }
            None => false,
        }
    }

    /// Marks a reference as declined by the issuer. Returns false if unknown.
    pub async fn record_decline(&self, reference: &PaymentReference, reason: &str) -> bool {
        let mut ledger = self.ledger.write().await;
        match ledger.transactions.get_mut(reference) {
            Some(tx) => {
                tx.declined = Some(reason.to_string());
                true
            }
            None => false,
        }
    }

    /// Registers an already-charged transaction, as if initialized and paid in
    /// an earlier page load.
    pub async fn insert_charged(&self, reference: PaymentReference, kind: IntentKind, amount: Amount) {
        let mut ledger = self.ledger.write().await;
        ledger.transactions.insert(
            reference,
            SandboxTransaction {
                kind,
                amount: amount.value(),
                charged: true,
                declined: None,
                verdict: None,
            },
        );
    }

    fn authorize(&self, credential: &Credential) -> Result<()> {
        match &self.accepted_token {
            Some(token) if token != credential.token() => Err(PaymentError::Unauthenticated(
                "Invalid or expired token".to_string(),
            )),
            _ => Ok(()),
        }
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl PaymentBackend for InMemoryBackend {
    async fn initialize(
        &self,
        credential: &Credential,
        request: InitializeRequest,
    ) -> Result<InitializedPayment> {
        self.ledger.write().await.calls.initialize += 1;
        self.simulate_latency().await;
        self.authorize(credential)?;

        let amount = Amount::from_minor_units(request.amount_minor)?;
        let reference = PaymentReference::new(format!("sbx_{}", Uuid::new_v4().simple()))?;
        let authorization_url = format!("https://checkout.sandbox.gaspay.local/{}", reference);

        let mut ledger = self.ledger.write().await;
        ledger.transactions.insert(
            reference.clone(),
            SandboxTransaction {
                kind: request.kind,
                amount: amount.value(),
                charged: false,
                declined: None,
                verdict: None,
            },
        );

        Ok(InitializedPayment {
            reference,
            authorization_url,
        })
    }

    async fn verify(
        &self,
        credential: &Credential,
        reference: &PaymentReference,
    ) -> Result<VerificationResult> {
        self.ledger.write().await.calls.verify.push(reference.clone());
        self.simulate_latency().await;
        self.authorize(credential)?;

        let mut ledger = self.ledger.write().await;
        let Some(tx) = ledger.transactions.get(reference).cloned() else {
            return Ok(VerificationResult {
                success: false,
                reference: reference.clone(),
                amount: Decimal::ZERO,
                timestamp: Utc::now(),
                failure_reason: Some("Transaction reference not found".to_string()),
            });
        };

        // Once a verdict exists it is returned verbatim.
        if let Some(verdict) = tx.verdict {
            return Ok(verdict);
        }

        let verdict = if let Some(reason) = tx.declined {
            VerificationResult {
                success: false,
                reference: reference.clone(),
                amount: tx.amount,
                timestamp: Utc::now(),
                failure_reason: Some(reason),
            }
        } else if tx.charged {
            VerificationResult {
                success: true,
                reference: reference.clone(),
                amount: tx.amount,
                timestamp: Utc::now(),
                failure_reason: None,
            }
        } else {
            // Not charged yet: report, but do not record a terminal verdict.
            return Ok(VerificationResult {
                success: false,
                reference: reference.clone(),
                amount: tx.amount,
                timestamp: Utc::now(),
                failure_reason: Some("Transaction was not completed".to_string()),
            });
        };

        if verdict.success && tx.kind == IntentKind::TopUp {
            let credited = Balance::new(ledger.balance.value() + tx.amount);
            ledger.balance = credited;
        }
        if let Some(stored) = ledger.transactions.get_mut(reference) {
            stored.verdict = Some(verdict.clone());
        }
        Ok(verdict)
    }

    async fn debit_wallet(
        &self,
        credential: &Credential,
        _kind: IntentKind,
        _subject_id: Option<&str>,
        amount: Amount,
    ) -> Result<Balance> {
        self.ledger.write().await.calls.debit += 1;
        self.simulate_latency().await;
        self.authorize(credential)?;

        let mut ledger = self.ledger.write().await;
        if !ledger.balance.covers(amount) {
            return Err(PaymentError::InsufficientFunds(format!(
                "Wallet balance {} is less than {}",
                ledger.balance, amount
            )));
        }
        let debited = Balance::new(ledger.balance.value() - amount.value());
        ledger.balance = debited;
        Ok(debited)
    }

    async fn wallet_balance(&self, credential: &Credential) -> Result<Balance> {
        self.ledger.write().await.calls.balance += 1;
        self.simulate_latency().await;
        self.authorize(credential)?;

        Ok(self.ledger.read().await.balance)
    }
}
