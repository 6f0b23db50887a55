use crate::domain::intent::{IntentKind, PaymentIntent, PaymentMethod};
use crate::domain::ports::{
    GatewayCheckout, GatewayClientBox, GatewayEvent, GatewayHandoff, InitializeRequest,
    PaymentBackendBox,
};
use crate::domain::session::{Credential, Session};
use crate::domain::state::OrchestratorState;
use crate::domain::verification::PaymentReference;
use crate::domain::wallet::Balance;
use crate::error::{PaymentError, Result};
use crate::interfaces::return_url::reference_from_return_url;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, MutexGuard, watch};
use uuid::Uuid;

/// A payment the backend has confirmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    /// Unknown when recovered from a return URL alone.
    pub kind: Option<IntentKind>,
    /// Absent for wallet debits, which never touch the gateway.
    pub reference: Option<PaymentReference>,
    /// Major units.
    pub amount: Decimal,
    /// Balance re-read from the backend, when the payment could have moved it
    /// and the re-read succeeded.
    pub wallet_balance: Option<Balance>,
}

/// Result of a payment attempt that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Settled(Settlement),
    /// The payer was sent to the hosted checkout page. The attempt completes
    /// through [`PaymentOrchestrator::resume_from_return_url`].
    AwaitingRedirect {
        reference: PaymentReference,
        authorization_url: String,
    },
}

/// One in-flight attempt. Holds the orchestrator's attempt slot and publishes
/// its state; `finish` and `fail` consume it, so an attempt ends exactly once.
struct Attempt<'a> {
    id: Uuid,
    state: &'a watch::Sender<OrchestratorState>,
    _slot: MutexGuard<'a, ()>,
    finished: bool,
}

impl Attempt<'_> {
    fn advance(&self, next: OrchestratorState) {
        let current = self.state.borrow().clone();
        if !current.can_transition_to(&next) {
            tracing::error!(
                attempt = %self.id,
                from = current.label(),
                to = next.label(),
                "illegal payment state transition"
            );
        }
        tracing::debug!(attempt = %self.id, from = current.label(), to = next.label(), "payment state changed");
        self.state.send_replace(next);
    }

    fn finish(mut self, outcome: PaymentOutcome) -> PaymentOutcome {
        match &outcome {
            PaymentOutcome::Settled(settlement) => {
                tracing::info!(
                    attempt = %self.id,
                    reference = ?settlement.reference.as_ref().map(PaymentReference::as_str),
                    amount = %settlement.amount,
                    "payment settled"
                );
                self.advance(OrchestratorState::Settled);
            }
            PaymentOutcome::AwaitingRedirect { reference, .. } => {
                tracing::info!(attempt = %self.id, %reference, "payment handed off to gateway redirect");
            }
        }
        self.finished = true;
        outcome
    }

    fn fail(mut self, error: PaymentError) -> PaymentError {
        match &error {
            PaymentError::UnknownIntentKind(_) => {
                tracing::error!(attempt = %self.id, %error, "payment attempt failed")
            }
            PaymentError::UserCancelled => {
                tracing::info!(attempt = %self.id, "payment cancelled by payer")
            }
            _ => tracing::warn!(attempt = %self.id, %error, "payment attempt failed"),
        }
        self.advance(OrchestratorState::Failed(error.clone()));
        self.finished = true;
        error
    }
}

impl Drop for Attempt<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!(attempt = %self.id, "payment attempt abandoned before completion");
            self.state.send_replace(OrchestratorState::Idle);
        }
    }
}

/// Decides how a purchase is paid and reconciles the outcome.
///
/// Wallet payments are debited directly on the backend ledger; gateway
/// payments are initialized on the backend, handed to the gateway widget, and
/// settled only after the backend verifies the reference. At most one attempt
/// runs at a time; a second submission while one is in flight is rejected
/// with [`PaymentError::AttemptInProgress`]. Nothing is retried automatically.
pub struct PaymentOrchestrator {
    backend: PaymentBackendBox,
    gateway: GatewayClientBox,
    session: Session,
    callback_url: Option<String>,
    state: watch::Sender<OrchestratorState>,
    in_flight: Mutex<()>,
}

impl PaymentOrchestrator {
    pub fn new(backend: PaymentBackendBox, gateway: GatewayClientBox, session: Session) -> Self {
        let (state, _) = watch::channel(OrchestratorState::Idle);
        Self {
            backend,
            gateway,
            session,
            callback_url: None,
            state,
            in_flight: Mutex::new(()),
        }
    }

    /// Where the gateway sends the payer back after a hosted checkout.
    pub fn with_callback_url(mut self, callback_url: impl Into<String>) -> Self {
        self.callback_url = Some(callback_url.into());
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> OrchestratorState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.state.subscribe()
    }

    /// Returns to `Idle`, e.g. when the checkout view is torn down.
    ///
    /// Returns false, and changes nothing, while an attempt is still running.
    pub fn reset(&self) -> bool {
        match self.in_flight.try_lock() {
            Ok(_slot) => {
                self.state.send_replace(OrchestratorState::Idle);
                true
            }
            Err(_) => false,
        }
    }

    /// Re-reads the wallet balance into the session cache.
    pub async fn refresh_balance(&self) -> Result<Balance> {
        let credential = self.session.credential()?;
        self.fetch_balance(credential).await
    }

    /// Pays for `intent` with the method it names.
    pub async fn pay(&self, intent: PaymentIntent) -> Result<PaymentOutcome> {
        let attempt = self.begin()?;
        tracing::info!(
            attempt = %attempt.id,
            kind = %intent.kind(),
            method = ?intent.method(),
            amount = %intent.amount(),
            "payment submitted"
        );

        let result = match intent.method() {
            PaymentMethod::Wallet => self.pay_from_wallet(&attempt, &intent).await,
            PaymentMethod::Gateway => self.pay_through_gateway(&attempt, &intent).await,
        };
        match result {
            Ok(outcome) => Ok(attempt.finish(outcome)),
            Err(error) => Err(attempt.fail(error)),
        }
    }

    /// Completes a redirected payment from the URL the gateway sent the payer
    /// back to. Derives everything from the reference in the URL; whatever
    /// this orchestrator held in memory before is ignored.
    pub async fn resume_from_return_url(&self, return_url: &str) -> Result<PaymentOutcome> {
        let attempt = self.begin()?;
        let result = match reference_from_return_url(return_url) {
            Ok(reference) => self.recover(&attempt, reference).await,
            Err(error) => Err(error),
        };
        match result {
            Ok(outcome) => Ok(attempt.finish(outcome)),
            Err(error) => Err(attempt.fail(error)),
        }
    }

    /// Same recovery path for callers that already hold the reference.
    pub async fn verify_reference(&self, reference: PaymentReference) -> Result<PaymentOutcome> {
        let attempt = self.begin()?;
        match self.recover(&attempt, reference).await {
            Ok(outcome) => Ok(attempt.finish(outcome)),
            Err(error) => Err(attempt.fail(error)),
        }
    }

    fn begin(&self) -> Result<Attempt<'_>> {
        let slot = self.in_flight.try_lock().map_err(|_| {
            tracing::warn!("rejecting payment submission while another attempt is in flight");
            PaymentError::AttemptInProgress
        })?;
        self.state.send_replace(OrchestratorState::Idle);
        Ok(Attempt {
            id: Uuid::new_v4(),
            state: &self.state,
            _slot: slot,
            finished: false,
        })
    }

    async fn pay_from_wallet(
        &self,
        attempt: &Attempt<'_>,
        intent: &PaymentIntent,
    ) -> Result<PaymentOutcome> {
        let credential = self.session.credential()?;
        let amount = intent.amount();

        let balance = match self.session.cached_balance().await {
            Some(balance) => balance,
            None => self.fetch_balance(credential).await?,
        };
        if !balance.covers(amount) {
            return Err(PaymentError::InsufficientFunds(format!(
                "wallet balance {} is less than {}",
                balance, amount
            )));
        }

        attempt.advance(OrchestratorState::AwaitingGatewayOrWallet);
        self.session.invalidate_balance().await;

        match self
            .backend
            .debit_wallet(credential, intent.kind(), intent.subject_id(), amount)
            .await
        {
            Ok(reported) => {
                tracing::debug!(attempt = %attempt.id, %reported, "wallet debited");
                let wallet_balance = self.refresh_after_write(credential).await;
                Ok(PaymentOutcome::Settled(Settlement {
                    kind: Some(intent.kind()),
                    reference: None,
                    amount: amount.value(),
                    wallet_balance,
                }))
            }
            Err(error) => {
                // The ledger disagreed with our cached copy, so that copy is wrong.
                if matches!(
                    error,
                    PaymentError::InsufficientFunds(_) | PaymentError::DebitRejected(_)
                ) {
                    self.refresh_after_write(credential).await;
                }
                Err(error)
            }
        }
    }

    async fn pay_through_gateway(
        &self,
        attempt: &Attempt<'_>,
        intent: &PaymentIntent,
    ) -> Result<PaymentOutcome> {
        let credential = self.session.credential()?;
        attempt.advance(OrchestratorState::Initializing);

        let amount_minor = intent.amount().to_minor_units()?;
        let initialized = self
            .backend
            .initialize(
                credential,
                InitializeRequest {
                    kind: intent.kind(),
                    subject_id: intent.subject_id().map(str::to_string),
                    amount_minor,
                    email: intent.payer_email().to_string(),
                    callback_url: self.callback_url.clone(),
                },
            )
            .await?;
        let reference = initialized.reference;
        tracing::debug!(attempt = %attempt.id, %reference, gateway = self.gateway.name(), "opening gateway");

        attempt.advance(OrchestratorState::AwaitingGatewayOrWallet);
        let handoff = self
            .gateway
            .open(GatewayCheckout {
                reference: reference.clone(),
                authorization_url: initialized.authorization_url,
                amount_minor,
                payer_email: intent.payer_email().to_string(),
            })
            .await?;

        let signal = match handoff {
            GatewayHandoff::Redirected { authorization_url } => {
                return Ok(PaymentOutcome::AwaitingRedirect {
                    reference,
                    authorization_url,
                });
            }
            GatewayHandoff::Embedded(signal) => signal,
        };

        match signal.outcome().await {
            GatewayEvent::Cancelled => return Err(PaymentError::UserCancelled),
            GatewayEvent::Success(reported) if reported != reference => {
                return Err(PaymentError::VerificationFailed {
                    reference: reference.to_string(),
                    reason: format!("gateway reported unexpected reference {}", reported),
                });
            }
            GatewayEvent::Success(_) => {}
        }

        if intent.kind() == IntentKind::TopUp {
            self.session.invalidate_balance().await;
        }
        attempt.advance(OrchestratorState::Verifying);
        let verdict = self
            .backend
            .verify(credential, &reference)
            .await?
            .into_confirmed()?;

        if verdict.reference != reference {
            return Err(PaymentError::VerificationFailed {
                reference: reference.to_string(),
                reason: format!("backend verified a different reference {}", verdict.reference),
            });
        }
        if verdict.amount != intent.amount().value() {
            return Err(PaymentError::VerificationFailed {
                reference: reference.to_string(),
                reason: format!(
                    "verified amount {} does not match {}",
                    verdict.amount,
                    intent.amount()
                ),
            });
        }

        let wallet_balance = if intent.kind() == IntentKind::TopUp {
            self.refresh_after_write(credential).await
        } else {
            None
        };
        Ok(PaymentOutcome::Settled(Settlement {
            kind: Some(intent.kind()),
            reference: Some(reference),
            amount: verdict.amount,
            wallet_balance,
        }))
    }

    async fn recover(
        &self,
        attempt: &Attempt<'_>,
        reference: PaymentReference,
    ) -> Result<PaymentOutcome> {
        let credential = self.session.credential()?;
        tracing::info!(attempt = %attempt.id, %reference, "recovering payment from reference");

        attempt.advance(OrchestratorState::Verifying);
        let verdict = self
            .backend
            .verify(credential, &reference)
            .await?
            .into_confirmed()?;
        if verdict.reference != reference {
            return Err(PaymentError::VerificationFailed {
                reference: reference.to_string(),
                reason: format!("backend verified a different reference {}", verdict.reference),
            });
        }

        // The reference alone does not say whether this was a top-up.
        self.session.invalidate_balance().await;
        let wallet_balance = self.refresh_after_write(credential).await;
        Ok(PaymentOutcome::Settled(Settlement {
            kind: None,
            reference: Some(reference),
            amount: verdict.amount,
            wallet_balance,
        }))
    }

    async fn fetch_balance(&self, credential: &Credential) -> Result<Balance> {
        let balance = self.backend.wallet_balance(credential).await?;
        self.session.store_balance(balance).await;
        Ok(balance)
    }

    /// Best-effort re-read after a wallet write. On failure the cache stays
    /// invalidated and the next wallet payment fetches a fresh copy.
    async fn refresh_after_write(&self, credential: &Credential) -> Option<Balance> {
        match self.fetch_balance(credential).await {
            Ok(balance) => Some(balance),
            Err(error) => {
                tracing::warn!(%error, "could not refresh wallet balance after payment");
                None
            }
        }
    }
}
