use crate::domain::ports::{
    GatewayCallback, GatewayCheckout, GatewayClient, GatewayHandoff, GatewaySignal,
};
use crate::domain::verification::PaymentReference;
use crate::error::{PaymentError, Result};
use crate::infrastructure::in_memory::InMemoryBackend;
use async_trait::async_trait;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};

/// Sends the payer to the gateway's hosted page.
///
/// The page navigates away, so no event ever fires in this process; the
/// outcome is recovered from the return URL instead.
#[derive(Debug, Default, Clone)]
pub struct RedirectGateway;

#[async_trait]
impl GatewayClient for RedirectGateway {
    fn name(&self) -> &'static str {
        "redirect"
    }

    async fn open(&self, checkout: GatewayCheckout) -> Result<GatewayHandoff> {
        tracing::info!(
            reference = %checkout.reference,
            url = %checkout.authorization_url,
            "redirecting payer to hosted checkout"
        );
        Ok(GatewayHandoff::Redirected {
            authorization_url: checkout.authorization_url,
        })
    }
}

/// An embedded checkout widget whose result is reported by whoever drives it.
///
/// Each opened checkout is announced on the channel returned by
/// [`PopupGateway::new`]; the driver later calls [`PopupGateway::complete`] or
/// [`PopupGateway::close`] with its reference.
#[derive(Debug, Clone)]
pub struct PopupGateway {
    pending: Arc<Mutex<HashMap<PaymentReference, GatewayCallback>>>,
    opened: mpsc::UnboundedSender<GatewayCheckout>,
}

impl PopupGateway {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GatewayCheckout>) {
        let (opened, rx) = mpsc::unbounded_channel();
        (
            Self {
                pending: Arc::new(Mutex::new(HashMap::new())),
                opened,
            },
            rx,
        )
    }

    /// Reports a successful charge. Returns false if no such popup is open.
    pub async fn complete(&self, reference: &PaymentReference) -> bool {
        match self.pending.lock().await.remove(reference) {
            Some(callback) => callback.success(reference.clone()),
            None => false,
        }
    }

    /// Reports that the payer closed the popup. Returns false if none is open.
    pub async fn close(&self, reference: &PaymentReference) -> bool {
        match self.pending.lock().await.remove(reference) {
            Some(callback) => callback.cancelled(),
            None => false,
        }
    }

    pub async fn open_count(&self) -> usize {
        let mut pending = self.pending.lock().await;
        prune_abandoned(&mut pending);
        pending.len()
    }
}

/// Drops popups whose attempt was abandoned by the caller.
fn prune_abandoned(pending: &mut HashMap<PaymentReference, GatewayCallback>) {
    pending.retain(|reference, callback| {
        let abandoned = callback.is_abandoned();
        if abandoned {
            tracing::debug!(%reference, "discarding popup of abandoned attempt");
        }
        !abandoned
    });
}

#[async_trait]
impl GatewayClient for PopupGateway {
    fn name(&self) -> &'static str {
        "popup"
    }

    async fn open(&self, checkout: GatewayCheckout) -> Result<GatewayHandoff> {
        let (callback, signal) = GatewaySignal::channel();
        {
            let mut pending = self.pending.lock().await;
            prune_abandoned(&mut pending);
            pending.insert(checkout.reference.clone(), callback);
        }
        tracing::info!(reference = %checkout.reference, "checkout popup opened");
        // Nobody listening just means nobody will drive this popup.
        let _ = self.opened.send(checkout);
        Ok(GatewayHandoff::Embedded(signal))
    }
}

/// Scripted payer behaviour for the sandbox gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxBehavior {
    /// Card is charged and the widget reports success.
    Approve,
    /// Widget reports success but the issuer declined; verification fails.
    Decline,
    /// Payer closes the widget before paying.
    Cancel,
    /// Widget disappears without reporting anything.
    Vanish,
}

impl FromStr for SandboxBehavior {
    type Err = PaymentError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "decline" => Ok(Self::Decline),
            "cancel" => Ok(Self::Cancel),
            "vanish" => Ok(Self::Vanish),
            other => Err(PaymentError::ValidationError(format!(
                "Unknown sandbox behavior: {}",
                other
            ))),
        }
    }
}

/// Embedded gateway that settles immediately against the sandbox ledger.
#[derive(Debug, Clone)]
pub struct SandboxGateway {
    backend: InMemoryBackend,
    behavior: SandboxBehavior,
}

impl SandboxGateway {
    pub fn new(backend: InMemoryBackend, behavior: SandboxBehavior) -> Self {
        Self { backend, behavior }
    }
}

#[async_trait]
impl GatewayClient for SandboxGateway {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    async fn open(&self, checkout: GatewayCheckout) -> Result<GatewayHandoff> {
        let (callback, signal) = GatewaySignal::channel();
        tracing::debug!(reference = %checkout.reference, behavior = ?self.behavior, "sandbox checkout");

        match self.behavior {
            SandboxBehavior::Approve => {
                self.backend.record_charge(&checkout.reference).await;
                callback.success(checkout.reference);
            }
            SandboxBehavior::Decline => {
                self.backend
                    .record_decline(&checkout.reference, "Declined by issuer")
                    .await;
                callback.success(checkout.reference);
            }
            SandboxBehavior::Cancel => {
                callback.cancelled();
            }
            SandboxBehavior::Vanish => drop(callback),
        }
        Ok(GatewayHandoff::Embedded(signal))
    }
}
