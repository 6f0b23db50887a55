use super::wallet::Amount;
use crate::error::PaymentError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What is being paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    Order,
    Subscription,
    #[serde(rename = "topup")]
    TopUp,
}

impl IntentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Order => "order",
            Self::Subscription => "subscription",
            Self::TopUp => "topup",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentKind {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "order" => Ok(Self::Order),
            "subscription" => Ok(Self::Subscription),
            "topup" | "top-up" | "top_up" => Ok(Self::TopUp),
            other => {
                tracing::error!(kind = other, "rejecting payment intent of unknown kind");
                Err(PaymentError::UnknownIntentKind(other.to_string()))
            }
        }
    }
}

/// How the payer settles the intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Wallet,
    Gateway,
}

impl FromStr for PaymentMethod {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wallet" => Ok(Self::Wallet),
            "gateway" | "card" => Ok(Self::Gateway),
            other => Err(PaymentError::ValidationError(format!(
                "Unknown payment method: {}",
                other
            ))),
        }
    }
}

/// A submitted purchase awaiting payment.
///
/// Built once through [`PaymentIntent::new`], which rejects shapes the backend
/// cannot settle, and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    kind: IntentKind,
    subject_id: Option<String>,
    amount: Amount,
    payer_email: String,
    method: PaymentMethod,
}

impl PaymentIntent {
    pub fn new(
        kind: IntentKind,
        subject_id: Option<String>,
        amount: Amount,
        payer_email: impl Into<String>,
        method: PaymentMethod,
    ) -> Result<Self, PaymentError> {
        let payer_email = payer_email.into();
        let subject_id = subject_id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        match (kind, &subject_id) {
            (IntentKind::TopUp, Some(_)) => {
                return Err(PaymentError::ValidationError(
                    "A top-up does not reference a subject".to_string(),
                ));
            }
            (IntentKind::Order | IntentKind::Subscription, None) => {
                return Err(PaymentError::ValidationError(format!(
                    "A {} payment requires a subject id",
                    kind
                )));
            }
            _ => {}
        }

        if kind == IntentKind::TopUp && method == PaymentMethod::Wallet {
            return Err(PaymentError::ValidationError(
                "A wallet top-up cannot be paid from the wallet".to_string(),
            ));
        }

        if !payer_email.contains('@') {
            return Err(PaymentError::ValidationError(format!(
                "Invalid payer email: {:?}",
                payer_email
            )));
        }

        Ok(Self {
            kind,
            subject_id,
            amount,
            payer_email,
            method,
        })
    }

    /// Convenience for a wallet top-up, which is always gateway funded.
    pub fn top_up(amount: Amount, payer_email: impl Into<String>) -> Result<Self, PaymentError> {
        Self::new(
            IntentKind::TopUp,
            None,
            amount,
            payer_email,
            PaymentMethod::Gateway,
        )
    }

    pub fn kind(&self) -> IntentKind {
        self.kind
    }

    pub fn subject_id(&self) -> Option<&str> {
        self.subject_id.as_deref()
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    pub fn payer_email(&self) -> &str {
        &self.payer_email
    }

    pub fn method(&self) -> PaymentMethod {
        self.method
    }
}
