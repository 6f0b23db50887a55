use crate::error::PaymentError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend-assigned identifier for one payment attempt.
///
/// Used as the idempotency key for verification. A retry always asks the
/// backend for a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PaymentReference(String);

impl PaymentReference {
    pub fn new(value: impl Into<String>) -> Result<Self, PaymentError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(PaymentError::ValidationError(
                "Payment reference must not be empty".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PaymentReference {
    type Error = PaymentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PaymentReference> for String {
    fn from(reference: PaymentReference) -> Self {
        reference.0
    }
}

impl fmt::Display for PaymentReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the backend hands back when a gateway transaction is opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitializedPayment {
    pub reference: PaymentReference,
    pub authorization_url: String,
}

/// Server-side verdict for a reference. Terminal once it exists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub success: bool,
    pub reference: PaymentReference,
    /// Major units, as recorded by the ledger.
    pub amount: Decimal,
    pub timestamp: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

impl VerificationResult {
    /// Turns a non-successful verdict into the error surfaced to callers.
    pub fn into_confirmed(self) -> Result<Self, PaymentError> {
        if self.success {
            Ok(self)
        } else {
            Err(PaymentError::VerificationFailed {
                reference: self.reference.to_string(),
                reason: self
                    .failure_reason
                    .unwrap_or_else(|| "payment was not confirmed".to_string()),
            })
        }
    }
}
