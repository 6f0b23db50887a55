use thiserror::Error;

/// Every way a payment attempt can end without settling.
///
/// The variants are `Clone` so a failed attempt can be published through the
/// orchestrator's state channel alongside the error returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    #[error("Payment cancelled by user")]
    UserCancelled,
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Verification failed for {reference}: {reason}")]
    VerificationFailed { reference: String, reason: String },
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Unknown intent kind: {0}")]
    UnknownIntentKind(String),
    #[error("Wallet debit rejected: {0}")]
    DebitRejected(String),
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("A payment attempt is already in progress")]
    AttemptInProgress,
}

impl PaymentError {
    /// Only transport failures may be retried, and only with a new attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::NetworkError(_))
    }

    /// Errors that end the session or indicate a programming mistake.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Unauthenticated(_) | Self::UnknownIntentKind(_))
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(err: reqwest::Error) -> Self {
        Self::NetworkError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
