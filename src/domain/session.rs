use super::wallet::Balance;
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::RwLock;

/// Bearer token for the backend, optionally with a known expiry.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            expires_at: None,
        }
    }

    pub fn expiring_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// The payer's session: who they are and the last balance the server reported.
///
/// Passed explicitly to the orchestrator. The cached balance is only ever
/// replaced with a server value or cleared; it is never adjusted locally.
#[derive(Debug, Default)]
pub struct Session {
    credential: Option<Credential>,
    cached_balance: RwLock<Option<Balance>>,
}

impl Session {
    pub fn new(credential: Option<Credential>) -> Self {
        Self {
            credential,
            cached_balance: RwLock::new(None),
        }
    }

    pub fn with_cached_balance(self, balance: Balance) -> Self {
        Self {
            credential: self.credential,
            cached_balance: RwLock::new(Some(balance)),
        }
    }

    /// The credential to attach to a backend call.
    ///
    /// Missing or expired credentials fail here, before any request is made.
    pub fn credential(&self) -> Result<&Credential> {
        match &self.credential {
            None => Err(PaymentError::Unauthenticated(
                "no active session".to_string(),
            )),
            Some(credential) if credential.is_expired() => Err(PaymentError::Unauthenticated(
                "session credential has expired".to_string(),
            )),
            Some(credential) => Ok(credential),
        }
    }

    pub async fn cached_balance(&self) -> Option<Balance> {
        *self.cached_balance.read().await
    }

    pub(crate) async fn store_balance(&self, balance: Balance) {
        *self.cached_balance.write().await = Some(balance);
    }

    /// Marks the cached copy stale; called as soon as a wallet write is issued.
    pub(crate) async fn invalidate_balance(&self) {
        *self.cached_balance.write().await = None;
    }
}
