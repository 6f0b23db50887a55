use crate::domain::intent::IntentKind;
use crate::domain::ports::{InitializeRequest, PaymentBackend};
use crate::domain::session::Credential;
use crate::domain::verification::{InitializedPayment, PaymentReference, VerificationResult};
use crate::domain::wallet::{Amount, Balance};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{StatusCode, Url};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    amount: i64,
    email: &'a str,
    #[serde(rename = "subjectId", skip_serializing_if = "Option::is_none")]
    subject_id: Option<&'a str>,
    kind: IntentKind,
    #[serde(rename = "callbackUrl", skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    reference: String,
    authorization_url: String,
}

/// Some deployments wrap payloads as `{status, message, data}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope<T> {
    Wrapped { data: T },
    Bare(T),
}

impl<T> Envelope<T> {
    fn into_inner(self) -> T {
        match self {
            Self::Wrapped { data } => data,
            Self::Bare(inner) => inner,
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    #[serde(default)]
    success: bool,
    message: Option<String>,
    data: Option<VerifyData>,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    reference: Option<String>,
    amount: Option<Decimal>,
    #[serde(rename = "transactionDate")]
    transaction_date: Option<DateTime<Utc>>,
    gateway_response: Option<String>,
}

#[derive(Debug, Serialize)]
struct DebitBody<'a> {
    kind: IntentKind,
    #[serde(rename = "subjectId", skip_serializing_if = "Option::is_none")]
    subject_id: Option<&'a str>,
    /// Serialized as a decimal string so no precision is lost.
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct DebitResponse {
    #[serde(rename = "newBalance")]
    new_balance: Decimal,
}

#[derive(Debug, Deserialize)]
struct BalanceResponse {
    balance: Decimal,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

/// Backend payment API over HTTP/JSON.
///
/// Attaches the session's bearer token to every request and maps transport
/// and status failures onto [`PaymentError`]. Never retries.
#[derive(Debug, Clone)]
pub struct HttpPaymentBackend {
    base_url: Url,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpPaymentBackend {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(|e| {
            PaymentError::ValidationError(format!("Invalid backend URL {:?}: {}", base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(PaymentError::ValidationError(format!(
                "Backend URL {} cannot be used as a base",
                base_url
            )));
        }
        Ok(Self {
            base_url,
            timeout,
            client: reqwest::Client::new(),
        })
    }

    /// Appends path segments to the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        self.send_with(request, classify_failure).await
    }

    /// Sends `request`, mapping non-2xx responses through `classify`.
    async fn send_with<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        classify: fn(StatusCode, &str) -> PaymentError,
    ) -> Result<T> {
        let response = request.timeout(self.timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                PaymentError::NetworkError("request timed out".to_string())
            } else {
                PaymentError::from(e)
            }
        })?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(classify(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| malformed(e.to_string()))
    }
}

fn malformed(detail: impl std::fmt::Display) -> PaymentError {
    PaymentError::NetworkError(format!("Malformed response: {}", detail))
}

fn server_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed.message.or(parsed.error).filter(|m| !m.is_empty())
}

/// Maps a non-2xx response onto the error taxonomy.
fn classify_failure(status: StatusCode, body: &str) -> PaymentError {
    let message =
        server_message(body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => PaymentError::Unauthenticated(message),
        _ => PaymentError::NetworkError(message),
    }
}

/// Wallet debits carry ledger verdicts in their status codes.
fn classify_debit_failure(status: StatusCode, body: &str) -> PaymentError {
    match (status, classify_failure(status, body)) {
        (StatusCode::PAYMENT_REQUIRED, PaymentError::NetworkError(message)) => {
            PaymentError::InsufficientFunds(message)
        }
        (StatusCode::CONFLICT, PaymentError::NetworkError(message)) => {
            PaymentError::DebitRejected(message)
        }
        (_, error) => error,
    }
}

/// A successful verdict must name the reference and amount it settled; a
/// failed one may come back with little more than a reason.
fn into_verification(
    requested: &PaymentReference,
    response: VerifyResponse,
) -> Result<VerificationResult> {
    let data = response.data;
    let timestamp = data
        .as_ref()
        .and_then(|d| d.transaction_date)
        .unwrap_or_else(Utc::now);

    if response.success {
        let Some(VerifyData {
            reference: Some(reference),
            amount: Some(amount),
            ..
        }) = data
        else {
            return Err(malformed(format!(
                "verification of {} succeeded without a reference and amount",
                requested
            )));
        };
        let reference = PaymentReference::new(reference)
            .map_err(|_| malformed("verification returned an empty reference"))?;
        return Ok(VerificationResult {
            success: true,
            reference,
            amount,
            timestamp,
            failure_reason: None,
        });
    }

    let reference = data
        .as_ref()
        .and_then(|d| d.reference.clone())
        .and_then(|r| PaymentReference::new(r).ok())
        .unwrap_or_else(|| requested.clone());
    let amount = data.as_ref().and_then(|d| d.amount).unwrap_or_default();
    let failure_reason = response
        .message
        .or_else(|| data.and_then(|d| d.gateway_response))
        .unwrap_or_else(|| "Payment was not successful".to_string());

    Ok(VerificationResult {
        success: false,
        reference,
        amount,
        timestamp,
        failure_reason: Some(failure_reason),
    })
}

#[async_trait]
impl PaymentBackend for HttpPaymentBackend {
    async fn initialize(
        &self,
        credential: &Credential,
        request: InitializeRequest,
    ) -> Result<InitializedPayment> {
        let body = InitializeBody {
            amount: request.amount_minor,
            email: &request.email,
            subject_id: request.subject_id.as_deref(),
            kind: request.kind,
            callback_url: request.callback_url.as_deref(),
        };
        let response: Envelope<InitializeData> = self
            .send(
                self.client
                    .post(self.endpoint(&["payments", "initialize"]))
                    .bearer_auth(credential.token())
                    .json(&body),
            )
            .await?;
        let data = response.into_inner();

        tracing::debug!(reference = %data.reference, "gateway transaction initialized");
        Ok(InitializedPayment {
            reference: PaymentReference::new(data.reference).map_err(|_| {
                PaymentError::NetworkError("Backend returned an empty reference".to_string())
            })?,
            authorization_url: data.authorization_url,
        })
    }

    async fn verify(
        &self,
        credential: &Credential,
        reference: &PaymentReference,
    ) -> Result<VerificationResult> {
        let response: VerifyResponse = self
            .send(
                self.client
                    .get(self.endpoint(&["payments", "verify", reference.as_str()]))
                    .bearer_auth(credential.token()),
            )
            .await?;
        into_verification(reference, response)
    }

    async fn debit_wallet(
        &self,
        credential: &Credential,
        kind: IntentKind,
        subject_id: Option<&str>,
        amount: Amount,
    ) -> Result<Balance> {
        let body = DebitBody {
            kind,
            subject_id,
            amount: amount.value(),
        };
        let parsed: DebitResponse = self
            .send_with(
                self.client
                    .post(self.endpoint(&["wallet", "debit"]))
                    .bearer_auth(credential.token())
                    .json(&body),
                classify_debit_failure,
            )
            .await?;
        Ok(Balance::new(parsed.new_balance))
    }

    async fn wallet_balance(&self, credential: &Credential) -> Result<Balance> {
        let response: BalanceResponse = self
            .send(
                self.client
                    .get(self.endpoint(&["wallet", "balance"]))
                    .bearer_auth(credential.token()),
            )
            .await?;
        Ok(Balance::new(response.balance))
    }
}
