use crate::domain::verification::PaymentReference;
use crate::error::{PaymentError, Result};
use reqwest::Url;

/// Query key the gateway uses for the reference on the return URL.
pub const REFERENCE_KEY: &str = "reference";
/// Older gateway integrations send the reference under this key instead.
pub const LEGACY_REFERENCE_KEY: &str = "trxref";

/// Extracts the payment reference from the URL the gateway redirected back to.
///
/// Accepts a full URL or a bare query string (`?reference=...`). When both
/// keys are present, `reference` wins over `trxref`.
pub fn reference_from_return_url(input: &str) -> Result<PaymentReference> {
    let input = input.trim();
    let url = Url::parse(input)
        .or_else(|_| {
            let query = input.trim_start_matches('?');
            Url::parse(&format!("https://return.invalid/?{}", query))
        })
        .map_err(|e| PaymentError::ValidationError(format!("Invalid return URL: {}", e)))?;

    let mut legacy = None;
    for (key, value) in url.query_pairs() {
        if value.trim().is_empty() {
            continue;
        }
        if key == REFERENCE_KEY {
            return PaymentReference::new(value.into_owned());
        }
        if key == LEGACY_REFERENCE_KEY && legacy.is_none() {
            legacy = Some(value.into_owned());
        }
    }

    match legacy {
        Some(value) => PaymentReference::new(value),
        None => Err(PaymentError::ValidationError(format!(
            "Return URL carries no {} or {} parameter",
            REFERENCE_KEY, LEGACY_REFERENCE_KEY
        ))),
    }
}
