use crate::error::PaymentError;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minor units (kobo) per major unit (naira).
pub const MINOR_UNITS_PER_MAJOR: i64 = 100;

/// Number of fractional digits a major-unit amount may carry.
const MINOR_UNIT_SCALE: u32 = 2;

/// A wallet balance as reported by the backend ledger.
///
/// The client never derives a balance by arithmetic; values of this type only
/// ever come from a server response, so it deliberately has no `Add`/`Sub`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Whether this balance can cover `amount` without going negative.
    pub fn covers(&self, amount: Amount) -> bool {
        self.0 >= amount.value()
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

/// A positive payment amount in major units, exact to the minor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value <= Decimal::ZERO {
            return Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }
        if value.normalize().scale() > MINOR_UNIT_SCALE {
            return Err(PaymentError::ValidationError(format!(
                "Amount {} is not exact to the minor unit",
                value
            )));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Integer minor units, as the gateway expects them.
    pub fn to_minor_units(&self) -> Result<i64, PaymentError> {
        self.0
            .checked_mul(Decimal::from(MINOR_UNITS_PER_MAJOR))
            .and_then(|minor| minor.to_i64())
            .ok_or_else(|| {
                PaymentError::ValidationError(format!("Amount out of range for minor units: {}", self.0))
            })
    }

    pub fn from_minor_units(minor: i64) -> Result<Self, PaymentError> {
        Self::new(Decimal::new(minor, MINOR_UNIT_SCALE))
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = PaymentError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_validation() {
        assert!(Amount::new(dec!(1.0)).is_ok());
        assert!(Amount::new(dec!(1.50)).is_ok());
        assert!(matches!(
            Amount::new(dec!(0.0)),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(-1.0)),
            Err(PaymentError::ValidationError(_))
        ));
        assert!(matches!(
            Amount::new(dec!(1.005)),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_minor_unit_conversion() {
        let amount = Amount::new(dec!(5000)).unwrap();
        assert_eq!(amount.to_minor_units().unwrap(), 500_000);

        let amount = Amount::new(dec!(12.34)).unwrap();
        assert_eq!(amount.to_minor_units().unwrap(), 1234);
        assert_eq!(Amount::from_minor_units(1234).unwrap(), amount);
    }

    #[test]
    fn test_minor_unit_overflow_is_rejected() {
        let amount = Amount::new(Decimal::MAX).unwrap();
        assert!(matches!(
            amount.to_minor_units(),
            Err(PaymentError::ValidationError(_))
        ));

        // Fits in a Decimal but not in i64 minor units.
        let amount = Amount::new(Decimal::from(100_000_000_000_000_000_i64)).unwrap();
        assert!(matches!(
            amount.to_minor_units(),
            Err(PaymentError::ValidationError(_))
        ));
    }

    #[test]
    fn test_balance_covers() {
        let balance = Balance::new(dec!(200));
        assert!(balance.covers(Amount::new(dec!(200)).unwrap()));
        assert!(!balance.covers(Amount::new(dec!(1000)).unwrap()));
    }

    #[test]
    fn test_amount_deserialization_rejects_non_positive() {
        let parsed: Result<Amount, _> = serde_json::from_str("\"-5\"");
        assert!(parsed.is_err());
        let parsed: Amount = serde_json::from_str("\"5.25\"").unwrap();
        assert_eq!(parsed.value(), dec!(5.25));
    }
}
