//! Monetary amounts as carried by the commerce backend.
//!
//! Amounts travel as decimal strings (`"10.00"`) paired with an ISO 4217
//! currency code. Internally they are held as integer minor units with a
//! fixed scale of two fraction digits so that sums and products are exact.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

/// Number of fraction digits carried by every [`Money`].
pub const SCALE: u32 = 2;
const MINOR_PER_MAJOR: i64 = 100;

/// Errors produced while parsing or combining amounts.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("invalid decimal amount {0:?}")]
    InvalidAmount(String),

    #[error("invalid currency code {0:?}")]
    InvalidCurrency(String),

    #[error("currency mismatch: {left} vs {right}")]
    CurrencyMismatch {
        left: CurrencyCode,
        right: CurrencyCode,
    },

    #[error("amount overflow")]
    Overflow,
}

impl MoneyError {
    /// Machine-readable code associated with this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::CurrencyMismatch { .. } => ErrorCode::CurrencyMismatch,
            Self::InvalidAmount(_) | Self::InvalidCurrency(_) | Self::Overflow => {
                ErrorCode::MalformedResponse
            }
        }
    }
}

/// Three-letter upper-case ISO 4217 code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Validate and wrap a currency code.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::InvalidCurrency`] unless `raw` is exactly three
    /// ASCII letters. Lower-case input is accepted and normalized.
    pub fn new(raw: &str) -> Result<Self, MoneyError> {
        let trimmed = raw.trim();
        if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(MoneyError::InvalidCurrency(raw.to_string()))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Narrow symbol used when rendering prices.
    #[must_use]
    pub fn symbol(&self) -> &str {
        match self.0.as_str() {
            "USD" | "CAD" | "AUD" | "NZD" | "MXN" => "$",
            "EUR" => "€",
            "GBP" => "£",
            "JPY" | "CNY" => "¥",
            "INR" => "₹",
            other => other,
        }
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = MoneyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A decimal amount in a single currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "MoneyRepr", into = "MoneyRepr")]
pub struct Money {
    minor: i64,
    currency: CurrencyCode,
}

/// Wire shape: `{ "amount": "10.00", "currencyCode": "USD" }`.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoneyRepr {
    amount: String,
    currency_code: String,
}

impl TryFrom<MoneyRepr> for Money {
    type Error = MoneyError;

    fn try_from(repr: MoneyRepr) -> Result<Self, Self::Error> {
        Self::parse(&repr.amount, CurrencyCode::new(&repr.currency_code)?)
    }
}

impl From<Money> for MoneyRepr {
    fn from(money: Money) -> Self {
        Self {
            amount: money.amount(),
            currency_code: money.currency.into(),
        }
    }
}

impl Money {
    /// Build from integer minor units (cents for two-digit currencies).
    #[must_use]
    pub const fn from_minor(minor: i64, currency: CurrencyCode) -> Self {
        Self { minor, currency }
    }

    /// Zero in the given currency.
    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self::from_minor(0, currency)
    }

    /// Parse a decimal string such as `"10"`, `"10.5"` or `"-3.25"`.
    ///
    /// # Errors
    ///
    /// Returns [`MoneyError::InvalidAmount`] for anything that is not a plain
    /// decimal with at most [`SCALE`] fraction digits.
    pub fn parse(amount: &str, currency: CurrencyCode) -> Result<Self, MoneyError> {
        let invalid = || MoneyError::InvalidAmount(amount.to_string());
        let trimmed = amount.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let (whole, fraction) = digits.split_once('.').unwrap_or((digits, ""));
        if whole.is_empty() || fraction.len() > SCALE as usize {
            return Err(invalid());
        }
        if !whole.chars().all(|c| c.is_ascii_digit())
            || !fraction.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }

        let whole_minor = whole
            .parse::<i64>()
            .map_err(|_| invalid())?
            .checked_mul(MINOR_PER_MAJOR)
            .ok_or(MoneyError::Overflow)?;
        let mut fraction_minor = 0_i64;
        for (idx, ch) in fraction.chars().enumerate() {
            let digit = i64::from(ch.to_digit(10).ok_or_else(invalid)?);
            let place = 10_i64.pow(SCALE - 1 - u32::try_from(idx).map_err(|_| invalid())?);
            fraction_minor += digit * place;
        }

        let magnitude = whole_minor
            .checked_add(fraction_minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(
            if negative { -magnitude } else { magnitude },
            currency,
        ))
    }

    #[must_use]
    pub const fn minor(&self) -> i64 {
        self.minor
    }

    #[must_use]
    pub const fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.minor == 0
    }

    /// Decimal string with exactly [`SCALE`] fraction digits.
    #[must_use]
    pub fn amount(&self) -> String {
        let sign = if self.minor < 0 { "-" } else { "" };
        let abs = self.minor.unsigned_abs();
        let per = MINOR_PER_MAJOR.unsigned_abs();
        format!("{sign}{}.{:02}", abs / per, abs % per)
    }

    /// Add two amounts of the same currency.
    ///
    /// # Errors
    ///
    /// Fails on currency mismatch or overflow.
    pub fn checked_add(&self, other: &Self) -> Result<Self, MoneyError> {
        self.ensure_same_currency(other)?;
        let minor = self
            .minor
            .checked_add(other.minor)
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(minor, self.currency.clone()))
    }

    /// Multiply by a line quantity.
    ///
    /// # Errors
    ///
    /// Fails on overflow.
    pub fn checked_mul(&self, quantity: u32) -> Result<Self, MoneyError> {
        let minor = self
            .minor
            .checked_mul(i64::from(quantity))
            .ok_or(MoneyError::Overflow)?;
        Ok(Self::from_minor(minor, self.currency.clone()))
    }

    /// Scale by `numerator / denominator`, rounding half away from zero.
    ///
    /// A zero denominator yields zero.
    #[must_use]
    pub fn scaled(&self, numerator: i64, denominator: i64) -> Self {
        if denominator == 0 {
            return Self::zero(self.currency.clone());
        }
        let product = i128::from(self.minor) * i128::from(numerator);
        let den = i128::from(denominator);
        let half = den.abs() / 2;
        let rounded = if (product >= 0) == (den > 0) {
            (product.abs() + half) / den.abs()
        } else {
            -((product.abs() + half) / den.abs())
        };
        let minor = i64::try_from(rounded).unwrap_or(if rounded > 0 { i64::MAX } else { i64::MIN });
        Self::from_minor(minor, self.currency.clone())
    }

    /// Sum an iterator of amounts, starting from zero in `currency`.
    ///
    /// # Errors
    ///
    /// Fails on currency mismatch or overflow.
    pub fn sum<'a>(
        currency: &CurrencyCode,
        amounts: impl IntoIterator<Item = &'a Self>,
    ) -> Result<Self, MoneyError> {
        amounts
            .into_iter()
            .try_fold(Self::zero(currency.clone()), |acc, next| acc.checked_add(next))
    }

    /// Render as a shopper-facing price, e.g. `$10.00 USD`.
    #[must_use]
    pub fn format_price(&self) -> String {
        let symbol = self.currency.symbol();
        let amount = self.amount();
        let (sign, digits) = amount
            .strip_prefix('-')
            .map_or(("", amount.as_str()), |rest| ("-", rest));
        format!("{sign}{symbol}{digits} {}", self.currency)
    }

    fn ensure_same_currency(&self, other: &Self) -> Result<(), MoneyError> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(MoneyError::CurrencyMismatch {
                left: self.currency.clone(),
                right: other.currency.clone(),
            })
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.amount(), self.currency)
    }
}
