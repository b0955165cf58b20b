//! Currency codes.

use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Error returned when a string is not a usable currency code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid currency code: {0:?}")]
pub struct InvalidCurrencyCode(pub String);

/// ISO 4217-like currency code.
///
/// Codes are normalized to upper case. Anything made of 2 to 8 ASCII
/// alphanumerics is accepted, since feeds carry non-ISO codes such as
/// precious metals or crypto tickers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Create a new currency code, rejecting malformed input.
    pub fn new(code: impl AsRef<str>) -> Result<Self, InvalidCurrencyCode> {
        let code = code.as_ref().trim();
        let valid = (2..=8).contains(&code.len())
            && code.chars().all(|c| c.is_ascii_alphanumeric());

        if !valid {
            return Err(InvalidCurrencyCode(code.to_string()));
        }

        Ok(Self(code.to_ascii_uppercase()))
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Common currencies
    pub fn eur() -> Self {
        Self("EUR".to_string())
    }

    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    pub fn jpy() -> Self {
        Self("JPY".to_string())
    }

    pub fn gbp() -> Self {
        Self("GBP".to_string())
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CurrencyCode {
    type Err = InvalidCurrencyCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = InvalidCurrencyCode;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl AsRef<str> for CurrencyCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for CurrencyCode {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalizes_case() {
        let code = CurrencyCode::new("usd").unwrap();
        assert_eq!(code.code(), "USD");
        assert_eq!(code, CurrencyCode::usd());
    }

    #[test]
    fn test_rejects_malformed() {
        assert!(CurrencyCode::new("").is_err());
        assert!(CurrencyCode::new("U").is_err());
        assert!(CurrencyCode::new("US D").is_err());
        assert!(CurrencyCode::new("EUR/USD").is_err());
    }

    #[test]
    fn test_accepts_non_iso_tickers() {
        assert!(CurrencyCode::new("XAU").is_ok());
        assert!(CurrencyCode::new("USDT").is_ok());
    }

    #[test]
    fn test_serde_uses_plain_string() {
        let json = serde_json::to_string(&CurrencyCode::jpy()).unwrap();
        assert_eq!(json, "\"JPY\"");

        let parsed: CurrencyCode = serde_json::from_str("\"gbp\"").unwrap();
        assert_eq!(parsed, CurrencyCode::gbp());

        assert!(serde_json::from_str::<CurrencyCode>("\"??\"").is_err());
    }
}
