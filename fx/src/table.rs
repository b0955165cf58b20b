//! Rate tables.
//!
//! A [`RateTable`] maps currency codes to rates against one reference
//! currency. Tables are assembled with a [`RateTableBuilder`] while a feed is
//! parsed; [`RateTableBuilder::finish`] consumes the builder, so a finished
//! table has no way to be modified:
//!
//! ```compile_fail
//! use refrate_common::CurrencyCode;
//! use refrate_fx::table::RateTableBuilder;
//!
//! let mut builder = RateTableBuilder::new(CurrencyCode::eur());
//! builder.insert(CurrencyCode::usd(), 1.3655).unwrap();
//! let table = builder.finish(chrono::Utc::now()).unwrap();
//!
//! // Locked: neither the builder nor the table can change anymore.
//! builder.insert(CurrencyCode::jpy(), 130.0).unwrap();
//! ```

use std::collections::{BTreeMap, BTreeSet};

use refrate_common::{CurrencyCode, Timestamp};
use tracing::debug;

use crate::error::{FxError, FxResult, ParseError, ParseResult};

/// Tolerance when the reference currency is listed explicitly.
const REFERENCE_EPSILON: f64 = 1e-9;

/// Immutable snapshot of rates published by a feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    reference: CurrencyCode,
    rates: BTreeMap<CurrencyCode, f64>,
    valid_at: Timestamp,
}

impl RateTable {
    /// Currency every rate is expressed against.
    pub fn reference(&self) -> &CurrencyCode {
        &self.reference
    }

    /// Timestamp declared by the feed for this snapshot.
    pub fn valid_at(&self) -> Timestamp {
        self.valid_at
    }

    /// Units of `code` per unit of the reference currency.
    pub fn rate(&self, code: &str) -> Option<f64> {
        let code = code.trim();
        self.rates
            .get(code)
            .or_else(|| self.rates.get(code.to_ascii_uppercase().as_str()))
            .copied()
    }

    /// Check if `code` has a rate.
    pub fn contains(&self, code: &str) -> bool {
        self.rate(code).is_some()
    }

    /// All codes in the table, reference included.
    pub fn currencies(&self) -> BTreeSet<CurrencyCode> {
        self.rates.keys().cloned().collect()
    }

    /// Iterate over `(code, rate)` pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (&CurrencyCode, f64)> {
        self.rates.iter().map(|(code, rate)| (code, *rate))
    }

    /// Number of currencies, reference included.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    /// Always false; a finished table holds at least two currencies.
    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Convert `amount` of `from` into `to`.
    ///
    /// Converting a currency into itself returns `amount` unchanged.
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> FxResult<f64> {
        let from_rate = self
            .rate(from)
            .ok_or_else(|| FxError::UnknownCurrency(from.to_string()))?;
        let to_rate = self
            .rate(to)
            .ok_or_else(|| FxError::UnknownCurrency(to.to_string()))?;

        if from.trim().eq_ignore_ascii_case(to.trim()) {
            return Ok(amount);
        }

        Ok(amount * to_rate / from_rate)
    }
}

/// Accumulates rates while a feed is being parsed.
#[derive(Debug, Clone)]
pub struct RateTableBuilder {
    reference: CurrencyCode,
    rates: BTreeMap<CurrencyCode, f64>,
}

impl RateTableBuilder {
    /// Start a table expressed against `reference`.
    pub fn new(reference: CurrencyCode) -> Self {
        Self {
            reference,
            rates: BTreeMap::new(),
        }
    }

    /// Reference currency of the table being built.
    pub fn reference(&self) -> &CurrencyCode {
        &self.reference
    }

    /// Record the rate for `code`, replacing any earlier value.
    ///
    /// Rates must be finite and positive. The reference currency may only be
    /// listed at 1.0.
    pub fn insert(&mut self, code: CurrencyCode, rate: f64) -> ParseResult<()> {
        if !rate.is_finite() || rate <= 0.0 {
            return Err(ParseError::InvalidRate {
                code: code.to_string(),
                rate,
            });
        }

        if code == self.reference && (rate - 1.0).abs() > REFERENCE_EPSILON {
            return Err(ParseError::InvalidRate {
                code: code.to_string(),
                rate,
            });
        }

        if let Some(previous) = self.rates.insert(code.clone(), rate) {
            debug!(code = %code, previous, rate, "Rate listed twice, keeping latest");
        }
        Ok(())
    }

    /// Rate recorded so far for `code`.
    pub fn get(&self, code: &CurrencyCode) -> Option<f64> {
        if *code == self.reference {
            return Some(1.0);
        }
        self.rates.get(code).copied()
    }

    /// Number of rates recorded, not counting an implicit reference.
    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Lock the table.
    ///
    /// The reference currency is added at 1.0 when the feed did not list it.
    /// Fails with [`ParseError::Empty`] when no other currency was recorded.
    pub fn finish(mut self, valid_at: Timestamp) -> ParseResult<RateTable> {
        self.rates.insert(self.reference.clone(), 1.0);

        if self.rates.len() < 2 {
            return Err(ParseError::Empty);
        }

        Ok(RateTable {
            reference: self.reference,
            rates: self.rates,
            valid_at,
        })
    }
}
