//! Error types for the rate engine.

use refrate_common::InvalidCurrencyCode;
use thiserror::Error;

use crate::cache::Tier;

/// Errors raised by a [`FeedCache`](crate::cache::FeedCache).
#[derive(Debug, Error)]
pub enum CacheError {
    /// The requested tier has never been populated.
    #[error("Cache tier {0} is empty")]
    NotFound(Tier),

    /// `commit` was called before anything was written to the temporary tier.
    #[error("Nothing to commit: temporary tier is empty")]
    NothingToCommit,

    /// Underlying storage failure.
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The commit manifest could not be read or written.
    #[error("Cache manifest error: {0}")]
    Manifest(String),
}

/// Errors raised while parsing a feed document.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Not well-formed markup, or markup with an unexpected structure.
    #[error("Malformed feed: {0}")]
    Malformed(String),

    /// A mandatory attribute or element is absent.
    #[error("Missing mandatory field: {0}")]
    MissingField(&'static str),

    /// A numeric field does not hold a number.
    #[error("Invalid number {value:?} in field {field}")]
    InvalidNumber { field: &'static str, value: String },

    /// A declared timestamp cannot be parsed.
    #[error("Invalid timestamp: {0:?}")]
    InvalidTimestamp(String),

    /// A rate that is zero, negative or not finite.
    #[error("Invalid rate {rate} for {code}")]
    InvalidRate { code: String, rate: f64 },

    /// A currency code that is not usable.
    #[error(transparent)]
    InvalidCurrency(#[from] InvalidCurrencyCode),

    /// The feed parsed but carries no rates.
    #[error("Feed contains no rates")]
    Empty,

    /// A quoted pair shares no currency with the rest of the feed.
    #[error("Pair {pair} cannot be expressed against reference {reference}")]
    Unnormalizable { pair: String, reference: String },

    /// The byte source failed while being read.
    #[error("Failed to read feed: {0}")]
    Io(#[from] std::io::Error),
}

impl From<quick_xml::Error> for ParseError {
    fn from(err: quick_xml::Error) -> Self {
        match err {
            quick_xml::Error::Io(io) => {
                ParseError::Io(std::io::Error::new(io.kind(), io.to_string()))
            }
            other => ParseError::Malformed(other.to_string()),
        }
    }
}

impl From<quick_xml::events::attributes::AttrError> for ParseError {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        ParseError::Malformed(err.to_string())
    }
}

/// Errors raised by a [`FeedSource`](crate::source::FeedSource).
#[derive(Debug, Error)]
pub enum SourceError {
    /// The feed resource does not exist.
    #[error("Feed resource not found: {0}")]
    NotFound(String),

    /// The remote end could not be reached.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The request did not complete in time.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The server answered with a non-success status.
    #[error("Unexpected HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    /// Local read failure for file-backed sources.
    #[error("Feed I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level errors surfaced by the converter.
#[derive(Debug, Error)]
pub enum FxError {
    /// Fetching the feed failed.
    #[error("Network error: {0}")]
    Network(#[from] SourceError),

    /// The fetched or cached feed could not be parsed.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// A conversion referenced a code absent from the current table.
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    /// Cache storage failed.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Another update is running on the same converter.
    #[error("Update already in progress")]
    UpdateInProgress,

    /// Invalid converter configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl FxError {
    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            FxError::Network(_) => "network",
            FxError::Parse(_) => "parse",
            FxError::UnknownCurrency(_) => "convert",
            FxError::Cache(_) => "cache",
            FxError::UpdateInProgress => "update",
            FxError::Config(_) => "config",
        }
    }

    /// Check if retrying the same operation later could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FxError::Network(SourceError::Connection(_))
                | FxError::Network(SourceError::Timeout(_))
                | FxError::Network(SourceError::Status { .. })
                | FxError::UpdateInProgress
        )
    }

    /// Check if this error means the feed resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, FxError::Network(SourceError::NotFound(_)))
    }
}

/// Result type for rate engine operations.
pub type FxResult<T> = Result<T, FxError>;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type for feed parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for feed sources.
pub type SourceResult<T> = Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        let err = FxError::from(SourceError::NotFound("x".into()));
        assert_eq!(err.stage(), "network");
        assert!(err.is_not_found());
        assert!(!err.is_retryable());

        let err = FxError::from(ParseError::Empty);
        assert_eq!(err.stage(), "parse");

        let err = FxError::from(CacheError::NothingToCommit);
        assert_eq!(err.stage(), "cache");
    }

    #[test]
    fn test_retryable() {
        assert!(FxError::from(SourceError::Timeout("t".into())).is_retryable());
        assert!(FxError::UpdateInProgress.is_retryable());
        assert!(!FxError::UnknownCurrency("XXX".into()).is_retryable());
    }
}
