//! refrate FX Engine
//!
//! Reference-rate cache and currency conversion.
//!
//! # Features
//!
//! - ECB and Yahoo feed parsers producing immutable rate tables
//! - Two-tier feed cache (in memory or on disk) with explicit commit
//! - Fallback to the last committed feed when a fetch or parse fails
//! - Single-flight updates with lock-free conversion reads
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use refrate_fx::{Converter, ConverterConfig, FileCache};
//!
//! let config = ConverterConfig::from_env();
//! let cache = Arc::new(FileCache::open("/var/cache/refrate", config.provider.id())?);
//! let converter = Converter::from_config(&config, cache)?;
//!
//! if let Err(e) = converter.update().await {
//!     // Stale data may still be in use.
//!     tracing::warn!(error = %e, state = ?converter.state(), "Update failed");
//! }
//!
//! let usd = converter.convert(100.0, "EUR", "USD")?;
//! ```

pub mod cache;
pub mod config;
pub mod converter;
pub mod error;
pub mod parser;
pub mod provider;
pub mod source;
pub mod state;
pub mod table;

pub use cache::{FeedCache, FileCache, MemoryCache, SharedFeedCache, Tier};
pub use config::ConverterConfig;
pub use converter::Converter;
pub use error::{CacheError, FxError, FxResult, ParseError, SourceError};
pub use parser::{EcbParser, FeedParser, YahooParser};
pub use provider::FeedProvider;
pub use source::{FeedSource, FileFeedSource, HttpFeedSource};
pub use state::ConverterState;
pub use table::{RateTable, RateTableBuilder};
