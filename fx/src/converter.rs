//! Currency converter backed by a cached rate feed.

use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;

use chrono::Duration;
use parking_lot::RwLock;
use refrate_common::{epoch_seconds, is_older_than, now, CurrencyCode, Timestamp};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::cache::{FeedCache, SharedFeedCache, Tier};
use crate::config::ConverterConfig;
use crate::error::{CacheError, FxError, FxResult};
use crate::parser::FeedParser;
use crate::source::{source_for, FeedSource};
use crate::state::ConverterState;
use crate::table::RateTable;

/// Everything readers observe, replaced as one unit.
#[derive(Debug, Default)]
struct Snapshot {
    state: ConverterState,
    table: Option<Arc<RateTable>>,
    /// Last successful fetch in this process.
    refreshed_at: Option<Timestamp>,
}

/// Converts amounts using the rates of one feed provider.
///
/// [`update`](Converter::update) runs one fetch, parse and commit cycle and
/// falls back to the cache's persisted tier when any step fails. Readers
/// (`convert`, `is_available`, ...) never wait on an update; they see either
/// the table before it or the table after it.
pub struct Converter {
    parser: Arc<dyn FeedParser>,
    source: Arc<dyn FeedSource>,
    cache: SharedFeedCache,
    snapshot: RwLock<Arc<Snapshot>>,
    update_guard: Mutex<()>,
}

impl Converter {
    /// Create a converter from its collaborators.
    pub fn new(
        parser: Arc<dyn FeedParser>,
        source: Arc<dyn FeedSource>,
        cache: SharedFeedCache,
    ) -> Self {
        Self {
            parser,
            source,
            cache,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            update_guard: Mutex::new(()),
        }
    }

    /// Create a converter for the provider and locator named in `config`.
    pub fn from_config(config: &ConverterConfig, cache: SharedFeedCache) -> FxResult<Self> {
        config.validate().map_err(FxError::Config)?;

        let source = source_for(config.feed_locator(), config)?;
        Ok(Self::new(config.provider.parser(), Arc::from(source), cache))
    }

    /// Name of the feed provider.
    pub fn provider(&self) -> &str {
        self.parser.name()
    }

    /// Where the feed is fetched from.
    pub fn locator(&self) -> &str {
        self.source.locator()
    }

    /// Run one fetch, parse and commit cycle.
    ///
    /// On failure the persisted tier is parsed instead and, if usable, adopted
    /// as stale data. The error of the failed cycle is returned either way;
    /// check [`state`](Converter::state) to see what is in effect.
    #[instrument(skip(self), fields(provider = %self.parser.name(), locator = %self.source.locator()))]
    pub async fn update(&self) -> FxResult<()> {
        let _guard = self
            .update_guard
            .try_lock()
            .map_err(|_| FxError::UpdateInProgress)?;

        match self.synchronize().await {
            Ok(table) => {
                info!(
                    currencies = table.len(),
                    valid_at = %table.valid_at(),
                    "Rates synchronized"
                );
                self.replace(|_| Snapshot {
                    state: ConverterState::Synchronized,
                    table: Some(Arc::new(table)),
                    refreshed_at: Some(now()),
                });
                Ok(())
            }
            Err(err) => {
                warn!(stage = err.stage(), error = %err, "Update failed");
                self.fall_back();
                Err(err)
            }
        }
    }

    /// Run [`update`](Converter::update) unless the last successful fetch is
    /// more recent than `max_age`. Returns whether an update ran.
    pub async fn update_if_older_than(&self, max_age: Duration) -> FxResult<bool> {
        let refreshed_at = self.snapshot().refreshed_at;
        if !is_older_than(refreshed_at, max_age) {
            debug!(refreshed_at = ?refreshed_at, "Rates are recent, skipping update");
            return Ok(false);
        }

        self.update().await?;
        Ok(true)
    }

    /// Adopt the persisted tier without touching the network.
    ///
    /// Meant for start-up, so conversions work before the first fetch. Does
    /// nothing once the converter is synchronized.
    pub fn load_cached(&self) -> FxResult<()> {
        let _guard = self
            .update_guard
            .try_lock()
            .map_err(|_| FxError::UpdateInProgress)?;

        if self.state().is_synchronized() {
            return Ok(());
        }

        let table = self.read_persisted()?;
        info!(
            provider = %self.parser.name(),
            valid_at = %table.valid_at(),
            "Loaded cached rates"
        );
        self.replace(|prev| Snapshot {
            state: ConverterState::Stale,
            table: Some(Arc::new(table)),
            refreshed_at: prev.refreshed_at,
        });
        Ok(())
    }

    /// Fetch into the temporary tier, parse it and commit it.
    async fn synchronize(&self) -> FxResult<RateTable> {
        let mut sink = self.cache.open_write_sink()?;
        let body = self.source.fetch().await?;
        sink.write_all(&body).map_err(CacheError::from)?;
        sink.close()?;

        let mut fetched = self.cache.open_read_source(Tier::Temporary)?;
        let table = self.parser.parse(&mut fetched)?;

        self.cache.commit()?;
        Ok(table)
    }

    fn read_persisted(&self) -> FxResult<RateTable> {
        let mut persisted = self.cache.open_read_source(Tier::Persisted)?;
        Ok(self.parser.parse(&mut persisted)?)
    }

    fn fall_back(&self) {
        match self.read_persisted() {
            Ok(table) => {
                warn!(
                    valid_at = %table.valid_at(),
                    committed_at = ?self.cache.committed_at(),
                    "Serving cached rates"
                );
                self.replace(|prev| Snapshot {
                    state: ConverterState::Stale,
                    table: Some(Arc::new(table)),
                    refreshed_at: prev.refreshed_at,
                });
            }
            Err(e) => {
                warn!(error = %e, "No usable cached rates");
                self.replace(|prev| Snapshot {
                    state: ConverterState::Unavailable,
                    table: prev.table.clone(),
                    refreshed_at: prev.refreshed_at,
                });
            }
        }
    }

    fn replace(&self, next: impl FnOnce(&Snapshot) -> Snapshot) {
        let mut current = self.snapshot.write();
        *current = Arc::new(next(&current));
    }

    fn snapshot(&self) -> Arc<Snapshot> {
        self.snapshot.read().clone()
    }

    /// Current state of the update cycle.
    pub fn state(&self) -> ConverterState {
        self.snapshot().state
    }

    /// True only right after a successful fetch, parse and commit.
    pub fn is_synchronized(&self) -> bool {
        self.state().is_synchronized()
    }

    /// Table currently in effect.
    pub fn table(&self) -> Option<Arc<RateTable>> {
        self.snapshot().table.clone()
    }

    /// Time of the last successful fetch in this process.
    pub fn refreshed_at(&self) -> Option<Timestamp> {
        self.snapshot().refreshed_at
    }

    /// Unix seconds of the last successful fetch, negative if none.
    pub fn refresh_timestamp(&self) -> i64 {
        epoch_seconds(self.refreshed_at())
    }

    /// Unix seconds of the feed timestamp of the current table, negative if none.
    pub fn timestamp(&self) -> i64 {
        epoch_seconds(self.table().map(|t| t.valid_at()))
    }

    /// Check if `code` can be converted.
    pub fn is_available(&self, code: &str) -> bool {
        self.table().is_some_and(|t| t.contains(code))
    }

    /// Codes of the current table; empty when there is none.
    pub fn currencies(&self) -> BTreeSet<CurrencyCode> {
        self.table().map(|t| t.currencies()).unwrap_or_default()
    }

    /// Rate of `code` against the reference currency.
    pub fn rate(&self, code: &str) -> Option<f64> {
        self.table().and_then(|t| t.rate(code))
    }

    /// Reference currency of the current table.
    pub fn reference_currency(&self) -> Option<CurrencyCode> {
        self.table().map(|t| t.reference().clone())
    }

    /// Convert `amount` of `from` into `to` using the current table.
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> FxResult<f64> {
        match self.table() {
            Some(table) => table.convert(amount, from, to),
            None => Err(FxError::UnknownCurrency(from.to_string())),
        }
    }
}
