//! Periodic refresh loop.

use std::sync::Arc;
use std::time::Duration;

use refrate_fx::{Converter, ConverterState};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{info, instrument, warn};

/// Result of one refresh cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Rates were recent enough; nothing was fetched.
    Skipped,
    /// A fresh feed was fetched and committed.
    Synchronized,
    /// The update failed at `stage`; `state` is what the converter fell back to.
    Failed {
        stage: &'static str,
        state: ConverterState,
    },
}

/// Drives a converter's updates until stopped.
pub struct Refresher {
    converter: Arc<Converter>,
    max_age: chrono::Duration,
    retry_interval: Duration,
    shutdown_tx: watch::Sender<bool>,
}

impl Refresher {
    /// Refresh whenever the rates are older than `refresh_interval`, checking
    /// every `retry_interval`.
    pub fn new(converter: Arc<Converter>, refresh_interval: Duration, retry_interval: Duration) -> Self {
        let max_age =
            chrono::Duration::from_std(refresh_interval).unwrap_or_else(|_| chrono::Duration::days(365));
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            converter,
            max_age,
            retry_interval,
            shutdown_tx,
        }
    }

    /// The converter being refreshed.
    pub fn converter(&self) -> &Arc<Converter> {
        &self.converter
    }

    /// Ask a running loop to exit after its current cycle.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Run one refresh cycle.
    #[instrument(skip(self), fields(provider = %self.converter.provider()))]
    pub async fn cycle(&self) -> CycleOutcome {
        match self.converter.update_if_older_than(self.max_age).await {
            Ok(false) => CycleOutcome::Skipped,
            Ok(true) => {
                info!(
                    currencies = self.converter.currencies().len(),
                    data_timestamp = self.converter.timestamp(),
                    "Refresh succeeded"
                );
                CycleOutcome::Synchronized
            }
            Err(e) => {
                let state = self.converter.state();
                warn!(
                    stage = e.stage(),
                    error = %e,
                    state = ?state,
                    degraded = state.is_degraded(),
                    retry_in = ?self.retry_interval,
                    "Refresh failed"
                );
                CycleOutcome::Failed {
                    stage: e.stage(),
                    state,
                }
            }
        }
    }

    /// Load cached rates, then refresh until [`stop`](Refresher::stop) is called.
    pub async fn run(&self) {
        match self.converter.load_cached() {
            Ok(()) => info!(
                data_timestamp = self.converter.timestamp(),
                "Serving cached rates until first refresh"
            ),
            Err(e) => info!(reason = %e, "No cached rates to start from"),
        }

        let mut shutdown = self.shutdown_tx.subscribe();
        let mut ticker = tokio::time::interval(self.retry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    self.cycle().await;
                }
                _ = shutdown.changed() => {}
            }
        }

        info!(state = ?self.converter.state(), "Refresher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refrate_fx::source::MockFeedSource;
    use refrate_fx::{EcbParser, FileCache, MemoryCache};

    const FEED: &str = r#"<Envelope><Cube><Cube time="2013-08-02">
        <Cube currency="USD" rate="1.3655"/><Cube currency="JPY" rate="130.54"/>
    </Cube></Cube></Envelope>"#;

    fn refresher(source: Arc<MockFeedSource>, cache: Arc<MemoryCache>) -> Refresher {
        let converter = Converter::new(Arc::new(EcbParser::new()), source, cache);
        Refresher::new(
            Arc::new(converter),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        )
    }

    #[tokio::test]
    async fn test_cycle_outcomes() {
        let source = Arc::new(MockFeedSource::new(FEED));
        let refresher = refresher(source.clone(), Arc::new(MemoryCache::new()));

        assert_eq!(refresher.cycle().await, CycleOutcome::Synchronized);
        assert_eq!(refresher.cycle().await, CycleOutcome::Skipped);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_cycle_reports_state() {
        let source = Arc::new(MockFeedSource::not_found());
        let refresher = refresher(source, Arc::new(MemoryCache::new()));

        assert_eq!(
            refresher.cycle().await,
            CycleOutcome::Failed {
                stage: "network",
                state: ConverterState::Unavailable,
            }
        );
    }

    #[tokio::test]
    async fn test_run_until_stopped() {
        let source = Arc::new(MockFeedSource::new(FEED));
        let refresher = Arc::new(refresher(source.clone(), Arc::new(MemoryCache::new())));

        let running = refresher.clone();
        let handle = tokio::spawn(async move { running.run().await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        refresher.stop();
        handle.await.unwrap();

        assert!(refresher.converter().is_synchronized());
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_restart_serves_file_cache() {
        let dir = tempfile::TempDir::new().unwrap();
        let parser = Arc::new(EcbParser::new());

        let cache = Arc::new(FileCache::open(dir.path(), "ecb").unwrap());
        let first = Converter::new(parser.clone(), Arc::new(MockFeedSource::new(FEED)), cache);
        let first = Refresher::new(
            Arc::new(first),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );
        assert_eq!(first.cycle().await, CycleOutcome::Synchronized);

        let cache = Arc::new(FileCache::open(dir.path(), "ecb").unwrap());
        let second = Converter::new(parser, Arc::new(MockFeedSource::not_found()), cache);
        let second = Refresher::new(
            Arc::new(second),
            Duration::from_secs(3600),
            Duration::from_secs(60),
        );

        second.stop();
        second.run().await;
        assert_eq!(second.converter().state(), ConverterState::Stale);

        let outcome = second.cycle().await;
        assert_eq!(
            outcome,
            CycleOutcome::Failed {
                stage: "network",
                state: ConverterState::Stale,
            }
        );
        assert!(second.converter().state().is_degraded());
        assert!(second.converter().is_available("USD"));
    }

    #[tokio::test]
    async fn test_run_starts_from_cache() {
        let cache = Arc::new(MemoryCache::with_persisted(
            FEED.as_bytes().to_vec(),
            refrate_common::now(),
        ));
        let refresher = refresher(Arc::new(MockFeedSource::not_found()), cache);

        refresher.stop();
        refresher.run().await;

        assert_eq!(refresher.converter().state(), ConverterState::Stale);
        assert!(refresher.converter().is_available("JPY"));
    }
}
