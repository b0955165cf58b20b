//! Converter state definitions.

/// Where a converter's current data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConverterState {
    /// No update has run yet.
    #[default]
    Uninitialized,
    /// The table was fetched, parsed and committed by the last update.
    Synchronized,
    /// The last update failed; the table was recovered from the persisted tier.
    Stale,
    /// The last update failed and nothing could be recovered.
    Unavailable,
}

impl ConverterState {
    /// Check if the data is fresh from the feed.
    pub fn is_synchronized(&self) -> bool {
        matches!(self, ConverterState::Synchronized)
    }

    /// Check if the last update failed.
    pub fn is_degraded(&self) -> bool {
        matches!(self, ConverterState::Stale | ConverterState::Unavailable)
    }
}
