//! Two-tier feed cache.
//!
//! A cache holds the raw bytes of a feed in two slots. The `temporary` tier
//! receives every fetch, validated or not. The `persisted` tier only changes
//! through [`FeedCache::commit`], which copies the temporary tier over it once
//! the converter has parsed the fetched document successfully.
//!
//! One cache serves one feed provider: `commit` does not record which format
//! the bytes are in.

mod file;
mod memory;

pub use file::FileCache;
pub use memory::MemoryCache;

use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use refrate_common::{epoch_seconds, Timestamp};

use crate::error::CacheResult;

/// One of the two storage slots of a cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Last fetched content, possibly invalid.
    Temporary,
    /// Last committed content.
    Persisted,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tier::Temporary => write!(f, "temporary"),
            Tier::Persisted => write!(f, "persisted"),
        }
    }
}

/// Byte sink bound to the temporary tier.
///
/// Content becomes readable only after [`close`](CacheSink::close). A sink
/// dropped without closing leaves the temporary tier empty.
pub trait CacheSink: Write + Send {
    /// Finalize the write.
    fn close(self: Box<Self>) -> CacheResult<()>;
}

/// Byte source over one tier.
pub type CacheSource = Box<dyn Read + Send>;

/// Storage contract for the converter's feed cache.
pub trait FeedCache: Send + Sync {
    /// Open a fresh sink on the temporary tier, discarding uncommitted content.
    fn open_write_sink(&self) -> CacheResult<Box<dyn CacheSink>>;

    /// Open a source on `tier`; fails with `NotFound` if it was never populated.
    fn open_read_source(&self, tier: Tier) -> CacheResult<CacheSource>;

    /// Copy the temporary tier over the persisted tier and stamp the commit time.
    fn commit(&self) -> CacheResult<()>;

    /// Check whether `tier` currently holds content.
    fn contains(&self, tier: Tier) -> bool;

    /// When the persisted tier was last committed.
    fn committed_at(&self) -> Option<Timestamp>;

    /// True iff neither tier holds content.
    fn is_empty(&self) -> bool {
        !self.contains(Tier::Temporary) && !self.contains(Tier::Persisted)
    }

    /// Unix seconds of the last commit, negative if never committed.
    fn persisted_timestamp(&self) -> i64 {
        epoch_seconds(self.committed_at())
    }
}

/// Shared feed cache.
pub type SharedFeedCache = Arc<dyn FeedCache>;
