//! In-process feed cache.

use std::io::{self, Cursor, Write};
use std::sync::Arc;

use parking_lot::Mutex;
use refrate_common::{now, Timestamp};
use tracing::debug;

use super::{CacheSink, CacheSource, FeedCache, Tier};
use crate::error::{CacheError, CacheResult};

#[derive(Debug, Default)]
struct Slots {
    temporary: Option<Arc<Vec<u8>>>,
    persisted: Option<Arc<Vec<u8>>>,
    committed_at: Option<Timestamp>,
    /// Bumped by every `open_write_sink`; only the newest sink may close.
    generation: u64,
}

/// Feed cache that keeps both tiers in memory.
///
/// Lives as long as the process. Useful for tests and for hosts that persist
/// the committed bytes themselves.
#[derive(Debug, Default, Clone)]
pub struct MemoryCache {
    slots: Arc<Mutex<Slots>>,
}

impl MemoryCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a cache whose persisted tier is seeded with `bytes`.
    pub fn with_persisted(bytes: Vec<u8>, committed_at: Timestamp) -> Self {
        let cache = Self::new();
        {
            let mut slots = cache.slots.lock();
            slots.persisted = Some(Arc::new(bytes));
            slots.committed_at = Some(committed_at);
        }
        cache
    }

    /// Size in bytes of the content in `tier`.
    pub fn size(&self, tier: Tier) -> Option<usize> {
        let slots = self.slots.lock();
        match tier {
            Tier::Temporary => slots.temporary.as_ref().map(|b| b.len()),
            Tier::Persisted => slots.persisted.as_ref().map(|b| b.len()),
        }
    }
}

impl FeedCache for MemoryCache {
    fn open_write_sink(&self) -> CacheResult<Box<dyn CacheSink>> {
        let mut slots = self.slots.lock();
        slots.generation += 1;
        slots.temporary = None;

        Ok(Box::new(MemorySink {
            slots: self.slots.clone(),
            generation: slots.generation,
            buffer: Vec::new(),
        }))
    }

    fn open_read_source(&self, tier: Tier) -> CacheResult<CacheSource> {
        let slots = self.slots.lock();
        let bytes = match tier {
            Tier::Temporary => slots.temporary.clone(),
            Tier::Persisted => slots.persisted.clone(),
        };

        let bytes = bytes.ok_or(CacheError::NotFound(tier))?;
        Ok(Box::new(Cursor::new(SharedBytes(bytes))))
    }

    fn commit(&self) -> CacheResult<()> {
        let mut slots = self.slots.lock();
        let temporary = slots.temporary.clone().ok_or(CacheError::NothingToCommit)?;

        debug!(bytes = temporary.len(), "Committing temporary tier");
        slots.persisted = Some(temporary);
        slots.committed_at = Some(now());
        Ok(())
    }

    fn contains(&self, tier: Tier) -> bool {
        self.size(tier).is_some()
    }

    fn committed_at(&self) -> Option<Timestamp> {
        self.slots.lock().committed_at
    }
}

/// Sink collecting bytes until closed.
struct MemorySink {
    slots: Arc<Mutex<Slots>>,
    generation: u64,
    buffer: Vec<u8>,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CacheSink for MemorySink {
    fn close(self: Box<Self>) -> CacheResult<()> {
        let mut slots = self.slots.lock();

        // A newer sink has been opened since; this write is discarded.
        if slots.generation != self.generation {
            debug!("Discarding superseded temporary write");
            return Ok(());
        }

        slots.temporary = Some(Arc::new(self.buffer));
        Ok(())
    }
}

/// Shared byte buffer readable through a `Cursor`.
struct SharedBytes(Arc<Vec<u8>>);

impl AsRef<[u8]> for SharedBytes {
    fn as_ref(&self) -> &[u8] {
        self.0.as_slice()
    }
}
