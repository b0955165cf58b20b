//! Directory-backed feed cache.
//!
//! Layout for a cache named `ecb`:
//!
//! ```text
//! ecb.tmp            temporary tier
//! ecb.tmp.partial    sink in progress
//! ecb.dat            persisted tier
//! ecb.json           commit manifest
//! ```
//!
//! Finished files are always produced by renaming a fully written sibling, so
//! an interrupted write never leaves a truncated tier behind.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use refrate_common::{now, Timestamp};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{CacheSink, CacheSource, FeedCache, Tier};
use crate::error::{CacheError, CacheResult};

/// Metadata written next to the persisted tier on every commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Manifest {
    committed_at: Timestamp,
    bytes: u64,
}

/// Feed cache storing both tiers as files in one directory.
#[derive(Debug, Clone)]
pub struct FileCache {
    dir: PathBuf,
    name: String,
}

impl FileCache {
    /// Open (and create if needed) a cache named `name` inside `dir`.
    pub fn open(dir: impl Into<PathBuf>, name: &str) -> CacheResult<Self> {
        let dir = dir.into();

        if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
            return Err(CacheError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid cache name {name:?}"),
            )));
        }

        fs::create_dir_all(&dir)?;
        debug!(dir = %dir.display(), name, "Opened file cache");

        Ok(Self {
            dir,
            name: name.to_string(),
        })
    }

    /// Directory holding the cache files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file(&self, suffix: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", self.name, suffix))
    }

    fn tier_path(&self, tier: Tier) -> PathBuf {
        match tier {
            Tier::Temporary => self.file("tmp"),
            Tier::Persisted => self.file("dat"),
        }
    }

    fn read_manifest(&self) -> CacheResult<Manifest> {
        let raw = fs::read(self.file("json"))?;
        serde_json::from_slice(&raw).map_err(|e| CacheError::Manifest(e.to_string()))
    }

    fn write_manifest(&self, manifest: &Manifest) -> CacheResult<()> {
        let raw =
            serde_json::to_vec_pretty(manifest).map_err(|e| CacheError::Manifest(e.to_string()))?;
        let staging = self.file("json.staging");
        fs::write(&staging, raw)?;
        fs::rename(&staging, self.file("json"))?;
        Ok(())
    }
}

/// Remove `path`, treating a missing file as success.
fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

impl FeedCache for FileCache {
    fn open_write_sink(&self) -> CacheResult<Box<dyn CacheSink>> {
        let target = self.tier_path(Tier::Temporary);
        remove_if_exists(&target)?;

        let partial = self.file("tmp.partial");
        let file = File::create(&partial)?;

        Ok(Box::new(FileSink {
            writer: BufWriter::new(file),
            partial,
            target,
        }))
    }

    fn open_read_source(&self, tier: Tier) -> CacheResult<CacheSource> {
        match File::open(self.tier_path(tier)) {
            Ok(file) => Ok(Box::new(io::BufReader::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(CacheError::NotFound(tier)),
            Err(e) => Err(e.into()),
        }
    }

    fn commit(&self) -> CacheResult<()> {
        let temporary = self.tier_path(Tier::Temporary);
        if !temporary.exists() {
            return Err(CacheError::NothingToCommit);
        }

        let staging = self.file("dat.staging");
        let bytes = fs::copy(&temporary, &staging)?;
        File::open(&staging)?.sync_all()?;
        fs::rename(&staging, self.tier_path(Tier::Persisted))?;

        self.write_manifest(&Manifest {
            committed_at: now(),
            bytes,
        })?;

        debug!(name = %self.name, bytes, "Committed temporary tier");
        Ok(())
    }

    fn contains(&self, tier: Tier) -> bool {
        self.tier_path(tier).is_file()
    }

    fn committed_at(&self) -> Option<Timestamp> {
        if !self.contains(Tier::Persisted) {
            return None;
        }

        match self.read_manifest() {
            Ok(manifest) => Some(manifest.committed_at),
            Err(e) => {
                // Persisted tier without a readable manifest: fall back to mtime.
                warn!(name = %self.name, error = %e, "Cache manifest unavailable");
                fs::metadata(self.tier_path(Tier::Persisted))
                    .and_then(|m| m.modified())
                    .ok()
                    .map(Timestamp::from)
            }
        }
    }
}

/// Sink writing to a `.partial` file, renamed into place on close.
struct FileSink {
    writer: BufWriter<File>,
    partial: PathBuf,
    target: PathBuf,
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl CacheSink for FileSink {
    fn close(self: Box<Self>) -> CacheResult<()> {
        let FileSink {
            writer,
            partial,
            target,
        } = *self;

        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        fs::rename(&partial, &target)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    fn write(cache: &FileCache, bytes: &[u8]) {
        let mut sink = cache.open_write_sink().unwrap();
        sink.write_all(bytes).unwrap();
        sink.close().unwrap();
    }

    fn read(cache: &FileCache, tier: Tier) -> Vec<u8> {
        let mut out = Vec::new();
        cache
            .open_read_source(tier)
            .unwrap()
            .read_to_end(&mut out)
            .unwrap();
        out
    }

    #[test]
    fn test_new_cache_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::open(dir.path(), "ecb").unwrap();

        assert!(cache.is_empty());
        assert!(cache.persisted_timestamp() < 0);
        assert!(matches!(
            cache.open_read_source(Tier::Persisted),
            Err(CacheError::NotFound(Tier::Persisted))
        ));
    }

    #[test]
    fn test_commit_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let cache = FileCache::open(dir.path(), "ecb").unwrap();
            write(&cache, b"<feed/>");
            cache.commit().unwrap();
        }

        let cache = FileCache::open(dir.path(), "ecb").unwrap();
        assert_eq!(read(&cache, Tier::Persisted), b"<feed/>");
        assert!(cache.persisted_timestamp() > 0);
        assert_eq!(cache.read_manifest().unwrap().bytes, 7);
    }

    #[test]
    fn test_fetch_does_not_touch_persisted() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::open(dir.path(), "ecb").unwrap();
        write(&cache, b"good");
        cache.commit().unwrap();
        let committed = cache.committed_at();

        write(&cache, b"garbage");

        assert_eq!(read(&cache, Tier::Persisted), b"good");
        assert_eq!(read(&cache, Tier::Temporary), b"garbage");
        assert_eq!(cache.committed_at(), committed);
    }

    #[test]
    fn test_commit_without_write_fails() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::open(dir.path(), "ecb").unwrap();

        assert!(matches!(cache.commit(), Err(CacheError::NothingToCommit)));
    }

    #[test]
    fn test_unclosed_sink_is_not_visible() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::open(dir.path(), "ecb").unwrap();
        write(&cache, b"old");

        {
            let mut sink = cache.open_write_sink().unwrap();
            sink.write_all(b"half").unwrap();
        }

        assert!(!cache.contains(Tier::Temporary));
        assert!(matches!(
            cache.open_read_source(Tier::Temporary),
            Err(CacheError::NotFound(Tier::Temporary))
        ));
    }

    #[test]
    fn test_missing_manifest_falls_back_to_mtime() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::open(dir.path(), "ecb").unwrap();
        write(&cache, b"data");
        cache.commit().unwrap();
        fs::remove_file(cache.file("json")).unwrap();

        assert!(cache.committed_at().is_some());
    }

    #[test]
    fn test_rejects_bad_names() {
        let dir = TempDir::new().unwrap();
        assert!(FileCache::open(dir.path(), "").is_err());
        assert!(FileCache::open(dir.path(), "../escape").is_err());
        assert!(FileCache::open(dir.path(), ".hidden").is_err());
    }
}
