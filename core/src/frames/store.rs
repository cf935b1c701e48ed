//! Frame Store with Process-Wide Caching
//!
//! The [`FrameStore`] is the only component that touches durable storage.
//! It discovers frame sets under a root directory, loads the frames of a
//! set in numeric order, and memoizes loaded sequences in a process-wide
//! cache keyed by set name.
//!
//! # Cache Design
//!
//! - Entries are created lazily on the first request for a name, never
//!   evicted, never refreshed. An animation is reread from storage at most
//!   once regardless of request volume.
//! - Loaded sequences are `Arc<[Frame]>`: immutable and read-shared by
//!   every stream session without locking.
//! - Concurrent first-time requests for the same name are serialized by a
//!   per-key [`tokio::sync::OnceCell`], so a burst of connections for an
//!   uncached set triggers exactly one disk read.
//! - A failed load initializes nothing: the next request for that name
//!   retries the read naturally.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::debug;

use super::Frame;

/// Errors raised by frame storage access.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The frame root directory could not be enumerated.
    #[error("failed to read frame root {path:?}: {source}")]
    RootUnreadable {
        /// The root directory that was attempted.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A frame-set directory (or a frame file inside it) could not be read.
    #[error("failed to read frame set `{name}`: {source}")]
    SetUnreadable {
        /// The frame-set name that was attempted.
        name: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Counters accumulated over the store's lifetime.
///
/// `hits` counts requests served from a completed cache entry; `misses`
/// counts requests that found none (including waiters that piled onto an
/// in-flight load); `loads` counts actual storage read attempts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of frame sets with a completed cache entry.
    pub cached_sets: usize,
    /// Total frames held across all completed entries.
    pub cached_frames: usize,
    /// Requests served without touching storage.
    pub hits: u64,
    /// Requests that found no completed entry.
    pub misses: u64,
    /// Storage read attempts.
    pub loads: u64,
}

#[derive(Debug, Default)]
struct StoreCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
}

/// Loads frame sets from disk and memoizes them for the process lifetime.
///
/// Create one store at server start and share it (behind an `Arc`) with
/// every connection handler; fresh instances give tests full isolation.
#[derive(Debug)]
pub struct FrameStore {
    root: PathBuf,
    cache: DashMap<String, Arc<OnceCell<Arc<[Frame]>>>>,
    counters: StoreCounters,
}

impl FrameStore {
    /// Create a store rooted at `root`.
    ///
    /// The root is not touched until the first request; a missing or
    /// unreadable root surfaces as [`StoreError::RootUnreadable`] then.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: DashMap::new(),
            counters: StoreCounters::default(),
        }
    }

    /// The frame root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate the frame sets available under the root.
    ///
    /// A frame set is any directory entry of the root that is itself a
    /// directory; everything else is excluded. Result order is whatever the
    /// filesystem yields; callers that need determinism must sort.
    ///
    /// # Errors
    ///
    /// [`StoreError::RootUnreadable`] if the root cannot be enumerated.
    pub async fn list_frame_sets(&self) -> Result<Vec<String>, StoreError> {
        let root_err = |source| StoreError::RootUnreadable {
            path: self.root.clone(),
            source,
        };

        let mut entries = fs::read_dir(&self.root).await.map_err(root_err)?;
        let mut sets = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(root_err)? {
            let file_type = entry.file_type().await.map_err(root_err)?;
            if !file_type.is_dir() {
                continue;
            }
            // Names that are not valid UTF-8 cannot be requested over HTTP;
            // skip them.
            if let Some(name) = entry.file_name().to_str() {
                sets.push(name.to_owned());
            }
        }
        Ok(sets)
    }

    /// Read the named frame set from disk, bypassing the cache.
    ///
    /// Entries whose names parse as base-10 integers are read in ascending
    /// numeric order; non-numeric entries and non-files are silently
    /// skipped.
    ///
    /// # Errors
    ///
    /// [`StoreError::SetUnreadable`] if the directory or any selected frame
    /// file cannot be read.
    pub async fn load_frame_set(&self, name: &str) -> Result<Arc<[Frame]>, StoreError> {
        self.counters.loads.fetch_add(1, Ordering::Relaxed);

        let set_err = |source| StoreError::SetUnreadable {
            name: name.to_owned(),
            source,
        };

        let dir = self.root.join(name);
        let mut entries = fs::read_dir(&dir).await.map_err(set_err)?;

        let mut numbered: Vec<(u64, PathBuf)> = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(set_err)? {
            let Some(file_name) = entry.file_name().to_str().map(str::to_owned) else {
                continue;
            };
            let Ok(sequence) = file_name.parse::<u64>() else {
                continue;
            };
            if !entry.file_type().await.map_err(set_err)?.is_file() {
                continue;
            }
            numbered.push((sequence, entry.path()));
        }
        numbered.sort_unstable_by_key(|(sequence, _)| *sequence);

        let mut frames = Vec::with_capacity(numbered.len());
        for (_, path) in numbered {
            let text = fs::read_to_string(&path).await.map_err(set_err)?;
            frames.push(Frame::new(text));
        }

        debug!(set = name, frames = frames.len(), "loaded frame set from storage");
        Ok(frames.into())
    }

    /// Look up a cached sequence without touching storage.
    ///
    /// Returns `None` for names that were never requested or whose load has
    /// not completed.
    #[must_use]
    pub fn get_cached(&self, name: &str) -> Option<Arc<[Frame]>> {
        self.cache
            .get(name)
            .and_then(|cell| cell.get().map(Arc::clone))
    }

    /// Return the cached sequence for `name`, loading it first if needed.
    ///
    /// The result is cached even when the set is empty. Concurrent calls
    /// for the same uncached name share a single load; callers that arrive
    /// while a load is in flight wait for it instead of rereading disk.
    ///
    /// # Errors
    ///
    /// Propagates [`StoreError`] from the load. A failed load leaves the
    /// name uncached, so a later request retries.
    pub async fn ensure_cached(&self, name: &str) -> Result<Arc<[Frame]>, StoreError> {
        let cell = self.cache.entry(name.to_owned()).or_default().clone();

        if let Some(frames) = cell.get() {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(frames));
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let frames = cell.get_or_try_init(|| self.load_frame_set(name)).await?;
        Ok(Arc::clone(frames))
    }

    /// Snapshot the cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        let mut cached_sets = 0;
        let mut cached_frames = 0;
        for entry in self.cache.iter() {
            if let Some(frames) = entry.value().get() {
                cached_sets += 1;
                cached_frames += frames.len();
            }
        }
        CacheStats {
            cached_sets,
            cached_frames,
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs as std_fs;

    use tempfile::TempDir;

    /// Create a frame set directory with the given (file name, content) pairs.
    fn write_set(root: &Path, set: &str, files: &[(&str, &str)]) {
        let dir = root.join(set);
        std_fs::create_dir_all(&dir).unwrap();
        for (name, content) in files {
            std_fs::write(dir.join(name), content).unwrap();
        }
    }

    fn texts(frames: &[Frame]) -> Vec<&str> {
        frames.iter().map(Frame::text).collect()
    }

    #[tokio::test]
    async fn load_orders_frames_numerically() {
        let root = TempDir::new().unwrap();
        // Written out of order, and with a name that sorts differently as a
        // string ("10" < "3" lexicographically).
        write_set(
            root.path(),
            "dance",
            &[("3", "d"), ("0", "a"), ("10", "e"), ("1", "b"), ("2", "c")],
        );

        let store = FrameStore::new(root.path());
        let frames = store.load_frame_set("dance").await.unwrap();
        assert_eq!(texts(&frames), vec!["a", "b", "c", "d", "e"]);
    }

    #[tokio::test]
    async fn load_skips_non_numeric_entries() {
        let root = TempDir::new().unwrap();
        write_set(
            root.path(),
            "parrot",
            &[("0", "A"), ("1", "B"), ("2", "C"), ("readme", "nope")],
        );
        // A numerically-named subdirectory is not a frame either.
        std_fs::create_dir(root.path().join("parrot").join("9")).unwrap();

        let store = FrameStore::new(root.path());
        let frames = store.load_frame_set("parrot").await.unwrap();
        assert_eq!(texts(&frames), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn load_missing_set_fails() {
        let root = TempDir::new().unwrap();
        let store = FrameStore::new(root.path());

        let err = store.load_frame_set("ghost").await.unwrap_err();
        assert!(matches!(err, StoreError::SetUnreadable { ref name, .. } if name == "ghost"));
    }

    #[tokio::test]
    async fn list_returns_only_directories() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "parrot", &[("0", "A")]);
        write_set(root.path(), "dance", &[("0", "B")]);
        std_fs::write(root.path().join("notes.txt"), "stray").unwrap();

        let store = FrameStore::new(root.path());
        let mut sets = store.list_frame_sets().await.unwrap();
        sets.sort();
        assert_eq!(sets, vec!["dance", "parrot"]);
    }

    #[tokio::test]
    async fn list_missing_root_fails() {
        let store = FrameStore::new("/definitely/not/a/frame/root");
        let err = store.list_frame_sets().await.unwrap_err();
        assert!(matches!(err, StoreError::RootUnreadable { .. }));
    }

    #[tokio::test]
    async fn ensure_cached_loads_once() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "parrot", &[("0", "A"), ("1", "B")]);

        let store = FrameStore::new(root.path());
        let first = store.ensure_cached("parrot").await.unwrap();
        let second = store.ensure_cached("parrot").await.unwrap();

        // Same sequence instance, one storage read.
        assert!(Arc::ptr_eq(&first, &second));
        let stats = store.stats();
        assert_eq!(stats.loads, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.cached_sets, 1);
        assert_eq!(stats.cached_frames, 2);
    }

    #[tokio::test]
    async fn concurrent_ensure_cached_shares_one_load() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "parrot", &[("0", "A")]);

        let store = Arc::new(FrameStore::new(root.path()));
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(
                async move { store.ensure_cached("parrot").await },
            ));
        }
        for task in tasks {
            let frames = task.await.unwrap().unwrap();
            assert_eq!(texts(&frames), vec!["A"]);
        }
        assert_eq!(store.stats().loads, 1);
    }

    #[tokio::test]
    async fn empty_set_is_cached() {
        let root = TempDir::new().unwrap();
        std_fs::create_dir(root.path().join("void")).unwrap();

        let store = FrameStore::new(root.path());
        let frames = store.ensure_cached("void").await.unwrap();
        assert!(frames.is_empty());

        // Cached even though empty: no second read.
        let again = store.ensure_cached("void").await.unwrap();
        assert!(again.is_empty());
        assert_eq!(store.stats().loads, 1);
        assert_eq!(store.stats().cached_sets, 1);
    }

    #[tokio::test]
    async fn failed_load_is_not_cached() {
        let root = TempDir::new().unwrap();
        let store = FrameStore::new(root.path());

        assert!(store.ensure_cached("late").await.is_err());
        assert!(store.get_cached("late").is_none());

        // The set appears after the failed attempt; the next request
        // retries and succeeds.
        write_set(root.path(), "late", &[("0", "now")]);
        let frames = store.ensure_cached("late").await.unwrap();
        assert_eq!(texts(&frames), vec!["now"]);
        assert_eq!(store.stats().loads, 2);
    }

    #[tokio::test]
    async fn get_cached_never_touches_storage() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "parrot", &[("0", "A")]);

        let store = FrameStore::new(root.path());
        assert!(store.get_cached("parrot").is_none());

        store.ensure_cached("parrot").await.unwrap();

        // Remove the backing directory: the cache must keep serving.
        std_fs::remove_dir_all(root.path().join("parrot")).unwrap();
        let frames = store.get_cached("parrot").unwrap();
        assert_eq!(texts(&frames), vec!["A"]);
        let frames = store.ensure_cached("parrot").await.unwrap();
        assert_eq!(texts(&frames), vec!["A"]);
        assert_eq!(store.stats().loads, 1);
    }

    #[tokio::test]
    async fn frames_keep_raw_bytes() {
        let root = TempDir::new().unwrap();
        write_set(root.path(), "ansi", &[("0", "\x1b[1mparrot\x1b[0m\n")]);

        let store = FrameStore::new(root.path());
        let frames = store.ensure_cached("ansi").await.unwrap();
        assert_eq!(frames[0].text(), "\x1b[1mparrot\x1b[0m\n");
    }
}
