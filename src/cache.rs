//! A `Cache` is one on-disk tree of previously fetched values.  Most
//! callers construct it once per root with [`CacheBuilder`] and go
//! through [`Cache::get_or_fetch`], which only invokes its fetch
//! closure on a miss.
//!
//! All structural work (lookup, entry publication, the index-log
//! append, the write counter, rebalancing) happens under one mutex
//! per cache value, so no thread ever observes the tree mid-split.
//! The lock is *not* held while a miss runs the caller's fetch
//! closure: fetches are slow network I/O, and a duplicate fetch of
//! the same key from a concurrent caller is benign (last write wins).
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use tempfile::NamedTempFile;
use tracing::debug;

use crate::cadence::WriteCadence;
use crate::digest::key_digest;
use crate::error::Error;
use crate::error::Result;
use crate::index_log::IndexLog;
use crate::tree;
use crate::tree::FsStore;

/// Maximum number of entry files a node may hold before a rebalance
/// pass splits it.
pub const DEFAULT_NODE_CAPACITY: usize = 1024;

/// A full-tree rebalance pass runs every this many writes.
pub const DEFAULT_REBALANCE_PERIOD: u64 = 4096;

/// Entry files are staged in this subdirectory of the cache root and
/// published with an atomic rename.
const TEMP_SUBDIR: &str = ".temp";

/// Configures and opens a [`Cache`].
#[derive(Clone, Debug)]
pub struct CacheBuilder {
    root: PathBuf,
    node_capacity: usize,
    rebalance_period: u64,
}

impl CacheBuilder {
    /// Returns a builder for a cache rooted at `root`, with the
    /// default node capacity and rebalance period.
    pub fn new(root: impl Into<PathBuf>) -> CacheBuilder {
        CacheBuilder {
            root: root.into(),
            node_capacity: DEFAULT_NODE_CAPACITY,
            rebalance_period: DEFAULT_REBALANCE_PERIOD,
        }
    }

    /// Sets the per-node entry capacity above which a rebalance pass
    /// splits the node.
    pub fn node_capacity(mut self, capacity: usize) -> CacheBuilder {
        self.node_capacity = capacity;
        self
    }

    /// Sets the write cadence of full-tree rebalance passes.
    pub fn rebalance_period(mut self, period: u64) -> CacheBuilder {
        self.rebalance_period = period;
        self
    }

    /// Opens the cache, creating the root directory if missing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRoot`] if the root exists and is not
    /// a directory, or if the root or its internal files cannot be
    /// created; the underlying I/O error rides along as the source.
    pub fn build(self) -> Result<Cache> {
        match std::fs::metadata(&self.root) {
            Ok(meta) if !meta.is_dir() => {
                return Err(Error::InvalidRoot {
                    path: self.root,
                    source: None,
                })
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                // Anything else (e.g. a file where a parent directory
                // should be) makes the root unusable: a configuration
                // error, not a transient I/O failure.
                return Err(Error::InvalidRoot {
                    path: self.root,
                    source: Some(e),
                });
            }
        }

        if let Err(e) = std::fs::create_dir_all(self.root.join(TEMP_SUBDIR)) {
            return Err(Error::InvalidRoot {
                path: self.root,
                source: Some(e),
            });
        }

        let log = IndexLog::open(&self.root).map_err(|e| Error::InvalidRoot {
            path: self.root.clone(),
            source: Some(e),
        })?;
        let cadence = WriteCadence::new(self.rebalance_period, log.writes());
        debug!(root = %self.root.display(), writes = log.writes(), "opened cache");

        Ok(Cache {
            root: self.root,
            node_capacity: self.node_capacity,
            state: Arc::new(Mutex::new(WriterState { log, cadence })),
        })
    }
}

/// State mutated on every write, guarded by the cache's single lock.
#[derive(Debug)]
struct WriterState {
    log: IndexLog,
    cadence: WriteCadence,
}

/// A content-addressed cache of string values in a self-balancing
/// directory tree.  Cheap to clone; clones share the same root and
/// the same lock.
#[derive(Clone, Debug)]
pub struct Cache {
    root: PathBuf,
    node_capacity: usize,
    state: Arc<Mutex<WriterState>>,
}

impl Cache {
    /// Returns a builder for a cache rooted at `root`.
    pub fn builder(root: impl Into<PathBuf>) -> CacheBuilder {
        CacheBuilder::new(root)
    }

    /// Returns the cache's root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Acquires the writer lock.  A poisoned lock means a thread
    /// panicked inside the cache's own locked sections (fetch
    /// closures run with the lock released), which leaves the tree
    /// state suspect; propagating the panic is deliberate.
    fn lock_state(&self) -> MutexGuard<WriterState> {
        self.state.lock().unwrap()
    }

    /// Returns the value stored for `key`, if any.
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let digest = key_digest(key);
        let _state = self.lock_state();
        self.read_entry(&digest)
    }

    /// Returns whether a value is stored for `key`.
    pub fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Stores `value` for `key`, overwriting any previous value.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let digest = key_digest(key);
        let mut state = self.lock_state();
        self.write_entry(&mut state, &digest, key, value)
    }

    /// Returns the cached value for `key`, or invokes `fetch` to
    /// produce, store, and return it.
    ///
    /// The returned value is always either a previously cached value
    /// or the one `fetch` just produced, never a partial write.  When
    /// two threads miss on the same key concurrently, both fetches
    /// run and the last write wins; `fetch` is *not* guaranteed to
    /// run at most once across callers.
    pub fn get_or_fetch(
        &self,
        key: &str,
        fetch: impl FnOnce() -> Result<String>,
    ) -> Result<String> {
        let digest = key_digest(key);

        {
            let _state = self.lock_state();
            if let Some(value) = self.read_entry(&digest)? {
                debug!(key, "cache hit");
                return Ok(value);
            }
        }

        // Fetch with the lock released: this is the slow part, and
        // the tree must stay available to other workers meanwhile.
        debug!(key, "cache miss, fetching");
        let value = fetch()?;

        let mut state = self.lock_state();
        self.write_entry(&mut state, &digest, key, &value)?;
        Ok(value)
    }

    /// Runs a full-tree rebalance pass immediately, regardless of the
    /// write cadence.
    pub fn rebalance(&self) -> Result<()> {
        let _state = self.lock_state();
        tree::rebalance(&FsStore, &self.root, 0, self.node_capacity)
    }

    /// Reads the entry for `digest` from its leaf node.  Caller holds
    /// the state lock.
    fn read_entry(&self, digest: &str) -> Result<Option<String>> {
        let node = tree::locate(&FsStore, &self.root, digest)?;
        match std::fs::read_to_string(node.join(digest)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Publishes `value` under `digest`, appends the index line,
    /// and runs a rebalance pass when the cadence fires.  Caller
    /// holds the state lock.
    fn write_entry(
        &self,
        state: &mut WriterState,
        digest: &str,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let node = tree::locate(&FsStore, &self.root, digest)?;

        // Stage in `.temp` and publish with a rename so a concurrent
        // reader never sees a partially written entry.
        let staged = NamedTempFile::new_in(self.root.join(TEMP_SUBDIR))?;
        std::fs::write(staged.path(), value.as_bytes())?;
        staged
            .persist(node.join(digest))
            .map_err(|e| Error::from(e.error))?;

        state.log.append(digest, key)?;
        if state.cadence.observe() {
            tree::rebalance(&FsStore, &self.root, 0, self.node_capacity)?;
        }

        Ok(())
    }
}
