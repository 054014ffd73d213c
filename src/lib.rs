//! Arbor implements a self-balancing persistent cache of fetched
//! resources, stored in a filesystem directory tree whose shape
//! adapts to the data instead of being fixed up front.  Every cache
//! key (typically a URL) is reduced to its MD5 hex digest, and the
//! digest's position in hex-string order decides which directory owns
//! the entry.  Directories that grow past a capacity threshold are
//! split in two along the midpoint of their digest range, so lookup
//! cost stays logarithmic in the number of entries no matter how
//! lopsided the key distribution is.
//!
//! Rebalancing is batched: rather than checking directory sizes on
//! every write, the cache counts writes and walks the tree once per
//! fixed period (4096 writes by default).  Between walks, directories
//! may exceed their capacity; this is deliberate, and keeps the
//! common write path at a constant number of filesystem operations.
//!
//! # Cache directory structure
//!
//! The root cache directory initially holds entries directly: the
//! entry for a key is a file named after the key's 32-character MD5
//! hex digest, containing the cached payload.  The root conceptually
//! covers the whole digest space, bounded above by 40 `f`s (the
//! largest 160-bit value in hex).
//!
//! When a directory with upper bound `sup` at depth `d` splits, it
//! gains two subdirectories named after their own upper bounds,
//! written as 40-digit hex numbers:
//!
//! * the low child's bound is `sup - (2^159 >> d)`, i.e. `sup` minus
//!   half of a root-sized span scaled down by depth;
//! * the high child's bound is `sup` itself.
//!
//! Each existing entry moves into the low child when its full path
//! string sorts at or before the low child's path, and into the high
//! child otherwise.  Lookups descend the same way: a directory's
//! children are sorted by name and the first child whose name is
//! lexicographically at or after the digest owns it.  Since digests
//! are 32 hex digits and bounds are 40, a digest compares against a
//! bound as a plain string, which matches how entries were routed
//! when the split happened.
//!
//! A directory, once split, holds no entry files of its own; entries
//! only live at the leaves.  Splitting is not atomic: a crash in the
//! middle of a split can leave some entries behind in the parent,
//! and those leftovers are effectively lost.  Lookups descend past
//! any node that has children, so a parent-level entry is never
//! found again, and later rebalance passes only split nodes that
//! overflow on their own, so nothing ever moves it down.  The
//! affected keys simply miss and get re-fetched; the stale files
//! linger in the parent until removed by hand.
//!
//! Two internal names share the root with the tree and are ignored by
//! it: `.index.log`, an append-only log with one tab-separated
//! `timestamp, digest, key` line per write (the only place the
//! original keys are recorded), and `.temp`, where new entries are
//! staged before being atomically renamed into place.
//!
//! # Concurrency
//!
//! A [`Cache`] hands out clones that all share one mutex-guarded
//! writer state.  Reads, writes, and rebalancing serialize on that
//! mutex; [`Cache::get_or_fetch`] releases it while the fetch closure
//! runs, so slow fetches do not block other threads' cache hits.  Two
//! threads missing on the same key may therefore both fetch it; the
//! second write wins, which is harmless for idempotent fetches.
//!
//! Batches of fetch work can be driven through a [`TaskPool`], which
//! runs closures over a fixed number of worker threads and returns
//! their results in submission order, and flaky fetches can be
//! wrapped in a [`RetryPolicy`].
//!
//! # Sample usage
//!
//! ```no_run
//! # fn main() -> arbor_cache::Result<()> {
//! let cache = arbor_cache::Cache::builder("/tmp/resource_cache")
//!     .node_capacity(1024)
//!     .build()?;
//!
//! // Returns the cached payload for this URL, fetching and storing
//! // it on a miss.
//! let page = cache.get_or_fetch("https://example.com/page", || {
//!     // ... fetch over the network ...
//!     # Ok(String::new())
//! })?;
//!
//! // Fan a batch of fetches out over 5 workers; results come back
//! // in submission order.
//! let mut pool = arbor_cache::TaskPool::new(5);
//! for i in 0..20 {
//!     let cache = cache.clone();
//!     let url = format!("https://example.com/item/{}", i);
//!     pool.add_task(move || {
//!         cache.get_or_fetch(&url, || {
//!             // ... fetch over the network ...
//!             # Ok(String::new())
//!         })
//!     });
//! }
//! let pages = pool.execute()?;
//! # let _ = (page, pages);
//! # Ok(())
//! # }
//! ```
mod cache;
mod cadence;
mod digest;
mod error;
mod index_log;
mod pool;
mod retry;
mod span;
mod tree;

pub use cache::Cache;
pub use cache::CacheBuilder;
pub use cache::DEFAULT_NODE_CAPACITY;
pub use cache::DEFAULT_REBALANCE_PERIOD;
pub use error::Error;
pub use error::Result;
pub use pool::TaskPool;
pub use retry::RetryPolicy;
