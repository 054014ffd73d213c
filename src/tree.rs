//! The cache tree is a directory hierarchy.  A leaf node holds entry
//! files directly; a split node holds exactly two child directories
//! named by the upper bounds of the digest sub-ranges they own (see
//! [`crate::span`]).  `locate` descends from the root to the leaf
//! responsible for a digest; `rebalance` splits any node whose direct
//! entry count exceeds the configured capacity and pushes its entries
//! down, recursing so that multi-level overflow resolves in one pass.
//!
//! Two routing rules are preserved exactly from the on-disk format
//! this crate inherits:
//!
//! - descent compares the digest against sorted child names as plain
//!   strings, picking the first name `>=` the digest;
//! - a split distributes an entry by comparing its *full file path*
//!   lexicographically against the low child's directory path, not by
//!   comparing the digest against the numeric midpoint.
//!
//! The walks are written against the small [`NodeStore`] seam (list
//! children, list entries, create child, move entry) so the tree
//! logic is testable without touching a real filesystem.  Names
//! starting with a dot are reserved for the cache's internal files
//! and invisible to the walks.
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::info;

use crate::error::Error;
use crate::error::Result;
use crate::span::Bound;

/// The `NodeStore` trait is the tree's only view of the directory
/// hierarchy.
pub(crate) trait NodeStore {
    /// Returns the names of `node`'s child nodes, in no particular
    /// order.
    fn child_nodes(&self, node: &Path) -> Result<Vec<String>>;

    /// Returns the names of the entry files directly under `node`.
    fn entries(&self, node: &Path) -> Result<Vec<String>>;

    /// Creates the child node at `node`; succeeds if it already
    /// exists.
    fn create_node(&self, node: &Path) -> Result<()>;

    /// Moves the entry file at `from` to `to`.
    fn move_entry(&self, from: &Path, to: &Path) -> Result<()>;
}

/// `FsStore` backs the tree with the real filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct FsStore;

/// Internal files and directories (the index log, the temporary
/// subdirectory) are dot-named; the tree never enumerates them.
fn is_internal(name: &str) -> bool {
    name.starts_with('.')
}

impl FsStore {
    fn list(&self, node: &Path, want_dir: bool) -> Result<Vec<String>> {
        let mut found = Vec::new();
        for dirent in std::fs::read_dir(node)? {
            let dirent = dirent?;
            if dirent.file_type()?.is_dir() != want_dir {
                continue;
            }

            if let Some(name) = dirent.file_name().to_str() {
                if !is_internal(name) {
                    found.push(name.to_owned());
                }
            }
        }

        Ok(found)
    }
}

impl NodeStore for FsStore {
    fn child_nodes(&self, node: &Path) -> Result<Vec<String>> {
        self.list(node, true)
    }

    fn entries(&self, node: &Path) -> Result<Vec<String>> {
        self.list(node, false)
    }

    fn create_node(&self, node: &Path) -> Result<()> {
        std::fs::create_dir_all(node)?;
        Ok(())
    }

    fn move_entry(&self, from: &Path, to: &Path) -> Result<()> {
        std::fs::rename(from, to)?;
        Ok(())
    }
}

/// Walks from `root` down to the leaf node responsible for `digest`
/// and returns its path.
///
/// At each split node, the first child (in sorted name order) whose
/// name is `>=` the digest owns it.  A split node with no such child
/// means the tree is corrupt; that is fatal, not recovered.
pub(crate) fn locate(store: &impl NodeStore, root: &Path, digest: &str) -> Result<PathBuf> {
    let mut node = root.to_path_buf();

    loop {
        let mut children = store.child_nodes(&node)?;
        if children.is_empty() {
            debug!(node = %node.display(), digest, "located leaf node");
            return Ok(node);
        }

        children.sort();
        match children.into_iter().find(|name| digest <= name.as_str()) {
            Some(name) => node.push(name),
            None => {
                return Err(Error::InconsistentTree {
                    digest: digest.to_owned(),
                    node,
                })
            }
        }
    }
}

/// Rebalances the subtree rooted at `node`, at tree depth `depth` (0
/// for the cache root): splits the node if its direct entry count
/// strictly exceeds `capacity`, then recurses into every child,
/// pre-existing or freshly created.
pub(crate) fn rebalance(
    store: &impl NodeStore,
    node: &Path,
    depth: u32,
    capacity: usize,
) -> Result<()> {
    let entries = store.entries(node)?;
    if entries.len() > capacity {
        split_node(store, node, depth, entries)?;
    }

    for child in store.child_nodes(node)? {
        rebalance(store, &node.join(child), depth + 1, capacity)?;
    }

    Ok(())
}

/// Returns the upper bound of the range owned by `node` at `depth`.
/// The root owns the full digest space; any deeper node is named by
/// its bound.
fn node_bound(node: &Path, depth: u32) -> Result<Bound> {
    if depth == 0 {
        return Ok(Bound::FULL);
    }

    node.file_name()
        .and_then(|name| name.to_str())
        .and_then(Bound::parse)
        .ok_or_else(|| Error::InvalidNodeName {
            node: node.to_owned(),
        })
}

/// Splits `node` into its two children and distributes `entries`
/// between them by the lexicographic path rule.
fn split_node(
    store: &impl NodeStore,
    node: &Path,
    depth: u32,
    entries: Vec<String>,
) -> Result<()> {
    let sup = node_bound(node, depth)?;
    let low = sup.low_child(depth).ok_or_else(|| Error::InvalidNodeName {
        node: node.to_owned(),
    })?;

    let low_path = node.join(low.to_hex());
    let high_path = node.join(sup.to_hex());
    info!(node = %low_path.display(), "rebalancing: creating node");
    info!(node = %high_path.display(), "rebalancing: creating node");
    store.create_node(&low_path)?;
    store.create_node(&high_path)?;

    for name in entries {
        let from = node.join(&name);
        // An entry goes to the low child iff its full path sorts at
        // or before the low child's directory path.
        let target = if from.as_os_str() <= low_path.as_os_str() {
            &low_path
        } else {
            &high_path
        };

        debug!(entry = %name, to = %target.display(), "rebalancing: moving entry");
        store.move_entry(&from, &target.join(&name))?;
    }

    Ok(())
}


#[cfg(test)]
mod test {
    use std::path::Path;
    use std::path::PathBuf;

    use super::mem::MemStore;
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/cache")
    }

    const LOW_NAME: &str = "7fffffffffffffffffffffffffffffffffffffff";
    const HIGH_NAME: &str = "ffffffffffffffffffffffffffffffffffffffff";

    /// An unsplit root is its own leaf, whatever the digest.
    #[test]
    fn test_locate_unsplit() {
        let store = MemStore::new(&root());

        let node = locate(&store, &root(), "00aabb").expect("locate must succeed");
        assert_eq!(node, root());
        let node = locate(&store, &root(), "ffffff").expect("locate must succeed");
        assert_eq!(node, root());
    }

    /// After one split, digests route to the first child whose name
    /// is greater than or equal to the digest.
    #[test]
    fn test_locate_split() {
        let store = MemStore::new(&root());
        store.create_node(&root().join(LOW_NAME)).expect("must succeed");
        store.create_node(&root().join(HIGH_NAME)).expect("must succeed");

        let low = locate(&store, &root(), "12345678901234567890123456789012")
            .expect("locate must succeed");
        assert_eq!(low, root().join(LOW_NAME));

        let high = locate(&store, &root(), "fedcba09876543211234567890abcdef")
            .expect("locate must succeed");
        assert_eq!(high, root().join(HIGH_NAME));

        // The exact low bound belongs to the low child: the rule is
        // `digest <= name`.
        let boundary = locate(&store, &root(), LOW_NAME).expect("locate must succeed");
        assert_eq!(boundary, root().join(LOW_NAME));
    }

    /// A split node none of whose children covers the digest is
    /// corrupt: locate must fail, not guess.
    #[test]
    fn test_locate_inconsistent() {
        let store = MemStore::new(&root());
        store
            .create_node(&root().join("3fffffffffffffffffffffffffffffffffffffff"))
            .expect("must succeed");

        let err = locate(&store, &root(), "fedcba09876543211234567890abcdef")
            .expect_err("locate must fail");
        assert!(matches!(err, Error::InconsistentTree { .. }));
    }

    /// Inserting capacity + 1 entries and rebalancing must split the
    /// node into exactly two children whose combined entries equal
    /// the original set, distributed by the lexicographic path rule.
    #[test]
    fn test_split_conserves_entries() {
        let store = MemStore::new(&root());
        let names = [
            "11111111111111111111111111111111",
            "77777777777777777777777777777777",
            "cccccccccccccccccccccccccccccccc",
        ];
        for name in &names {
            store.add_entry(&root(), name);
        }

        rebalance(&store, &root(), 0, 2).expect("rebalance must succeed");

        let mut children = store.child_nodes(&root()).expect("list must succeed");
        children.sort();
        assert_eq!(children, vec![LOW_NAME.to_owned(), HIGH_NAME.to_owned()]);
        assert_eq!(store.entries(&root()).expect("list must succeed"), Vec::<String>::new());

        let all: Vec<String> = store.all_entries().into_iter().collect();
        assert_eq!(all, names.iter().map(|s| s.to_string()).collect::<Vec<_>>());

        // Path-rule routing: names sorting at or before the low
        // child's name go low, the rest go high.
        let low_entries = store
            .entries(&root().join(LOW_NAME))
            .expect("list must succeed");
        assert_eq!(low_entries, vec![names[0].to_owned(), names[1].to_owned()]);
        let high_entries = store
            .entries(&root().join(HIGH_NAME))
            .expect("list must succeed");
        assert_eq!(high_entries, vec![names[2].to_owned()]);

        // Every entry remains reachable through locate.
        for name in &names {
            let leaf = locate(&store, &root(), name).expect("locate must succeed");
            assert!(store
                .entries(&leaf)
                .expect("list must succeed")
                .contains(&name.to_string()));
        }
    }

    /// A node that does not overflow is left alone.
    #[test]
    fn test_no_split_at_capacity() {
        let store = MemStore::new(&root());
        store.add_entry(&root(), "11111111111111111111111111111111");
        store.add_entry(&root(), "cccccccccccccccccccccccccccccccc");

        rebalance(&store, &root(), 0, 2).expect("rebalance must succeed");

        assert!(store.child_nodes(&root()).expect("list must succeed").is_empty());
        assert_eq!(store.entries(&root()).expect("list must succeed").len(), 2);
    }

    /// Multi-level overflow resolves in a single pass: with capacity
    /// 1, the recursion keeps splitting fresh children until every
    /// node is within capacity, and every entry stays reachable.
    #[test]
    fn test_multi_level_rebalance() {
        let store = MemStore::new(&root());
        let names = [
            "00000000000000000000000000000000",
            "11111111111111111111111111111111",
            "88888888888888888888888888888888",
            "cccccccccccccccccccccccccccccccc",
        ];
        for name in &names {
            store.add_entry(&root(), name);
        }

        rebalance(&store, &root(), 0, 1).expect("rebalance must succeed");

        assert_eq!(store.all_entries().len(), names.len());
        for (_, count) in store.entry_counts() {
            assert!(count <= 1);
        }
        for name in &names {
            let leaf = locate(&store, &root(), name).expect("locate must succeed");
            assert!(store
                .entries(&leaf)
                .expect("list must succeed")
                .contains(&name.to_string()));
        }
    }

    /// The filesystem store obeys the same contract: split on
    /// overflow, dot-named internals invisible, entries reachable.
    #[test]
    fn test_fs_store_rebalance() {
        use test_dir::{DirBuilder, FileType, TestDir};

        let temp = TestDir::temp()
            .create("11111111111111111111111111111111", FileType::RandomFile(8))
            .create("77777777777777777777777777777777", FileType::RandomFile(8))
            .create("cccccccccccccccccccccccccccccccc", FileType::RandomFile(8))
            .create(".index.log", FileType::ZeroFile(1))
            .create(".temp", FileType::Dir);

        let store = FsStore;
        let tree_root = temp.path(".");
        assert_eq!(
            store.entries(&tree_root).expect("list must succeed").len(),
            3
        );
        assert!(store
            .child_nodes(&tree_root)
            .expect("list must succeed")
            .is_empty());

        rebalance(&store, &tree_root, 0, 2).expect("rebalance must succeed");

        let mut children = store.child_nodes(&tree_root).expect("list must succeed");
        children.sort();
        assert_eq!(children, vec![LOW_NAME.to_owned(), HIGH_NAME.to_owned()]);
        assert!(store.entries(&tree_root).expect("list must succeed").is_empty());

        for name in &[
            "11111111111111111111111111111111",
            "77777777777777777777777777777777",
            "cccccccccccccccccccccccccccccccc",
        ] {
            let leaf = locate(&store, &tree_root, name).expect("locate must succeed");
            assert!(std::fs::metadata(leaf.join(name)).is_ok());
        }

        // The internal files must not have moved.
        assert!(std::fs::metadata(temp.path(".index.log")).is_ok());
        assert!(std::fs::metadata(temp.path(".temp")).is_ok());
    }

    /// Sibling ranges partition the digest space: any digest locates
    /// to exactly one leaf, and distinct leaves own disjoint ranges.
    #[test]
    fn test_partition() {
        let store = MemStore::new(&root());
        for name in &[
            "00000000000000000000000000000000",
            "55555555555555555555555555555555",
            "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
            "ffffffffffffffffffffffffffffffff",
        ] {
            store.add_entry(&root(), name);
        }
        rebalance(&store, &root(), 0, 1).expect("rebalance must succeed");

        // Probe a spread of digests; each must land on exactly one
        // leaf, and the walk must never error.
        for hex in 0..16 {
            let digest = format!("{:x}", hex).repeat(32);
            let leaf = locate(&store, &root(), &digest).expect("locate must succeed");
            assert!(store
                .child_nodes(&leaf)
                .expect("list must succeed")
                .is_empty());
        }
    }

    /// Depth passes through to the split arithmetic: splitting the
    /// high child uses a step half the root's.
    #[test]
    fn test_second_level_names() {
        let store = MemStore::new(&root());
        let high = root().join(HIGH_NAME);
        store.create_node(&root().join(LOW_NAME)).expect("must succeed");
        store.create_node(&high).expect("must succeed");
        store.add_entry(&high, "ffff0000000000000000000000000000");
        store.add_entry(&high, "ffff1111111111111111111111111111");

        rebalance(&store, &root(), 0, 1).expect("rebalance must succeed");

        let mut children = store.child_nodes(&high).expect("list must succeed");
        children.sort();
        assert_eq!(
            children,
            vec![
                "bfffffffffffffffffffffffffffffffffffffff".to_owned(),
                HIGH_NAME.to_owned(),
            ]
        );
    }

    /// A malformed directory name under a split node is surfaced as
    /// corruption when the rebalance reaches it.
    #[test]
    fn test_malformed_node_name() {
        let store = MemStore::new(&root());
        let bogus = root().join("not-a-bound");
        store.create_node(&bogus).expect("must succeed");
        store.add_entry(&bogus, "00000000000000000000000000000000");
        store.add_entry(&bogus, "11111111111111111111111111111111");

        let err = rebalance(&store, &root(), 0, 1).expect_err("rebalance must fail");
        assert!(matches!(err, Error::InvalidNodeName { .. }));
    }

    /// A crash between creating a split's children and moving its
    /// entries strands the stragglers: descent skips past the parent,
    /// so the entry is never found, and a later rebalance pass does
    /// not move it down either.  This is the documented data-loss
    /// sharp edge, pinned here so the docs stay honest about it.
    #[test]
    fn test_partial_split_strands_parent_entries() {
        let store = MemStore::new(&root());
        store.create_node(&root().join(LOW_NAME)).expect("must succeed");
        store.create_node(&root().join(HIGH_NAME)).expect("must succeed");
        let name = "11111111111111111111111111111111";
        store.add_entry(&root(), name);

        // Descent lands on a leaf that does not hold the entry.
        let leaf = locate(&store, &root(), name).expect("locate must succeed");
        assert_eq!(leaf, root().join(LOW_NAME));
        assert!(!store
            .entries(&leaf)
            .expect("list must succeed")
            .contains(&name.to_string()));

        // A full pass leaves the leftover in the parent: the parent
        // is far under capacity, so it never splits again.
        rebalance(&store, &root(), 0, 1024).expect("rebalance must succeed");
        assert!(store
            .entries(&root())
            .expect("list must succeed")
            .contains(&name.to_string()));
    }

    /// `Path`-based routing matches the documented rule on the real
    /// path type.
    #[test]
    fn test_path_order_is_string_order() {
        let low_path = Path::new("/cache").join(LOW_NAME);
        let before = Path::new("/cache").join("11111111111111111111111111111111");
        let after = Path::new("/cache").join("cccccccccccccccccccccccccccccccc");

        assert!(before.as_os_str() <= low_path.as_os_str());
        assert!(after.as_os_str() > low_path.as_os_str());
    }
}
