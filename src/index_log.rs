//! Every cache write appends one line to `.index.log` at the cache
//! root: an RFC 3339 timestamp, the entry's digest, and the original
//! key, tab-separated.  The log is an append-only audit trail and the
//! source of the total write count that drives the rebalance cadence;
//! lookups never read it, so a damaged log degrades the cadence, not
//! correctness.
use std::fs::File;
use std::fs::OpenOptions;
use std::io::Read;
use std::io::Result;
use std::io::Write;
use std::path::Path;

use chrono::SecondsFormat;
use chrono::Utc;

/// Name of the log file, directly under the cache root.  The leading
/// dot keeps it out of the tree walks, which ignore dot-named files.
pub(crate) const INDEX_LOG_NAME: &str = ".index.log";

/// The append-only write log of one cache root.
#[derive(Debug)]
pub(crate) struct IndexLog {
    file: File,
    writes: u64,
}

impl IndexLog {
    /// Opens (or creates) the index log under `root` in append mode,
    /// counting the lines already present.
    pub fn open(root: &Path) -> Result<IndexLog> {
        let path = root.join(INDEX_LOG_NAME);
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;

        let mut writes = 0u64;
        let mut buf = [0u8; 8192];
        loop {
            let got = file.read(&mut buf)?;
            if got == 0 {
                break;
            }

            writes += buf[..got].iter().filter(|&&b| b == b'\n').count() as u64;
        }

        Ok(IndexLog { file, writes })
    }

    /// Appends one line for a write of `key`'s entry under `digest`.
    pub fn append(&mut self, digest: &str, key: &str) -> Result<()> {
        let stamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        writeln!(self.file, "{}\t{}\t{}", stamp, digest, key)?;
        self.writes += 1;
        Ok(())
    }

    /// Total writes recorded, including lines found at open time.
    pub fn writes(&self) -> u64 {
        self.writes
    }
}

/// Appending lines should grow both the write count and the on-disk
/// log, one tab-separated line per write.
#[test]
fn test_append() {
    use test_dir::{DirBuilder, TestDir};

    let temp = TestDir::temp();
    let mut log = IndexLog::open(&temp.path(".")).expect("open must succeed");
    assert_eq!(log.writes(), 0);

    log.append("d41d8cd98f00b204e9800998ecf8427e", "https://example/a")
        .expect("append must succeed");
    log.append("900150983cd24fb0d6963f7d28e17f72", "https://example/b")
        .expect("append must succeed");
    assert_eq!(log.writes(), 2);

    let contents =
        std::fs::read_to_string(temp.path(INDEX_LOG_NAME)).expect("read must succeed");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 2);
    for (line, key) in lines.iter().zip(&["https://example/a", "https://example/b"]) {
        let fields: Vec<&str> = line.split('\t').collect();
        assert_eq!(fields.len(), 3);
        assert_eq!(&fields[2], key);
    }
}

/// Reopening the log must pick up the existing line count, and new
/// lines must append rather than truncate.
#[test]
fn test_reopen() {
    use test_dir::{DirBuilder, TestDir};

    let temp = TestDir::temp();

    {
        let mut log = IndexLog::open(&temp.path(".")).expect("open must succeed");
        log.append("d41d8cd98f00b204e9800998ecf8427e", "k1")
            .expect("append must succeed");
    }

    let mut log = IndexLog::open(&temp.path(".")).expect("reopen must succeed");
    assert_eq!(log.writes(), 1);
    log.append("900150983cd24fb0d6963f7d28e17f72", "k2")
        .expect("append must succeed");
    assert_eq!(log.writes(), 2);

    let contents =
        std::fs::read_to_string(temp.path(INDEX_LOG_NAME)).expect("read must succeed");
    assert_eq!(contents.lines().count(), 2);
}
