//! Rebalancing is amortised: rather than scanning the tree after
//! every write, the cache counts writes and runs a full rebalance
//! pass every `period` of them.  The counter is deterministic (no
//! jitter) because it lives in the same critical section as the write
//! it follows, and is seeded from the index log so the cadence
//! carries across process restarts.

/// Counts writes and fires every `period` of them.
#[derive(Clone, Copy, Debug)]
pub(crate) struct WriteCadence {
    period: u64,
    observed: u64,
}

impl WriteCadence {
    /// Returns a cadence that fires every `period` observed writes,
    /// with `observed` writes already on record.
    ///
    /// A zero period makes no sense; treat it as a period of one
    /// (i.e., fire on every write).
    pub fn new(mut period: u64, observed: u64) -> WriteCadence {
        if period == 0 {
            period = 1;
        }

        WriteCadence { period, observed }
    }

    /// Records one write.  Returns whether the caller should run a
    /// rebalance pass.
    pub fn observe(&mut self) -> bool {
        self.observed += 1;
        self.observed % self.period == 0
    }
}

/// The cadence must fire exactly once per period, on the period's
/// last write.
#[test]
fn test_fires_every_period() {
    let mut cadence = WriteCadence::new(4, 0);

    let fired: Vec<bool> = (0..9).map(|_| cadence.observe()).collect();
    assert_eq!(
        fired,
        vec![false, false, false, true, false, false, false, true, false]
    );
}

/// A period of one fires on every write.
#[test]
fn test_one_period() {
    let mut cadence = WriteCadence::new(1, 0);

    for _ in 0..10 {
        assert!(cadence.observe());
    }
}

/// A zero period is treated as one.
#[test]
fn test_zero_period() {
    let mut cadence = WriteCadence::new(0, 0);

    for _ in 0..10 {
        assert!(cadence.observe());
    }
}

/// Seeding with prior writes keeps the cadence aligned: with 3 of 4
/// writes already recorded, the very next write fires.
#[test]
fn test_seeded() {
    let mut cadence = WriteCadence::new(4, 3);

    assert!(cadence.observe());
    assert!(!cadence.observe());
}
