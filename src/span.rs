//! Node directories are named by the upper bound of the digest range
//! they own, written as 40 lowercase hex digits (a 160-bit unsigned
//! integer).  A `Bound` is one such value, stored big-endian so that
//! the derived byte-wise ordering, the numeric ordering, and the
//! lexicographic ordering of the fixed-width hex names all agree.
//!
//! Splitting a node at tree depth `d` (0 for the root) names its low
//! child `sup - (2^159 >> d)`, where `sup` is the node's own upper
//! bound; the high child keeps the name `sup`.  The step is derived
//! from the *root's* span halved once per level, not from the node's
//! local span, so splits below depth 1 are not numerically even.  A
//! balanced binary split (halving the node's own range) would be
//! simpler, but existing cache trees on disk were built with this
//! rule, so it is preserved exactly.
use std::fmt;

/// Number of bytes in a bound.
pub(crate) const BOUND_BYTES: usize = 20;

/// Number of hex digits in a node directory name.
pub(crate) const BOUND_WIDTH: usize = 2 * BOUND_BYTES;

/// A 160-bit node range bound, big-endian.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct Bound([u8; BOUND_BYTES]);

impl fmt::Debug for Bound {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Bound({})", self.to_hex())
    }
}

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

impl Bound {
    /// The upper bound of the whole digest space, `ff…f`: the name
    /// the root node implicitly carries.
    pub const FULL: Bound = Bound([0xff; BOUND_BYTES]);

    /// Parses a 40-hex-digit node directory name.
    pub fn parse(name: &str) -> Option<Bound> {
        if name.len() != BOUND_WIDTH || !name.is_ascii() {
            return None;
        }

        let mut bytes = [0u8; BOUND_BYTES];
        for (i, pair) in name.as_bytes().chunks(2).enumerate() {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            bytes[i] = ((hi << 4) | lo) as u8;
        }

        Some(Bound(bytes))
    }

    /// Formats the bound as a 40-digit lowercase hex directory name.
    pub fn to_hex(&self) -> String {
        let mut hex = String::with_capacity(BOUND_WIDTH);
        for byte in self.0.iter() {
            hex.push(HEX_DIGITS[(byte >> 4) as usize] as char);
            hex.push(HEX_DIGITS[(byte & 0xf) as usize] as char);
        }

        hex
    }

    /// Returns the name of the low child created when a node with
    /// this upper bound splits at tree depth `depth`:
    /// `self - (2^159 >> depth)`.
    ///
    /// Returns `None` when the step does not fit in the remaining
    /// range (a tree deep enough to trigger this does not occur in
    /// practice; callers treat it as a consistency error).
    pub fn low_child(&self, depth: u32) -> Option<Bound> {
        if depth as usize >= 8 * BOUND_BYTES {
            return None;
        }

        let mut step = [0u8; BOUND_BYTES];
        step[(depth / 8) as usize] = 0x80u8 >> (depth % 8);
        self.checked_sub(&Bound(step))
    }

    /// Big-endian subtraction with borrow; `None` on underflow.
    fn checked_sub(&self, other: &Bound) -> Option<Bound> {
        let mut result = [0u8; BOUND_BYTES];
        let mut borrow = 0u16;
        for i in (0..BOUND_BYTES).rev() {
            let lhs = self.0[i] as u16;
            let rhs = other.0[i] as u16 + borrow;
            if lhs >= rhs {
                result[i] = (lhs - rhs) as u8;
                borrow = 0;
            } else {
                result[i] = (lhs + 0x100 - rhs) as u8;
                borrow = 1;
            }
        }

        if borrow == 0 {
            Some(Bound(result))
        } else {
            None
        }
    }
}
