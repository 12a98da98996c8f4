//! Sequence Number Handling
//!
//! ARQ sequence numbers are assigned monotonically per packet and occupy the
//! low 30 bits of the first header word (bits 30 and 31 carry flags). Transfers
//! are finite, so sequence numbers never wrap: ordering is plain integer
//! ordering.

use std::fmt;
use std::ops::{Add, AddAssign, Sub};

/// Maximum sequence number value (30-bit: 0x3FFFFFFF)
pub const MAX_SEQ_NUMBER: u32 = 0x3FFF_FFFF;

/// Packet sequence number
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct SeqNumber(u32);

impl SeqNumber {
    /// Sequence number of the first packet of every transfer
    pub const ZERO: SeqNumber = SeqNumber(0);

    /// Create a new sequence number
    ///
    /// # Panics
    /// Panics if value exceeds MAX_SEQ_NUMBER
    pub fn new(value: u32) -> Self {
        assert!(
            value <= MAX_SEQ_NUMBER,
            "Sequence number {} exceeds maximum {}",
            value,
            MAX_SEQ_NUMBER
        );
        SeqNumber(value)
    }

    /// Create a sequence number from a wire value, masking it to 30 bits
    #[inline]
    pub fn new_unchecked(value: u32) -> Self {
        SeqNumber(value & MAX_SEQ_NUMBER)
    }

    /// Get the raw sequence number value
    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// Index of this sequence number into per-transfer tables
    #[inline]
    pub fn as_index(self) -> usize {
        self.0 as usize
    }

    /// Increment the sequence number by 1
    #[inline]
    pub fn increment(&mut self) {
        self.0 += 1;
    }

    /// Get the next sequence number
    #[inline]
    pub fn next(self) -> Self {
        SeqNumber(self.0 + 1)
    }

    /// Get the previous sequence number, or `None` at zero
    #[inline]
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(SeqNumber)
    }

    /// Signed distance from this sequence number to another
    ///
    /// Positive values mean `other` is ahead of `self`.
    pub fn distance_to(self, other: SeqNumber) -> i64 {
        other.0 as i64 - self.0 as i64
    }
}

impl fmt::Debug for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNumber({})", self.0)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SeqNumber {
    fn from(value: u32) -> Self {
        SeqNumber::new_unchecked(value)
    }
}

impl From<SeqNumber> for u32 {
    fn from(seq: SeqNumber) -> u32 {
        seq.0
    }
}

impl Add<u32> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: u32) -> SeqNumber {
        SeqNumber(self.0.saturating_add(rhs))
    }
}

impl AddAssign<u32> for SeqNumber {
    fn add_assign(&mut self, rhs: u32) {
        self.0 = self.0.saturating_add(rhs);
    }
}

impl Sub for SeqNumber {
    type Output = i64;

    /// Calculate the signed distance between two sequence numbers
    fn sub(self, rhs: SeqNumber) -> i64 {
        rhs.distance_to(self)
    }
}
