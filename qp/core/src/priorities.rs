//! Priority sets
//!
//! [`QPSet`] holds priorities `1..=64` in two 32-bit groups. Finding the
//! highest member narrows the word by halves and finishes with a 16-entry
//! nibble table, so the cost does not depend on how many priorities are set.

use core::fmt;

/// Largest priority a [`QPSet`] can hold
pub const QPSET_MAX: u8 = 64;

/// 1-based index of the most significant bit of a nibble
const LOG2_LKUP: [u8; 16] = [0, 1, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4];

/// 1-based position of the most significant set bit, 0 when `x == 0`
pub const fn log2(x: u32) -> u8 {
    let mut x = x;
    let mut n = 0u8;
    if x >= 1 << 16 {
        n += 16;
        x >>= 16;
    }
    if x >= 1 << 8 {
        n += 8;
        x >>= 8;
    }
    if x >= 1 << 4 {
        n += 4;
        x >>= 4;
    }
    n + LOG2_LKUP[x as usize]
}

/// Set of priorities `1..=64`
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct QPSet {
    bits: [u32; 2],
}

impl QPSet {
    /// The empty set
    pub const EMPTY: Self = Self { bits: [0; 2] };

    pub const fn new() -> Self {
        Self::EMPTY
    }

    const fn slot(prio: u8) -> (usize, u32) {
        let n = (prio - 1) as usize;
        (n >> 5, 1u32 << (n & 31))
    }

    pub fn insert(&mut self, prio: u8) {
        debug_assert!((1..=QPSET_MAX).contains(&prio), "priority {prio} out of range");
        let (word, bit) = Self::slot(prio);
        self.bits[word] |= bit;
    }

    pub fn remove(&mut self, prio: u8) {
        debug_assert!((1..=QPSET_MAX).contains(&prio), "priority {prio} out of range");
        let (word, bit) = Self::slot(prio);
        self.bits[word] &= !bit;
    }

    pub fn contains(&self, prio: u8) -> bool {
        if prio == 0 || prio > QPSET_MAX {
            return false;
        }
        let (word, bit) = Self::slot(prio);
        self.bits[word] & bit != 0
    }

    pub const fn is_empty(&self) -> bool {
        self.bits[0] == 0 && self.bits[1] == 0
    }

    /// Highest priority in the set
    pub fn find_max(&self) -> Option<u8> {
        if self.bits[1] != 0 {
            Some(32 + log2(self.bits[1]))
        } else if self.bits[0] != 0 {
            Some(log2(self.bits[0]))
        } else {
            None
        }
    }

    /// Members from highest to lowest priority
    pub fn iter(&self) -> QPSetIter {
        QPSetIter { set: *self }
    }

    pub fn clear(&mut self) {
        self.bits = [0; 2];
    }
}

/// Iterator over a [`QPSet`], highest priority first
pub struct QPSetIter {
    set: QPSet,
}

impl Iterator for QPSetIter {
    type Item = u8;

    fn next(&mut self) -> Option<u8> {
        let prio = self.set.find_max()?;
        self.set.remove(prio);
        Some(prio)
    }
}

impl fmt::Display for QPSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QPSet({:#010x}_{:08x})", self.bits[1], self.bits[0])
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for QPSet {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "QPSet({=u32:x}_{=u32:x})", self.bits[1], self.bits[0]);
    }
}
