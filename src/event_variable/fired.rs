use std::fmt;

use super::{FLAG_WORDS, MAX_NUMBER_OF_EVENTS_PER_LISTENER};

/// Set of slot indices that fired during one wake-up.
///
/// Fixed-size bitset; iteration yields indices in ascending order.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct FiredIndices {
    words: [u64; FLAG_WORDS],
}

impl FiredIndices {
    pub(crate) const fn from_words(words: [u64; FLAG_WORDS]) -> Self {
        Self { words }
    }

    /// Add `index` to the set. Out-of-range indices are ignored.
    pub fn insert(&mut self, index: usize) {
        if index < MAX_NUMBER_OF_EVENTS_PER_LISTENER {
            self.words[index / 64] |= 1 << (index % 64);
        }
    }

    /// Returns true if `index` fired.
    #[must_use]
    pub const fn contains(&self, index: usize) -> bool {
        index < MAX_NUMBER_OF_EVENTS_PER_LISTENER && self.words[index / 64] & (1 << (index % 64)) != 0
    }

    /// Returns true if nothing fired.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of fired indices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Ascending iterator over the fired indices.
    #[must_use]
    pub const fn iter(&self) -> FiredIter {
        FiredIter {
            words: self.words,
            word: 0,
        }
    }
}

impl fmt::Debug for FiredIndices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl IntoIterator for FiredIndices {
    type Item = usize;
    type IntoIter = FiredIter;

    fn into_iter(self) -> FiredIter {
        self.iter()
    }
}

impl IntoIterator for &FiredIndices {
    type Item = usize;
    type IntoIter = FiredIter;

    fn into_iter(self) -> FiredIter {
        self.iter()
    }
}

/// Iterator over [`FiredIndices`].
#[derive(Debug, Clone)]
pub struct FiredIter {
    words: [u64; FLAG_WORDS],
    word: usize,
}

impl Iterator for FiredIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        while self.word < FLAG_WORDS {
            let bits = self.words[self.word];
            if bits != 0 {
                let bit = bits.trailing_zeros() as usize;
                // clear lowest set bit
                self.words[self.word] = bits & (bits - 1);
                return Some(self.word * 64 + bit);
            }
            self.word += 1;
        }
        None
    }
}
