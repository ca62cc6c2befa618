// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! ChangeSet: growable bit container backed by `u64` words.
//!
//! Records which fields of a structured value changed so an update can carry
//! a delta instead of a full re-encode. Encoders walk [`ChangeSet::iter`] in
//! ascending field order.
//!
//! Bits at or beyond `len()` are always zero, including after a shrink, so
//! iteration and [`ChangeSet::find_next_set`] never report stale fields.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use std::iter::FusedIterator;
use std::ops::BitOrAssign;

use crate::error::{PvError, Result};
use crate::fmt::{Describe, IndentWriter};
use crate::instance::CHANGE_SETS;

const WORD_BITS: usize = 64;

/// Set of changed field indices
#[derive(PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "RawChangeSet", try_from = "RawChangeSet")]
pub struct ChangeSet {
    words: SmallVec<[u64; 1]>,
    len: usize,
}

impl ChangeSet {
    /// Create a change set of `len` bits, all clear
    pub fn new(len: usize) -> Self {
        CHANGE_SETS.acquire();
        Self {
            words: SmallVec::from_elem(0, len.div_ceil(WORD_BITS)),
            len,
        }
    }

    /// Create a change set with exactly `indices` set.
    ///
    /// The length is `min_len` widened to cover the largest index.
    pub fn from_indices<I>(indices: I, min_len: usize) -> Self
    where
        I: IntoIterator<Item = usize>,
    {
        let mut set = Self::new(min_len);
        for index in indices {
            if index >= set.len {
                set.resize(index + 1);
            }
            set.words[index / WORD_BITS] |= 1 << (index % WORD_BITS);
        }
        set
    }

    /// Number of valid bit positions
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the change set has no bit positions at all
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Backing words, lowest index in the lowest bit of word 0
    #[inline]
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Grow or shrink to `new_len` bits.
    ///
    /// New bits are clear. Bits dropped by a shrink are cleared too, so they
    /// stay clear if the set later grows again.
    pub fn resize(&mut self, new_len: usize) {
        self.words.resize(new_len.div_ceil(WORD_BITS), 0);
        if new_len < self.len {
            let tail = new_len % WORD_BITS;
            if tail != 0 {
                if let Some(last) = self.words.last_mut() {
                    *last &= (1u64 << tail) - 1;
                }
            }
        }
        self.len = new_len;
    }

    /// Read bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    #[track_caller]
    pub fn get(&self, index: usize) -> bool {
        match self.try_get(index) {
            Ok(value) => value,
            Err(err) => panic!("{err}"),
        }
    }

    /// Write bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`.
    #[track_caller]
    pub fn set(&mut self, index: usize, value: bool) {
        if let Err(err) = self.try_set(index, value) {
            panic!("{err}");
        }
    }

    pub fn try_get(&self, index: usize) -> Result<bool> {
        self.check(index)?;
        Ok(self.words[index / WORD_BITS] & (1 << (index % WORD_BITS)) != 0)
    }

    pub fn try_set(&mut self, index: usize, value: bool) -> Result<()> {
        self.check(index)?;
        let mask = 1u64 << (index % WORD_BITS);
        let word = &mut self.words[index / WORD_BITS];
        if value {
            *word |= mask;
        } else {
            *word &= !mask;
        }
        Ok(())
    }

    #[inline]
    fn check(&self, index: usize) -> Result<()> {
        if index < self.len {
            Ok(())
        } else {
            Err(PvError::IndexOutOfBounds {
                index,
                len: self.len,
            })
        }
    }

    /// Smallest set index in `[start, len())`, or `len()` if there is none.
    pub fn find_next_set(&self, mut start: usize) -> usize {
        while start < self.len {
            let word = start / WORD_BITS;
            let bit = start % WORD_BITS;

            // Skip whole words with nothing at or above `bit`
            let masked = self.words[word] & (u64::MAX << bit);
            if masked == 0 {
                start = (word + 1) * WORD_BITS;
                continue;
            }

            let lowest = masked & masked.wrapping_neg();
            let found = word * WORD_BITS + lowest_bit_position(lowest) as usize;
            debug_assert!(found < self.len);
            return found;
        }
        self.len
    }

    /// Iterate set indices in ascending order
    pub fn iter(&self) -> SetBits<'_> {
        SetBits { set: self, next: 0 }
    }

    /// Number of set bits
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// True if any bit is set
    pub fn any(&self) -> bool {
        self.words.iter().any(|&w| w != 0)
    }

    /// Clear every bit, keeping the length
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// Merge `other` into `self`, widening to the longer of the two.
    ///
    /// Coalesces two successive deltas of the same value.
    pub fn union_with(&mut self, other: &ChangeSet) {
        if other.len > self.len {
            self.resize(other.len);
        }
        for (dst, src) in self.words.iter_mut().zip(other.words.iter()) {
            *dst |= *src;
        }
    }

    /// Returns true if this set shares any set bits with `other`.
    pub fn intersects(&self, other: &ChangeSet) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(a, b)| a & b != 0)
    }

    /// Move the contents out, leaving an empty change set of length 0
    pub fn take(&mut self) -> ChangeSet {
        std::mem::take(self)
    }
}

/// Position of the single set bit in `isolated`.
///
/// Fixed-depth binary search over 32/16/8/4/2/1-bit halves.
#[inline]
fn lowest_bit_position(isolated: u64) -> u32 {
    debug_assert_eq!(isolated.count_ones(), 1);
    let mut bit = 63;
    if isolated & 0x0000_0000_ffff_ffff != 0 {
        bit -= 32;
    }
    if isolated & 0x0000_ffff_0000_ffff != 0 {
        bit -= 16;
    }
    if isolated & 0x00ff_00ff_00ff_00ff != 0 {
        bit -= 8;
    }
    if isolated & 0x0f0f_0f0f_0f0f_0f0f != 0 {
        bit -= 4;
    }
    if isolated & 0x3333_3333_3333_3333 != 0 {
        bit -= 2;
    }
    if isolated & 0x5555_5555_5555_5555 != 0 {
        bit -= 1;
    }
    bit
}

impl Default for ChangeSet {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Clone for ChangeSet {
    fn clone(&self) -> Self {
        CHANGE_SETS.acquire();
        Self {
            words: self.words.clone(),
            len: self.len,
        }
    }
}

impl Drop for ChangeSet {
    fn drop(&mut self) {
        CHANGE_SETS.release();
    }
}

impl FromIterator<usize> for ChangeSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self::from_indices(iter, 0)
    }
}

impl BitOrAssign<&ChangeSet> for ChangeSet {
    fn bitor_assign(&mut self, rhs: &ChangeSet) {
        self.union_with(rhs);
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = usize;
    type IntoIter = SetBits<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over set indices, see [`ChangeSet::iter`]
#[derive(Clone)]
pub struct SetBits<'a> {
    set: &'a ChangeSet,
    next: usize,
}

impl Iterator for SetBits<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        let found = self.set.find_next_set(self.next);
        if found >= self.set.len {
            self.next = self.set.len;
            return None;
        }
        self.next = found + 1;
        Some(found)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.set.len.saturating_sub(self.next)))
    }
}

impl FusedIterator for SetBits<'_> {}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (n, index) in self.iter().enumerate() {
            if n > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{index}")?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeSet")
            .field("len", &self.len)
            .field("set", &format_args!("{self}"))
            .finish()
    }
}

impl Describe for ChangeSet {
    fn describe<W: fmt::Write>(&self, out: &mut IndentWriter<W>) -> fmt::Result {
        use std::fmt::Write;

        if out.level() == 0 {
            return writeln!(out, "{self}");
        }
        writeln!(out, "ChangeSet len={} set={self}", self.len)?;
        let mut words = out.indent();
        for (i, word) in self.words.iter().enumerate() {
            writeln!(words, "word[{i}] = {word:#018x}")?;
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct RawChangeSet {
    len: usize,
    set: Vec<usize>,
}

impl From<ChangeSet> for RawChangeSet {
    fn from(set: ChangeSet) -> Self {
        RawChangeSet {
            len: set.len,
            set: set.iter().collect(),
        }
    }
}

impl TryFrom<RawChangeSet> for ChangeSet {
    type Error = PvError;

    fn try_from(raw: RawChangeSet) -> Result<Self> {
        if let Some(&bad) = raw.set.iter().find(|&&index| index >= raw.len) {
            return Err(PvError::InvalidChangeSet(format!(
                "index {bad} outside length {}",
                raw.len
            )));
        }
        Ok(ChangeSet::from_indices(raw.set, raw.len))
    }
}
