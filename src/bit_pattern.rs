//! Per-channel boolean bitmaps (hit and trigger patterns).
//!
//! Bits live in 32-bit words, bit 0 of word 0 being channel 0. On disk a
//! pattern is its capacity-sized word array, little-endian.

use crate::error::{Diagnostic, Result};
use crate::wire::{ByteReader, WriteLeExt};

/// Growable channel bitmap addressed `0..capacity`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BitPattern {
    capacity: usize,
    words: Vec<u32>,
}

fn words_for(bits: usize) -> usize {
    bits.div_ceil(32)
}

impl BitPattern {
    /// Empty pattern with `capacity` cleared bits.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            words: vec![0; words_for(capacity)],
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Grow to `capacity` bits. Existing bits are kept; shrinking is a no-op.
    pub fn resize_capacity(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }
        self.words.resize(words_for(capacity), 0);
        self.capacity = capacity;
    }

    #[track_caller]
    pub fn get_bit(&self, index: usize) -> Result<bool> {
        Diagnostic::check_index("bit", index, self.capacity)?;
        Ok(self.words[index >> 5] & (1 << (index & 31)) != 0)
    }

    #[track_caller]
    pub fn set_bit(&mut self, index: usize, value: bool) -> Result<()> {
        Diagnostic::check_index("bit", index, self.capacity)?;
        let mask = 1u32 << (index & 31);
        if value {
            self.words[index >> 5] |= mask;
        } else {
            self.words[index >> 5] &= !mask;
        }
        Ok(())
    }

    /// Number of set bits.
    #[must_use]
    pub fn count_ones(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Number of set bits strictly below `index`.
    #[must_use]
    pub fn rank(&self, index: usize) -> usize {
        let index = index.min(self.capacity);
        let full = index >> 5;
        let mut n: usize = self.words[..full].iter().map(|w| w.count_ones() as usize).sum();
        let rem = index & 31;
        if rem != 0 {
            n += (self.words[full] & ((1u32 << rem) - 1)).count_ones() as usize;
        }
        n
    }

    /// Index of the `n`-th set bit (0-based), if there are that many.
    #[must_use]
    pub fn select(&self, mut n: usize) -> Option<usize> {
        for (w, &word) in self.words.iter().enumerate() {
            let ones = word.count_ones() as usize;
            if n < ones {
                let mut word = word;
                for _ in 0..n {
                    word &= word - 1;
                }
                return Some(w * 32 + word.trailing_zeros() as usize);
            }
            n -= ones;
        }
        None
    }

    /// Set bit indices in ascending order.
    pub fn iter_ones(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(w, &word)| {
            let mut word = word;
            std::iter::from_fn(move || {
                if word == 0 {
                    return None;
                }
                let bit = word.trailing_zeros() as usize;
                word &= word - 1;
                Some(w * 32 + bit)
            })
        })
    }

    /// True if any bit in `range` is set.
    #[must_use]
    pub fn any_in(&self, range: std::ops::Range<usize>) -> bool {
        let end = range.end.min(self.capacity);
        range.start < end && self.rank(end) > self.rank(range.start)
    }

    #[must_use]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Encoded size in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.words.len() * 4
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        for &w in &self.words {
            out.put_u32_le(w);
        }
    }

    /// Decode a pattern of `capacity` bits. Set bits past the capacity are
    /// corruption.
    pub(crate) fn decode(r: &mut ByteReader<'_>, capacity: usize) -> Result<Self> {
        let mut words = Vec::with_capacity(words_for(capacity));
        for _ in 0..words_for(capacity) {
            words.push(r.u32_le()?);
        }
        let rem = capacity & 31;
        if rem != 0 {
            if let Some(last) = words.last() {
                if last >> rem != 0 {
                    return Err(Diagnostic::corruption(format!(
                        "bit pattern has bits set beyond capacity {capacity}"
                    )));
                }
            }
        }
        Ok(Self { capacity, words })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::ErrorKind;

    #[test]
    fn untouched_bits_default_false() {
        let mut p = BitPattern::new(499);
        p.set_bit(3, true).unwrap();
        p.set_bit(498, true).unwrap();
        assert!(p.get_bit(3).unwrap());
        assert!(p.get_bit(498).unwrap());
        assert!(!p.get_bit(4).unwrap());
        assert_eq!(p.count_ones(), 2);
    }

    #[test]
    fn out_of_range_access_fails() {
        let mut p = BitPattern::new(10);
        assert_eq!(p.get_bit(10).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
        assert_eq!(
            p.set_bit(64, true).unwrap_err().kind(),
            ErrorKind::IndexOutOfBounds
        );
    }

    #[test]
    fn resize_is_additive() {
        let mut p = BitPattern::new(33);
        p.set_bit(32, true).unwrap();
        p.resize_capacity(100);
        assert_eq!(p.capacity(), 100);
        assert!(p.get_bit(32).unwrap());
        assert!(!p.get_bit(99).unwrap());
        p.resize_capacity(5);
        assert_eq!(p.capacity(), 100);
        assert!(p.get_bit(32).unwrap());
    }

    #[test]
    fn rank_and_select_agree() {
        let mut p = BitPattern::new(70);
        for i in [0, 5, 31, 32, 64, 69] {
            p.set_bit(i, true).unwrap();
        }
        assert_eq!(p.rank(0), 0);
        assert_eq!(p.rank(32), 3);
        assert_eq!(p.rank(70), 6);
        assert_eq!(p.select(3), Some(32));
        assert_eq!(p.select(6), None);
        assert_eq!(p.iter_ones().collect::<Vec<_>>(), vec![0, 5, 31, 32, 64, 69]);
        assert!(p.any_in(60..65));
        assert!(!p.any_in(6..31));
    }

    #[test]
    fn decode_rejects_bits_past_capacity() {
        let mut buf = Vec::new();
        buf.put_u32_le(1 << 12);
        let mut r = ByteReader::new(&buf, "pattern");
        let err = BitPattern::decode(&mut r, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
    }

    proptest! {
        #[test]
        fn set_bits_read_back(cap in 1usize..600, bits in proptest::collection::vec(0usize..600, 0..64)) {
            let mut p = BitPattern::new(cap);
            let mut expected = vec![false; cap];
            for b in bits.into_iter().filter(|&b| b < cap) {
                p.set_bit(b, true).unwrap();
                expected[b] = true;
            }
            for (i, &e) in expected.iter().enumerate() {
                prop_assert_eq!(p.get_bit(i).unwrap(), e);
            }
            prop_assert_eq!(p.count_ones(), expected.iter().filter(|&&e| e).count());

            let mut buf = Vec::new();
            p.encode_into(&mut buf);
            let mut r = ByteReader::new(&buf, "pattern");
            prop_assert_eq!(BitPattern::decode(&mut r, cap).unwrap(), p);
        }
    }
}
