//! Set of telescope ids taking part in a run.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Diagnostic, Result};
use crate::wire::{ByteReader, WriteLeExt};

/// Telescope ids are `0..MAX_TELESCOPES`; id 255 is the array trigger node.
pub const MAX_TELESCOPES: usize = 255;

/// Width of the legacy DAQ integer mask.
pub const DAQ_MASK_TELESCOPES: usize = 32;

/// Encoded size of a mask in the file header.
pub const CONFIG_MASK_LEN: usize = 32;

/// Configuration mask over telescope ids.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConfigMask {
    words: [u32; 8],
}

impl ConfigMask {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a comma separated id list such as `"0,1,5"`.
    ///
    /// An empty string is the empty mask. Ids must be decimal, at most three
    /// digits and below 255.
    pub fn parse(s: &str) -> Result<Self> {
        let mut mask = Self::new();
        if s.is_empty() {
            return Ok(mask);
        }
        for item in s.split(',') {
            if item.is_empty() {
                return Err(Diagnostic::usage(format!(
                    "bad configuration mask {s:?}: empty telescope id"
                )));
            }
            if item.len() > 3 {
                return Err(Diagnostic::usage(format!(
                    "bad configuration mask {s:?}: telescope id {item:?} longer than 3 digits"
                )));
            }
            let id = item
                .parse::<usize>()
                .ok()
                .filter(|&id| id < MAX_TELESCOPES)
                .ok_or_else(|| {
                    Diagnostic::usage(format!(
                        "bad configuration mask {s:?}: {item:?} is not a telescope id"
                    ))
                })?;
            mask.insert(id);
        }
        Ok(mask)
    }

    /// Mask from the DAQ integer form, bit `k` being telescope `k`.
    #[must_use]
    pub fn from_daq_mask(mask: u32) -> Self {
        let mut out = Self::new();
        out.words[0] = mask;
        out
    }

    /// DAQ integer form; telescopes past the first 32 are dropped.
    #[must_use]
    pub fn to_daq_mask(&self) -> u32 {
        self.words[0]
    }

    #[must_use]
    pub fn contains(&self, id: usize) -> bool {
        id < MAX_TELESCOPES && self.words[id >> 5] & (1 << (id & 31)) != 0
    }

    /// Add `id`; ids outside `0..MAX_TELESCOPES` are ignored.
    pub fn insert(&mut self, id: usize) -> bool {
        if id >= MAX_TELESCOPES || self.contains(id) {
            return false;
        }
        self.words[id >> 5] |= 1 << (id & 31);
        true
    }

    pub fn remove(&mut self, id: usize) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.words[id >> 5] &= !(1 << (id & 31));
        true
    }

    #[must_use]
    pub fn cardinality(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cardinality() == 0
    }

    /// Ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_TELESCOPES).filter(move |&id| self.contains(id))
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        for &w in &self.words {
            out.put_u32_le(w);
        }
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let words: [u32; 8] = r.u32_array()?;
        if words[7] >> 31 != 0 {
            return Err(Diagnostic::corruption(
                "configuration mask has the array trigger bit set",
            ));
        }
        Ok(Self { words })
    }
}

impl FromIterator<usize> for ConfigMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut mask = Self::new();
        for id in iter {
            mask.insert(id);
        }
        mask
    }
}

impl FromStr for ConfigMask {
    type Err = Diagnostic;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ConfigMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("empty");
        }
        for (n, id) in self.iter().enumerate() {
            if n > 0 {
                f.write_str(",")?;
            }
            write!(f, "{id}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn parse_and_display() {
        let mask = ConfigMask::parse("0,1,5,254").unwrap();
        assert_eq!(mask.cardinality(), 4);
        assert!(mask.contains(254));
        assert!(!mask.contains(2));
        assert_eq!(mask.to_string(), "0,1,5,254");
        assert_eq!(ConfigMask::parse("").unwrap().to_string(), "empty");
    }

    #[test]
    fn parse_rejects_bad_ids() {
        for bad in ["1,,2", "1000", "255", "x", "1,"] {
            let err = ConfigMask::parse(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Usage, "{bad}");
        }
    }

    #[test]
    fn daq_mask_covers_first_telescopes() {
        let mask = ConfigMask::from_daq_mask(0b1011);
        assert_eq!(mask.iter().collect::<Vec<_>>(), vec![0, 1, 3]);
        let mut wide = mask;
        wide.insert(40);
        assert_eq!(wide.to_daq_mask(), 0b1011);
    }

    #[test]
    fn sentinel_id_is_never_a_member() {
        let mut mask = ConfigMask::new();
        assert!(!mask.insert(255));
        assert!(mask.is_empty());
    }
}
