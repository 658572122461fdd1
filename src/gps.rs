//! BCD GPS time decoding for the 5-word event time field.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Decoded GPS clock reading.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GpsTime {
    pub status: u8,
    /// Day of year.
    pub days: u16,
    pub hours: u8,
    pub minutes: u8,
    /// Seconds with 100 ns resolution.
    pub seconds: f64,
}

fn nibble(word: u16, shift: u32) -> u16 {
    (word >> shift) & 0xF
}

impl GpsTime {
    /// Decode the five 16-bit GPS words stored on an event record.
    #[must_use]
    pub fn decode(words: &[u16; 5]) -> Self {
        let [w0, w1, w2, w3, w4] = *words;
        let fraction = [
            nibble(w3, 12),
            nibble(w3, 8),
            nibble(w3, 4),
            nibble(w3, 0),
            nibble(w4, 12),
            nibble(w4, 8),
            nibble(w4, 4),
        ]
        .iter()
        .zip(1..)
        .map(|(&d, exp)| f64::from(d) * 10f64.powi(-exp))
        .sum::<f64>();

        Self {
            status: nibble(w0, 4) as u8,
            days: 100 * nibble(w0, 0) + 10 * nibble(w1, 12) + nibble(w1, 8),
            hours: (10 * nibble(w1, 4) + nibble(w1, 0)) as u8,
            minutes: (10 * nibble(w2, 12) + nibble(w2, 8)) as u8,
            seconds: f64::from(10 * nibble(w2, 4) + nibble(w2, 0)) + fraction,
        }
    }

    /// Decode the three raw 32-bit words as delivered by the DAQ.
    #[must_use]
    pub fn decode_raw(word0: u32, word1: u32, word2: u32) -> Self {
        Self::decode(&[
            word0 as u16,
            (word0 >> 16) as u16,
            word1 as u16,
            (word1 >> 16) as u16,
            word2 as u16,
        ])
    }
}

impl fmt::Display for GpsTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stat={} {} Days {}:{}:{:.7}",
            self.status, self.days, self.hours, self.minutes, self.seconds
        )
    }
}
