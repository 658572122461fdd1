//! One telescope's event: hit/trigger patterns, zero-suppressed channel data,
//! clock-trigger boards and GPS fields.
//!
//! The channel store always holds exactly one entry per set hit bit, in
//! ascending channel order. Channel accessors take the dense hit index
//! (`0..num_channels()`); use [`EventRecord::hit_channel_id`] and
//! [`EventRecord::channel_hit_index`] to move between hit index and physical
//! channel.

use crate::bit_pattern::BitPattern;
use crate::channel_data::{ChannelDataStore, CHANNEL_SCALAR_LEN};
use crate::error::{Diagnostic, Result, ResultExt};
use crate::wire::{ByteReader, WriteLeExt};

/// Words per clock-trigger board record.
pub const CLOCK_TRIG_WORDS: usize = 7;

/// Number of 16-bit GPS time words.
pub const GPS_TIME_WORDS: usize = 5;

/// Flags bit marking a compressed channel section.
pub const FLAG_COMPRESSED: u16 = 1;

/// Fixed part of a serialized event: event number, node, GPS words, GPS year,
/// event type, flags, max channels, samples, clock boards.
const FIXED_LEN: usize = 4 + 1 + 2 * GPS_TIME_WORDS + 1 + 1 + 2 + 2 + 2 + 2;

/// One clock-trigger board.
pub type ClockTrigBoard = [u32; CLOCK_TRIG_WORDS];

/// A telescope event record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventRecord {
    event_number: u32,
    node_number: u8,
    gps_time: [u16; GPS_TIME_WORDS],
    gps_year: u8,
    event_type: u8,
    flags: u16,
    hit_pattern: BitPattern,
    trigger_pattern: BitPattern,
    channels: ChannelDataStore,
    clock_trig: Vec<ClockTrigBoard>,
}

impl EventRecord {
    /// Empty event: no samples, no channels, no channel bits, no clock boards.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Same as [`EventRecord::new`] followed by the three resize calls.
    #[must_use]
    pub fn with_sizes(
        num_samples: usize,
        num_channels: usize,
        max_num_channels: usize,
        num_clock_trig_boards: usize,
    ) -> Self {
        let mut ev = Self::new();
        ev.resize_channel_data(num_samples, num_channels);
        ev.resize_channel_bits(max_num_channels);
        ev.resize_clock_trig_data(num_clock_trig_boards);
        ev
    }

    pub fn event_number(&self) -> u32 {
        self.event_number
    }

    pub fn set_event_number(&mut self, value: u32) {
        self.event_number = value;
    }

    /// 0-based telescope number.
    pub fn node_number(&self) -> u8 {
        self.node_number
    }

    pub fn set_node_number(&mut self, value: u8) {
        self.node_number = value;
    }

    pub fn gps_time(&self) -> &[u16; GPS_TIME_WORDS] {
        &self.gps_time
    }

    pub fn gps_time_mut(&mut self) -> &mut [u16; GPS_TIME_WORDS] {
        &mut self.gps_time
    }

    /// Years since 2000.
    pub fn gps_year(&self) -> u8 {
        self.gps_year
    }

    pub fn set_gps_year(&mut self, value: u8) {
        self.gps_year = value;
    }

    pub fn event_type_code(&self) -> u8 {
        self.event_type
    }

    pub fn set_event_type_code(&mut self, value: u8) {
        self.event_type = value;
    }

    pub fn flags(&self) -> u16 {
        self.flags
    }

    pub fn set_flags(&mut self, flags: u16) {
        self.flags = flags;
    }

    pub fn compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    pub fn set_compressed(&mut self, value: bool) {
        if value {
            self.flags |= FLAG_COMPRESSED;
        } else {
            self.flags &= !FLAG_COMPRESSED;
        }
    }

    /// Compression only applies when there are samples to compress.
    pub fn will_use_compression(&self) -> bool {
        self.compressed() && self.num_samples() != 0
    }

    pub fn num_samples(&self) -> usize {
        self.channels.num_samples()
    }

    /// Number of stored channels; always the hit pattern's popcount.
    pub fn num_channels(&self) -> usize {
        self.channels.num_channels()
    }

    pub fn max_num_channels(&self) -> usize {
        self.hit_pattern.capacity()
    }

    pub fn num_clock_trig_boards(&self) -> usize {
        self.clock_trig.len()
    }

    /// Grow the sample count and reserve room for `num_channels` channels.
    /// Channels become addressable as hit bits are set.
    pub fn resize_channel_data(&mut self, num_samples: usize, num_channels: usize) {
        self.channels.resize(num_samples, 0);
        self.channels.reserve_channels(num_channels);
    }

    /// Grow hit and trigger patterns to `max_num_channels` bits.
    pub fn resize_channel_bits(&mut self, max_num_channels: usize) {
        self.hit_pattern.resize_capacity(max_num_channels);
        self.trigger_pattern.resize_capacity(max_num_channels);
    }

    /// Grow the clock-trigger board list; new boards are zero.
    pub fn resize_clock_trig_data(&mut self, num_boards: usize) {
        if num_boards > self.clock_trig.len() {
            self.clock_trig.resize(num_boards, [0; CLOCK_TRIG_WORDS]);
        }
    }

    pub fn hit_pattern(&self) -> &BitPattern {
        &self.hit_pattern
    }

    pub fn trigger_pattern(&self) -> &BitPattern {
        &self.trigger_pattern
    }

    #[track_caller]
    pub fn hit_bit(&self, channel: usize) -> Result<bool> {
        self.hit_pattern.get_bit(channel)
    }

    /// Setting a hit bit inserts a zeroed channel at its rank; clearing one
    /// drops that channel's data.
    #[track_caller]
    pub fn set_hit_bit(&mut self, channel: usize, value: bool) -> Result<()> {
        let was = self.hit_pattern.get_bit(channel)?;
        if was == value {
            return Ok(());
        }
        let rank = self.hit_pattern.rank(channel);
        self.hit_pattern.set_bit(channel, value)?;
        if value {
            self.channels.insert_channel(rank);
        } else {
            self.channels.remove_channel(rank);
        }
        Ok(())
    }

    #[track_caller]
    pub fn trigger_bit(&self, channel: usize) -> Result<bool> {
        self.trigger_pattern.get_bit(channel)
    }

    #[track_caller]
    pub fn set_trigger_bit(&mut self, channel: usize, value: bool) -> Result<()> {
        self.trigger_pattern.set_bit(channel, value)
    }

    /// Physical channel of the `i`-th stored channel.
    #[track_caller]
    pub fn hit_channel_id(&self, i: usize) -> Result<usize> {
        self.hit_pattern
            .select(i)
            .ok_or_else(|| Diagnostic::index_out_of_bounds(format!(
                "hit index {i} out of range (size {})",
                self.num_channels()
            )))
    }

    /// Dense hit index of physical `channel`, or `None` if it was suppressed.
    pub fn channel_hit_index(&self, channel: usize) -> Option<usize> {
        match self.hit_pattern.get_bit(channel) {
            Ok(true) => Some(self.hit_pattern.rank(channel)),
            _ => None,
        }
    }

    /// Physical channels with stored data, ascending.
    pub fn hit_channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.hit_pattern.iter_ones()
    }

    /// Physical channels that took part in the local trigger, ascending.
    pub fn triggered_channels(&self) -> impl Iterator<Item = usize> + '_ {
        self.trigger_pattern.iter_ones()
    }

    /// 8-bit trigger summary: bit k is set when any channel of the k-th of
    /// eight equal channel groups has its trigger bit set.
    pub fn trigger_mask(&self) -> u8 {
        let max = self.max_num_channels();
        if max == 0 {
            return 0;
        }
        let group = max.div_ceil(8);
        (0..8).fold(0u8, |mask, k| {
            if self.trigger_pattern.any_in(k * group..(k + 1) * group) {
                mask | (1 << k)
            } else {
                mask
            }
        })
    }

    pub fn channel_data(&self) -> &ChannelDataStore {
        &self.channels
    }

    #[track_caller]
    pub fn sample(&self, channel: usize, sample: usize) -> Result<u8> {
        self.channels.sample(channel, sample)
    }

    #[track_caller]
    pub fn set_sample(&mut self, channel: usize, sample: usize, value: u8) -> Result<()> {
        self.channels.set_sample(channel, sample, value)
    }

    #[track_caller]
    pub fn samples(&self, channel: usize) -> Result<&[u8]> {
        self.channels.samples(channel)
    }

    #[track_caller]
    pub fn samples_mut(&mut self, channel: usize) -> Result<&mut [u8]> {
        self.channels.samples_mut(channel)
    }

    #[track_caller]
    pub fn charge(&self, channel: usize) -> Result<u16> {
        self.channels.charge(channel)
    }

    #[track_caller]
    pub fn set_charge(&mut self, channel: usize, value: u16) -> Result<()> {
        self.channels.set_charge(channel, value)
    }

    #[track_caller]
    pub fn pedestal(&self, channel: usize) -> Result<u16> {
        self.channels.pedestal(channel)
    }

    #[track_caller]
    pub fn set_pedestal(&mut self, channel: usize, value: u16) -> Result<()> {
        self.channels.set_pedestal(channel, value)
    }

    #[track_caller]
    pub fn hi_lo(&self, channel: usize) -> Result<bool> {
        self.channels.hi_lo(channel)
    }

    #[track_caller]
    pub fn set_hi_lo(&mut self, channel: usize, value: bool) -> Result<()> {
        self.channels.set_hi_lo(channel, value)
    }

    #[track_caller]
    pub fn clock_trig_data(&self, board: usize) -> Result<&ClockTrigBoard> {
        Diagnostic::check_index("clock trigger board", board, self.clock_trig.len())?;
        Ok(&self.clock_trig[board])
    }

    #[track_caller]
    pub fn clock_trig_data_mut(&mut self, board: usize) -> Result<&mut ClockTrigBoard> {
        Diagnostic::check_index("clock trigger board", board, self.clock_trig.len())?;
        Ok(&mut self.clock_trig[board])
    }

    /// Serialized length in bytes under the current compression flag.
    pub fn size(&self) -> Result<usize> {
        Ok(FIXED_LEN
            + 2 * self.hit_pattern.encoded_len()
            + self.channel_section()?.len()
            + self.clock_trig.len() * CLOCK_TRIG_WORDS * 4)
    }

    fn channel_section(&self) -> Result<Vec<u8>> {
        let mut raw = Vec::new();
        self.channels.encode_into(&mut raw);
        if !self.will_use_compression() {
            return Ok(raw);
        }
        let compressed = lz4_flex::block::compress(&raw);
        let mut out = Vec::with_capacity(8 + compressed.len());
        out.put_u32_le(u32::try_from(raw.len()).map_err(|_| {
            Diagnostic::usage(format!("channel section of {} bytes is too large", raw.len()))
        })?);
        out.put_u32_le(compressed.len() as u32);
        out.put_bytes(&compressed);
        Ok(out)
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        let max = u16::try_from(self.max_num_channels())
            .map_err(|_| Diagnostic::usage("max_num_channels exceeds 65535"))?;
        let samples = u16::try_from(self.num_samples())
            .map_err(|_| Diagnostic::usage("num_samples exceeds 65535"))?;
        let boards = u16::try_from(self.clock_trig.len())
            .map_err(|_| Diagnostic::usage("too many clock trigger boards"))?;
        out.put_u32_le(self.event_number);
        out.put_u8(self.node_number);
        for &w in &self.gps_time {
            out.put_u16_le(w);
        }
        out.put_u8(self.gps_year);
        out.put_u8(self.event_type);
        out.put_u16_le(self.flags);
        out.put_u16_le(max);
        out.put_u16_le(samples);
        out.put_u16_le(boards);
        self.hit_pattern.encode_into(out);
        self.trigger_pattern.encode_into(out);
        out.put_bytes(&self.channel_section()?);
        for board in &self.clock_trig {
            for &w in board {
                out.put_u32_le(w);
            }
        }
        Ok(())
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let event_number = r.u32_le()?;
        let node_number = r.u8()?;
        let mut gps_time = [0u16; GPS_TIME_WORDS];
        for w in &mut gps_time {
            *w = r.u16_le()?;
        }
        let gps_year = r.u8()?;
        let event_type = r.u8()?;
        let flags = r.u16_le()?;
        let max = usize::from(r.u16_le()?);
        let num_samples = usize::from(r.u16_le()?);
        let boards = usize::from(r.u16_le()?);
        let hit_pattern = BitPattern::decode(r, max)?;
        let trigger_pattern = BitPattern::decode(r, max)?;
        let num_channels = hit_pattern.count_ones();

        let compressed = flags & FLAG_COMPRESSED != 0 && num_samples != 0;
        let channels = if compressed {
            let raw_len = r.u32_le()? as usize;
            let comp_len = r.u32_le()? as usize;
            let expected = num_channels * (CHANNEL_SCALAR_LEN + num_samples);
            // An LZ4 block cannot expand by more than 255x.
            if raw_len != expected || raw_len > comp_len.saturating_mul(255) + 16 {
                return Err(Diagnostic::corruption(format!(
                    "compressed channel data claims {raw_len} bytes, expected {expected}"
                )));
            }
            let raw = lz4_flex::block::decompress(r.take(comp_len)?, raw_len).map_err(|e| {
                Diagnostic::corruption(format!("channel data decompression failed: {e}"))
            })?;
            if raw.len() != raw_len {
                return Err(Diagnostic::corruption(format!(
                    "channel data decompressed to {} bytes, expected {raw_len}",
                    raw.len()
                )));
            }
            let mut inner = ByteReader::new(&raw, "compressed channel data");
            let channels = ChannelDataStore::decode(&mut inner, num_samples, num_channels)?;
            inner.finish()?;
            channels
        } else {
            ChannelDataStore::decode(r, num_samples, num_channels)?
        };

        let mut clock_trig = Vec::with_capacity(boards);
        for _ in 0..boards {
            clock_trig.push(r.u32_array::<CLOCK_TRIG_WORDS>()?);
        }

        Ok(Self {
            event_number,
            node_number,
            gps_time,
            gps_year,
            event_type,
            flags,
            hit_pattern,
            trigger_pattern,
            channels,
            clock_trig,
        })
    }

    /// Decode one length-delimited event record.
    pub(crate) fn decode_exact(buf: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(buf, "event record");
        let ev = Self::decode(&mut r)?;
        r.finish()
            .with_comment(|| format!("event {} node {}", ev.event_number, ev.node_number))?;
        Ok(ev)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    fn sample_event(compressed: bool) -> EventRecord {
        let mut ev = EventRecord::with_sizes(16, 4, 40, 2);
        ev.set_event_number(12);
        ev.set_node_number(3);
        *ev.gps_time_mut() = [1, 2, 3, 4, 5];
        ev.set_gps_year(24);
        ev.set_compressed(compressed);
        for ch in [1, 7, 33, 39] {
            ev.set_hit_bit(ch, true).unwrap();
        }
        ev.set_trigger_bit(7, true).unwrap();
        ev.set_trigger_bit(20, true).unwrap();
        for i in 0..ev.num_channels() {
            ev.set_charge(i, 100 + i as u16).unwrap();
            ev.set_pedestal(i, 20).unwrap();
            ev.set_hi_lo(i, i % 2 == 0).unwrap();
            for s in 0..ev.num_samples() {
                ev.set_sample(i, s, (i * 3 + s) as u8).unwrap();
            }
        }
        ev.clock_trig_data_mut(1).unwrap()[6] = 0xDEAD_BEEF;
        ev
    }

    #[test]
    fn hit_bits_drive_channel_count() {
        let mut ev = EventRecord::with_sizes(8, 10, 10, 0);
        assert_eq!(ev.num_channels(), 0);
        ev.set_hit_bit(4, true).unwrap();
        ev.set_hit_bit(2, true).unwrap();
        assert_eq!(ev.num_channels(), 2);
        ev.set_sample(1, 0, 44).unwrap();
        // channel 4 is the second stored channel; inserting 3 shifts it up.
        ev.set_hit_bit(3, true).unwrap();
        assert_eq!(ev.sample(2, 0).unwrap(), 44);
        assert_eq!(ev.channel_hit_index(4), Some(2));
        assert_eq!(ev.hit_channel_id(2).unwrap(), 4);
        ev.set_hit_bit(3, false).unwrap();
        assert_eq!(ev.num_channels(), ev.hit_pattern().count_ones());
        assert_eq!(ev.sample(1, 0).unwrap(), 44);
        assert_eq!(ev.channel_hit_index(3), None);
    }

    #[test]
    fn resizes_are_additive() {
        let mut ev = sample_event(false);
        let before = ev.clone();
        ev.resize_channel_bits(10);
        ev.resize_clock_trig_data(1);
        ev.resize_channel_data(2, 1);
        assert_eq!(ev, before);
        ev.resize_channel_bits(64);
        assert_eq!(ev.max_num_channels(), 64);
        assert!(ev.hit_bit(39).unwrap());
        assert!(!ev.hit_bit(63).unwrap());
        ev.resize_channel_data(20, 0);
        assert_eq!(ev.samples(0).unwrap()[..16], before.samples(0).unwrap()[..]);
        assert_eq!(ev.num_channels(), ev.hit_pattern().count_ones());
    }

    #[test]
    fn accessors_beyond_capacity_fail() {
        let ev = sample_event(false);
        assert_eq!(ev.hit_bit(40).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
        assert_eq!(ev.charge(4).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
        assert_eq!(ev.clock_trig_data(2).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
        assert_eq!(ev.hit_channel_id(4).unwrap_err().kind(), ErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn encode_decode_matches_size_for_both_flags() {
        for compressed in [false, true] {
            let ev = sample_event(compressed);
            let mut buf = Vec::new();
            ev.encode_into(&mut buf).unwrap();
            assert_eq!(buf.len(), ev.size().unwrap());
            let back = EventRecord::decode_exact(&buf).unwrap();
            assert_eq!(back, ev);
            assert_eq!(back.trigger_mask(), ev.trigger_mask());
        }
    }

    #[test]
    fn trigger_mask_groups_channels() {
        let ev = sample_event(false);
        // 40 channels -> groups of 5; channels 7 and 20 fall in groups 1 and 4.
        assert_eq!(ev.trigger_mask(), 0b0001_0010);
        assert_eq!(EventRecord::new().trigger_mask(), 0);
    }

    #[test]
    fn compression_needs_samples() {
        let mut ev = EventRecord::with_sizes(0, 0, 8, 0);
        ev.set_compressed(true);
        assert!(!ev.will_use_compression());
        ev.resize_channel_data(1, 0);
        assert!(ev.will_use_compression());
    }

    #[test]
    fn damaged_compressed_payload_is_corruption() {
        let ev = sample_event(true);
        let mut buf = Vec::new();
        ev.encode_into(&mut buf).unwrap();
        // Claim a larger decompressed length than the block holds.
        let section = FIXED_LEN + 2 * ev.hit_pattern().encoded_len();
        buf[section..section + 4].copy_from_slice(&10_000u32.to_le_bytes());
        let err = EventRecord::decode_exact(&buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corruption);
    }
}
