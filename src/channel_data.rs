//! Per-channel waveform samples and scalar metrics.
//!
//! Samples are stored row-major (`channel * num_samples + sample`) in one
//! contiguous buffer. Growth never discards data: when the sample count grows
//! the rows are spread out in place, back to front.

use crate::error::{Diagnostic, Result};
use crate::wire::{ByteReader, WriteLeExt};

/// Bytes per channel on disk besides the samples: charge, pedestal, hi/lo.
pub(crate) const CHANNEL_SCALAR_LEN: usize = 2 + 2 + 1;

/// Variable-length channel data with additive growth.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelDataStore {
    num_samples: usize,
    samples: Vec<u8>,
    charges: Vec<u16>,
    pedestals: Vec<u16>,
    hi_lo: Vec<bool>,
}

impl ChannelDataStore {
    #[must_use]
    pub fn new(num_samples: usize, num_channels: usize) -> Self {
        let mut store = Self::default();
        store.resize(num_samples, num_channels);
        store
    }

    #[must_use]
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    #[must_use]
    pub fn num_channels(&self) -> usize {
        self.charges.len()
    }

    /// Grow to at least `num_samples` x `num_channels`. Never shrinks; new
    /// cells are zero.
    pub fn resize(&mut self, num_samples: usize, num_channels: usize) {
        self.grow_samples(num_samples);
        let channels = num_channels.max(self.num_channels());
        self.samples.resize(channels * self.num_samples, 0);
        self.charges.resize(channels, 0);
        self.pedestals.resize(channels, 0);
        self.hi_lo.resize(channels, false);
    }

    /// Reserve room for `num_channels` channels without making them addressable.
    pub fn reserve_channels(&mut self, num_channels: usize) {
        let extra = num_channels.saturating_sub(self.num_channels());
        self.samples.reserve(extra * self.num_samples);
        self.charges.reserve(extra);
        self.pedestals.reserve(extra);
        self.hi_lo.reserve(extra);
    }

    fn grow_samples(&mut self, num_samples: usize) {
        let old = self.num_samples;
        if num_samples <= old {
            return;
        }
        let channels = self.num_channels();
        self.samples.resize(channels * num_samples, 0);
        for ch in (0..channels).rev() {
            self.samples
                .copy_within(ch * old..ch * old + old, ch * num_samples);
            self.samples[ch * num_samples + old..(ch + 1) * num_samples].fill(0);
        }
        self.num_samples = num_samples;
    }

    /// Insert a zeroed channel at `at`, shifting later channels up.
    pub(crate) fn insert_channel(&mut self, at: usize) {
        let ns = self.num_samples;
        let pos = at * ns;
        self.samples
            .splice(pos..pos, std::iter::repeat(0).take(ns));
        self.charges.insert(at, 0);
        self.pedestals.insert(at, 0);
        self.hi_lo.insert(at, false);
    }

    /// Remove the channel at `at`, shifting later channels down.
    pub(crate) fn remove_channel(&mut self, at: usize) {
        let ns = self.num_samples;
        self.samples.drain(at * ns..(at + 1) * ns);
        self.charges.remove(at);
        self.pedestals.remove(at);
        self.hi_lo.remove(at);
    }

    #[track_caller]
    fn check(&self, channel: usize) -> Result<()> {
        Diagnostic::check_index("channel", channel, self.num_channels())
    }

    #[track_caller]
    fn check_sample(&self, channel: usize, sample: usize) -> Result<usize> {
        self.check(channel)?;
        Diagnostic::check_index("sample", sample, self.num_samples)?;
        Ok(channel * self.num_samples + sample)
    }

    #[track_caller]
    pub fn sample(&self, channel: usize, sample: usize) -> Result<u8> {
        let at = self.check_sample(channel, sample)?;
        Ok(self.samples[at])
    }

    #[track_caller]
    pub fn set_sample(&mut self, channel: usize, sample: usize, value: u8) -> Result<()> {
        let at = self.check_sample(channel, sample)?;
        self.samples[at] = value;
        Ok(())
    }

    /// All samples of one channel.
    #[track_caller]
    pub fn samples(&self, channel: usize) -> Result<&[u8]> {
        self.check(channel)?;
        let ns = self.num_samples;
        Ok(&self.samples[channel * ns..(channel + 1) * ns])
    }

    #[track_caller]
    pub fn samples_mut(&mut self, channel: usize) -> Result<&mut [u8]> {
        self.check(channel)?;
        let ns = self.num_samples;
        Ok(&mut self.samples[channel * ns..(channel + 1) * ns])
    }

    #[track_caller]
    pub fn charge(&self, channel: usize) -> Result<u16> {
        self.check(channel)?;
        Ok(self.charges[channel])
    }

    #[track_caller]
    pub fn set_charge(&mut self, channel: usize, value: u16) -> Result<()> {
        self.check(channel)?;
        self.charges[channel] = value;
        Ok(())
    }

    #[track_caller]
    pub fn pedestal(&self, channel: usize) -> Result<u16> {
        self.check(channel)?;
        Ok(self.pedestals[channel])
    }

    #[track_caller]
    pub fn set_pedestal(&mut self, channel: usize, value: u16) -> Result<()> {
        self.check(channel)?;
        self.pedestals[channel] = value;
        Ok(())
    }

    /// High-gain (`true`) or low-gain readout.
    #[track_caller]
    pub fn hi_lo(&self, channel: usize) -> Result<bool> {
        self.check(channel)?;
        Ok(self.hi_lo[channel])
    }

    #[track_caller]
    pub fn set_hi_lo(&mut self, channel: usize, value: bool) -> Result<()> {
        self.check(channel)?;
        self.hi_lo[channel] = value;
        Ok(())
    }

    /// Serialized size of the uncompressed channel section.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        self.num_channels() * (CHANNEL_SCALAR_LEN + self.num_samples)
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        out.reserve(self.encoded_len());
        for ch in 0..self.num_channels() {
            out.put_u16_le(self.charges[ch]);
            out.put_u16_le(self.pedestals[ch]);
            out.put_u8(u8::from(self.hi_lo[ch]));
            let ns = self.num_samples;
            out.put_bytes(&self.samples[ch * ns..(ch + 1) * ns]);
        }
    }

    pub(crate) fn decode(
        r: &mut ByteReader<'_>,
        num_samples: usize,
        num_channels: usize,
    ) -> Result<Self> {
        let need = num_channels * (CHANNEL_SCALAR_LEN + num_samples);
        if r.remaining() < need {
            return Err(Diagnostic::corruption(format!(
                "channel data needs {need} bytes, {} left",
                r.remaining()
            )));
        }
        let mut store = Self::new(num_samples, num_channels);
        for ch in 0..num_channels {
            store.charges[ch] = r.u16_le()?;
            store.pedestals[ch] = r.u16_le()?;
            store.hi_lo[ch] = match r.u8()? {
                0 => false,
                1 => true,
                other => {
                    return Err(Diagnostic::corruption(format!(
                        "channel {ch} has invalid gain flag {other}"
                    )))
                }
            };
            store.samples[ch * num_samples..(ch + 1) * num_samples]
                .copy_from_slice(r.take(num_samples)?);
        }
        Ok(store)
    }
}
