//! Array-level trigger snapshot.

use crate::error::{Diagnostic, Result};
use crate::event::GPS_TIME_WORDS;
use crate::wire::{ByteReader, WriteLeExt};

/// Node number reserved for array trigger records.
pub const ARRAY_TRIGGER_NODE: u8 = 255;

const FIXED_LEN: usize =
    4 + 1 + 2 * GPS_TIME_WORDS + 1 + 1 + 2 + 2 + 1 + 4 + 4 * 4 + 3 * 4 + 3 * 4 + 2 + 2;

const SUBARRAY_LEN: usize = 4 * 7 + 3 * 4 + 3 * 4;

/// Per-telescope entry of the subarray list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SubarrayTelescope {
    /// Physical telescope id; `None` until assigned.
    pub telescope_id: Option<u32>,
    pub altitude: f32,
    pub azimuth: f32,
    pub tdc_time: u32,
    /// Telescope-specific event type code.
    pub event_type: u32,
    pub shower_delay: u32,
    pub comp_delay: u32,
    pub l2_counts: [u32; 3],
    pub cal_counts: [u32; 3],
}

/// Array trigger record.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayTriggerRecord {
    event_number: u32,
    node_number: u8,
    gps_time: [u16; GPS_TIME_WORDS],
    gps_year: u8,
    event_type: u8,
    flags: u16,
    at_flags: u16,
    config_mask: u8,
    run_number: u32,
    ten_mhz_clock: [u32; 4],
    opt_cal_count: [u32; 3],
    ped_count: [u32; 3],
    subarray: Vec<SubarrayTelescope>,
    trigger_telescopes: Vec<u32>,
}

impl Default for ArrayTriggerRecord {
    fn default() -> Self {
        Self {
            event_number: 0,
            node_number: ARRAY_TRIGGER_NODE,
            gps_time: [0; GPS_TIME_WORDS],
            gps_year: 0,
            event_type: 0,
            flags: 0,
            at_flags: 0,
            config_mask: 0,
            run_number: 0,
            ten_mhz_clock: [0; 4],
            opt_cal_count: [0; 3],
            ped_count: [0; 3],
            subarray: Vec::new(),
            trigger_telescopes: Vec::new(),
        }
    }
}

macro_rules! subarray_field {
    ($get:ident, $set:ident, $field:ident, $ty:ty) => {
        #[track_caller]
        pub fn $get(&self, index: usize) -> Result<$ty> {
            Ok(self.subarray_telescope(index)?.$field)
        }

        #[track_caller]
        pub fn $set(&mut self, index: usize, value: $ty) -> Result<()> {
            self.subarray_telescope_mut(index)?.$field = value;
            Ok(())
        }
    };
}

impl ArrayTriggerRecord {
    /// Empty record with the sentinel node number.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_sizes(num_subarray: usize, num_trigger: usize) -> Self {
        let mut at = Self::new();
        at.resize_subarray_telescopes(num_subarray);
        at.resize_trigger_telescopes(num_trigger);
        at
    }

    pub fn event_number(&self) -> u32 {
        self.event_number
    }

    pub fn set_event_number(&mut self, value: u32) {
        self.event_number = value;
    }

    pub fn node_number(&self) -> u8 {
        self.node_number
    }

    pub fn set_node_number(&mut self, value: u8) {
        self.node_number = value;
    }

    pub fn run_number(&self) -> u32 {
        self.run_number
    }

    pub fn set_run_number(&mut self, value: u32) {
        self.run_number = value;
    }

    pub fn gps_time(&self) -> &[u16; GPS_TIME_WORDS] {
        &self.gps_time
    }

    pub fn gps_time_mut(&mut self) -> &mut [u16; GPS_TIME_WORDS] {
        &mut self.gps_time
    }

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

    pub fn set_flags(&mut self, value: u16) {
        self.flags = value;
    }

    pub fn at_flags(&self) -> u16 {
        self.at_flags
    }

    pub fn set_at_flags(&mut self, value: u16) {
        self.at_flags = value;
    }

    /// DAQ configuration mask byte as reported by the array trigger.
    pub fn config_mask(&self) -> u8 {
        self.config_mask
    }

    pub fn set_config_mask(&mut self, value: u8) {
        self.config_mask = value;
    }

    pub fn ten_mhz_clock(&self) -> &[u32; 4] {
        &self.ten_mhz_clock
    }

    pub fn ten_mhz_clock_mut(&mut self) -> &mut [u32; 4] {
        &mut self.ten_mhz_clock
    }

    pub fn opt_cal_count(&self) -> &[u32; 3] {
        &self.opt_cal_count
    }

    pub fn opt_cal_count_mut(&mut self) -> &mut [u32; 3] {
        &mut self.opt_cal_count
    }

    pub fn ped_count(&self) -> &[u32; 3] {
        &self.ped_count
    }

    pub fn ped_count_mut(&mut self) -> &mut [u32; 3] {
        &mut self.ped_count
    }

    pub fn num_subarray_telescopes(&self) -> usize {
        self.subarray.len()
    }

    pub fn num_trigger_telescopes(&self) -> usize {
        self.trigger_telescopes.len()
    }

    /// Grow the subarray list; new slots are zero with no telescope id.
    pub fn resize_subarray_telescopes(&mut self, n: usize) {
        if n > self.subarray.len() {
            self.subarray.resize_with(n, SubarrayTelescope::default);
        }
    }

    /// Grow the triggered-telescope list; new ids are zero.
    pub fn resize_trigger_telescopes(&mut self, n: usize) {
        if n > self.trigger_telescopes.len() {
            self.trigger_telescopes.resize(n, 0);
        }
    }

    #[track_caller]
    pub fn subarray_telescope(&self, index: usize) -> Result<&SubarrayTelescope> {
        Diagnostic::check_index("subarray telescope", index, self.subarray.len())?;
        Ok(&self.subarray[index])
    }

    #[track_caller]
    pub fn subarray_telescope_mut(&mut self, index: usize) -> Result<&mut SubarrayTelescope> {
        Diagnostic::check_index("subarray telescope", index, self.subarray.len())?;
        Ok(&mut self.subarray[index])
    }

    pub fn subarray_telescopes(&self) -> &[SubarrayTelescope] {
        &self.subarray
    }

    /// Telescope id bound to slot `index`, `None` while unassigned.
    #[track_caller]
    pub fn subarray_telescope_id(&self, index: usize) -> Result<Option<u32>> {
        Ok(self.subarray_telescope(index)?.telescope_id)
    }

    #[track_caller]
    pub fn set_subarray_telescope_id(&mut self, index: usize, id: u32) -> Result<()> {
        self.subarray_telescope_mut(index)?.telescope_id = Some(id);
        Ok(())
    }

    subarray_field!(altitude, set_altitude, altitude, f32);
    subarray_field!(azimuth, set_azimuth, azimuth, f32);
    subarray_field!(tdc_time, set_tdc_time, tdc_time, u32);
    subarray_field!(specific_event_type_code, set_specific_event_type_code, event_type, u32);
    subarray_field!(shower_delay, set_shower_delay, shower_delay, u32);
    subarray_field!(comp_delay, set_comp_delay, comp_delay, u32);

    #[track_caller]
    pub fn trigger_telescope_id(&self, index: usize) -> Result<u32> {
        Diagnostic::check_index("trigger telescope", index, self.trigger_telescopes.len())?;
        Ok(self.trigger_telescopes[index])
    }

    #[track_caller]
    pub fn set_trigger_telescope_id(&mut self, index: usize, id: u32) -> Result<()> {
        Diagnostic::check_index("trigger telescope", index, self.trigger_telescopes.len())?;
        self.trigger_telescopes[index] = id;
        Ok(())
    }

    pub fn trigger_telescopes(&self) -> &[u32] {
        &self.trigger_telescopes
    }

    /// Fails with `IncompleteRecord` if any subarray slot lacks a telescope id.
    pub fn check_complete(&self) -> Result<()> {
        match self.subarray.iter().position(|t| t.telescope_id.is_none()) {
            Some(slot) => Err(Diagnostic::incomplete_record(format!(
                "array trigger for event {}: subarray slot {slot} has no telescope id",
                self.event_number
            ))),
            None => Ok(()),
        }
    }

    /// Serialized length in bytes.
    pub fn size(&self) -> usize {
        FIXED_LEN + self.subarray.len() * SUBARRAY_LEN + self.trigger_telescopes.len() * 4
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        self.check_complete()?;
        let num_sub = u16::try_from(self.subarray.len())
            .map_err(|_| Diagnostic::usage("too many subarray telescopes"))?;
        let num_trig = u16::try_from(self.trigger_telescopes.len())
            .map_err(|_| Diagnostic::usage("too many trigger telescopes"))?;
        out.put_u32_le(self.event_number);
        out.put_u8(self.node_number);
        for &w in &self.gps_time {
            out.put_u16_le(w);
        }
        out.put_u8(self.gps_year);
        out.put_u8(self.event_type);
        out.put_u16_le(self.flags);
        out.put_u16_le(self.at_flags);
        out.put_u8(self.config_mask);
        out.put_u32_le(self.run_number);
        for &w in self
            .ten_mhz_clock
            .iter()
            .chain(&self.opt_cal_count)
            .chain(&self.ped_count)
        {
            out.put_u32_le(w);
        }
        out.put_u16_le(num_sub);
        out.put_u16_le(num_trig);
        for t in &self.subarray {
            out.put_u32_le(t.telescope_id.unwrap_or_default());
            out.put_f32_le(t.altitude);
            out.put_f32_le(t.azimuth);
            out.put_u32_le(t.tdc_time);
            out.put_u32_le(t.event_type);
            out.put_u32_le(t.shower_delay);
            out.put_u32_le(t.comp_delay);
            for &w in t.l2_counts.iter().chain(&t.cal_counts) {
                out.put_u32_le(w);
            }
        }
        for &id in &self.trigger_telescopes {
            out.put_u32_le(id);
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
        let at_flags = r.u16_le()?;
        let config_mask = r.u8()?;
        let run_number = r.u32_le()?;
        let ten_mhz_clock = r.u32_array()?;
        let opt_cal_count = r.u32_array()?;
        let ped_count = r.u32_array()?;
        let num_sub = usize::from(r.u16_le()?);
        let num_trig = usize::from(r.u16_le()?);

        let mut subarray = Vec::with_capacity(num_sub);
        for _ in 0..num_sub {
            subarray.push(SubarrayTelescope {
                telescope_id: Some(r.u32_le()?),
                altitude: r.f32_le()?,
                azimuth: r.f32_le()?,
                tdc_time: r.u32_le()?,
                event_type: r.u32_le()?,
                shower_delay: r.u32_le()?,
                comp_delay: r.u32_le()?,
                l2_counts: r.u32_array()?,
                cal_counts: r.u32_array()?,
            });
        }
        let mut trigger_telescopes = Vec::with_capacity(num_trig);
        for _ in 0..num_trig {
            trigger_telescopes.push(r.u32_le()?);
        }

        Ok(Self {
            event_number,
            node_number,
            gps_time,
            gps_year,
            event_type,
            flags,
            at_flags,
            config_mask,
            run_number,
            ten_mhz_clock,
            opt_cal_count,
            ped_count,
            subarray,
            trigger_telescopes,
        })
    }
}
