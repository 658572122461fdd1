//! Simulation metadata banks. [`SimulationHeader`] describes the whole run and
//! is written once, usually in packet 0; the other banks are flat per-shower
//! records stored alongside the array event.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Diagnostic, Result, ResultExt};
use crate::wire::{ByteReader, WriteLeExt};

/// Position of one camera pixel with the telescope at stow.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PixelLocation {
    pub east_at_stow_deg: f32,
    pub up_at_stow_deg: f32,
    pub radius_deg: f32,
}

impl PixelLocation {
    const ENCODED_LEN: usize = 12;
}

/// One telescope of the simulated array, relative to the array centre.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TelescopeLocation {
    pub rel_south_m: f32,
    pub rel_east_m: f32,
    /// Relative to the observation level.
    pub rel_up_m: f32,
    pub camera: Vec<PixelLocation>,
}

/// Run-level description of a simulation: which package produced it, for
/// which array epoch and atmosphere, the array layout and the configuration
/// text the simulation was driven by.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationHeader {
    /// YYYYMMDD.
    pub date_of_sims_utc: u32,
    /// See the `PACKAGE_*` constants.
    pub simulation_package: u32,
    /// Free-form name of whoever ran the simulation.
    pub simulator: String,
    /// YYYYMMDD of the array configuration being mimicked.
    pub date_of_array_for_sims: u32,
    /// CORSIKA atmosphere number.
    pub atmospheric_model: u32,
    pub obs_altitude_m: f32,
    pub array: Vec<TelescopeLocation>,
    pub sim_config_file: String,
}

impl SimulationHeader {
    pub const PACKAGE_UNKNOWN: u32 = 0;
    pub const PACKAGE_LEEDS: u32 = 1;
    pub const PACKAGE_GRISU: u32 = 2;
    pub const PACKAGE_KASCADE: u32 = 3;
    pub const PACKAGE_CORSIKA: u32 = 4;
    pub const PACKAGE_UCLA: u32 = 5;

    pub(crate) const VERSION: u16 = 1;

    /// Total pixels over every telescope.
    #[must_use]
    pub fn num_pixels(&self) -> usize {
        self.array.iter().map(|t| t.camera.len()).sum()
    }

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) -> Result<()> {
        out.put_u32_le(self.date_of_sims_utc);
        out.put_u32_le(self.simulation_package);
        put_text(out, &self.simulator).comment("while encoding simulator name")?;
        out.put_u32_le(self.date_of_array_for_sims);
        out.put_u32_le(self.atmospheric_model);
        out.put_f32_le(self.obs_altitude_m);
        out.put_u32_le(encoded_count(self.array.len(), "telescopes")?);
        for tel in &self.array {
            out.put_f32_le(tel.rel_south_m);
            out.put_f32_le(tel.rel_east_m);
            out.put_f32_le(tel.rel_up_m);
            out.put_u32_le(encoded_count(tel.camera.len(), "pixels")?);
            for pix in &tel.camera {
                out.put_f32_le(pix.east_at_stow_deg);
                out.put_f32_le(pix.up_at_stow_deg);
                out.put_f32_le(pix.radius_deg);
            }
        }
        put_text(out, &self.sim_config_file).comment("while encoding simulation config")?;
        Ok(())
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let date_of_sims_utc = r.u32_le()?;
        let simulation_package = r.u32_le()?;
        let simulator = take_text(r, "simulator name")?;
        let date_of_array_for_sims = r.u32_le()?;
        let atmospheric_model = r.u32_le()?;
        let obs_altitude_m = r.f32_le()?;

        // Every telescope carries at least its position and pixel count.
        let num_tels = r.u32_le()? as usize;
        check_room(r, num_tels, 16, "telescopes")?;
        let mut array = Vec::with_capacity(num_tels);
        for _ in 0..num_tels {
            let rel_south_m = r.f32_le()?;
            let rel_east_m = r.f32_le()?;
            let rel_up_m = r.f32_le()?;
            let num_pix = r.u32_le()? as usize;
            check_room(r, num_pix, PixelLocation::ENCODED_LEN, "pixels")?;
            let mut camera = Vec::with_capacity(num_pix);
            for _ in 0..num_pix {
                camera.push(PixelLocation {
                    east_at_stow_deg: r.f32_le()?,
                    up_at_stow_deg: r.f32_le()?,
                    radius_deg: r.f32_le()?,
                });
            }
            array.push(TelescopeLocation {
                rel_south_m,
                rel_east_m,
                rel_up_m,
                camera,
            });
        }
        let sim_config_file = take_text(r, "simulation config")?;
        Ok(Self {
            date_of_sims_utc,
            simulation_package,
            simulator,
            date_of_array_for_sims,
            atmospheric_model,
            obs_altitude_m,
            array,
            sim_config_file,
        })
    }
}

#[track_caller]
fn encoded_count(n: usize, what: &str) -> Result<u32> {
    u32::try_from(n).map_err(|_| Diagnostic::usage(format!("too many {what}: {n}")))
}

fn put_text(out: &mut Vec<u8>, text: &str) -> Result<()> {
    out.put_u32_le(encoded_count(text.len(), "text bytes")?);
    out.put_bytes(text.as_bytes());
    Ok(())
}

fn take_text(r: &mut ByteReader<'_>, what: &str) -> Result<String> {
    let len = r.u32_le()? as usize;
    let bytes = r.take(len)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| Diagnostic::corruption(format!("{what} is not UTF-8: {e}")))
}

fn check_room(r: &ByteReader<'_>, count: usize, each: usize, what: &str) -> Result<()> {
    if count.saturating_mul(each) > r.remaining() {
        return Err(Diagnostic::corruption(format!(
            "{count} {what} do not fit in {} remaining bytes",
            r.remaining()
        )));
    }
    Ok(())
}

/// Primary particle and pointing of a simulated shower.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationData {
    /// CORSIKA particle code of the primary (1 = gamma, 14 = proton).
    pub corsika_particle_id: u32,
    pub energy_gev: f32,
    pub observation_zenith_deg: f32,
    pub observation_azimuth_deg: f32,
    pub primary_zenith_deg: f32,
    pub primary_azimuth_deg: f32,
    pub ref_zenith_deg: f32,
    pub ref_azimuth_deg: f32,
    pub ref_position_angle_deg: f32,
    pub core_east_m: f32,
    pub core_south_m: f32,
    /// Height of the impact point above sea level.
    pub core_elevation_masl: f32,
}

impl SimulationData {
    pub(crate) const VERSION: u16 = 1;
    pub(crate) const ENCODED_LEN: usize = 4 + 11 * 4;

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_u32_le(self.corsika_particle_id);
        for v in [
            self.energy_gev,
            self.observation_zenith_deg,
            self.observation_azimuth_deg,
            self.primary_zenith_deg,
            self.primary_azimuth_deg,
            self.ref_zenith_deg,
            self.ref_azimuth_deg,
            self.ref_position_angle_deg,
            self.core_east_m,
            self.core_south_m,
            self.core_elevation_masl,
        ] {
            out.put_f32_le(v);
        }
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            corsika_particle_id: r.u32_le()?,
            energy_gev: r.f32_le()?,
            observation_zenith_deg: r.f32_le()?,
            observation_azimuth_deg: r.f32_le()?,
            primary_zenith_deg: r.f32_le()?,
            primary_azimuth_deg: r.f32_le()?,
            ref_zenith_deg: r.f32_le()?,
            ref_azimuth_deg: r.f32_le()?,
            ref_position_angle_deg: r.f32_le()?,
            core_east_m: r.f32_le()?,
            core_south_m: r.f32_le()?,
            core_elevation_masl: r.f32_le()?,
        })
    }
}

/// CORSIKA-specific shower bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CorsikaSimulationData {
    /// Metres above sea level.
    pub first_interaction_height: f32,
    /// Grammage in g/cm^2.
    pub first_interaction_depth: f32,
    pub corsika_run_id: i32,
    pub shower_id: i32,
}

impl CorsikaSimulationData {
    pub(crate) const VERSION: u16 = 1;
    pub(crate) const ENCODED_LEN: usize = 16;

    pub(crate) fn encode_into(&self, out: &mut Vec<u8>) {
        out.put_f32_le(self.first_interaction_height);
        out.put_f32_le(self.first_interaction_depth);
        out.put_u32_le(self.corsika_run_id as u32);
        out.put_u32_le(self.shower_id as u32);
    }

    pub(crate) fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(Self {
            first_interaction_height: r.f32_le()?,
            first_interaction_depth: r.f32_le()?,
            corsika_run_id: r.u32_le()? as i32,
            shower_id: r.u32_le()? as i32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_lengths_match_constants() {
        let mut out = Vec::new();
        SimulationData::default().encode_into(&mut out);
        assert_eq!(out.len(), SimulationData::ENCODED_LEN);
        out.clear();
        let corsika = CorsikaSimulationData {
            first_interaction_height: 21_000.0,
            first_interaction_depth: 60.5,
            corsika_run_id: -1,
            shower_id: 42,
        };
        corsika.encode_into(&mut out);
        assert_eq!(out.len(), CorsikaSimulationData::ENCODED_LEN);
        let mut r = ByteReader::new(&out, "corsika");
        assert_eq!(CorsikaSimulationData::decode(&mut r).unwrap(), corsika);
    }

    fn two_telescope_header() -> SimulationHeader {
        let pixel = |i: usize| PixelLocation {
            east_at_stow_deg: 0.1 * i as f32,
            up_at_stow_deg: -0.1 * i as f32,
            radius_deg: 0.05,
        };
        SimulationHeader {
            date_of_sims_utc: 20_240_611,
            simulation_package: SimulationHeader::PACKAGE_CORSIKA,
            simulator: "Sembroski".into(),
            date_of_array_for_sims: 20_090_901,
            atmospheric_model: 61,
            obs_altitude_m: 1270.0,
            array: vec![
                TelescopeLocation {
                    rel_south_m: 37.6,
                    rel_east_m: -23.7,
                    rel_up_m: 0.0,
                    camera: (0..3).map(pixel).collect(),
                },
                TelescopeLocation {
                    rel_south_m: -44.1,
                    rel_east_m: -47.7,
                    rel_up_m: 4.5,
                    camera: (0..2).map(pixel).collect(),
                },
            ],
            sim_config_file: "NSHOW 10\nERANGE 50 50000\n".into(),
        }
    }

    #[test]
    fn simulation_header_round_trip() {
        let header = two_telescope_header();
        assert_eq!(header.num_pixels(), 5);
        let mut out = Vec::new();
        header.encode_into(&mut out).unwrap();
        let mut r = ByteReader::new(&out, "simulation header");
        assert_eq!(SimulationHeader::decode(&mut r).unwrap(), header);
        r.finish().unwrap();
    }

    #[test]
    fn simulation_header_with_oversized_pixel_count_is_corruption() {
        let mut out = Vec::new();
        SimulationHeader {
            array: vec![TelescopeLocation::default()],
            ..SimulationHeader::default()
        }
        .encode_into(&mut out)
        .unwrap();
        // The only telescope's pixel count sits right after its position.
        let at = 4 + 4 + 4 + 4 + 4 + 4 + 4 + 12;
        out[at..at + 4].copy_from_slice(&u32::MAX.to_le_bytes());
        let mut r = ByteReader::new(&out, "simulation header");
        let err = SimulationHeader::decode(&mut r).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Corruption);
    }

    #[test]
    fn simulation_header_rejects_invalid_text() {
        let mut out = Vec::new();
        SimulationHeader {
            simulator: "ab".into(),
            ..SimulationHeader::default()
        }
        .encode_into(&mut out)
        .unwrap();
        out[12] = 0xFF;
        let mut r = ByteReader::new(&out, "simulation header");
        let err = SimulationHeader::decode(&mut r).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Corruption);
    }
}
