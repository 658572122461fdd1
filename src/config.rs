//! Run description for synthetic bank files.
//!
//! Missing keys fall back to the reference run: 100 packets of two
//! telescopes, 64 samples over 499 channels, 7 subarray telescopes.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config_mask::{ConfigMask, MAX_TELESCOPES};
use crate::error::{Diagnostic, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default, deny_unknown_fields))]
pub struct SyntheticRunConfig {
    pub run_number: u32,
    pub num_packets: u32,
    /// Node numbers of the reporting telescopes.
    pub telescopes: Vec<u8>,
    pub num_samples: usize,
    pub num_channels: usize,
    pub clock_trig_boards: usize,
    pub subarray_telescopes: usize,
    pub trigger_telescopes: usize,
    pub compress: bool,
    /// Attach simulation and CORSIKA banks to every packet.
    pub simulation_banks: bool,
    /// Indices left out; the writer fills them with empty packets.
    pub skip_indices: Vec<u32>,
}

impl Default for SyntheticRunConfig {
    fn default() -> Self {
        Self {
            run_number: 400,
            num_packets: 100,
            telescopes: vec![0, 1],
            num_samples: 64,
            num_channels: 499,
            clock_trig_boards: 1,
            subarray_telescopes: 7,
            trigger_telescopes: 7,
            compress: true,
            simulation_banks: true,
            skip_indices: Vec::new(),
        }
    }
}

impl SyntheticRunConfig {
    /// Header configuration mask: the reporting telescopes.
    pub fn config_mask(&self) -> ConfigMask {
        self.telescopes.iter().map(|&t| usize::from(t)).collect()
    }

    /// Reject telescope lists the file format cannot represent.
    pub fn validate(&self) -> Result<()> {
        for (i, &t) in self.telescopes.iter().enumerate() {
            if usize::from(t) >= MAX_TELESCOPES {
                return Err(Diagnostic::usage(format!(
                    "telescope {t} is reserved for the array trigger"
                )));
            }
            if self.telescopes[..i].contains(&t) {
                return Err(Diagnostic::usage(format!("telescope {t} listed twice")));
            }
        }
        if self.skip_indices.iter().any(|&i| i >= self.num_packets) {
            return Err(Diagnostic::usage(
                "skip_indices must be below num_packets",
            ));
        }
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)
            .map_err(|e| Diagnostic::usage(format!("invalid run config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    #[cfg(feature = "serde")]
    pub fn load<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Diagnostic::from(e).with_comment(format!("reading {}", path.display())))?;
        Self::from_toml_str(&text).map_err(|e| e.with_comment(format!("in {}", path.display())))
    }
}
