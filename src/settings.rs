// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Runtime tunables for an IFE node.
///
/// Every field has a default so a settings file only needs to name what it
/// overrides.
///
/// # Example
///
/// ```
/// use edgefirst_ife::settings::Settings;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let settings = Settings::from_json(r#"{ "force_single_ife": true }"#)?;
/// assert!(settings.force_single_ife);
/// assert_eq!(settings.queue_depth, 8);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Never split a frame across two IFE cores
    pub force_single_ife: bool,
    /// Cap pixel outputs to the single-core width during negotiation
    pub cap_resolution_for_single_ife: bool,
    /// Number of in-flight requests; sizes every request-indexed ring
    pub queue_depth: usize,
    /// Requests at the start of a stream allowed to run without 3A stats
    pub startup_frames_without_stats: u64,
    /// Overrides the chip's maximum downscale ratio when non-zero
    pub max_downscale: u32,
    /// Overrides the chip's single-core clock limit when non-zero, in Hz
    pub max_clock_hz: u64,
    /// Context columns added on each side of the split point in dual mode
    pub striping_padding: u32,
    /// Bit mask of hang-dump register groups to capture
    pub reg_dump_mask: u32,
    /// Capture a hang dump descriptor for every request
    pub per_frame_reg_dump: bool,
    /// Camnoc bandwidth overhead, percent on top of the raw pixel rate
    pub camnoc_overhead_percent: u32,
    /// External bus bandwidth overhead, percent on top of the raw pixel rate
    pub external_overhead_percent: u32,
    /// Fraction of line time the output path may use, 0.0 to 1.0
    pub throughput: f32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            force_single_ife: false,
            cap_resolution_for_single_ife: false,
            queue_depth: 8,
            startup_frames_without_stats: 1,
            max_downscale: 0,
            max_clock_hz: 0,
            striping_padding: 64,
            reg_dump_mask: u32::MAX,
            per_frame_reg_dump: false,
            camnoc_overhead_percent: 20,
            external_overhead_percent: 10,
            throughput: 1.0,
        }
    }
}

impl Settings {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() -> Result<()> {
        let settings = Settings::from_json(r#"{ "queue_depth": 4, "striping_padding": 32 }"#)?;
        assert_eq!(settings.queue_depth, 4);
        assert_eq!(settings.striping_padding, 32);
        assert_eq!(settings.startup_frames_without_stats, 1);
        assert!(!settings.force_single_ife);
        Ok(())
    }

    #[test]
    fn rejects_bad_json() {
        assert!(Settings::from_json("{ queue_depth: }").is_err());
    }
}
