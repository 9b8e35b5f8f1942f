// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Sensor mode descriptors consumed by negotiation, resource acquisition and
//! the IQ modules. Sensor drivers are external; these structures only carry
//! what the IFE needs and load from JSON so tools can describe a mode in a
//! file.

use crate::{
    error::Result,
    format::{Dimension, Format},
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Colour filter arrangement of the first 2x2 pixel block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BayerPattern {
    #[default]
    Rggb,
    Grbg,
    Gbrg,
    Bggr,
}

/// CSI physical layer type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaneType {
    #[default]
    Dphy,
    Cphy,
}

/// Kind of a virtual-channel sub-stream multiplexed by the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Image,
    Pdaf,
    Meta,
    Hdr,
}

/// One CSI sub-stream of the sensor output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubStream {
    pub kind: StreamKind,
    pub dims: Dimension,
    pub format: Format,
    pub vc: u8,
    pub dt: u8,
}

/// Phase-detection sensor family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdafType {
    /// On-sensor PD processing, results delivered as metadata
    Type1,
    /// PD pixels delivered on a separate virtual channel
    Type2,
    /// PD pixels embedded in the Bayer image, extracted by the IFE
    Type3,
    /// Every pixel carries a phase pair
    DualPd,
}

/// Memory layout of the PD sub-stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PdBufferFormat {
    Unpacked16,
    Mipi10,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdafInfo {
    pub sensor_type: PdafType,
    /// Format the sensor sends on the wire
    pub native_format: PdBufferFormat,
    /// Format the PD library expects in memory
    pub buffer_format: PdBufferFormat,
}

/// Sensor mode selected by the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorMode {
    pub name: String,
    /// Active pixel array output after binning and sensor crop
    pub output: Dimension,
    pub format: Format,
    #[serde(default)]
    pub pattern: BayerPattern,
    pub fps: f32,
    /// Output pixel rate on the CSI bus, pixels per second
    pub pixel_clock_hz: u64,
    #[serde(default = "default_lanes")]
    pub lanes: u8,
    #[serde(default)]
    pub lane_type: LaneType,
    #[serde(default)]
    pub vc: u8,
    #[serde(default = "default_dt")]
    pub dt: u8,
    #[serde(default = "default_bit_width")]
    pub bit_width: u8,
    #[serde(default = "default_black_level")]
    pub black_level: u16,
    #[serde(default)]
    pub streams: Vec<SubStream>,
    #[serde(default)]
    pub pdaf: Option<PdafInfo>,
}

fn default_lanes() -> u8 {
    4
}

fn default_dt() -> u8 {
    0x2b
}

fn default_bit_width() -> u8 {
    10
}

fn default_black_level() -> u16 {
    64
}

impl SensorMode {
    /// Minimal 10-bit Bayer mode with no side-channel streams.
    pub fn new(name: &str, output: Dimension, fps: f32) -> Self {
        let blanking = 1.1;
        Self {
            name: name.to_owned(),
            output,
            format: Format::RawMipi10,
            pattern: BayerPattern::default(),
            fps,
            pixel_clock_hz: (output.area() as f64 * fps as f64 * blanking) as u64,
            lanes: default_lanes(),
            lane_type: LaneType::default(),
            vc: 0,
            dt: default_dt(),
            bit_width: default_bit_width(),
            black_level: default_black_level(),
            streams: Vec::new(),
            pdaf: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Looks up a side-channel sub-stream by kind.
    pub fn stream(&self, kind: StreamKind) -> Option<&SubStream> {
        self.streams.iter().find(|s| s.kind == kind)
    }

    pub fn pdaf_type(&self) -> Option<PdafType> {
        self.pdaf.as_ref().map(|p| p.sensor_type)
    }

    /// Maximum raw value for the sensor bit width.
    pub fn white_level(&self) -> u32 {
        (1u32 << self.bit_width.min(16)) - 1
    }
}
