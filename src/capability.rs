// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-version capability tables.
//!
//! Each hardware version publishes one immutable [`Capability`] describing the
//! IQ and stats modules it carries (with the factory that instantiates them)
//! and the limits negotiation and split decisions check against. Lookups are
//! a linear scan on `(ModuleType, PipelinePath)`; tables hold a few dozen
//! entries and are only consulted at node initialization.

use crate::{
    error::Result,
    format::Dimension,
    hw::{HwVersion, ModuleRegion},
    iq::{self, IspModule},
    packet::blob::DataPath,
    stats,
};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Processing stage implemented by an IQ or stats module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    Linearization,
    Lsc,
    Demosaic,
    WhiteBalance,
    Gamma,
    Mnds,
    Crop,
    BHist,
    AwbBg,
    Bf,
}

impl ModuleType {
    pub fn is_stats(&self) -> bool {
        matches!(self, ModuleType::BHist | ModuleType::AwbBg | ModuleType::Bf)
    }
}

/// Hardware pipeline path a module instance sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePath {
    /// Shared front half of the pipe, ahead of any output branch
    Common,
    /// Full resolution video output
    Full,
    /// Face detection output
    Fd,
    /// Display output (V2 only)
    Display,
    /// 4:1 downscaled output
    Ds4,
    /// Raw pixel dump output
    PixelRaw,
}

impl PipelinePath {
    /// Bandwidth vote path the output of this pipeline path counts against.
    pub fn data_path(&self) -> DataPath {
        match self {
            PipelinePath::Full => DataPath::Video,
            PipelinePath::Display => DataPath::Display,
            PipelinePath::PixelRaw => DataPath::PixelRaw,
            PipelinePath::Common | PipelinePath::Fd | PipelinePath::Ds4 => DataPath::Linear,
        }
    }
}

/// Identity of one module instance: a stage on a given path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId {
    pub kind: ModuleType,
    pub path: PipelinePath,
}

impl ModuleId {
    pub const fn new(kind: ModuleType, path: PipelinePath) -> Self {
        Self { kind, path }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}/{:?}", self.kind, self.path)
    }
}

/// Everything a factory needs to build a module for one chip.
pub struct ModuleCreateData {
    pub id: ModuleId,
    pub version: HwVersion,
    pub region: &'static ModuleRegion,
    pub max_downscale: u32,
}

pub type ModuleFactory = fn(&ModuleCreateData) -> Result<Box<dyn IspModule>>;

/// One row of a capability table.
pub struct ModuleEntry {
    pub kind: ModuleType,
    pub path: PipelinePath,
    pub installed: bool,
    pub create: ModuleFactory,
}

impl ModuleEntry {
    pub fn id(&self) -> ModuleId {
        ModuleId::new(self.kind, self.path)
    }
}

impl fmt::Debug for ModuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleEntry")
            .field("kind", &self.kind)
            .field("path", &self.path)
            .field("installed", &self.installed)
            .finish()
    }
}

bitflags! {
    /// UBWC versions the write masters can produce.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UbwcVersions: u32 {
        const V2 = 1 << 0;
        const V3 = 1 << 1;
        const V4 = 1 << 2;
    }
}

/// Image correction and adjustment engine generation paired with the IFE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcaVersion {
    Ica10,
    Ica20,
    Ica30,
}

/// Immutable description of one hardware version.
#[derive(Debug)]
pub struct Capability {
    pub version: HwVersion,
    pub iq_modules: &'static [ModuleEntry],
    pub stats_modules: &'static [ModuleEntry],
    pub ubwc: UbwcVersions,
    /// Largest 8-bit frame that may use lossy UBWC
    pub lossy_8bit_max: Dimension,
    /// Largest 10-bit frame that may use lossy UBWC
    pub lossy_10bit_max: Dimension,
    pub ica: IcaVersion,
    pub ldc: bool,
    /// Widest output a single core can write on the full path
    pub max_output_width_full: u32,
    /// Widest output a single core can write on the FD path
    pub max_output_width_fd: u32,
    pub max_output_height: u32,
    /// Widest line a single core can ingest
    pub max_input_width: u32,
    /// Output limits relaxed when only RDI ports are active
    pub max_rdi_only: Dimension,
    pub max_downscale: u32,
    pub dual: bool,
    pub bus_read: bool,
    pub max_clock_hz: u64,
    pub bhist_dims: Dimension,
    pub awb_bg_dims: Dimension,
    pub bf_dims: Dimension,
}

impl Capability {
    /// Returns the static table for a hardware version.
    pub fn lookup(version: HwVersion) -> &'static Capability {
        match version {
            HwVersion::V1 => &V1_CAPABILITY,
            HwVersion::V2 => &V2_CAPABILITY,
            HwVersion::V3 => &V3_CAPABILITY,
        }
    }

    /// Finds the module entry for `(kind, path)` in either table.
    pub fn find(&self, kind: ModuleType, path: PipelinePath) -> Option<&'static ModuleEntry> {
        self.iq_modules
            .iter()
            .chain(self.stats_modules.iter())
            .find(|e| e.kind == kind && e.path == path)
    }

    /// Installed IQ entries followed by installed stats entries, in table order.
    pub fn installed(&self) -> impl Iterator<Item = &'static ModuleEntry> {
        self.iq_modules
            .iter()
            .chain(self.stats_modules.iter())
            .filter(|e| e.installed)
    }

    /// Fixed buffer size of a stats output, one core's worth.
    pub fn stats_dims(&self, kind: ModuleType) -> Option<Dimension> {
        match kind {
            ModuleType::BHist => Some(self.bhist_dims),
            ModuleType::AwbBg => Some(self.awb_bg_dims),
            ModuleType::Bf => Some(self.bf_dims),
            _ => None,
        }
    }

    /// Single-core output width limit for a pixel path.
    pub fn max_output_width(&self, path: PipelinePath) -> u32 {
        match path {
            PipelinePath::Fd | PipelinePath::Ds4 => self.max_output_width_fd,
            _ => self.max_output_width_full,
        }
    }

    pub fn supports_ubwc(&self) -> bool {
        !self.ubwc.is_empty()
    }
}

macro_rules! entry {
    ($kind:ident, $path:ident, $installed:expr, $create:path) => {
        ModuleEntry {
            kind: ModuleType::$kind,
            path: PipelinePath::$path,
            installed: $installed,
            create: $create,
        }
    };
}

static STATS_MODULES: [ModuleEntry; 3] = [
    entry!(BHist, Common, true, stats::bhist::create),
    entry!(AwbBg, Common, true, stats::awb_bg::create),
    entry!(Bf, Common, true, stats::bf::create),
];

static V1_IQ_MODULES: [ModuleEntry; 11] = [
    entry!(Linearization, Common, true, iq::linearization::create),
    entry!(Lsc, Common, true, iq::lsc::create),
    entry!(Demosaic, Common, true, iq::demosaic::create),
    entry!(WhiteBalance, Common, true, iq::white_balance::create),
    entry!(Gamma, Common, true, iq::gamma::create),
    entry!(Mnds, Full, true, iq::mnds::create),
    entry!(Crop, Full, true, iq::crop::create),
    entry!(Mnds, Fd, true, iq::mnds::create),
    entry!(Crop, Fd, true, iq::crop::create),
    entry!(Mnds, Ds4, false, iq::mnds::create),
    entry!(Crop, PixelRaw, true, iq::crop::create),
];

static V2_IQ_MODULES: [ModuleEntry; 14] = [
    entry!(Linearization, Common, true, iq::linearization::create),
    entry!(Lsc, Common, true, iq::lsc::create),
    entry!(Demosaic, Common, true, iq::demosaic::create),
    entry!(WhiteBalance, Common, true, iq::white_balance::create),
    entry!(Gamma, Full, true, iq::gamma::create),
    entry!(Gamma, Display, true, iq::gamma::create),
    entry!(Mnds, Full, true, iq::mnds::create),
    entry!(Crop, Full, true, iq::crop::create),
    entry!(Mnds, Fd, true, iq::mnds::create),
    entry!(Crop, Fd, true, iq::crop::create),
    entry!(Mnds, Display, true, iq::mnds::create),
    entry!(Crop, Display, true, iq::crop::create),
    entry!(Mnds, Ds4, true, iq::mnds::create),
    entry!(Crop, PixelRaw, true, iq::crop::create),
];

static V3_IQ_MODULES: [ModuleEntry; 8] = [
    entry!(Linearization, Common, true, iq::linearization::create),
    entry!(Lsc, Common, true, iq::lsc::create),
    entry!(Demosaic, Common, true, iq::demosaic::create),
    entry!(WhiteBalance, Common, true, iq::white_balance::create),
    entry!(Gamma, Common, true, iq::gamma::create),
    entry!(Mnds, Full, true, iq::mnds::create),
    entry!(Crop, Full, true, iq::crop::create),
    entry!(Crop, PixelRaw, true, iq::crop::create),
];

static V1_CAPABILITY: Capability = Capability {
    version: HwVersion::V1,
    iq_modules: &V1_IQ_MODULES,
    stats_modules: &STATS_MODULES,
    ubwc: UbwcVersions::V2,
    lossy_8bit_max: Dimension::new(0, 0),
    lossy_10bit_max: Dimension::new(0, 0),
    ica: IcaVersion::Ica10,
    ldc: false,
    max_output_width_full: 4928,
    max_output_width_fd: 1920,
    max_output_height: 4096,
    max_input_width: 4928,
    max_rdi_only: Dimension::new(16384, 16384),
    max_downscale: 8,
    dual: true,
    bus_read: false,
    max_clock_hz: 600_000_000,
    bhist_dims: Dimension::new(3072, 1),
    awb_bg_dims: Dimension::new(691200, 1),
    bf_dims: Dimension::new(5768, 1),
};

static V2_CAPABILITY: Capability = Capability {
    version: HwVersion::V2,
    iq_modules: &V2_IQ_MODULES,
    stats_modules: &STATS_MODULES,
    ubwc: UbwcVersions::V2.union(UbwcVersions::V3).union(UbwcVersions::V4),
    lossy_8bit_max: Dimension::new(3840, 2160),
    lossy_10bit_max: Dimension::new(1280, 720),
    ica: IcaVersion::Ica30,
    ldc: true,
    max_output_width_full: 5376,
    max_output_width_fd: 2304,
    max_output_height: 8192,
    max_input_width: 5376,
    max_rdi_only: Dimension::new(16384, 16384),
    max_downscale: 16,
    dual: true,
    bus_read: false,
    max_clock_hz: 720_000_000,
    bhist_dims: Dimension::new(3072, 1),
    awb_bg_dims: Dimension::new(691200, 1),
    bf_dims: Dimension::new(5768, 1),
};

static V3_CAPABILITY: Capability = Capability {
    version: HwVersion::V3,
    iq_modules: &V3_IQ_MODULES,
    stats_modules: &STATS_MODULES,
    ubwc: UbwcVersions::empty(),
    lossy_8bit_max: Dimension::new(0, 0),
    lossy_10bit_max: Dimension::new(0, 0),
    ica: IcaVersion::Ica20,
    ldc: false,
    max_output_width_full: 4096,
    max_output_width_fd: 1920,
    max_output_height: 4096,
    max_input_width: 4096,
    max_rdi_only: Dimension::new(8192, 8192),
    max_downscale: 16,
    dual: false,
    bus_read: true,
    max_clock_hz: 466_000_000,
    bhist_dims: Dimension::new(3072, 1),
    awb_bg_dims: Dimension::new(172800, 1),
    bf_dims: Dimension::new(2880, 1),
};
