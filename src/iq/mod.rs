// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! IQ module framework.
//!
//! Every IQ and stats module implements [`IspModule`]. Per request the node
//! calls [`IspModule::execute`], which validates inputs, recomputes only when
//! the module's dependencies changed, and always emits the module's commands
//! from its stored configuration. A module that did not recompute therefore
//! writes exactly what it wrote for the previous request.
//!
//! Modules never see whether the frame is split. They receive a
//! [`ProcessingContext`] naming the instance they are configuring and the
//! window of the frame that instance reads, and keep their state per
//! instance.
//!
//! Module results come back as a narrow [`ModuleOutput`]; only
//! [`CalculatedData::merge`] folds them into the request-wide aggregate.

pub mod bank;
pub mod crop;
pub mod demosaic;
pub mod gamma;
pub mod linearization;
pub mod lsc;
pub mod mnds;
pub mod white_balance;

pub use bank::LutBank;

use crate::{
    capability::{ModuleId, ModuleType, PipelinePath},
    error::{IfeError, Result},
    format::{Dimension, Format, Rect},
    hw::RegWrite,
    packet::{blob::DataPath, CommandBuffer},
    pipeline::ModuleEnable,
    sensor::SensorMode,
    split::{Instance, PortStripe, StripeConfig},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The frame one instance processes.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingContext<'a> {
    pub instance: Instance,
    /// Full sensor frame
    pub frame: Dimension,
    /// Columns read by this instance, in frame coordinates
    pub window: Rect,
    /// Columns this instance produces results for: the window less padding
    pub owned: Rect,
    /// Per-port output share of this instance, empty in single mode
    pub stripes: &'a [PortStripe],
}

impl ProcessingContext<'static> {
    pub fn single(frame: Dimension) -> Self {
        Self {
            instance: Instance::Common,
            frame,
            window: Rect::full(frame),
            owned: Rect::full(frame),
            stripes: &[],
        }
    }
}

impl ProcessingContext<'_> {
    pub fn is_dual(&self) -> bool {
        self.instance != Instance::Common
    }

    /// Output share of the port on `path`; the whole output in single mode.
    pub fn stripe(&self, path: PipelinePath, output: Dimension) -> StripeConfig {
        if !self.is_dual() {
            return StripeConfig {
                offset: 0,
                width: output.width,
            };
        }
        self.stripes
            .iter()
            .find(|s| s.path == path)
            .map(|s| s.stripe)
            .unwrap_or_default()
    }
}

/// An output port active for the current stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivePort {
    pub port: u32,
    pub path: PipelinePath,
    pub dims: Dimension,
    pub format: Format,
}

/// Channel gains applied by white balance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WbGains {
    pub r: f32,
    pub gr: f32,
    pub gb: f32,
    pub b: f32,
}

impl Default for WbGains {
    fn default() -> Self {
        Self {
            r: 1.0,
            gr: 1.0,
            gb: 1.0,
            b: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AwbMode {
    #[default]
    Auto,
    Manual,
    Off,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadingMode {
    Off,
    #[default]
    Fast,
    HighQuality,
}

/// Application and HAL controls for a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HalTags {
    /// Digital zoom region in sensor coordinates
    pub crop_region: Option<Rect>,
    pub awb_mode: AwbMode,
    pub manual_gains: Option<WbGains>,
    /// Contrast step, -5 to 5
    pub contrast: i8,
    pub ae_lock: bool,
    pub awb_lock: bool,
    pub shading: ShadingMode,
    /// Publish the lens shading map with the result
    pub shading_map: bool,
    pub hist_roi: Option<Rect>,
    pub af_rois: Vec<Rect>,
}

/// 3A results published for an earlier frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsUpdate {
    pub request_id: u64,
    pub awb_gains: WbGains,
    /// Correlated colour temperature, kelvin
    pub cct: u32,
    pub aec_gain: f32,
    pub lux_index: f32,
    /// AF algorithm's requested BF regions
    #[serde(default)]
    pub af_rois: Vec<Rect>,
}

impl StatsUpdate {
    pub fn neutral(request_id: u64) -> Self {
        Self {
            request_id,
            awb_gains: WbGains::default(),
            cct: 5000,
            aec_gain: 1.0,
            lux_index: 200.0,
            af_rois: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Usecase {
    #[default]
    Preview,
    Video,
    Snapshot,
}

/// Selects the tuning data set for a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TuningMode {
    pub usecase: Usecase,
    pub scene: u8,
}

/// Everything a module may read for one request.
#[derive(Debug, Clone, Copy)]
pub struct FrameInput<'a> {
    pub request_id: u64,
    pub sensor: &'a SensorMode,
    pub ports: &'a [ActivePort],
    pub hal: &'a HalTags,
    pub stats: Option<&'a StatsUpdate>,
    pub tuning: TuningMode,
    /// Recompute every module regardless of dependencies
    pub force_update: bool,
}

impl FrameInput<'_> {
    pub fn port(&self, path: PipelinePath) -> Option<&ActivePort> {
        self.ports.iter().find(|p| p.path == path)
    }

    /// Zoom region clipped to the sensor frame.
    pub fn crop_region(&self) -> Rect {
        let full = Rect::full(self.sensor.output);
        self.hal
            .crop_region
            .and_then(|c| c.intersect(&full))
            .unwrap_or(full)
    }
}

/// Remembers the inputs a module last computed from.
///
/// [`DependencyGate::check`] stores the new snapshot as pending; it becomes the
/// applied snapshot only on [`DependencyGate::commit`], so a failed
/// calculation is retried next request.
#[derive(Debug, Clone)]
pub struct DependencyGate<S> {
    applied: Option<S>,
    pending: Option<S>,
}

impl<S> Default for DependencyGate<S> {
    fn default() -> Self {
        Self {
            applied: None,
            pending: None,
        }
    }
}

impl<S: PartialEq> DependencyGate<S> {
    pub fn check(&mut self, snapshot: S, force: bool) -> bool {
        let changed = force || self.applied.as_ref() != Some(&snapshot);
        self.pending = Some(snapshot);
        changed
    }

    pub fn applied(&self) -> Option<&S> {
        self.applied.as_ref()
    }

    pub fn pending(&self) -> Option<&S> {
        self.pending.as_ref()
    }

    pub fn commit(&mut self) {
        if let Some(s) = self.pending.take() {
            self.applied = Some(s);
        }
    }
}

/// Write-master contribution of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WmDescriptor {
    pub path: DataPath,
    pub dims: Dimension,
    pub format: Format,
}

/// Region configuration reported by a stats module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsConfig {
    pub roi: Rect,
    /// Horizontal and vertical region count
    pub regions: Dimension,
}

/// Module-specific result of one execute call.
#[derive(Debug, Clone, PartialEq)]
pub enum ModuleData {
    None,
    Linearization { black_level: u32 },
    WhiteBalance { gains: WbGains },
    Lsc { grid: Dimension, map: Vec<u16> },
    Gamma { curve: Vec<u16> },
    Crop { applied: Rect, output: Dimension },
    Scale { input: Dimension, output: Dimension },
    Stats(StatsConfig),
}

/// Narrow output of a module for one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleOutput {
    pub enabled: bool,
    pub data: ModuleData,
    pub wm: Option<WmDescriptor>,
}

impl ModuleOutput {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            data: ModuleData::None,
            wm: None,
        }
    }

    pub fn enabled(data: ModuleData) -> Self {
        Self {
            enabled: true,
            data,
            wm: None,
        }
    }

    pub fn with_wm(mut self, wm: WmDescriptor) -> Self {
        self.wm = Some(wm);
        self
    }
}

/// Applied crop reported per output path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CropInfo {
    pub applied: Rect,
    pub output: Dimension,
}

/// Request-wide aggregate of module outputs, owned by the node.
///
/// Field ownership: `enables` and `failed` hold one flag per module id;
/// `crop` and `scale` are keyed by the crop and MNDS module's path; `gamma`
/// by the gamma module's path; `wb_gains`, `black_level` and `lsc` belong to
/// the white balance, linearization and LSC modules; `stats` is keyed by
/// the stats module type; `snapshots` by module id and instance.
#[derive(Debug, Clone, Default)]
pub struct CalculatedData {
    enables: ModuleEnable,
    failed: ModuleEnable,
    pub crop: BTreeMap<PipelinePath, CropInfo>,
    pub scale: BTreeMap<PipelinePath, (Dimension, Dimension)>,
    pub gamma: BTreeMap<PipelinePath, Vec<u16>>,
    pub wb_gains: Option<WbGains>,
    pub black_level: Option<u32>,
    pub lsc: Option<(Dimension, Vec<u16>)>,
    pub stats: BTreeMap<ModuleType, StatsConfig>,
    pub wm: Vec<WmDescriptor>,
    pub snapshots: BTreeMap<(ModuleId, Instance), Vec<RegWrite>>,
}

impl CalculatedData {
    /// Folds one module's output for one instance into the aggregate.
    pub fn merge(&mut self, id: ModuleId, instance: Instance, output: ModuleOutput) {
        if output.enabled {
            self.enables |= ModuleEnable::for_module(id);
        }
        if let Some(wm) = output.wm {
            match self
                .wm
                .iter_mut()
                .find(|w| w.path == wm.path && w.format == wm.format)
            {
                // The two instances each write their stripe of the same output.
                Some(w) if instance != Instance::Common => {
                    w.dims.width += wm.dims.width;
                    w.dims.height = w.dims.height.max(wm.dims.height);
                }
                _ => self.wm.push(wm),
            }
        }
        match output.data {
            ModuleData::None => {}
            ModuleData::Linearization { black_level } => self.black_level = Some(black_level),
            ModuleData::WhiteBalance { gains } => self.wb_gains = Some(gains),
            ModuleData::Lsc { grid, map } => self.lsc = Some((grid, map)),
            ModuleData::Gamma { curve } => {
                self.gamma.insert(id.path, curve);
            }
            ModuleData::Crop { applied, output } => {
                self.crop
                    .entry(id.path)
                    .and_modify(|c| {
                        c.applied = c.applied.union(&applied);
                        c.output.width += output.width;
                    })
                    .or_insert(CropInfo { applied, output });
            }
            ModuleData::Scale { input, output } => {
                self.scale.entry(id.path).or_insert((input, output));
            }
            ModuleData::Stats(config) => {
                self.stats
                    .entry(id.kind)
                    .and_modify(|s| {
                        s.roi = s.roi.union(&config.roi);
                        // Only the BG grid is divided between the cores.
                        if id.kind == ModuleType::AwbBg {
                            s.regions.width += config.regions.width;
                        } else {
                            s.regions.width = s.regions.width.max(config.regions.width);
                        }
                    })
                    .or_insert(config);
            }
        }
    }

    /// Drops a module from this request after a soft failure.
    pub fn disable(&mut self, id: ModuleId) {
        self.failed |= ModuleEnable::for_module(id);
    }

    /// Per-request enables with soft-failed modules removed.
    pub fn request_enables(&self) -> ModuleEnable {
        self.enables.difference(self.failed)
    }

    pub fn record_snapshot(&mut self, id: ModuleId, instance: Instance, regs: Vec<RegWrite>) {
        self.snapshots.insert((id, instance), regs);
    }
}

/// Contract implemented by every IQ and stats module.
pub trait IspModule: Send {
    fn id(&self) -> ModuleId;

    /// Rejects inputs the module cannot work with.
    fn validate_dependencies(&self, _input: &FrameInput<'_>, _ctx: &ProcessingContext<'_>) -> Result<()> {
        Ok(())
    }

    /// Whether the inputs this module depends on changed since its last
    /// calculation for `ctx.instance`.
    fn check_dependency_changed(&mut self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> bool;

    /// Recomputes the stored configuration. Double-buffered LUT modules
    /// toggle their bank here.
    fn run_calculation(&mut self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> Result<()>;

    /// Writes the stored configuration for `ctx.instance`.
    fn create_cmd_list(&self, ctx: &ProcessingContext<'_>, cmd: &mut CommandBuffer) -> Result<()>;

    fn update_internal_data(&self, ctx: &ProcessingContext<'_>) -> ModuleOutput;

    /// Register values last written for `instance`, for tuning dumps.
    fn dump_registers(&self, instance: Instance) -> Vec<RegWrite>;

    /// Bank last written for `instance`, for LUT modules.
    fn lut_bank(&self, _instance: Instance) -> Option<u8> {
        None
    }

    /// Resumes bank alternation from `next` after a flush read-back.
    fn resume_lut_bank(&mut self, _next: u8) {}

    fn execute(
        &mut self,
        input: &FrameInput<'_>,
        ctx: &ProcessingContext<'_>,
        cmd: &mut CommandBuffer,
    ) -> Result<ModuleOutput> {
        self.validate_dependencies(input, ctx)?;
        if self.check_dependency_changed(input, ctx) {
            self.run_calculation(input, ctx)?;
        }
        self.create_cmd_list(ctx, cmd)?;
        Ok(self.update_internal_data(ctx))
    }
}

/// Error for a module asked to emit before it ever calculated.
pub(crate) fn not_calculated(id: ModuleId, instance: Instance) -> IfeError {
    IfeError::InvalidArgument(format!("{id} has no configuration for {instance:?}"))
}

/// Packs two 16-bit fields into one register value.
pub(crate) fn pack16(lo: u32, hi: u32) -> u32 {
    (lo & 0xffff) | ((hi & 0xffff) << 16)
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::*;

    pub struct Fixture {
        pub sensor: SensorMode,
        pub ports: Vec<ActivePort>,
        pub hal: HalTags,
        pub stats: StatsUpdate,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self {
                sensor: SensorMode::new("test", Dimension::new(4000, 3000), 30.0),
                ports: vec![ActivePort {
                    port: 0,
                    path: PipelinePath::Full,
                    dims: Dimension::new(1920, 1080),
                    format: Format::Nv12,
                }],
                hal: HalTags::default(),
                stats: StatsUpdate::neutral(0),
            }
        }

        pub fn input(&self, request_id: u64) -> FrameInput<'_> {
            FrameInput {
                request_id,
                sensor: &self.sensor,
                ports: &self.ports,
                hal: &self.hal,
                stats: Some(&self.stats),
                tuning: TuningMode::default(),
                force_update: false,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_commits_only_on_success() {
        let mut gate = DependencyGate::default();
        assert!(gate.check(1u32, false));
        // Calculation failed, nothing committed.
        assert!(gate.check(1u32, false));
        gate.commit();
        assert!(!gate.check(1u32, false));
        assert!(gate.check(1u32, true));
        assert!(gate.check(2u32, false));
    }

    #[test]
    fn soft_failure_wins_over_enable() {
        let id = ModuleId::new(ModuleType::Bf, PipelinePath::Common);
        let mut data = CalculatedData::default();
        data.merge(id, Instance::Left, ModuleOutput::enabled(ModuleData::None));
        data.disable(id);
        assert!(!data.request_enables().contains(ModuleEnable::BF));
    }

    #[test]
    fn dual_crop_merges_stripes() {
        let id = ModuleId::new(ModuleType::Crop, PipelinePath::Full);
        let mut data = CalculatedData::default();
        data.merge(
            id,
            Instance::Left,
            ModuleOutput::enabled(ModuleData::Crop {
                applied: Rect::new(0, 0, 2000, 3000),
                output: Dimension::new(960, 1080),
            }),
        );
        data.merge(
            id,
            Instance::Right,
            ModuleOutput::enabled(ModuleData::Crop {
                applied: Rect::new(2000, 0, 2000, 3000),
                output: Dimension::new(960, 1080),
            }),
        );
        let crop = data.crop[&PipelinePath::Full];
        assert_eq!(crop.applied, Rect::new(0, 0, 4000, 3000));
        assert_eq!(crop.output, Dimension::new(1920, 1080));
    }
}
