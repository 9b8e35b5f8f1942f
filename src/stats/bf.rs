// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Bayer focus statistics.
//!
//! Up to 90 focus windows are programmed through a double-buffered DMI
//! table, two words per window. Windows come from the AF algorithm when it
//! published any, otherwise from the HAL, otherwise the centre third of the
//! frame.

use super::{owned_roi, stats_wm};
use crate::{
    capability::{ModuleCreateData, ModuleId},
    error::{IfeError, Result},
    format::{Dimension, Rect},
    hw::{HwVersion, LutRegion, ModuleRegion, RegWrite},
    iq::{
        not_calculated, pack16, DependencyGate, FrameInput, IspModule, LutBank, ModuleData,
        ModuleOutput, ProcessingContext, StatsConfig,
    },
    packet::CommandBuffer,
    split::{Instance, PerInstance},
};
use tracing::debug;

const REG_COUNT: u32 = 6;
pub const MAX_ROIS: usize = 90;
const WORDS_PER_ROI: usize = 2;
pub const MIN_BLOCK_HEIGHT: u32 = 16;
pub const MAX_BLOCK_HEIGHT: u32 = 1024;
const MIN_BLOCK_WIDTH: u32 = 8;
/// Horizontal and vertical filter taps, fixed tuning.
const H_FILTER: u32 = 0x0012_0c04;
const V_FILTER: u32 = 0x0008_0402;
const CORING: u32 = 0x10;

#[derive(Debug, Clone, PartialEq)]
struct Snapshot {
    /// Windows this core collects, clipped to its columns
    rois: Vec<Rect>,
    total: usize,
    window: Rect,
}

#[derive(Debug, Clone)]
struct Config {
    regs: [u32; REG_COUNT as usize],
    lut: Vec<u32>,
    bank: u8,
    stats: StatsConfig,
}

#[derive(Debug, Default)]
struct State {
    gate: DependencyGate<Snapshot>,
    config: Option<Config>,
    calculated: bool,
    bank: LutBank,
}

pub struct Bf {
    id: ModuleId,
    version: HwVersion,
    region: &'static ModuleRegion,
    lut: LutRegion,
    state: PerInstance<State>,
}

pub fn create(data: &ModuleCreateData) -> Result<Box<dyn IspModule>> {
    let lut = data
        .region
        .lut
        .ok_or_else(|| IfeError::Unsupported(format!("{} has no LUT region", data.id)))?;
    if data.region.regs.count < REG_COUNT || (lut.words as usize) < MAX_ROIS * WORDS_PER_ROI {
        return Err(IfeError::Unsupported(format!(
            "{} register map too small",
            data.id
        )));
    }
    Ok(Box::new(Bf {
        id: data.id,
        version: data.version,
        region: data.region,
        lut,
        state: PerInstance::default(),
    }))
}

/// Focus windows requested for this frame, in frame coordinates.
fn requested_rois(input: &FrameInput<'_>) -> Vec<Rect> {
    let frame = input.sensor.output;
    let from_af = input.stats.map(|s| s.af_rois.as_slice()).unwrap_or_default();
    let source = if !from_af.is_empty() {
        from_af
    } else {
        input.hal.af_rois.as_slice()
    };
    if source.is_empty() {
        return vec![Rect::new(
            frame.width / 3,
            frame.height / 3,
            frame.width / 3,
            frame.height / 3,
        )];
    }
    let full = Rect::full(frame);
    source.iter().filter_map(|r| r.intersect(&full)).collect()
}

impl IspModule for Bf {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn validate_dependencies(&self, input: &FrameInput<'_>, _ctx: &ProcessingContext<'_>) -> Result<()> {
        let rois = requested_rois(input);
        if rois.len() > MAX_ROIS {
            return Err(IfeError::InvalidArgument(format!(
                "{}: {} focus windows, at most {MAX_ROIS}",
                self.id,
                rois.len()
            )));
        }
        for roi in &rois {
            if !(MIN_BLOCK_HEIGHT..=MAX_BLOCK_HEIGHT).contains(&roi.height) {
                return Err(IfeError::InvalidArgument(format!(
                    "{}: block height {} outside [{MIN_BLOCK_HEIGHT}, {MAX_BLOCK_HEIGHT}]",
                    self.id, roi.height
                )));
            }
            if roi.width < MIN_BLOCK_WIDTH {
                return Err(IfeError::InvalidArgument(format!(
                    "{}: block width {} below {MIN_BLOCK_WIDTH}",
                    self.id, roi.width
                )));
            }
        }
        Ok(())
    }

    fn check_dependency_changed(&mut self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> bool {
        let requested = requested_rois(input);
        let snapshot = Snapshot {
            rois: requested
                .iter()
                .filter_map(|r| owned_roi(*r, ctx))
                .collect(),
            total: requested.len(),
            window: ctx.window,
        };
        self.state
            .get_mut(ctx.instance)
            .gate
            .check(snapshot, input.force_update)
    }

    fn run_calculation(&mut self, _input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> Result<()> {
        let state = self.state.get_mut(ctx.instance);
        let Some(snap) = state.gate.pending().cloned() else {
            return Err(not_calculated(self.id, ctx.instance));
        };
        state.config = match snap.rois.split_first() {
            None => None,
            Some((first, rest)) => {
                let roi = rest.iter().fold(*first, |acc, r| acc.union(r));
                let mut lut = Vec::with_capacity(MAX_ROIS * WORDS_PER_ROI);
                for r in &snap.rois {
                    let local = r.relative_to(&snap.window);
                    lut.push(pack16(local.left, local.top));
                    lut.push(pack16(local.width - 1, local.height - 1));
                }
                // Unused entries are zero, which the hardware treats as end of table.
                lut.resize(MAX_ROIS * WORDS_PER_ROI, 0);
                debug!(instance = ?ctx.instance, windows = snap.rois.len(), "focus windows");
                Some(Config {
                    regs: [
                        1,
                        snap.rois.len() as u32,
                        H_FILTER,
                        V_FILTER,
                        CORING,
                        pack16(snap.window.width, snap.window.height),
                    ],
                    lut,
                    bank: state.bank.toggle(),
                    stats: StatsConfig {
                        roi,
                        regions: Dimension::new(snap.total as u32, 1),
                    },
                })
            }
        };
        state.calculated = true;
        state.gate.commit();
        Ok(())
    }

    fn create_cmd_list(&self, ctx: &ProcessingContext<'_>, cmd: &mut CommandBuffer) -> Result<()> {
        let state = self.state.get(ctx.instance);
        if !state.calculated {
            return Err(not_calculated(self.id, ctx.instance));
        }
        let Some(config) = &state.config else {
            return Ok(());
        };
        let mut burst = cmd.burst();
        for (i, value) in config.regs.iter().enumerate() {
            burst.write(self.region.reg(i as u32), *value);
        }
        burst
            .write(self.lut.bank_select, config.bank as u32)
            .dmi(&self.lut, config.bank, &config.lut);
        burst.finish()
    }

    fn update_internal_data(&self, ctx: &ProcessingContext<'_>) -> ModuleOutput {
        let Some(config) = &self.state.get(ctx.instance).config else {
            return ModuleOutput::disabled();
        };
        let output = ModuleOutput::enabled(ModuleData::Stats(config.stats));
        match stats_wm(self.version, self.id.kind) {
            Some(wm) if ctx.instance != Instance::Right => output.with_wm(wm),
            _ => output,
        }
    }

    fn dump_registers(&self, instance: Instance) -> Vec<RegWrite> {
        let Some(c) = &self.state.get(instance).config else {
            return Vec::new();
        };
        c.regs
            .iter()
            .enumerate()
            .map(|(i, v)| RegWrite::new(self.region.reg(i as u32), *v))
            .chain(std::iter::once(RegWrite::new(self.lut.bank_select, c.bank as u32)))
            .collect()
    }

    fn lut_bank(&self, instance: Instance) -> Option<u8> {
        self.state.get(instance).config.as_ref().map(|c| c.bank)
    }

    fn resume_lut_bank(&mut self, next: u8) {
        for state in self.state.iter_mut() {
            state.bank.resume_at(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capability::{ModuleType, PipelinePath},
        iq::test_util::Fixture,
    };

    fn module() -> Result<Box<dyn IspModule>> {
        let region = HwVersion::V2
            .registers()
            .module(ModuleType::Bf, PipelinePath::Common)
            .ok_or_else(|| IfeError::Unsupported("region".into()))?;
        create(&ModuleCreateData {
            id: region.id(),
            version: HwVersion::V2,
            region,
            max_downscale: 16,
        })
    }

    #[test]
    fn centre_third_by_default() -> Result<()> {
        let fx = Fixture::new();
        let mut bf = module()?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(1024);
        let out = bf.execute(&fx.input(1), &ctx, &mut cmd)?;
        assert_eq!(
            out.data,
            ModuleData::Stats(StatsConfig {
                roi: Rect::new(1333, 1000, 1333, 1000),
                regions: Dimension::new(1, 1),
            })
        );
        Ok(())
    }

    #[test]
    fn af_windows_win_over_hal() -> Result<()> {
        let mut fx = Fixture::new();
        fx.hal.af_rois = vec![Rect::new(0, 0, 400, 400)];
        fx.stats.af_rois = vec![Rect::new(100, 100, 200, 200), Rect::new(800, 100, 200, 200)];
        let mut bf = module()?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(1024);
        bf.execute(&fx.input(1), &ctx, &mut cmd)?;
        assert_eq!(bf.dump_registers(Instance::Common)[1].value, 2);
        Ok(())
    }

    #[test]
    fn block_height_is_validated() -> Result<()> {
        let mut fx = Fixture::new();
        fx.hal.af_rois = vec![Rect::new(0, 0, 400, 8)];
        let mut bf = module()?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(1024);
        assert!(matches!(
            bf.execute(&fx.input(1), &ctx, &mut cmd),
            Err(IfeError::InvalidArgument(_))
        ));
        Ok(())
    }

    #[test]
    fn bank_follows_window_changes() -> Result<()> {
        let mut fx = Fixture::new();
        let mut bf = module()?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(4096);
        bf.execute(&fx.input(1), &ctx, &mut cmd)?;
        bf.execute(&fx.input(2), &ctx, &mut cmd)?;
        assert_eq!(bf.lut_bank(Instance::Common), Some(0));
        fx.stats.af_rois = vec![Rect::new(64, 64, 256, 256)];
        bf.execute(&fx.input(3), &ctx, &mut cmd)?;
        assert_eq!(bf.lut_bank(Instance::Common), Some(1));
        Ok(())
    }
}
