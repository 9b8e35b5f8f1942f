// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! AWB Bayer grid: per-region channel sums over the whole frame.
//!
//! The grid comes from the chip's default stats configuration. In dual mode
//! the grid columns are divided between the cores in proportion to the frame
//! columns each core owns, so the two halves tile the frame exactly.

use super::stats_wm;
use crate::{
    capability::{ModuleCreateData, ModuleId},
    error::{IfeError, Result},
    format::{even_floor, Dimension, Rect},
    hw::{HwVersion, ModuleRegion, RegWrite},
    iq::{
        not_calculated, pack16, DependencyGate, FrameInput, IspModule, ModuleData, ModuleOutput,
        ProcessingContext, StatsConfig,
    },
    packet::CommandBuffer,
    pipeline,
    split::{Instance, PerInstance},
};
use tracing::trace;

const REG_COUNT: u32 = 5;
const MIN_REGION: u32 = 2;
/// Pixels above this level are excluded from the sums, 14-bit.
const SATURATION: u32 = 0x3f00;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    frame: Dimension,
    window: Rect,
    owned: Rect,
}

#[derive(Debug, Clone, Copy)]
struct Config {
    regs: [u32; REG_COUNT as usize],
    stats: StatsConfig,
}

#[derive(Debug, Default)]
struct State {
    gate: DependencyGate<Snapshot>,
    config: Option<Config>,
    calculated: bool,
}

pub struct AwbBg {
    id: ModuleId,
    version: HwVersion,
    region: &'static ModuleRegion,
    state: PerInstance<State>,
}

pub fn create(data: &ModuleCreateData) -> Result<Box<dyn IspModule>> {
    if data.region.regs.count < REG_COUNT {
        return Err(IfeError::Unsupported(format!(
            "{} register map too small",
            data.id
        )));
    }
    Ok(Box::new(AwbBg {
        id: data.id,
        version: data.version,
        region: data.region,
        state: PerInstance::default(),
    }))
}

/// First grid column and column count of the regions starting in `owned`.
fn core_columns(columns: u32, region_w: u32, owned: &Rect) -> (u32, u32) {
    if region_w == 0 {
        return (0, 0);
    }
    let first = owned.left.div_ceil(region_w).min(columns);
    let last = owned.right().div_ceil(region_w).min(columns);
    (first, last - first)
}

impl IspModule for AwbBg {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn validate_dependencies(&self, input: &FrameInput<'_>, _ctx: &ProcessingContext<'_>) -> Result<()> {
        let frame = input.sensor.output;
        let Some(grid) = pipeline::default_stats_config(self.version, self.id.kind, frame) else {
            return Err(IfeError::Unsupported(format!("{} has no default grid", self.id)));
        };
        let region = Dimension::new(
            frame.width / grid.regions.width.max(1),
            frame.height / grid.regions.height.max(1),
        );
        if region.width < MIN_REGION || region.height < MIN_REGION {
            return Err(IfeError::InvalidArgument(format!(
                "{}: {} frame gives {} regions",
                self.id, frame, region
            )));
        }
        Ok(())
    }

    fn check_dependency_changed(&mut self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> bool {
        let snapshot = Snapshot {
            frame: input.sensor.output,
            window: ctx.window,
            owned: ctx.owned,
        };
        self.state
            .get_mut(ctx.instance)
            .gate
            .check(snapshot, input.force_update)
    }

    fn run_calculation(&mut self, _input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> Result<()> {
        let state = self.state.get_mut(ctx.instance);
        let Some(snap) = state.gate.pending().copied() else {
            return Err(not_calculated(self.id, ctx.instance));
        };
        let Some(grid) = pipeline::default_stats_config(self.version, self.id.kind, snap.frame) else {
            return Err(not_calculated(self.id, ctx.instance));
        };
        let region_w = even_floor(snap.frame.width / grid.regions.width.max(1));
        let region_h = even_floor(snap.frame.height / grid.regions.height.max(1));
        let (first, columns) = core_columns(grid.regions.width, region_w, &snap.owned);
        trace!(instance = ?ctx.instance, first, columns, region_w, region_h, "bayer grid");

        state.config = (columns > 0).then(|| {
            let roi = Rect::new(
                first * region_w,
                0,
                columns * region_w,
                region_h * grid.regions.height,
            );
            let local = roi.relative_to(&snap.window);
            Config {
                regs: [
                    1,
                    pack16(local.left, local.top),
                    pack16(region_w - 1, region_h - 1),
                    pack16(columns - 1, grid.regions.height - 1),
                    SATURATION,
                ],
                stats: StatsConfig {
                    roi,
                    regions: Dimension::new(columns, grid.regions.height),
                },
            }
        });
        state.calculated = true;
        state.gate.commit();
        Ok(())
    }

    fn create_cmd_list(&self, ctx: &ProcessingContext<'_>, cmd: &mut CommandBuffer) -> Result<()> {
        let state = self.state.get(ctx.instance);
        if !state.calculated {
            return Err(not_calculated(self.id, ctx.instance));
        }
        let Some(config) = state.config else {
            return Ok(());
        };
        let mut burst = cmd.burst();
        for (i, value) in config.regs.iter().enumerate() {
            burst.write(self.region.reg(i as u32), *value);
        }
        burst.finish()
    }

    fn update_internal_data(&self, ctx: &ProcessingContext<'_>) -> ModuleOutput {
        let Some(config) = self.state.get(ctx.instance).config else {
            return ModuleOutput::disabled();
        };
        let output = ModuleOutput::enabled(ModuleData::Stats(config.stats));
        match stats_wm(self.version, self.id.kind) {
            Some(wm) if ctx.instance != Instance::Right => output.with_wm(wm),
            _ => output,
        }
    }

    fn dump_registers(&self, instance: Instance) -> Vec<RegWrite> {
        self.state
            .get(instance)
            .config
            .map(|c| {
                c.regs
                    .iter()
                    .enumerate()
                    .map(|(i, v)| RegWrite::new(self.region.reg(i as u32), *v))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capability::{ModuleType, PipelinePath},
        iq::{test_util::Fixture, CalculatedData},
    };

    fn module(version: HwVersion) -> Result<Box<dyn IspModule>> {
        let region = version
            .registers()
            .module(ModuleType::AwbBg, PipelinePath::Common)
            .ok_or_else(|| IfeError::Unsupported("region".into()))?;
        create(&ModuleCreateData {
            id: region.id(),
            version,
            region,
            max_downscale: 16,
        })
    }

    #[test]
    fn dual_halves_tile_the_grid() -> Result<()> {
        let fx = Fixture::new();
        let mut bg = module(HwVersion::V2)?;
        let frame = fx.sensor.output;
        let left = ProcessingContext {
            instance: Instance::Left,
            frame,
            window: Rect::new(0, 0, 2064, 3000),
            owned: Rect::new(0, 0, 2000, 3000),
            stripes: &[],
        };
        let right = ProcessingContext {
            instance: Instance::Right,
            frame,
            window: Rect::new(1936, 0, 2064, 3000),
            owned: Rect::new(2000, 0, 2000, 3000),
            stripes: &[],
        };
        let mut cmd = CommandBuffer::with_capacity(64);
        let mut data = CalculatedData::default();
        for ctx in [left, right] {
            let out = bg.execute(&fx.input(1), &ctx, &mut cmd)?;
            data.merge(bg.id(), ctx.instance, out);
        }
        let stats = data.stats[&ModuleType::AwbBg];
        assert_eq!(stats.regions, Dimension::new(64, 48));
        // 4000 / 64 = 62 pixel columns, evened
        assert_eq!(stats.roi.width, 64 * 62);
        // The column straddling the split belongs to the left core.
        assert_eq!(bg.dump_registers(Instance::Right)[1].value & 0xffff, 33 * 62 - 1936);
        assert_eq!(data.wm.len(), 1);
        Ok(())
    }

    #[test]
    fn tiny_frame_is_rejected() -> Result<()> {
        let mut fx = Fixture::new();
        fx.sensor.output = Dimension::new(96, 64);
        let mut bg = module(HwVersion::V1)?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(64);
        assert!(matches!(
            bg.execute(&fx.input(1), &ctx, &mut cmd),
            Err(IfeError::InvalidArgument(_))
        ));
        Ok(())
    }
}
