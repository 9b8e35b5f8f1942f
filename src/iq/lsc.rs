// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Lens shading correction.
//!
//! A 17x13 gain mesh covers the full sensor frame. Falloff follows a radial
//! model whose per-channel strength depends on the colour temperature from
//! 3A. Each core receives the whole mesh and the mesh position of the first
//! column of its window.

use super::{
    not_calculated, pack16, DependencyGate, FrameInput, IspModule, LutBank, ModuleData,
    ModuleOutput, ProcessingContext, ShadingMode,
};
use crate::{
    capability::{ModuleCreateData, ModuleId},
    error::{IfeError, Result},
    format::Dimension,
    hw::{LutRegion, ModuleRegion, RegWrite},
    packet::CommandBuffer,
    split::{Instance, PerInstance},
};
use tracing::trace;

const REG_COUNT: u32 = 6;
pub const MESH: Dimension = Dimension::new(17, 13);
const MESH_POINTS: usize = (MESH.width * MESH.height) as usize;
const GAIN_Q: f32 = 1024.0;
const CCT_BUCKET: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    frame: Dimension,
    window_left: u32,
    cct: u32,
    mode: ShadingMode,
}

#[derive(Debug, Clone)]
struct Config {
    regs: [u32; REG_COUNT as usize],
    /// Four Q10 gains per mesh point, r/gr/gb/b
    gains: Vec<u16>,
    lut: Vec<u32>,
    bank: u8,
}

#[derive(Debug, Default)]
struct State {
    gate: DependencyGate<Snapshot>,
    config: Option<Config>,
    calculated: bool,
    bank: LutBank,
}

pub struct Lsc {
    id: ModuleId,
    region: &'static ModuleRegion,
    lut: LutRegion,
    state: PerInstance<State>,
}

pub fn create(data: &ModuleCreateData) -> Result<Box<dyn IspModule>> {
    let lut = data
        .region
        .lut
        .ok_or_else(|| IfeError::Unsupported(format!("{} has no LUT region", data.id)))?;
    if data.region.regs.count < REG_COUNT || (lut.words as usize) < MESH_POINTS * 2 {
        return Err(IfeError::Unsupported(format!(
            "{} register map too small",
            data.id
        )));
    }
    Ok(Box::new(Lsc {
        id: data.id,
        region: data.region,
        lut,
        state: PerInstance::default(),
    }))
}

/// Radial falloff strength per channel; warmer light shades red harder.
fn channel_strength(cct: u32, mode: ShadingMode) -> [f32; 4] {
    let warm = ((5000.0 - cct as f32) / 10000.0).clamp(-0.15, 0.25);
    let scale = match mode {
        ShadingMode::HighQuality => 1.0,
        ShadingMode::Fast => 0.8,
        ShadingMode::Off => 0.0,
    };
    [
        (0.45 + warm) * scale,
        0.38 * scale,
        0.38 * scale,
        (0.42 - warm / 2.0) * scale,
    ]
}

fn mesh_gains(cct: u32, mode: ShadingMode) -> Vec<u16> {
    let strength = channel_strength(cct, mode);
    let cx = (MESH.width - 1) as f32 / 2.0;
    let cy = (MESH.height - 1) as f32 / 2.0;
    let max_r2 = cx * cx + cy * cy;
    let mut gains = Vec::with_capacity(MESH_POINTS * 4);
    for y in 0..MESH.height {
        for x in 0..MESH.width {
            let dx = x as f32 - cx;
            let dy = y as f32 - cy;
            let r2 = (dx * dx + dy * dy) / max_r2;
            gains.extend(
                strength
                    .iter()
                    .map(|s| ((1.0 + s * r2) * GAIN_Q).round().min(u16::MAX as f32) as u16),
            );
        }
    }
    gains
}

impl IspModule for Lsc {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn check_dependency_changed(&mut self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> bool {
        let state = self.state.get_mut(ctx.instance);
        // Converged 3A: keep the mesh while exposure and colour are locked.
        if input.hal.ae_lock && input.hal.awb_lock && state.gate.applied().is_some() && !input.force_update {
            return false;
        }
        let cct = input.stats.map_or(5000, |s| s.cct);
        let snapshot = Snapshot {
            frame: ctx.frame,
            window_left: ctx.window.left,
            cct: (cct + CCT_BUCKET / 2) / CCT_BUCKET * CCT_BUCKET,
            mode: input.hal.shading,
        };
        state.gate.check(snapshot, input.force_update)
    }

    fn run_calculation(&mut self, _input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> Result<()> {
        let state = self.state.get_mut(ctx.instance);
        let Some(snap) = state.gate.pending().copied() else {
            return Err(not_calculated(self.id, ctx.instance));
        };
        state.config = if snap.mode == ShadingMode::Off {
            None
        } else {
            let block_w = snap.frame.width.div_ceil(MESH.width - 1).max(1);
            let block_h = snap.frame.height.div_ceil(MESH.height - 1).max(1);
            let init_block = snap.window_left / block_w;
            let init_pixel = snap.window_left % block_w;
            trace!(block_w, block_h, init_block, init_pixel, "shading mesh");

            let gains = mesh_gains(snap.cct, snap.mode);
            let lut = gains
                .chunks_exact(4)
                .flat_map(|g| {
                    [
                        pack16(g[0] as u32, g[1] as u32),
                        pack16(g[2] as u32, g[3] as u32),
                    ]
                })
                .collect();
            Some(Config {
                regs: [
                    1,
                    pack16(block_w, block_h),
                    pack16(init_block, init_pixel),
                    0,
                    pack16((1 << 20) / block_w, (1 << 20) / block_h),
                    pack16(MESH.width, MESH.height),
                ],
                gains,
                lut,
                bank: state.bank.toggle(),
            })
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
        match &self.state.get(ctx.instance).config {
            Some(c) => ModuleOutput::enabled(ModuleData::Lsc {
                grid: MESH,
                // Published only when the request asks for the shading map.
                map: c.gains.clone(),
            }),
            None => ModuleOutput::disabled(),
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
        format::Rect,
        hw::HwVersion,
        iq::test_util::Fixture,
    };

    fn module() -> Result<Box<dyn IspModule>> {
        let region = HwVersion::V1
            .registers()
            .module(ModuleType::Lsc, PipelinePath::Common)
            .ok_or_else(|| IfeError::Unsupported("region".into()))?;
        create(&ModuleCreateData {
            id: region.id(),
            version: HwVersion::V1,
            region,
            max_downscale: 8,
        })
    }

    #[test]
    fn corners_get_more_gain() {
        let gains = mesh_gains(3000, ShadingMode::HighQuality);
        assert_eq!(gains.len(), MESH_POINTS * 4);
        let centre = ((MESH.height / 2) * MESH.width + MESH.width / 2) as usize * 4;
        assert_eq!(gains[centre], 1024);
        assert!(gains[0] > gains[1], "red falls off harder under warm light");
    }

    #[test]
    fn locked_3a_skips_recalculation() -> Result<()> {
        let mut fx = Fixture::new();
        let mut lsc = module()?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(4096);
        lsc.execute(&fx.input(1), &ctx, &mut cmd)?;
        fx.hal.ae_lock = true;
        fx.hal.awb_lock = true;
        fx.stats.cct = 2800;
        lsc.execute(&fx.input(2), &ctx, &mut cmd)?;
        assert_eq!(lsc.lut_bank(Instance::Common), Some(0));
        Ok(())
    }

    #[test]
    fn shading_map_report_keeps_bank() -> Result<()> {
        let mut fx = Fixture::new();
        let mut lsc = module()?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(4096);
        lsc.execute(&fx.input(1), &ctx, &mut cmd)?;
        let bank = lsc.lut_bank(Instance::Common);
        fx.hal.shading_map = !fx.hal.shading_map;
        let output = lsc.execute(&fx.input(2), &ctx, &mut cmd)?;
        assert_eq!(lsc.lut_bank(Instance::Common), bank);
        assert!(matches!(output.data, ModuleData::Lsc { ref map, .. } if !map.is_empty()));
        Ok(())
    }

    #[test]
    fn right_core_starts_mid_mesh() -> Result<()> {
        let fx = Fixture::new();
        let mut lsc = module()?;
        let ctx = ProcessingContext {
            instance: Instance::Right,
            frame: fx.sensor.output,
            window: Rect::new(1936, 0, 2064, 3000),
            owned: Rect::new(2000, 0, 2000, 3000),
            stripes: &[],
        };
        let mut cmd = CommandBuffer::with_capacity(4096);
        lsc.execute(&fx.input(1), &ctx, &mut cmd)?;
        let regs = lsc.dump_registers(Instance::Right);
        // 4000 / 16 = 250 pixel blocks
        assert_eq!(regs[2].value, 7 | (186 << 16));
        Ok(())
    }

    #[test]
    fn off_disables() -> Result<()> {
        let mut fx = Fixture::new();
        fx.hal.shading = ShadingMode::Off;
        let mut lsc = module()?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(4096);
        assert!(!lsc.execute(&fx.input(1), &ctx, &mut cmd)?.enabled);
        Ok(())
    }
}
