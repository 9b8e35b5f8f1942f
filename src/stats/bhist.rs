// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Bayer histogram over a HAL region of interest, the full frame by default.

use super::{owned_roi, stats_wm};
use crate::{
    capability::{ModuleCreateData, ModuleId},
    error::{IfeError, Result},
    format::{Dimension, Rect},
    hw::{HwVersion, ModuleRegion, RegWrite},
    iq::{
        not_calculated, pack16, DependencyGate, FrameInput, IspModule, ModuleData, ModuleOutput,
        ProcessingContext, StatsConfig,
    },
    packet::CommandBuffer,
    split::{Instance, PerInstance},
};

const REG_COUNT: u32 = 3;
/// Green channels only.
const CHANNEL_SELECT: u32 = 0b0110;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    roi: Option<Rect>,
    window: Rect,
}

#[derive(Debug, Clone, Copy)]
struct Config {
    regs: [u32; REG_COUNT as usize],
    roi: Rect,
}

#[derive(Debug, Default)]
struct State {
    gate: DependencyGate<Snapshot>,
    config: Option<Config>,
    calculated: bool,
}

pub struct BHist {
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
    Ok(Box::new(BHist {
        id: data.id,
        version: data.version,
        region: data.region,
        state: PerInstance::default(),
    }))
}

impl IspModule for BHist {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn check_dependency_changed(&mut self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> bool {
        let full = Rect::full(input.sensor.output);
        let roi = input
            .hal
            .hist_roi
            .and_then(|r| r.intersect(&full))
            .unwrap_or(full);
        let snapshot = Snapshot {
            roi: owned_roi(roi, ctx),
            window: ctx.window,
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
        state.config = snap.roi.map(|roi| {
            let local = roi.relative_to(&snap.window);
            Config {
                regs: [
                    1 | (CHANNEL_SELECT << 4),
                    pack16(local.left, local.top),
                    pack16(local.width - 1, local.height - 1),
                ],
                roi,
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
        let output = ModuleOutput::enabled(ModuleData::Stats(StatsConfig {
            roi: config.roi,
            regions: Dimension::new(1, 1),
        }));
        match stats_wm(self.version, self.id.kind) {
            // Both cores write into the one stats buffer.
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
        iq::test_util::Fixture,
    };

    #[test]
    fn roi_outside_core_disables_it() -> Result<()> {
        let region = HwVersion::V2
            .registers()
            .module(ModuleType::BHist, PipelinePath::Common)
            .ok_or_else(|| IfeError::Unsupported("region".into()))?;
        let mut bhist = create(&ModuleCreateData {
            id: region.id(),
            version: HwVersion::V2,
            region,
            max_downscale: 16,
        })?;
        let mut fx = Fixture::new();
        fx.hal.hist_roi = Some(Rect::new(100, 100, 400, 400));
        let right = ProcessingContext {
            instance: Instance::Right,
            frame: fx.sensor.output,
            window: Rect::new(1936, 0, 2064, 3000),
            owned: Rect::new(2000, 0, 2000, 3000),
            stripes: &[],
        };
        let mut cmd = CommandBuffer::with_capacity(64);
        let out = bhist.execute(&fx.input(1), &right, &mut cmd)?;
        assert!(!out.enabled);
        assert!(cmd.is_empty());
        Ok(())
    }
}
