// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-channel white balance gains.
//!
//! Gains come from the HAL in manual mode, from the latest 3A result in auto
//! mode, and are unity when AWB is off. While AWB is locked the last applied
//! gains are kept.

use super::{
    not_calculated, AwbMode, DependencyGate, FrameInput, IspModule, ModuleData, ModuleOutput,
    ProcessingContext, WbGains,
};
use crate::{
    capability::{ModuleCreateData, ModuleId},
    error::{IfeError, Result},
    hw::{ModuleRegion, RegWrite},
    packet::CommandBuffer,
    split::{Instance, PerInstance},
};

const REG_COUNT: u32 = 5;
const GAIN_Q: u32 = 7;
/// Largest gain the 12-bit Q7 fields hold.
const MAX_GAIN: f32 = 31.99;

fn to_q(gain: f32) -> u32 {
    (gain * (1 << GAIN_Q) as f32).round() as u32
}

fn from_q(value: u32) -> f32 {
    value as f32 / (1 << GAIN_Q) as f32
}

/// Gains in register units, r/gr/gb/b.
type QGains = [u32; 4];

fn quantize(g: &WbGains) -> QGains {
    [to_q(g.r), to_q(g.gr), to_q(g.gb), to_q(g.b)]
}

#[derive(Debug, Default)]
struct State {
    gate: DependencyGate<QGains>,
    applied: Option<QGains>,
}

pub struct WhiteBalance {
    id: ModuleId,
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
    Ok(Box::new(WhiteBalance {
        id: data.id,
        region: data.region,
        state: PerInstance::default(),
    }))
}

impl WhiteBalance {
    fn requested(&self, input: &FrameInput<'_>, instance: Instance) -> Result<WbGains> {
        if input.hal.awb_lock {
            if let Some(q) = self.state.get(instance).applied {
                return Ok(WbGains {
                    r: from_q(q[0]),
                    gr: from_q(q[1]),
                    gb: from_q(q[2]),
                    b: from_q(q[3]),
                });
            }
        }
        match input.hal.awb_mode {
            AwbMode::Off => Ok(WbGains::default()),
            AwbMode::Manual => input.hal.manual_gains.ok_or_else(|| {
                IfeError::InvalidArgument("manual AWB without gains".to_owned())
            }),
            AwbMode::Auto => Ok(input.stats.map(|s| s.awb_gains).unwrap_or_default()),
        }
    }
}

impl IspModule for WhiteBalance {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn validate_dependencies(&self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> Result<()> {
        let g = self.requested(input, ctx.instance)?;
        let valid = |v: f32| v.is_finite() && v > 0.0 && v <= MAX_GAIN;
        if ![g.r, g.gr, g.gb, g.b].into_iter().all(valid) {
            return Err(IfeError::InvalidArgument(format!(
                "white balance gains out of range: {g:?}"
            )));
        }
        Ok(())
    }

    fn check_dependency_changed(&mut self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> bool {
        // Validation already rejected a missing manual gain.
        let gains = self
            .requested(input, ctx.instance)
            .map(|g| quantize(&g))
            .unwrap_or_else(|_| quantize(&WbGains::default()));
        self.state
            .get_mut(ctx.instance)
            .gate
            .check(gains, input.force_update)
    }

    fn run_calculation(&mut self, _input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> Result<()> {
        let state = self.state.get_mut(ctx.instance);
        let gains = state
            .gate
            .pending()
            .copied()
            .ok_or_else(|| not_calculated(self.id, ctx.instance))?;
        state.applied = Some(gains);
        state.gate.commit();
        Ok(())
    }

    fn create_cmd_list(&self, ctx: &ProcessingContext<'_>, cmd: &mut CommandBuffer) -> Result<()> {
        let gains = self
            .state
            .get(ctx.instance)
            .applied
            .ok_or_else(|| not_calculated(self.id, ctx.instance))?;
        let mut burst = cmd.burst();
        burst.write(self.region.reg(0), 1);
        for (i, g) in gains.iter().enumerate() {
            burst.write(self.region.reg(i as u32 + 1), *g);
        }
        burst.finish()
    }

    fn update_internal_data(&self, ctx: &ProcessingContext<'_>) -> ModuleOutput {
        match self.state.get(ctx.instance).applied {
            Some(q) => ModuleOutput::enabled(ModuleData::WhiteBalance {
                gains: WbGains {
                    r: from_q(q[0]),
                    gr: from_q(q[1]),
                    gb: from_q(q[2]),
                    b: from_q(q[3]),
                },
            }),
            None => ModuleOutput::disabled(),
        }
    }

    fn dump_registers(&self, instance: Instance) -> Vec<RegWrite> {
        let Some(gains) = self.state.get(instance).applied else {
            return Vec::new();
        };
        std::iter::once(RegWrite::new(self.region.reg(0), 1))
            .chain(
                gains
                    .iter()
                    .enumerate()
                    .map(|(i, g)| RegWrite::new(self.region.reg(i as u32 + 1), *g)),
            )
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capability::{ModuleType, PipelinePath},
        hw::HwVersion,
        iq::test_util::Fixture,
    };

    fn module() -> Result<Box<dyn IspModule>> {
        let region = HwVersion::V1
            .registers()
            .module(ModuleType::WhiteBalance, PipelinePath::Common)
            .ok_or_else(|| IfeError::Unsupported("region".into()))?;
        create(&ModuleCreateData {
            id: region.id(),
            version: HwVersion::V1,
            region,
            max_downscale: 8,
        })
    }

    #[test]
    fn lock_holds_previous_gains() -> Result<()> {
        let mut fx = Fixture::new();
        let mut wb = module()?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(256);
        fx.stats.awb_gains.r = 2.0;
        wb.execute(&fx.input(1), &ctx, &mut cmd)?;

        fx.hal.awb_lock = true;
        fx.stats.awb_gains.r = 1.5;
        let out = wb.execute(&fx.input(2), &ctx, &mut cmd)?;
        assert!(matches!(out.data, ModuleData::WhiteBalance { gains } if gains.r == 2.0));
        Ok(())
    }

    #[test]
    fn manual_without_gains_is_soft_failure() -> Result<()> {
        let mut fx = Fixture::new();
        let mut wb = module()?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(256);
        fx.hal.awb_mode = AwbMode::Manual;
        let err = wb.execute(&fx.input(1), &ctx, &mut cmd).err();
        assert!(err.is_some_and(|e| e.is_module_soft_failure()));
        assert!(cmd.is_empty());
        Ok(())
    }
}
