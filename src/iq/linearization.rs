// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Black level subtraction and linearization.
//!
//! Eight knee points span `[black, white]`; each of the four Bayer channels
//! gets a slope table in the double-buffered DMI LUT.

use super::{
    not_calculated, DependencyGate, FrameInput, IspModule, LutBank, ModuleData, ModuleOutput,
    ProcessingContext,
};
use crate::{
    capability::{ModuleCreateData, ModuleId},
    error::{IfeError, Result},
    hw::{LutRegion, ModuleRegion, RegWrite},
    packet::CommandBuffer,
    sensor::BayerPattern,
    split::{Instance, PerInstance},
};

const REG_COUNT: u32 = 9;
const KNEE_POINTS: usize = 8;
const CHANNELS: usize = 4;
const SLOPE_Q: u32 = 12;
const LUT_WORDS: usize = CHANNELS * (KNEE_POINTS + 1);

/// Extra black level per unit of analog gain above 1x, in percent.
const DARK_CURRENT_PERCENT: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    black: u32,
    white: u32,
    pattern: BayerPattern,
}

#[derive(Debug, Clone)]
struct Config {
    regs: [u32; REG_COUNT as usize],
    lut: Vec<u32>,
    bank: u8,
    black: u32,
}

#[derive(Debug, Default)]
struct State {
    gate: DependencyGate<Snapshot>,
    config: Option<Config>,
    bank: LutBank,
}

pub struct Linearization {
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
    if data.region.regs.count < REG_COUNT || (lut.words as usize) < LUT_WORDS {
        return Err(IfeError::Unsupported(format!(
            "{} register map too small",
            data.id
        )));
    }
    Ok(Box::new(Linearization {
        id: data.id,
        region: data.region,
        lut,
        state: PerInstance::default(),
    }))
}

fn black_level(input: &FrameInput<'_>) -> u32 {
    let base = input.sensor.black_level as f32;
    let gain = input.stats.map_or(1.0, |s| s.aec_gain).max(1.0);
    (base * (1.0 + DARK_CURRENT_PERCENT / 100.0 * (gain - 1.0))).round() as u32
}

impl IspModule for Linearization {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn validate_dependencies(&self, input: &FrameInput<'_>, _ctx: &ProcessingContext<'_>) -> Result<()> {
        if black_level(input) >= input.sensor.white_level() {
            return Err(IfeError::InvalidArgument(format!(
                "black level {} at or above white level {}",
                black_level(input),
                input.sensor.white_level()
            )));
        }
        Ok(())
    }

    fn check_dependency_changed(&mut self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> bool {
        let snapshot = Snapshot {
            black: black_level(input),
            white: input.sensor.white_level(),
            pattern: input.sensor.pattern,
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

        let range = snap.white - snap.black;
        let mut regs = [0u32; REG_COUNT as usize];
        regs[0] = 1 | (snap.pattern as u32) << 1;
        for (i, reg) in regs[1..].iter_mut().enumerate() {
            *reg = snap.black + range * (i as u32 + 1) / KNEE_POINTS as u32;
        }

        let slope = ((snap.white as u64) << SLOPE_Q) / range as u64;
        let mut lut = Vec::with_capacity(LUT_WORDS);
        for _ in 0..CHANNELS {
            // Segment 0 sits below black and clips to zero.
            lut.push(0);
            lut.extend(std::iter::repeat(slope as u32).take(KNEE_POINTS));
        }

        let bank = state.bank.toggle();
        state.config = Some(Config {
            regs,
            lut,
            bank,
            black: snap.black,
        });
        state.gate.commit();
        Ok(())
    }

    fn create_cmd_list(&self, ctx: &ProcessingContext<'_>, cmd: &mut CommandBuffer) -> Result<()> {
        let config = self
            .state
            .get(ctx.instance)
            .config
            .as_ref()
            .ok_or_else(|| not_calculated(self.id, ctx.instance))?;
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
            Some(config) => ModuleOutput::enabled(ModuleData::Linearization {
                black_level: config.black,
            }),
            None => ModuleOutput::disabled(),
        }
    }

    fn dump_registers(&self, instance: Instance) -> Vec<RegWrite> {
        let Some(config) = &self.state.get(instance).config else {
            return Vec::new();
        };
        config
            .regs
            .iter()
            .enumerate()
            .map(|(i, v)| RegWrite::new(self.region.reg(i as u32), *v))
            .chain(std::iter::once(RegWrite::new(
                self.lut.bank_select,
                config.bank as u32,
            )))
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
        hw::HwVersion,
        iq::test_util::Fixture,
    };

    fn module() -> Result<Box<dyn IspModule>> {
        let region = HwVersion::V2
            .registers()
            .module(ModuleType::Linearization, PipelinePath::Common)
            .ok_or_else(|| IfeError::Unsupported("region".into()))?;
        create(&ModuleCreateData {
            id: region.id(),
            version: HwVersion::V2,
            region,
            max_downscale: 16,
        })
    }

    #[test]
    fn knee_points_span_range() -> Result<()> {
        let fx = Fixture::new();
        let mut lin = module()?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(1024);
        lin.execute(&fx.input(1), &ctx, &mut cmd)?;
        let regs = lin.dump_registers(Instance::Common);
        assert_eq!(regs[1].value, 64 + (1023 - 64) / 8);
        assert_eq!(regs[8].value, 1023);
        Ok(())
    }

    #[test]
    fn gain_change_rewrites_lut() -> Result<()> {
        let mut fx = Fixture::new();
        let mut lin = module()?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(4096);
        lin.execute(&fx.input(1), &ctx, &mut cmd)?;
        lin.execute(&fx.input(2), &ctx, &mut cmd)?;
        assert_eq!(lin.lut_bank(Instance::Common), Some(0));
        fx.stats.aec_gain = 16.0;
        lin.execute(&fx.input(3), &ctx, &mut cmd)?;
        assert_eq!(lin.lut_bank(Instance::Common), Some(1));
        Ok(())
    }
}
