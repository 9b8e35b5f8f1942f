// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Gamma curve, one 64-entry table per colour channel in a double-buffered
//! DMI LUT. Path instances (full, display) are disabled while their output
//! port is inactive.

use super::{
    not_calculated, pack16, DependencyGate, FrameInput, IspModule, LutBank, ModuleData,
    ModuleOutput, ProcessingContext, Usecase,
};
use crate::{
    capability::{ModuleCreateData, ModuleId, PipelinePath},
    error::{IfeError, Result},
    hw::{LutRegion, ModuleRegion, RegWrite},
    packet::CommandBuffer,
    split::{Instance, PerInstance},
};

const REG_COUNT: u32 = 2;
pub const GAMMA_ENTRIES: usize = 64;
const CHANNELS: usize = 3;
const OUT_MAX: f32 = 1023.0;
const BASE_EXPONENT: f32 = 1.0 / 2.2;
/// Exponent change per contrast step.
const CONTRAST_STEP: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    contrast: i8,
    usecase: Usecase,
}

#[derive(Debug, Clone)]
struct Config {
    curve: Vec<u16>,
    lut: Vec<u32>,
    bank: u8,
}

#[derive(Debug, Default)]
struct State {
    gate: DependencyGate<Option<Snapshot>>,
    config: Option<Config>,
    calculated: bool,
    bank: LutBank,
}

pub struct Gamma {
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
    if data.region.regs.count < REG_COUNT || (lut.words as usize) < GAMMA_ENTRIES * CHANNELS {
        return Err(IfeError::Unsupported(format!(
            "{} register map too small",
            data.id
        )));
    }
    Ok(Box::new(Gamma {
        id: data.id,
        region: data.region,
        lut,
        state: PerInstance::default(),
    }))
}

/// Output levels of the 64 curve knots.
pub fn curve(contrast: i8, usecase: Usecase) -> Vec<u16> {
    let contrast = contrast.clamp(-5, 5) as f32;
    // Video trades a little shadow detail for less noise.
    let bias = match usecase {
        Usecase::Video => 0.02,
        Usecase::Preview | Usecase::Snapshot => 0.0,
    };
    let exponent = BASE_EXPONENT * (1.0 + contrast * CONTRAST_STEP) + bias;
    (0..GAMMA_ENTRIES)
        .map(|i| {
            let x = i as f32 / (GAMMA_ENTRIES - 1) as f32;
            (x.powf(exponent) * OUT_MAX).round() as u16
        })
        .collect()
}

impl IspModule for Gamma {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn check_dependency_changed(&mut self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> bool {
        let active = self.id.path == PipelinePath::Common || input.port(self.id.path).is_some();
        let snapshot = active.then_some(Snapshot {
            contrast: input.hal.contrast,
            usecase: input.tuning.usecase,
        });
        self.state
            .get_mut(ctx.instance)
            .gate
            .check(snapshot, input.force_update)
    }

    fn run_calculation(&mut self, _input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> Result<()> {
        let state = self.state.get_mut(ctx.instance);
        let Some(pending) = state.gate.pending().copied() else {
            return Err(not_calculated(self.id, ctx.instance));
        };
        state.config = match pending {
            Some(snap) => {
                let curve = curve(snap.contrast, snap.usecase);
                // Each entry carries its level and the slope to the next knot.
                let table: Vec<u32> = curve
                    .iter()
                    .enumerate()
                    .map(|(i, v)| {
                        let next = curve.get(i + 1).copied().unwrap_or(*v);
                        pack16(*v as u32, next.saturating_sub(*v) as u32)
                    })
                    .collect();
                let lut = std::iter::repeat(table).take(CHANNELS).flatten().collect();
                Some(Config {
                    curve,
                    lut,
                    bank: state.bank.toggle(),
                })
            }
            None => None,
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
        burst
            .write(self.region.reg(0), 1 | ((CHANNELS as u32) << 4))
            .write(self.region.reg(1), (GAMMA_ENTRIES - 1) as u32)
            .write(self.lut.bank_select, config.bank as u32)
            .dmi(&self.lut, config.bank, &config.lut);
        burst.finish()
    }

    fn update_internal_data(&self, ctx: &ProcessingContext<'_>) -> ModuleOutput {
        match &self.state.get(ctx.instance).config {
            Some(c) => ModuleOutput::enabled(ModuleData::Gamma {
                curve: c.curve.clone(),
            }),
            None => ModuleOutput::disabled(),
        }
    }

    fn dump_registers(&self, instance: Instance) -> Vec<RegWrite> {
        match &self.state.get(instance).config {
            Some(c) => vec![
                RegWrite::new(self.region.reg(0), 1 | ((CHANNELS as u32) << 4)),
                RegWrite::new(self.region.reg(1), (GAMMA_ENTRIES - 1) as u32),
                RegWrite::new(self.lut.bank_select, c.bank as u32),
            ],
            None => Vec::new(),
        }
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
