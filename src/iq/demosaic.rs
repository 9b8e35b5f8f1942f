// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use super::{
    not_calculated, pack16, DependencyGate, FrameInput, IspModule, ModuleData, ModuleOutput,
    ProcessingContext, Usecase,
};
use crate::{
    capability::{ModuleCreateData, ModuleId},
    error::{IfeError, Result},
    hw::{ModuleRegion, RegWrite},
    packet::CommandBuffer,
    sensor::BayerPattern,
    split::{Instance, PerInstance},
};

const REG_COUNT: u32 = 6;

/// Interpolation weights and thresholds of one tuning set.
struct Tuning {
    weight: u32,
    noise: u32,
    edge: u32,
    lambda_g: u32,
    lambda_rb: u32,
}

const PREVIEW: Tuning = Tuning {
    weight: 0x80,
    noise: 24,
    edge: 128,
    lambda_g: 0x40,
    lambda_rb: 0x40,
};

const SNAPSHOT: Tuning = Tuning {
    weight: 0xc0,
    noise: 12,
    edge: 96,
    lambda_g: 0x60,
    lambda_rb: 0x50,
};

#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    pattern: BayerPattern,
    usecase: Usecase,
}

#[derive(Debug, Default)]
struct State {
    gate: DependencyGate<Snapshot>,
    regs: Option<[u32; REG_COUNT as usize]>,
}

pub struct Demosaic {
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
    Ok(Box::new(Demosaic {
        id: data.id,
        region: data.region,
        state: PerInstance::default(),
    }))
}

impl IspModule for Demosaic {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn check_dependency_changed(&mut self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> bool {
        let snapshot = Snapshot {
            pattern: input.sensor.pattern,
            usecase: input.tuning.usecase,
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
        let tuning = match snap.usecase {
            Usecase::Snapshot => &SNAPSHOT,
            Usecase::Preview | Usecase::Video => &PREVIEW,
        };
        state.regs = Some([
            1 | (snap.pattern as u32) << 1,
            tuning.weight,
            tuning.noise,
            tuning.edge,
            pack16(tuning.lambda_g, tuning.lambda_rb),
            0,
        ]);
        state.gate.commit();
        Ok(())
    }

    fn create_cmd_list(&self, ctx: &ProcessingContext<'_>, cmd: &mut CommandBuffer) -> Result<()> {
        let regs = self
            .state
            .get(ctx.instance)
            .regs
            .ok_or_else(|| not_calculated(self.id, ctx.instance))?;
        let mut burst = cmd.burst();
        for (i, value) in regs.iter().enumerate() {
            burst.write(self.region.reg(i as u32), *value);
        }
        burst.finish()
    }

    fn update_internal_data(&self, ctx: &ProcessingContext<'_>) -> ModuleOutput {
        match self.state.get(ctx.instance).regs {
            Some(_) => ModuleOutput::enabled(ModuleData::None),
            None => ModuleOutput::disabled(),
        }
    }

    fn dump_registers(&self, instance: Instance) -> Vec<RegWrite> {
        self.state
            .get(instance)
            .regs
            .map(|regs| {
                regs.iter()
                    .enumerate()
                    .map(|(i, v)| RegWrite::new(self.region.reg(i as u32), *v))
                    .collect()
            })
            .unwrap_or_default()
    }
}
