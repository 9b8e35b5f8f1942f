// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! M/N downscaler on an output path.

use super::{
    crop::port_geometry, not_calculated, pack16, DependencyGate, FrameInput, IspModule,
    ModuleData, ModuleOutput, ProcessingContext,
};
use crate::{
    capability::{ModuleCreateData, ModuleId},
    error::{IfeError, Result},
    format::Dimension,
    hw::{ModuleRegion, RegWrite},
    packet::CommandBuffer,
    split::{Instance, PerInstance},
};
use tracing::trace;

const REG_COUNT: u32 = 6;
const PHASE_Q: u32 = 14;
const PHASE_MASK: u64 = (1 << PHASE_Q) - 1;

#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    input: Dimension,
    output: Dimension,
    /// First output column of this core's stripe
    offset: u32,
}

#[derive(Debug, Clone, Copy)]
struct Config {
    regs: [u32; REG_COUNT as usize],
    input: Dimension,
    output: Dimension,
}

#[derive(Debug, Default)]
struct State {
    gate: DependencyGate<Option<Snapshot>>,
    config: Option<Config>,
    calculated: bool,
}

pub struct Mnds {
    id: ModuleId,
    region: &'static ModuleRegion,
    max_downscale: u32,
    state: PerInstance<State>,
}

pub fn create(data: &ModuleCreateData) -> Result<Box<dyn IspModule>> {
    if data.region.regs.count < REG_COUNT {
        return Err(IfeError::Unsupported(format!(
            "{} register map too small",
            data.id
        )));
    }
    Ok(Box::new(Mnds {
        id: data.id,
        region: data.region,
        max_downscale: data.max_downscale.max(1),
        state: PerInstance::default(),
    }))
}

impl Mnds {
    fn snapshot(&self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> Option<Snapshot> {
        let port = input.port(self.id.path)?;
        let (applied, output, _) = port_geometry(input, ctx, self.id.path)?;
        if applied.width == 0 || output.width == 0 {
            return None;
        }
        Some(Snapshot {
            input: applied.dimension(),
            output,
            offset: ctx.stripe(self.id.path, port.dims).offset,
        })
    }
}

impl IspModule for Mnds {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn validate_dependencies(&self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> Result<()> {
        let Some(snap) = self.snapshot(input, ctx) else {
            return Ok(());
        };
        if snap.output.width > snap.input.width || snap.output.height > snap.input.height {
            return Err(IfeError::OutOfBounds(format!(
                "{}: upscale {} -> {}",
                self.id, snap.input, snap.output
            )));
        }
        let limit = self.max_downscale as u64;
        if snap.input.width as u64 > snap.output.width as u64 * limit
            || snap.input.height as u64 > snap.output.height as u64 * limit
        {
            return Err(IfeError::OutOfBounds(format!(
                "{}: {} -> {} exceeds {}x downscale",
                self.id, snap.input, snap.output, self.max_downscale
            )));
        }
        Ok(())
    }

    fn check_dependency_changed(&mut self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> bool {
        let snapshot = self.snapshot(input, ctx);
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
        state.config = pending.map(|snap| {
            let h_step = ((snap.input.width as u64) << PHASE_Q) / snap.output.width as u64;
            let v_step = ((snap.input.height as u64) << PHASE_Q) / snap.output.height as u64;
            // A right stripe starts part way through a filter phase.
            let h_init = (snap.offset as u64 * h_step) & PHASE_MASK;
            trace!(id = %self.id, h_step, v_step, h_init, "scaler phases");
            Config {
                regs: [
                    1,
                    pack16(snap.input.width, snap.input.height),
                    pack16(snap.output.width, snap.output.height),
                    h_step as u32,
                    v_step as u32,
                    pack16(h_init as u32, 0),
                ],
                input: snap.input,
                output: snap.output,
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
        match self.state.get(ctx.instance).config {
            Some(c) => ModuleOutput::enabled(ModuleData::Scale {
                input: c.input,
                output: c.output,
            }),
            None => ModuleOutput::disabled(),
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
