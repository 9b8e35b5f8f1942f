// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Output crop.
//!
//! The HAL zoom region is trimmed to the output aspect ratio around its
//! centre. In dual mode each core crops only the input columns that feed its
//! output stripe, expressed relative to the window it reads.

use super::{
    not_calculated, pack16, DependencyGate, FrameInput, IspModule, ModuleData, ModuleOutput,
    ProcessingContext, WmDescriptor,
};
use crate::{
    capability::{ModuleCreateData, ModuleId, PipelinePath},
    error::{IfeError, Result},
    format::{even_floor, Dimension, Format, Rect},
    hw::{ModuleRegion, RegWrite},
    packet::CommandBuffer,
    split::{Instance, PerInstance, StripeConfig},
};

const REG_COUNT: u32 = 4;

/// Zoom region matched to the output aspect ratio, in frame coordinates.
pub(crate) fn zoom_window(crop: Rect, output: Dimension) -> Rect {
    if output.is_zero() || crop.width == 0 || crop.height == 0 {
        return crop;
    }
    let (cw, ch) = (crop.width as u64, crop.height as u64);
    let (ow, oh) = (output.width as u64, output.height as u64);
    if cw * oh > ch * ow {
        let width = even_floor((ch * ow / oh) as u32).max(2);
        Rect::new(crop.left + (crop.width - width) / 2, crop.top, width, crop.height)
    } else {
        let height = even_floor((cw * oh / ow) as u32).max(2);
        Rect::new(crop.left, crop.top + (crop.height - height) / 2, crop.width, height)
    }
}

/// Input columns that produce `stripe` of an output scaled from `zoom`,
/// clipped to the core's window.
pub(crate) fn stripe_input(zoom: Rect, output: Dimension, stripe: StripeConfig, window: &Rect) -> Rect {
    if output.width == 0 {
        return zoom;
    }
    let (zw, ow) = (zoom.width as u64, output.width as u64);
    let left = zoom.left + (stripe.offset as u64 * zw / ow) as u32;
    let right = zoom.left + ((stripe.offset + stripe.width) as u64 * zw).div_ceil(ow) as u32;
    let right = right.min(zoom.right()).max(left);
    let columns = Rect::new(left, zoom.top, right - left, zoom.height);
    columns
        .intersect(window)
        .unwrap_or(Rect::new(left, zoom.top, 0, 0))
}

/// Region and output size one core produces for the port on `path`.
pub(crate) fn port_geometry(
    input: &FrameInput<'_>,
    ctx: &ProcessingContext<'_>,
    path: PipelinePath,
) -> Option<(Rect, Dimension, Format)> {
    let port = input.port(path)?;
    let zoom = zoom_window(input.crop_region(), port.dims);
    let stripe = ctx.stripe(path, port.dims);
    let applied = stripe_input(zoom, port.dims, stripe, &ctx.window);
    Some((applied, Dimension::new(stripe.width, port.dims.height), port.format))
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Snapshot {
    geometry: Option<(Rect, Dimension, Format)>,
    window: Rect,
}

#[derive(Debug, Clone, Copy)]
struct Config {
    regs: [u32; REG_COUNT as usize],
    applied: Rect,
    output: Dimension,
    format: Format,
}

#[derive(Debug, Default)]
struct State {
    gate: DependencyGate<Snapshot>,
    config: Option<Config>,
    calculated: bool,
}

pub struct Crop {
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
    Ok(Box::new(Crop {
        id: data.id,
        region: data.region,
        state: PerInstance::default(),
    }))
}

impl IspModule for Crop {
    fn id(&self) -> ModuleId {
        self.id
    }

    fn check_dependency_changed(&mut self, input: &FrameInput<'_>, ctx: &ProcessingContext<'_>) -> bool {
        let snapshot = Snapshot {
            geometry: port_geometry(input, ctx, self.id.path),
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
        state.config = match snap.geometry {
            Some((applied, output, format)) if applied.width > 0 && output.width > 0 => {
                let local = applied.relative_to(&snap.window);
                Some(Config {
                    regs: [
                        1,
                        pack16(local.left, local.right() - 1),
                        pack16(local.top, local.bottom() - 1),
                        pack16(output.width, output.height),
                    ],
                    applied,
                    output,
                    format,
                })
            }
            // Port inactive, or this core contributes nothing to it.
            _ => None,
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
            Some(config) => ModuleOutput::enabled(ModuleData::Crop {
                applied: config.applied,
                output: config.output,
            })
            .with_wm(WmDescriptor {
                path: self.id.path.data_path(),
                dims: config.output,
                format: config.format,
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capability::ModuleType,
        hw::HwVersion,
        iq::test_util::Fixture,
        split::PortStripe,
    };

    fn module(path: PipelinePath) -> Result<Box<dyn IspModule>> {
        let region = HwVersion::V2
            .registers()
            .module(ModuleType::Crop, path)
            .ok_or_else(|| IfeError::Unsupported("region".into()))?;
        create(&ModuleCreateData {
            id: region.id(),
            version: HwVersion::V2,
            region,
            max_downscale: 16,
        })
    }

    #[test]
    fn aspect_matched_zoom() {
        let zoom = zoom_window(Rect::new(0, 0, 4000, 3000), Dimension::new(1920, 1080));
        assert_eq!(zoom, Rect::new(0, 375, 4000, 2250));
    }

    #[test]
    fn inactive_port_is_disabled() -> Result<()> {
        let fx = Fixture::new();
        let mut crop = module(PipelinePath::Display)?;
        let ctx = ProcessingContext::single(fx.sensor.output);
        let mut cmd = CommandBuffer::with_capacity(64);
        let out = crop.execute(&fx.input(1), &ctx, &mut cmd)?;
        assert!(!out.enabled);
        assert!(cmd.is_empty());
        Ok(())
    }

    #[test]
    fn stripes_cover_zoom() -> Result<()> {
        let fx = Fixture::new();
        let mut crop = module(PipelinePath::Full)?;
        let frame = fx.sensor.output;
        let left_stripes = [PortStripe {
            port: 0,
            path: PipelinePath::Full,
            stripe: StripeConfig {
                offset: 0,
                width: 960,
            },
        }];
        let right_stripes = [PortStripe {
            port: 0,
            path: PipelinePath::Full,
            stripe: StripeConfig {
                offset: 960,
                width: 960,
            },
        }];
        let left = ProcessingContext {
            instance: Instance::Left,
            frame,
            window: Rect::new(0, 0, 2064, 3000),
            owned: Rect::new(0, 0, 2000, 3000),
            stripes: &left_stripes,
        };
        let right = ProcessingContext {
            instance: Instance::Right,
            frame,
            window: Rect::new(1936, 0, 2064, 3000),
            owned: Rect::new(2000, 0, 2000, 3000),
            stripes: &right_stripes,
        };
        let mut cmd = CommandBuffer::with_capacity(64);
        let a = crop.execute(&fx.input(1), &left, &mut cmd)?;
        let b = crop.execute(&fx.input(1), &right, &mut cmd)?;
        let (ModuleData::Crop { applied: la, .. }, ModuleData::Crop { applied: ra, .. }) =
            (a.data, b.data)
        else {
            panic!("crop data missing");
        };
        assert_eq!(la.right(), ra.left);
        assert_eq!(la.union(&ra), Rect::new(0, 375, 4000, 2250));
        Ok(())
    }
}
