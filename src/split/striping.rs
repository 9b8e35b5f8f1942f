// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Striping library seam.
//!
//! Production builds link a vendor numeric library that computes the per-core
//! stripes; this crate only consumes its results. [`BalancedStriping`] is a
//! straightforward split at the frame centre used by the simulator and tests.

use super::{DualSplitParams, Instance, StripeConfig};
use crate::{
    capability::PipelinePath,
    error::{IfeError, Result},
    format::{Dimension, Rect},
};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tracing::trace;

/// Column alignment of the split point.
const SPLIT_ALIGNMENT: u32 = 16;

/// One output port the stripes must cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripePortRequest {
    pub port: u32,
    pub path: PipelinePath,
    pub output: Dimension,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripingInput {
    pub frame: Dimension,
    /// Sensor-space region feeding the outputs
    pub crop: Rect,
    pub ports: Vec<StripePortRequest>,
    /// Context columns requested on each side of the split
    pub padding: u32,
}

/// One port's share of a core's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortStripe {
    pub port: u32,
    pub path: PipelinePath,
    pub stripe: StripeConfig,
}

/// What one core sees.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeOutput {
    pub instance: Instance,
    /// Input columns read by this core, including padding
    pub window: Rect,
    pub ports: Vec<PortStripe>,
}

impl StripeOutput {
    pub fn port(&self, port: u32) -> Option<&PortStripe> {
        self.ports.iter().find(|p| p.port == port)
    }
}

/// Per-request result owned by the library until released.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripingResult {
    pub handle: u64,
    pub split: DualSplitParams,
    pub left: StripeOutput,
    pub right: StripeOutput,
}

pub trait StripingLibrary: Send {
    fn compute(&mut self, input: &StripingInput) -> Result<StripingResult>;

    /// Frees whatever the library holds for `result`.
    fn release(&mut self, result: &StripingResult);
}

/// Centre split with symmetric padding.
#[derive(Debug, Default)]
pub struct BalancedStriping {
    next_handle: u64,
    outstanding: Arc<AtomicUsize>,
}

impl BalancedStriping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter of results computed but not yet released.
    pub fn outstanding(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.outstanding)
    }
}

impl StripingLibrary for BalancedStriping {
    fn compute(&mut self, input: &StripingInput) -> Result<StripingResult> {
        let width = input.frame.width;
        let height = input.frame.height;
        let split_point = (width / 2) / SPLIT_ALIGNMENT * SPLIT_ALIGNMENT;
        let padding = input.padding.min(split_point).min(width - split_point);
        if split_point == 0 || (padding == 0 && input.padding != 0) {
            return Err(IfeError::InvalidArgument(format!(
                "frame {} too narrow to stripe",
                input.frame
            )));
        }

        let split = DualSplitParams {
            split_point,
            left_padding: padding,
            right_padding: padding,
        };
        let (left_window, right_window) = split.windows(input.frame);

        let mut left_ports = Vec::with_capacity(input.ports.len());
        let mut right_ports = Vec::with_capacity(input.ports.len());
        for req in &input.ports {
            let (left, right) = split_port(req.output.width, &input.crop, split_point);
            left_ports.push(PortStripe {
                port: req.port,
                path: req.path,
                stripe: left,
            });
            right_ports.push(PortStripe {
                port: req.port,
                path: req.path,
                stripe: right,
            });
        }

        self.next_handle += 1;
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        trace!(handle = self.next_handle, split_point, padding, "striping computed");
        Ok(StripingResult {
            handle: self.next_handle,
            split,
            left: StripeOutput {
                instance: Instance::Left,
                window: Rect::new(left_window.left, 0, left_window.width, height),
                ports: left_ports,
            },
            right: StripeOutput {
                instance: Instance::Right,
                window: Rect::new(right_window.left, 0, right_window.width, height),
                ports: right_ports,
            },
        })
    }

    fn release(&mut self, result: &StripingResult) {
        trace!(handle = result.handle, "striping released");
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Divides an output of `out_width` columns at the sensor column `split`.
fn split_port(out_width: u32, crop: &Rect, split: u32) -> (StripeConfig, StripeConfig) {
    let left_cols = split.clamp(crop.left, crop.right()) - crop.left;
    let left_width = if crop.width == 0 {
        0
    } else {
        let scaled = out_width as u64 * left_cols as u64 / crop.width as u64;
        (scaled as u32 & !1).min(out_width)
    };
    (
        StripeConfig {
            offset: 0,
            width: left_width,
        },
        StripeConfig {
            offset: left_width,
            width: out_width - left_width,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(width: u32) -> StripingInput {
        StripingInput {
            frame: Dimension::new(width, 3000),
            crop: Rect::new(0, 0, width, 3000),
            ports: vec![StripePortRequest {
                port: 0,
                path: PipelinePath::Full,
                output: Dimension::new(3840, 2160),
            }],
            padding: 64,
        }
    }

    #[test]
    fn stripes_cover_output() -> Result<()> {
        let mut lib = BalancedStriping::new();
        let result = lib.compute(&input(6000))?;
        let l = result.left.ports[0].stripe;
        let r = result.right.ports[0].stripe;
        assert_eq!(l.width + r.width, 3840);
        assert_eq!(r.offset, l.width);
        assert_eq!(lib.outstanding().load(Ordering::SeqCst), 1);
        lib.release(&result);
        assert_eq!(lib.outstanding().load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[test]
    fn split_outside_crop() {
        let crop = Rect::new(3200, 0, 800, 600);
        let (l, r) = split_port(640, &crop, 3000);
        assert_eq!(l.width, 0);
        assert_eq!(r.width, 640);
    }

    #[test]
    fn too_narrow() {
        let mut lib = BalancedStriping::new();
        assert!(lib.compute(&input(8)).is_err());
        assert_eq!(lib.outstanding().load(Ordering::SeqCst), 0);
    }
}
