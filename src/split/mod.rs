// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Dual-core split coordination.
//!
//! A frame wider than one core can handle is divided at a split point; each
//! core reads its half plus padding columns of context from the other half.
//! The IQ modules never know about the split: the coordinator hands them one
//! [`ProcessingContext`] per core, each describing the frame that core sees,
//! and the node runs the same module sequence once per context.

pub mod striping;

pub use striping::{
    BalancedStriping, PortStripe, StripeOutput, StripePortRequest, StripingInput,
    StripingLibrary, StripingResult,
};

use crate::{
    capability::{Capability, PipelinePath},
    error::{IfeError, Result},
    format::{Dimension, Rect},
    iq::ProcessingContext,
    packet::blob::{DualConfig, DualPort},
    sensor::{PdafType, SensorMode},
    settings::Settings,
};
use tracing::{debug, info};

/// Hardware instance a command segment or processing context targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Instance {
    /// Shared by both cores, or the only core in single mode
    Common = 0,
    Left = 1,
    Right = 2,
}

impl Instance {
    pub const ALL: [Instance; 3] = [Instance::Common, Instance::Left, Instance::Right];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Value held separately for each instance.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerInstance<T>([T; 3]);

impl<T> PerInstance<T> {
    pub fn get(&self, instance: Instance) -> &T {
        &self.0[instance.index()]
    }

    pub fn get_mut(&mut self, instance: Instance) -> &mut T {
        &mut self.0[instance.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.0.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.0.iter_mut()
    }
}

/// Where one logical frame is divided between the two cores.
///
/// The left core reads `[0, split_point + right_padding)` and the right core
/// reads `[split_point - left_padding, width)`, so the two windows overlap by
/// `left_padding + right_padding` columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DualSplitParams {
    pub split_point: u32,
    pub left_padding: u32,
    pub right_padding: u32,
}

impl DualSplitParams {
    pub fn overlap(&self) -> u32 {
        self.left_padding + self.right_padding
    }

    /// Input windows of the left and right cores for a frame.
    pub fn windows(&self, frame: Dimension) -> (Rect, Rect) {
        let left_width = (self.split_point + self.right_padding).min(frame.width);
        let right_start = self.split_point.saturating_sub(self.left_padding).min(frame.width);
        (
            Rect::new(0, 0, left_width, frame.height),
            Rect::new(right_start, 0, frame.width - right_start, frame.height),
        )
    }

    /// Checks that both cores read inside `frame` and each owns at least
    /// one column.
    pub fn check(&self, frame: Dimension) -> Result<()> {
        let fits = self.split_point > 0
            && self.split_point < frame.width
            && self.left_padding <= self.split_point
            && self
                .split_point
                .checked_add(self.right_padding)
                .is_some_and(|end| end <= frame.width);
        if fits {
            Ok(())
        } else {
            Err(IfeError::OutOfBounds(format!(
                "split at {} (padding {}/{}) outside frame {frame}",
                self.split_point, self.left_padding, self.right_padding
            )))
        }
    }
}

/// One core's share of an output port.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StripeConfig {
    pub offset: u32,
    pub width: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitMode {
    Single,
    Dual,
}

/// Chooses single or dual mode. The decision depends only on its inputs.
pub fn decide_mode<I>(cap: &Capability, settings: &Settings, sensor: &SensorMode, outputs: I) -> SplitMode
where
    I: IntoIterator<Item = (PipelinePath, Dimension)>,
{
    if settings.force_single_ife {
        debug!("single IFE forced by settings");
        return SplitMode::Single;
    }
    if !cap.dual {
        return SplitMode::Single;
    }
    if sensor.pdaf_type() == Some(PdafType::Type3) {
        info!("PDAF type 3 requires a single IFE");
        return SplitMode::Single;
    }
    if sensor.output.width > cap.max_input_width {
        info!(width = sensor.output.width, "input exceeds single IFE line width");
        return SplitMode::Dual;
    }
    for (path, dims) in outputs {
        if dims.width > cap.max_output_width(path) {
            info!(?path, width = dims.width, "output exceeds single IFE width");
            return SplitMode::Dual;
        }
    }
    let max_clock = match settings.max_clock_hz {
        0 => cap.max_clock_hz,
        hz => hz,
    };
    if sensor.pixel_clock_hz > max_clock {
        info!(
            clock = sensor.pixel_clock_hz,
            max_clock, "pixel clock exceeds single IFE limit"
        );
        return SplitMode::Dual;
    }
    SplitMode::Single
}

/// Owns a striping result for one request and releases it when dropped, on
/// every return path of the caller.
pub struct StripingGuard<'a> {
    library: &'a mut dyn StripingLibrary,
    result: StripingResult,
}

impl<'a> StripingGuard<'a> {
    /// Runs the library and checks its result against the frame. A result
    /// that fails the check is released before the error is returned.
    pub fn compute(library: &'a mut dyn StripingLibrary, input: &StripingInput) -> Result<Self> {
        let result = library.compute(input)?;
        let guard = Self { library, result };
        guard.check(input.frame)?;
        Ok(guard)
    }

    fn check(&self, frame: Dimension) -> Result<()> {
        let r = &self.result;
        r.split.check(frame)?;
        let inside = |start: u32, len: u32, limit: u32| {
            len > 0 && start.checked_add(len).is_some_and(|end| end <= limit)
        };
        for side in [&r.left, &r.right] {
            let w = side.window;
            if !inside(w.left, w.width, frame.width) || !inside(w.top, w.height, frame.height) {
                return Err(IfeError::OutOfBounds(format!(
                    "{:?} window {w} outside frame {frame}",
                    side.instance
                )));
            }
        }
        Ok(())
    }

    pub fn result(&self) -> &StripingResult {
        &self.result
    }
}

impl Drop for StripingGuard<'_> {
    fn drop(&mut self) {
        self.library.release(&self.result);
    }
}

/// Processing plan for one request.
pub enum SplitPlan<'a> {
    Single { frame: Dimension },
    Dual { frame: Dimension, guard: StripingGuard<'a> },
}

impl SplitPlan<'_> {
    pub fn mode(&self) -> SplitMode {
        match self {
            SplitPlan::Single { .. } => SplitMode::Single,
            SplitPlan::Dual { .. } => SplitMode::Dual,
        }
    }

    pub fn split(&self) -> Option<DualSplitParams> {
        match self {
            SplitPlan::Single { .. } => None,
            SplitPlan::Dual { guard, .. } => Some(guard.result().split),
        }
    }

    /// Apparent frames, one per core that runs the module sequence.
    pub fn contexts(&self) -> Vec<ProcessingContext<'_>> {
        match self {
            SplitPlan::Single { frame } => vec![ProcessingContext::single(*frame)],
            SplitPlan::Dual { frame, guard } => {
                let r = guard.result();
                let split = r.split.split_point.min(frame.width);
                let owned = [
                    Rect::new(0, 0, split, frame.height),
                    Rect::new(split, 0, frame.width - split, frame.height),
                ];
                [&r.left, &r.right]
                    .into_iter()
                    .zip(owned)
                    .map(|(side, owned)| ProcessingContext {
                        instance: side.instance,
                        frame: *frame,
                        window: side.window,
                        owned,
                        stripes: &side.ports,
                    })
                    .collect()
            }
        }
    }

    /// Dual configuration blob for the kernel.
    pub fn dual_config(&self) -> Option<DualConfig> {
        let SplitPlan::Dual { guard, .. } = self else {
            return None;
        };
        let r = guard.result();
        let ports = r
            .left
            .ports
            .iter()
            .filter_map(|l| {
                r.right.port(l.port).map(|rp| DualPort {
                    port: l.port,
                    left: l.stripe,
                    right: rp.stripe,
                })
            })
            .collect();
        Some(DualConfig {
            split: r.split,
            ports,
        })
    }
}

/// Builds per-request split plans around a striping library.
pub struct SplitCoordinator {
    library: Box<dyn StripingLibrary>,
    padding: u32,
}

impl SplitCoordinator {
    pub fn new(library: Box<dyn StripingLibrary>, padding: u32) -> Self {
        Self { library, padding }
    }

    pub fn plan(
        &mut self,
        mode: SplitMode,
        frame: Dimension,
        crop: Rect,
        ports: Vec<StripePortRequest>,
    ) -> Result<SplitPlan<'_>> {
        match mode {
            SplitMode::Single => Ok(SplitPlan::Single { frame }),
            SplitMode::Dual => {
                let input = StripingInput {
                    frame,
                    crop,
                    ports,
                    padding: self.padding,
                };
                let guard = StripingGuard::compute(self.library.as_mut(), &input)?;
                Ok(SplitPlan::Dual { frame, guard })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::HwVersion;
    use std::sync::atomic::Ordering;

    #[test]
    fn window_law() {
        let frame = Dimension::new(5000, 3000);
        let split = DualSplitParams {
            split_point: 2496,
            left_padding: 48,
            right_padding: 80,
        };
        let (l, r) = split.windows(frame);
        assert_eq!(l.width + r.width - split.overlap(), frame.width);
        assert_eq!(r.left, 2448);
    }

    #[test]
    fn mode_decision() {
        let cap = Capability::lookup(HwVersion::V2);
        let settings = Settings::default();
        let mut sensor = SensorMode::new("wide", Dimension::new(8000, 6000), 10.0);
        assert_eq!(decide_mode(cap, &settings, &sensor, []), SplitMode::Dual);

        let forced = Settings {
            force_single_ife: true,
            ..Settings::default()
        };
        assert_eq!(decide_mode(cap, &forced, &sensor, []), SplitMode::Single);

        sensor.output = Dimension::new(4000, 3000);
        sensor.pixel_clock_hz = 400_000_000;
        assert_eq!(decide_mode(cap, &settings, &sensor, []), SplitMode::Single);
        assert_eq!(
            decide_mode(
                cap,
                &settings,
                &sensor,
                [(PipelinePath::Fd, Dimension::new(3840, 2160))]
            ),
            SplitMode::Dual
        );
    }

    #[test]
    fn guard_releases_on_drop() -> Result<()> {
        let lib = BalancedStriping::new();
        let outstanding = lib.outstanding();
        let mut coordinator = SplitCoordinator::new(Box::new(lib), 64);
        {
            let plan = coordinator.plan(
                SplitMode::Dual,
                Dimension::new(6000, 4000),
                Rect::new(0, 0, 6000, 4000),
                Vec::new(),
            )?;
            assert_eq!(plan.contexts().len(), 2);
            assert_eq!(outstanding.load(Ordering::SeqCst), 1);
        }
        assert_eq!(outstanding.load(Ordering::SeqCst), 0);
        Ok(())
    }

    /// Moves the split point of every result by `shift` columns.
    struct ShiftedStriping {
        inner: BalancedStriping,
        shift: u32,
    }

    impl StripingLibrary for ShiftedStriping {
        fn compute(&mut self, input: &StripingInput) -> Result<StripingResult> {
            let mut result = self.inner.compute(input)?;
            result.split.split_point += self.shift;
            Ok(result)
        }

        fn release(&mut self, result: &StripingResult) {
            self.inner.release(result);
        }
    }

    #[test]
    fn split_outside_frame_is_rejected() {
        let frame = Dimension::new(8000, 6000);
        let inner = BalancedStriping::new();
        let outstanding = inner.outstanding();
        let mut coordinator = SplitCoordinator::new(Box::new(ShiftedStriping { inner, shift: 4256 }), 64);
        let plan = coordinator.plan(SplitMode::Dual, frame, Rect::full(frame), Vec::new());
        assert!(matches!(plan, Err(IfeError::OutOfBounds(_))));
        assert_eq!(outstanding.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn windows_clamp_to_frame() {
        let frame = Dimension::new(8000, 6000);
        let split = DualSplitParams {
            split_point: 8256,
            left_padding: 64,
            right_padding: 64,
        };
        assert!(split.check(frame).is_err());
        let (l, r) = split.windows(frame);
        assert_eq!(l.width, 8000);
        assert_eq!(r.right(), 8000);
    }
}
