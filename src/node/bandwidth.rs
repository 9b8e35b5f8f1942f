// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Clock and bandwidth votes sent with every request.

use super::negotiation::FinalPort;
use crate::{
    error::{IfeError, Result},
    format::{Dimension, Format},
    iq::WmDescriptor,
    packet::blob::{BwConfig, BwVote, ClockConfig, DataPath, UsageType},
    pipeline::IspPipeline,
    sensor::SensorMode,
    settings::Settings,
    split::DualSplitParams,
};
use std::collections::BTreeMap;
use tracing::trace;

/// Compression assumed for UBWC writes, in percent of the raw size.
const UBWC_LOSSLESS_PERCENT: u64 = 133;
const UBWC_LOSSY_PERCENT: u64 = 200;

/// Pixel clock each core needs. In dual mode a core's share follows the
/// width of the window it reads, padding included.
pub fn clock_config(
    sensor: &SensorMode,
    split: Option<DualSplitParams>,
    rdi_ports: usize,
    max_clock_hz: u64,
) -> Result<ClockConfig> {
    let clock = sensor.pixel_clock_hz;
    let (usage, left, right) = match split {
        None => (UsageType::Single, clock, 0),
        Some(split) => {
            let (l, r) = split.windows(sensor.output);
            let share = |w: u32| clock * w as u64 / sensor.output.width.max(1) as u64;
            (UsageType::Dual, share(l.width), share(r.width))
        }
    };
    if left.max(right) > max_clock_hz {
        return Err(IfeError::OutOfBounds(format!(
            "core clock {} Hz above limit {max_clock_hz} Hz",
            left.max(right)
        )));
    }
    Ok(ClockConfig {
        usage,
        left_pixel_hz: left,
        right_pixel_hz: right,
        rdi_hz: vec![clock; rdi_ports],
    })
}

fn raw_rate(dims: Dimension, format: Format, fps: f32) -> u64 {
    (dims.area() as f64 * format.bits_per_pixel() as f64 * fps as f64 / 8.0) as u64
}

/// Bandwidth votes grouped by data path.
///
/// Pixel and stats traffic comes from what the modules actually write this
/// request; raw dump ports come from negotiation.
pub fn bandwidth_config(
    wms: &[WmDescriptor],
    raw_ports: &[FinalPort],
    fps: f32,
    dual: bool,
    settings: &Settings,
    pipeline: &dyn IspPipeline,
) -> BwConfig {
    let mut votes: BTreeMap<DataPath, (u64, u64)> = BTreeMap::new();
    let writes = wms
        .iter()
        .map(|w| (w.path, w.dims, w.format))
        .chain(raw_ports.iter().map(|p| (p.source.data_path(), p.dims, p.format)));
    for (path, dims, format) in writes {
        let raw = raw_rate(dims, format, fps);
        let camnoc = raw * (100 + settings.camnoc_overhead_percent as u64) / 100;
        let mut external = raw * (100 + settings.external_overhead_percent as u64) / 100;
        if let Some(mode) = pipeline.ubwc_mode(format, dims) {
            let ratio = if mode.lossy {
                UBWC_LOSSY_PERCENT
            } else {
                UBWC_LOSSLESS_PERCENT
            };
            external = external * 100 / ratio;
        }
        trace!(?path, %dims, camnoc, external, "bandwidth");
        let vote = votes.entry(path).or_default();
        vote.0 += camnoc;
        vote.1 += external;
    }
    BwConfig {
        usage: if dual { UsageType::Dual } else { UsageType::Single },
        votes: votes
            .into_iter()
            .map(|(path, (camnoc, external))| BwVote {
                path,
                camnoc,
                external,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hw::HwVersion, pipeline};

    #[test]
    fn single_core_takes_the_whole_clock() -> Result<()> {
        let sensor = SensorMode::new("12mp", Dimension::new(4000, 3000), 30.0);
        let clock = clock_config(&sensor, None, 1, 600_000_000)?;
        assert_eq!(clock.usage, UsageType::Single);
        assert_eq!(clock.left_pixel_hz, sensor.pixel_clock_hz);
        assert_eq!(clock.rdi_hz, vec![sensor.pixel_clock_hz]);
        assert!(matches!(
            clock_config(&sensor, None, 0, 100_000_000),
            Err(IfeError::OutOfBounds(_))
        ));
        Ok(())
    }

    #[test]
    fn dual_clock_follows_windows() -> Result<()> {
        let mut sensor = SensorMode::new("48mp", Dimension::new(6000, 4000), 30.0);
        sensor.pixel_clock_hz = 1_200_000_000;
        let split = DualSplitParams {
            split_point: 3000,
            left_padding: 64,
            right_padding: 64,
        };
        let clock = clock_config(&sensor, Some(split), 0, 720_000_000)?;
        assert_eq!(clock.left_pixel_hz, 612_800_000);
        assert_eq!(clock.right_pixel_hz, 612_800_000);
        Ok(())
    }

    #[test]
    fn votes_carry_overheads() {
        let pipeline = pipeline::create(HwVersion::V1);
        let wms = [
            WmDescriptor {
                path: DataPath::Video,
                dims: Dimension::new(1920, 1080),
                format: Format::Nv12,
            },
            WmDescriptor {
                path: DataPath::Stats,
                dims: Dimension::new(4096, 1),
                format: Format::Blob,
            },
        ];
        let bw = bandwidth_config(&wms, &[], 30.0, false, &Settings::default(), pipeline.as_ref());
        let video = bw.vote(DataPath::Video).copied();
        assert_eq!(
            video,
            Some(BwVote {
                path: DataPath::Video,
                camnoc: 111_974_400,
                external: 102_643_200,
            })
        );
        assert!(bw.vote(DataPath::Stats).is_some());
        assert_eq!(bw.votes.len(), 2);
    }
}
