// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Two-pass buffer negotiation with the neighbouring nodes.
//!
//! The backward pass folds every consumer's requirement on each output port
//! into one superset and derives the input requirement from it. The forward
//! pass takes the sensor mode that was finally chosen and turns each port's
//! requirement into a concrete buffer: pixel ports are clipped to the input
//! and held within the downscale limit, while stats, RDI and side-channel
//! ports are sized directly from the chip and sensor tables.

use crate::{
    capability::{Capability, ModuleType, PipelinePath},
    error::{IfeError, Result},
    format::{even_ceil, even_floor, Dimension, Format, PlaneAlignment, MAX_PLANES},
    packet::blob::DataPath,
    sensor::{PdBufferFormat, PdafType, SensorMode, StreamKind},
    settings::Settings,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Buffer requirement exchanged with a neighbouring node for one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferRequirement {
    pub optimal: Dimension,
    pub min: Dimension,
    pub max: Dimension,
    pub alignment: [PlaneAlignment; MAX_PLANES],
}

impl BufferRequirement {
    /// Requirement with no bounds beyond `optimal`.
    pub fn new(optimal: Dimension) -> Self {
        Self {
            optimal,
            min: Dimension::default(),
            max: Dimension::new(u32::MAX, u32::MAX),
            alignment: [PlaneAlignment::default(); MAX_PLANES],
        }
    }

    pub fn with_bounds(mut self, min: Dimension, max: Dimension) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn with_alignment(mut self, plane: usize, alignment: PlaneAlignment) -> Self {
        if let Some(a) = self.alignment.get_mut(plane) {
            *a = alignment;
        }
        self
    }

    fn is_satisfiable(&self) -> bool {
        self.min.width <= self.max.width && self.min.height <= self.max.height
    }

    fn contains(&self, dims: Dimension) -> bool {
        (self.min.width..=self.max.width).contains(&dims.width)
            && (self.min.height..=self.max.height).contains(&dims.height)
    }
}

/// What feeds an output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortSource {
    /// Processed pixels from a pipeline path
    Pixel(PipelinePath),
    /// A stats block's output buffer
    Stats(ModuleType),
    /// Raw sensor data passed through on a dump interface
    Rdi(u8),
    Pdaf,
    Meta,
    Hdr,
}

impl PortSource {
    /// Bandwidth vote path for data written by this port.
    pub fn data_path(&self) -> DataPath {
        match self {
            PortSource::Pixel(path) => path.data_path(),
            PortSource::Stats(_) => DataPath::Stats,
            PortSource::Rdi(0) => DataPath::Rdi0,
            PortSource::Rdi(1) => DataPath::Rdi1,
            PortSource::Rdi(2) => DataPath::Rdi2,
            PortSource::Rdi(_) => DataPath::Rdi3,
            PortSource::Pdaf => DataPath::Pdaf,
            PortSource::Meta | PortSource::Hdr => DataPath::Rdi3,
        }
    }

    fn is_pixel(&self) -> bool {
        matches!(self, PortSource::Pixel(_))
    }
}

/// An output port and the requirements of the consumers linked to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputPortConfig {
    pub port: u32,
    pub source: PortSource,
    pub format: Format,
    pub consumers: Vec<BufferRequirement>,
}

/// Result of the backward pass for one output port.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRequirement {
    pub port: u32,
    pub source: PortSource,
    pub format: Format,
    pub requirement: BufferRequirement,
    /// Aspect ratio of each consumer's optimal size
    aspects: Vec<f32>,
}

/// This node's requirement on its input, published to the sensor node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputRequirement {
    pub requirement: BufferRequirement,
    /// No pixel output is linked; only raw data is dumped
    pub rdi_only: bool,
}

/// Negotiated buffer for one port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalPort {
    pub port: u32,
    pub source: PortSource,
    pub dims: Dimension,
    pub format: Format,
    pub alignment: [PlaneAlignment; MAX_PLANES],
    /// Requirement with `optimal` replaced by the final size for pixel ports
    pub requirement: BufferRequirement,
}

/// Single-core hardware limit for a pixel port, doubled when two cores can
/// share the frame.
fn pixel_limit(cap: &Capability, settings: &Settings, path: PipelinePath, rdi_only: bool) -> Dimension {
    if rdi_only {
        return cap.max_rdi_only;
    }
    let cores = if cap.dual && !settings.force_single_ife { 2 } else { 1 };
    Dimension::new(cap.max_output_width(path) * cores, cap.max_output_height)
}

/// Scales `dims` down to fit `max`, keeping its aspect ratio.
fn fit_within(dims: Dimension, max: Dimension) -> Dimension {
    let mut out = dims;
    if out.width > max.width {
        out.height = (out.height as u64 * max.width as u64 / out.width as u64) as u32;
        out.width = max.width;
    }
    if out.height > max.height {
        out.width = (out.width as u64 * max.height as u64 / out.height.max(1) as u64) as u32;
        out.height = max.height;
    }
    out
}

fn clamp_dims(dims: Dimension, min: Dimension, max: Dimension) -> Dimension {
    Dimension::new(
        dims.width.clamp(min.width, max.width),
        dims.height.clamp(min.height, max.height),
    )
}

/// Folds consumer requirements into the superset every consumer accepts.
fn superset(consumers: &[BufferRequirement], limit: Dimension) -> BufferRequirement {
    let mut merged = BufferRequirement::new(Dimension::default()).with_bounds(Dimension::default(), limit);
    for c in consumers {
        merged.optimal.width = merged.optimal.width.max(c.optimal.width);
        merged.optimal.height = merged.optimal.height.max(c.optimal.height);
        merged.min.width = merged.min.width.max(c.min.width);
        merged.min.height = merged.min.height.max(c.min.height);
        merged.max.width = merged.max.width.min(c.max.width);
        merged.max.height = merged.max.height.min(c.max.height);
        for (a, b) in merged.alignment.iter_mut().zip(&c.alignment) {
            *a = a.combine(b);
        }
    }
    merged
}

/// Backward pass: merges consumer requirements per port and derives the
/// input requirement.
pub fn finalize_input_requirement(
    cap: &Capability,
    settings: &Settings,
    ports: &[OutputPortConfig],
) -> Result<(InputRequirement, Vec<OutputRequirement>)> {
    let rdi_only = !ports
        .iter()
        .any(|p| p.source.is_pixel() && !p.consumers.is_empty());
    if rdi_only {
        info!("no pixel output linked, raw dump only");
    }

    let mut outputs = Vec::with_capacity(ports.len());
    let mut input = BufferRequirement::new(Dimension::default());
    for port in ports {
        if port.consumers.is_empty() {
            debug!(port = port.port, "no consumer linked, port disabled");
            continue;
        }
        let limit = match port.source {
            PortSource::Pixel(path) => pixel_limit(cap, settings, path, rdi_only),
            _ => Dimension::new(u32::MAX, u32::MAX),
        };
        let mut req = superset(&port.consumers, limit);
        if !req.is_satisfiable() {
            return Err(IfeError::Negotiation(format!(
                "port {}: min {} exceeds max {}",
                port.port, req.min, req.max
            )));
        }
        req.optimal = clamp_dims(fit_within(req.optimal, req.max), req.min, req.max);

        if matches!(port.source, PortSource::Pixel(_) | PortSource::Rdi(_)) {
            input.optimal.width = input.optimal.width.max(req.optimal.width);
            input.optimal.height = input.optimal.height.max(req.optimal.height);
            input.min.width = input.min.width.max(req.min.width);
            input.min.height = input.min.height.max(req.min.height);
        }
        debug!(port = port.port, source = ?port.source, optimal = %req.optimal, min = %req.min, max = %req.max, "port requirement");
        outputs.push(OutputRequirement {
            port: port.port,
            source: port.source,
            format: port.format,
            requirement: req,
            aspects: port
                .consumers
                .iter()
                .filter(|c| !c.optimal.is_zero())
                .map(|c| c.optimal.aspect_ratio())
                .collect(),
        });
    }

    if input.optimal.is_zero() && !rdi_only {
        return Err(IfeError::Negotiation(
            "no pixel consumer requested a size".to_owned(),
        ));
    }
    let cores = if cap.dual && !settings.force_single_ife { 2 } else { 1 };
    input.max = if rdi_only {
        cap.max_rdi_only
    } else {
        Dimension::new(cap.max_input_width * cores, u32::MAX)
    };
    if !input.is_satisfiable() {
        return Err(IfeError::Negotiation(format!(
            "input min {} exceeds max {}",
            input.min, input.max
        )));
    }
    input.optimal = clamp_dims(input.optimal, input.min, input.max);
    info!(optimal = %input.optimal, rdi_only, "input requirement");
    Ok((
        InputRequirement {
            requirement: input,
            rdi_only,
        },
        outputs,
    ))
}

/// Reshapes `dims` to the narrowest consumer aspect ratio, never narrower
/// than the sensor's.
fn reconcile_aspect(dims: Dimension, aspects: &[f32], sensor: Dimension) -> Dimension {
    if aspects.len() < 2 || dims.is_zero() {
        return dims;
    }
    let target = aspects
        .iter()
        .copied()
        .fold(f32::MAX, f32::min)
        .max(sensor.aspect_ratio());
    let current = dims.aspect_ratio();
    if (current - target).abs() < 0.01 {
        dims
    } else if current > target {
        Dimension::new(even_floor((dims.height as f32 * target) as u32), dims.height)
    } else {
        Dimension::new(dims.width, even_floor((dims.width as f32 / target) as u32))
    }
}

/// Final size of a pixel port fed from `input`.
fn pixel_dims(
    cap: &Capability,
    settings: &Settings,
    path: PipelinePath,
    out: &OutputRequirement,
    input: Dimension,
    max_downscale: u32,
) -> Result<Dimension> {
    let mut dims = reconcile_aspect(out.requirement.optimal, &out.aspects, input);
    if settings.cap_resolution_for_single_ife {
        dims = fit_within(dims, Dimension::new(cap.max_output_width(path), u32::MAX));
    }
    // No upscaling.
    dims = fit_within(dims, input);
    dims = Dimension::new(even_floor(dims.width), even_floor(dims.height));

    if max_downscale > 0 {
        let floor = Dimension::new(
            even_ceil(input.width.div_ceil(max_downscale)).min(input.width),
            even_ceil(input.height.div_ceil(max_downscale)).min(input.height),
        );
        if dims.width < floor.width || dims.height < floor.height {
            debug!(port = out.port, requested = %dims, %floor, "raised to downscale limit");
            dims.width = dims.width.max(floor.width);
            dims.height = dims.height.max(floor.height);
        }
    }

    if !out.requirement.contains(dims) {
        return Err(IfeError::Negotiation(format!(
            "port {}: {dims} outside [{}, {}] for input {input}",
            out.port, out.requirement.min, out.requirement.max
        )));
    }
    Ok(dims)
}

/// Size and format of the PDAF buffer for the sensor's PD layout.
fn pdaf_buffer(sensor: &SensorMode) -> Option<(Dimension, Format)> {
    let Some(info) = &sensor.pdaf else {
        warn!("PDAF port linked but sensor mode {} has no PDAF", sensor.name);
        return None;
    };
    let Some(stream) = sensor.stream(StreamKind::Pdaf) else {
        warn!("sensor mode {} has no PDAF sub-stream", sensor.name);
        return None;
    };
    let dims = stream.dims;
    let Some(bytes) = dims.width.checked_mul(dims.height).and_then(|n| n.checked_mul(2)) else {
        error!("PDAF sub-stream {dims} too large for one buffer");
        return None;
    };
    let blob = Dimension::new(bytes, 1);
    Some(match (info.sensor_type, info.native_format, info.buffer_format) {
        (PdafType::Type2 | PdafType::DualPd, PdBufferFormat::Unpacked16, _) => (blob, Format::Blob),
        (_, PdBufferFormat::Mipi10, PdBufferFormat::Unpacked16) => (dims, Format::RawPlain16),
        (_, PdBufferFormat::Mipi10, PdBufferFormat::Mipi10) => (dims, Format::RawMipi10),
        (_, PdBufferFormat::Unpacked16, PdBufferFormat::Unpacked16) => (blob, Format::Blob),
        (_, PdBufferFormat::Unpacked16, PdBufferFormat::Mipi10) => (dims, Format::RawMipi10),
    })
}

/// Size of a metadata or HDR side-channel buffer, `None` when the stream
/// is absent or the format cannot carry it.
fn side_channel(sensor: &SensorMode, kind: StreamKind, format: Format) -> Option<Dimension> {
    let Some(stream) = sensor.stream(kind) else {
        warn!("sensor mode {} has no {kind:?} sub-stream", sensor.name);
        return None;
    };
    match (kind, format) {
        (_, Format::Blob) => match stream.dims.width.checked_mul(stream.dims.height) {
            Some(bytes) => Some(Dimension::new(bytes, 1)),
            None => {
                error!("{kind:?} sub-stream {} too large for one buffer", stream.dims);
                None
            }
        },
        (StreamKind::Hdr, f) if f.is_raw() => Some(stream.dims),
        _ => {
            error!("{kind:?} port cannot be written as {format:?}");
            None
        }
    }
}

/// Forward pass: sizes every port against the chosen sensor mode.
///
/// Side-channel ports whose sub-stream is missing come back with zero
/// dimensions instead of failing the configuration.
pub fn finalize_buffer_properties(
    cap: &Capability,
    settings: &Settings,
    sensor: &SensorMode,
    outputs: &[OutputRequirement],
    max_downscale: u32,
) -> Result<Vec<FinalPort>> {
    let input = sensor.output;
    let mut ports = Vec::with_capacity(outputs.len());
    for out in outputs {
        let mut requirement = out.requirement;
        let (dims, format) = match out.source {
            PortSource::Pixel(path) => {
                let dims = pixel_dims(cap, settings, path, out, input, max_downscale)?;
                requirement.optimal = dims;
                (dims, out.format)
            }
            PortSource::Stats(kind) => {
                let dims = cap.stats_dims(kind).unwrap_or_default();
                // Sized for both cores in case the stream runs split.
                let cores = if cap.dual { 2 } else { 1 };
                (Dimension::new(dims.width * cores, dims.height), Format::Blob)
            }
            PortSource::Rdi(_) => (input, out.format),
            PortSource::Pdaf => pdaf_buffer(sensor).unwrap_or((Dimension::default(), out.format)),
            PortSource::Meta => (
                side_channel(sensor, StreamKind::Meta, out.format).unwrap_or_default(),
                out.format,
            ),
            PortSource::Hdr => (
                side_channel(sensor, StreamKind::Hdr, out.format).unwrap_or_default(),
                out.format,
            ),
        };
        info!(port = out.port, source = ?out.source, %dims, ?format, "buffer negotiated");
        ports.push(FinalPort {
            port: out.port,
            source: out.source,
            dims,
            format,
            alignment: requirement.alignment,
            requirement,
        });
    }
    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        hw::HwVersion,
        sensor::{PdafInfo, SubStream},
    };

    fn pixel(port: u32, path: PipelinePath, consumers: Vec<BufferRequirement>) -> OutputPortConfig {
        OutputPortConfig {
            port,
            source: PortSource::Pixel(path),
            format: Format::Nv12,
            consumers,
        }
    }

    #[test]
    fn superset_of_consumers() -> Result<()> {
        let cap = Capability::lookup(HwVersion::V2);
        let a = BufferRequirement::new(Dimension::new(1920, 1080))
            .with_bounds(Dimension::new(640, 360), Dimension::new(3840, 2160))
            .with_alignment(0, PlaneAlignment { stride: 64, scanline: 2 });
        let b = BufferRequirement::new(Dimension::new(1280, 720))
            .with_bounds(Dimension::new(320, 240), Dimension::new(1920, 1440))
            .with_alignment(0, PlaneAlignment { stride: 48, scanline: 4 });
        let (input, outputs) =
            finalize_input_requirement(cap, &Settings::default(), &[pixel(0, PipelinePath::Full, vec![a, b])])?;
        let req = outputs[0].requirement;
        assert_eq!(req.optimal, Dimension::new(1920, 1080));
        assert_eq!(req.min, Dimension::new(640, 360));
        assert_eq!(req.max, Dimension::new(1920, 1440));
        assert_eq!(req.alignment[0], PlaneAlignment { stride: 192, scanline: 4 });
        assert_eq!(input.requirement.optimal, Dimension::new(1920, 1080));
        assert!(!input.rdi_only);
        Ok(())
    }

    #[test]
    fn conflicting_bounds_fail() {
        let cap = Capability::lookup(HwVersion::V1);
        let a = BufferRequirement::new(Dimension::new(1920, 1080))
            .with_bounds(Dimension::new(1920, 1080), Dimension::new(3840, 2160));
        let b = BufferRequirement::new(Dimension::new(640, 480))
            .with_bounds(Dimension::new(320, 240), Dimension::new(1280, 720));
        let err = finalize_input_requirement(cap, &Settings::default(), &[pixel(0, PipelinePath::Full, vec![a, b])])
            .err();
        assert!(matches!(err, Some(IfeError::Negotiation(_))));
    }

    #[test]
    fn optimal_clamped_to_hardware() -> Result<()> {
        let cap = Capability::lookup(HwVersion::V3);
        let wide = BufferRequirement::new(Dimension::new(8192, 4608));
        let (_, outputs) =
            finalize_input_requirement(cap, &Settings::default(), &[pixel(0, PipelinePath::Full, vec![wide])])?;
        let req = outputs[0].requirement;
        assert_eq!(req.optimal.width, cap.max_output_width_full);
        assert_eq!(req.optimal.height, 2304);
        assert!(req.min.width <= req.optimal.width && req.optimal.width <= req.max.width);
        Ok(())
    }

    #[test]
    fn zero_pixel_size_needs_rdi_only() -> Result<()> {
        let cap = Capability::lookup(HwVersion::V2);
        let zero = BufferRequirement::new(Dimension::default());
        let err = finalize_input_requirement(cap, &Settings::default(), &[pixel(0, PipelinePath::Full, vec![zero])])
            .err();
        assert!(matches!(err, Some(IfeError::Negotiation(_))));

        let rdi = OutputPortConfig {
            port: 8,
            source: PortSource::Rdi(0),
            format: Format::RawMipi10,
            consumers: vec![zero],
        };
        let (input, _) = finalize_input_requirement(cap, &Settings::default(), &[rdi])?;
        assert!(input.rdi_only);
        assert_eq!(input.requirement.max, cap.max_rdi_only);
        Ok(())
    }

    #[test]
    fn full_hd_from_12mp() -> Result<()> {
        let cap = Capability::lookup(HwVersion::V2);
        let settings = Settings::default();
        let sensor = SensorMode::new("12mp", Dimension::new(4000, 3000), 30.0);
        let req = BufferRequirement::new(Dimension::new(1920, 1080));
        let (input, outputs) = finalize_input_requirement(cap, &settings, &[pixel(0, PipelinePath::Full, vec![req])])?;
        assert!(input.requirement.optimal.width <= sensor.output.width);
        let ports = finalize_buffer_properties(cap, &settings, &sensor, &outputs, cap.max_downscale)?;
        assert_eq!(ports[0].dims, Dimension::new(1920, 1080));
        Ok(())
    }

    #[test]
    fn downscale_limit_raises_output() -> Result<()> {
        let cap = Capability::lookup(HwVersion::V1);
        let settings = Settings::default();
        let sensor = SensorMode::new("12mp", Dimension::new(4000, 3000), 30.0);
        let tiny = BufferRequirement::new(Dimension::new(320, 240));
        let (_, outputs) = finalize_input_requirement(cap, &settings, &[pixel(1, PipelinePath::Fd, vec![tiny])])?;
        let ports = finalize_buffer_properties(cap, &settings, &sensor, &outputs, 8)?;
        // 4000 / 8 and 3000 / 8, rounded up to even
        assert_eq!(ports[0].dims, Dimension::new(500, 376));
        assert!(ports[0].dims.width <= sensor.output.width);
        Ok(())
    }

    #[test]
    fn never_upscales() -> Result<()> {
        let cap = Capability::lookup(HwVersion::V2);
        let settings = Settings::default();
        let sensor = SensorMode::new("vga", Dimension::new(640, 480), 60.0);
        let big = BufferRequirement::new(Dimension::new(1920, 1440));
        let (_, outputs) = finalize_input_requirement(cap, &settings, &[pixel(0, PipelinePath::Full, vec![big])])?;
        let ports = finalize_buffer_properties(cap, &settings, &sensor, &outputs, 16)?;
        assert_eq!(ports[0].dims, Dimension::new(640, 480));
        Ok(())
    }

    #[test]
    fn aspect_reconciled_across_consumers() {
        let dims = reconcile_aspect(
            Dimension::new(1920, 1440),
            &[16.0 / 9.0, 4.0 / 3.0],
            Dimension::new(4000, 3000),
        );
        assert_eq!(dims, Dimension::new(1920, 1440));
        // Too wide for the 4:3 consumer: trimmed to 4:3.
        let dims = reconcile_aspect(
            Dimension::new(2000, 1000),
            &[4.0 / 3.0, 2.0],
            Dimension::new(4000, 3000),
        );
        assert_eq!(dims, Dimension::new(1332, 1000));
    }

    #[test]
    fn side_channels_from_sensor_streams() -> Result<()> {
        let cap = Capability::lookup(HwVersion::V2);
        let settings = Settings::default();
        let mut sensor = SensorMode::new("pd", Dimension::new(4000, 3000), 30.0);
        sensor.pdaf = Some(PdafInfo {
            sensor_type: PdafType::Type2,
            native_format: PdBufferFormat::Unpacked16,
            buffer_format: PdBufferFormat::Unpacked16,
        });
        sensor.streams.push(SubStream {
            kind: StreamKind::Pdaf,
            dims: Dimension::new(496, 372),
            format: Format::RawPlain16,
            vc: 1,
            dt: 0x30,
        });
        let any = BufferRequirement::new(Dimension::default());
        let ports = [
            pixel(0, PipelinePath::Full, vec![BufferRequirement::new(Dimension::new(1920, 1080))]),
            OutputPortConfig {
                port: 9,
                source: PortSource::Pdaf,
                format: Format::RawPlain16,
                consumers: vec![any],
            },
            OutputPortConfig {
                port: 10,
                source: PortSource::Meta,
                format: Format::Blob,
                consumers: vec![any],
            },
            OutputPortConfig {
                port: 11,
                source: PortSource::Stats(ModuleType::AwbBg),
                format: Format::Blob,
                consumers: vec![any],
            },
        ];
        let (_, outputs) = finalize_input_requirement(cap, &settings, &ports)?;
        let finals = finalize_buffer_properties(cap, &settings, &sensor, &outputs, 16)?;
        assert_eq!(finals[1].dims, Dimension::new(496 * 372 * 2, 1));
        assert_eq!(finals[1].format, Format::Blob);
        // No metadata stream: logged and left empty.
        assert!(finals[2].dims.is_zero());
        assert_eq!(finals[3].dims.width, cap.awb_bg_dims.width * 2);
        Ok(())
    }

    #[test]
    fn oversized_side_channel_is_empty() {
        let mut sensor = SensorMode::new("huge", Dimension::new(4000, 3000), 30.0);
        sensor.pdaf = Some(PdafInfo {
            sensor_type: PdafType::Type2,
            native_format: PdBufferFormat::Unpacked16,
            buffer_format: PdBufferFormat::Unpacked16,
        });
        for kind in [StreamKind::Pdaf, StreamKind::Meta] {
            sensor.streams.push(SubStream {
                kind,
                dims: Dimension::new(70_000, 70_000),
                format: Format::RawPlain16,
                vc: 1,
                dt: 0x30,
            });
        }
        assert_eq!(pdaf_buffer(&sensor), None);
        assert_eq!(side_channel(&sensor, StreamKind::Meta, Format::Blob), None);
    }

    #[test]
    fn invariant_holds_after_both_passes() -> Result<()> {
        let cap = Capability::lookup(HwVersion::V1);
        let settings = Settings::default();
        let sensor = SensorMode::new("12mp", Dimension::new(4000, 3000), 30.0);
        let ports = [
            pixel(0, PipelinePath::Full, vec![BufferRequirement::new(Dimension::new(3840, 2160))
                .with_bounds(Dimension::new(640, 480), Dimension::new(4096, 4096))]),
            pixel(1, PipelinePath::Fd, vec![BufferRequirement::new(Dimension::new(640, 480))]),
        ];
        let (_, outputs) = finalize_input_requirement(cap, &settings, &ports)?;
        for port in finalize_buffer_properties(cap, &settings, &sensor, &outputs, 8)? {
            let r = port.requirement;
            assert!(r.min.width <= r.optimal.width && r.optimal.width <= r.max.width);
            assert!(r.min.height <= r.optimal.height && r.optimal.height <= r.max.height);
            assert!(port.dims.width <= sensor.output.width);
            assert!(port.dims.height <= sensor.output.height);
        }
        Ok(())
    }
}
