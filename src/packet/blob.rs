// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Generic blob sections of the kernel packet.
//!
//! Each blob is a little-endian `u32` type tag, a `u32` payload length in
//! bytes, then the payload padded to a 4-byte boundary. Readers skip tags they
//! do not know.

use crate::{
    error::{IfeError, Result},
    format::Dimension,
    split::{DualSplitParams, StripeConfig},
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;
use tracing::debug;

pub const TAG_HFR: u32 = 0;
pub const TAG_CLOCK: u32 = 1;
pub const TAG_BANDWIDTH: u32 = 2;
pub const TAG_UBWC: u32 = 3;
pub const TAG_CORE: u32 = 4;
pub const TAG_WM: u32 = 5;
pub const TAG_DUAL: u32 = 6;

/// Little-endian payload writer.
#[derive(Debug, Default)]
pub struct BlobWriter {
    bytes: Vec<u8>,
}

impl BlobWriter {
    // Writes into a Vec cannot fail.
    pub fn u32(&mut self, value: u32) -> &mut Self {
        let _ = self.bytes.write_u32::<LittleEndian>(value);
        self
    }

    pub fn u64(&mut self, value: u64) -> &mut Self {
        let _ = self.bytes.write_u64::<LittleEndian>(value);
        self
    }

    pub fn bool(&mut self, value: bool) -> &mut Self {
        self.u32(value as u32)
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Little-endian payload reader; running off the end is [`IfeError::OutOfBounds`].
pub struct BlobReader<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> BlobReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(bytes),
        }
    }

    pub fn u32(&mut self) -> Result<u32> {
        self.cursor
            .read_u32::<LittleEndian>()
            .map_err(|_| IfeError::OutOfBounds("truncated blob payload".to_owned()))
    }

    pub fn u64(&mut self) -> Result<u64> {
        self.cursor
            .read_u64::<LittleEndian>()
            .map_err(|_| IfeError::OutOfBounds("truncated blob payload".to_owned()))
    }

    pub fn bool(&mut self) -> Result<bool> {
        Ok(self.u32()? != 0)
    }

    /// Reads an element count and rejects counts the payload cannot hold.
    pub fn count(&mut self, element_bytes: usize) -> Result<usize> {
        let count = self.u32()? as usize;
        let remaining = self.cursor.get_ref().len() - self.cursor.position() as usize;
        if count.saturating_mul(element_bytes) > remaining {
            return Err(IfeError::OutOfBounds(format!(
                "blob claims {count} entries, {remaining} bytes left"
            )));
        }
        Ok(count)
    }
}

/// Structured configuration carried in a blob section.
pub trait BlobPayload: Sized {
    const TAG: u32;

    fn encode(&self, w: &mut BlobWriter);

    fn decode(r: &mut BlobReader<'_>) -> Result<Self>;
}

/// Whether one or two cores share the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UsageType {
    Single = 0,
    Dual = 1,
}

impl UsageType {
    fn from_u32(value: u32) -> Result<Self> {
        match value {
            0 => Ok(UsageType::Single),
            1 => Ok(UsageType::Dual),
            other => Err(IfeError::InvalidArgument(format!("usage type {other}"))),
        }
    }
}

/// Output data paths with independent bandwidth votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataPath {
    Linear = 0,
    Video = 1,
    Display = 2,
    Stats = 3,
    Rdi0 = 4,
    Rdi1 = 5,
    Rdi2 = 6,
    Rdi3 = 7,
    Pdaf = 8,
    PixelRaw = 9,
}

impl DataPath {
    fn from_u32(value: u32) -> Result<Self> {
        Ok(match value {
            0 => DataPath::Linear,
            1 => DataPath::Video,
            2 => DataPath::Display,
            3 => DataPath::Stats,
            4 => DataPath::Rdi0,
            5 => DataPath::Rdi1,
            6 => DataPath::Rdi2,
            7 => DataPath::Rdi3,
            8 => DataPath::Pdaf,
            9 => DataPath::PixelRaw,
            other => return Err(IfeError::InvalidArgument(format!("data path {other}"))),
        })
    }
}

/// Per-port frame subsampling for high frame rate batching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HfrPort {
    pub port: u32,
    pub subsample_pattern: u32,
    pub subsample_period: u32,
    pub framedrop_pattern: u32,
    pub framedrop_period: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HfrConfig {
    pub ports: Vec<HfrPort>,
}

impl BlobPayload for HfrConfig {
    const TAG: u32 = TAG_HFR;

    fn encode(&self, w: &mut BlobWriter) {
        w.u32(self.ports.len() as u32);
        for p in &self.ports {
            w.u32(p.port)
                .u32(p.subsample_pattern)
                .u32(p.subsample_period)
                .u32(p.framedrop_pattern)
                .u32(p.framedrop_period);
        }
    }

    fn decode(r: &mut BlobReader<'_>) -> Result<Self> {
        let n = r.count(20)?;
        let mut ports = Vec::with_capacity(n);
        for _ in 0..n {
            ports.push(HfrPort {
                port: r.u32()?,
                subsample_pattern: r.u32()?,
                subsample_period: r.u32()?,
                framedrop_pattern: r.u32()?,
                framedrop_period: r.u32()?,
            });
        }
        Ok(Self { ports })
    }
}

/// Clock vote for the pixel and RDI paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockConfig {
    pub usage: UsageType,
    pub left_pixel_hz: u64,
    pub right_pixel_hz: u64,
    pub rdi_hz: Vec<u64>,
}

impl BlobPayload for ClockConfig {
    const TAG: u32 = TAG_CLOCK;

    fn encode(&self, w: &mut BlobWriter) {
        w.u32(self.usage as u32)
            .u64(self.left_pixel_hz)
            .u64(self.right_pixel_hz)
            .u32(self.rdi_hz.len() as u32);
        for hz in &self.rdi_hz {
            w.u64(*hz);
        }
    }

    fn decode(r: &mut BlobReader<'_>) -> Result<Self> {
        let usage = UsageType::from_u32(r.u32()?)?;
        let left_pixel_hz = r.u64()?;
        let right_pixel_hz = r.u64()?;
        let n = r.count(8)?;
        let mut rdi_hz = Vec::with_capacity(n);
        for _ in 0..n {
            rdi_hz.push(r.u64()?);
        }
        Ok(Self {
            usage,
            left_pixel_hz,
            right_pixel_hz,
            rdi_hz,
        })
    }
}

/// Bandwidth vote for one data path, bytes per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BwVote {
    pub path: DataPath,
    pub camnoc: u64,
    pub external: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BwConfig {
    pub usage: UsageType,
    pub votes: Vec<BwVote>,
}

impl BwConfig {
    pub fn total_external(&self) -> u64 {
        self.votes.iter().map(|v| v.external).sum()
    }

    pub fn vote(&self, path: DataPath) -> Option<&BwVote> {
        self.votes.iter().find(|v| v.path == path)
    }
}

impl BlobPayload for BwConfig {
    const TAG: u32 = TAG_BANDWIDTH;

    fn encode(&self, w: &mut BlobWriter) {
        w.u32(self.usage as u32).u32(self.votes.len() as u32);
        for v in &self.votes {
            w.u32(v.path as u32).u64(v.camnoc).u64(v.external);
        }
    }

    fn decode(r: &mut BlobReader<'_>) -> Result<Self> {
        let usage = UsageType::from_u32(r.u32()?)?;
        let n = r.count(20)?;
        let mut votes = Vec::with_capacity(n);
        for _ in 0..n {
            votes.push(BwVote {
                path: DataPath::from_u32(r.u32()?)?,
                camnoc: r.u64()?,
                external: r.u64()?,
            });
        }
        Ok(Self { usage, votes })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UbwcPort {
    pub port: u32,
    pub version: u32,
    pub lossy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UbwcConfig {
    pub ports: Vec<UbwcPort>,
}

impl BlobPayload for UbwcConfig {
    const TAG: u32 = TAG_UBWC;

    fn encode(&self, w: &mut BlobWriter) {
        w.u32(self.ports.len() as u32);
        for p in &self.ports {
            w.u32(p.port).u32(p.version).bool(p.lossy);
        }
    }

    fn decode(r: &mut BlobReader<'_>) -> Result<Self> {
        let n = r.count(12)?;
        let mut ports = Vec::with_capacity(n);
        for _ in 0..n {
            ports.push(UbwcPort {
                port: r.u32()?,
                version: r.u32()?,
                lossy: r.bool()?,
            });
        }
        Ok(Self { ports })
    }
}

/// Frame-level core configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreConfig {
    pub input: Dimension,
    pub pattern: u32,
    pub dual: bool,
    pub bus_read: bool,
}

impl BlobPayload for CoreConfig {
    const TAG: u32 = TAG_CORE;

    fn encode(&self, w: &mut BlobWriter) {
        w.u32(self.input.width)
            .u32(self.input.height)
            .u32(self.pattern)
            .bool(self.dual)
            .bool(self.bus_read);
    }

    fn decode(r: &mut BlobReader<'_>) -> Result<Self> {
        Ok(Self {
            input: Dimension::new(r.u32()?, r.u32()?),
            pattern: r.u32()?,
            dual: r.bool()?,
            bus_read: r.bool()?,
        })
    }
}

/// Write-master geometry of one output port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WmPort {
    pub port: u32,
    pub width: u32,
    pub height: u32,
    pub format: u32,
    pub stride: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WmConfig {
    pub ports: Vec<WmPort>,
}

impl BlobPayload for WmConfig {
    const TAG: u32 = TAG_WM;

    fn encode(&self, w: &mut BlobWriter) {
        w.u32(self.ports.len() as u32);
        for p in &self.ports {
            w.u32(p.port)
                .u32(p.width)
                .u32(p.height)
                .u32(p.format)
                .u32(p.stride);
        }
    }

    fn decode(r: &mut BlobReader<'_>) -> Result<Self> {
        let n = r.count(20)?;
        let mut ports = Vec::with_capacity(n);
        for _ in 0..n {
            ports.push(WmPort {
                port: r.u32()?,
                width: r.u32()?,
                height: r.u32()?,
                format: r.u32()?,
                stride: r.u32()?,
            });
        }
        Ok(Self { ports })
    }
}

/// Per-port stripe pair of a dual-core frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DualPort {
    pub port: u32,
    pub left: StripeConfig,
    pub right: StripeConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DualConfig {
    pub split: DualSplitParams,
    pub ports: Vec<DualPort>,
}

impl BlobPayload for DualConfig {
    const TAG: u32 = TAG_DUAL;

    fn encode(&self, w: &mut BlobWriter) {
        w.u32(self.split.split_point)
            .u32(self.split.left_padding)
            .u32(self.split.right_padding)
            .u32(self.ports.len() as u32);
        for p in &self.ports {
            w.u32(p.port)
                .u32(p.left.offset)
                .u32(p.left.width)
                .u32(p.right.offset)
                .u32(p.right.width);
        }
    }

    fn decode(r: &mut BlobReader<'_>) -> Result<Self> {
        let split = DualSplitParams {
            split_point: r.u32()?,
            left_padding: r.u32()?,
            right_padding: r.u32()?,
        };
        let n = r.count(20)?;
        let mut ports = Vec::with_capacity(n);
        for _ in 0..n {
            ports.push(DualPort {
                port: r.u32()?,
                left: StripeConfig {
                    offset: r.u32()?,
                    width: r.u32()?,
                },
                right: StripeConfig {
                    offset: r.u32()?,
                    width: r.u32()?,
                },
            });
        }
        Ok(Self { split, ports })
    }
}

/// A decoded blob section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Blob {
    Hfr(HfrConfig),
    Clock(ClockConfig),
    Bandwidth(BwConfig),
    Ubwc(UbwcConfig),
    Core(CoreConfig),
    Wm(WmConfig),
    Dual(DualConfig),
}

impl Blob {
    pub fn tag(&self) -> u32 {
        match self {
            Blob::Hfr(_) => HfrConfig::TAG,
            Blob::Clock(_) => ClockConfig::TAG,
            Blob::Bandwidth(_) => BwConfig::TAG,
            Blob::Ubwc(_) => UbwcConfig::TAG,
            Blob::Core(_) => CoreConfig::TAG,
            Blob::Wm(_) => WmConfig::TAG,
            Blob::Dual(_) => DualConfig::TAG,
        }
    }

    /// Appends the tagged, padded section to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut w = BlobWriter::default();
        match self {
            Blob::Hfr(p) => p.encode(&mut w),
            Blob::Clock(p) => p.encode(&mut w),
            Blob::Bandwidth(p) => p.encode(&mut w),
            Blob::Ubwc(p) => p.encode(&mut w),
            Blob::Core(p) => p.encode(&mut w),
            Blob::Wm(p) => p.encode(&mut w),
            Blob::Dual(p) => p.encode(&mut w),
        }
        write_section(out, self.tag(), &w.into_bytes());
    }
}

/// Appends a raw section; used for tags this crate does not model.
pub fn write_section(out: &mut Vec<u8>, tag: u32, payload: &[u8]) {
    let _ = out.write_u32::<LittleEndian>(tag);
    let _ = out.write_u32::<LittleEndian>(payload.len() as u32);
    out.extend_from_slice(payload);
    out.resize(out.len() + padding(payload.len()), 0);
}

fn padding(len: usize) -> usize {
    (4 - len % 4) % 4
}

/// Decodes every known section, skipping unknown tags.
pub fn parse_blobs(bytes: &[u8]) -> Result<Vec<Blob>> {
    let mut blobs = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        let mut header = BlobReader::new(&bytes[pos..]);
        let tag = header.u32()?;
        let len = header.u32()? as usize;
        let start = pos + 8;
        let end = start
            .checked_add(len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| {
                IfeError::OutOfBounds(format!("blob tag {tag} length {len} overruns packet"))
            })?;
        let mut r = BlobReader::new(&bytes[start..end]);
        let blob = match tag {
            TAG_HFR => Some(Blob::Hfr(HfrConfig::decode(&mut r)?)),
            TAG_CLOCK => Some(Blob::Clock(ClockConfig::decode(&mut r)?)),
            TAG_BANDWIDTH => Some(Blob::Bandwidth(BwConfig::decode(&mut r)?)),
            TAG_UBWC => Some(Blob::Ubwc(UbwcConfig::decode(&mut r)?)),
            TAG_CORE => Some(Blob::Core(CoreConfig::decode(&mut r)?)),
            TAG_WM => Some(Blob::Wm(WmConfig::decode(&mut r)?)),
            TAG_DUAL => Some(Blob::Dual(DualConfig::decode(&mut r)?)),
            unknown => {
                debug!(tag = unknown, len, "skipping unknown blob");
                None
            }
        };
        blobs.extend(blob);
        pos = end + padding(len);
    }
    Ok(blobs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_tags_are_skipped() -> Result<()> {
        let clock = Blob::Clock(ClockConfig {
            usage: UsageType::Dual,
            left_pixel_hz: 400_000_000,
            right_pixel_hz: 380_000_000,
            rdi_hz: vec![100_000_000],
        });
        let core = Blob::Core(CoreConfig {
            input: Dimension::new(4000, 3000),
            pattern: 0,
            dual: true,
            bus_read: false,
        });

        let mut bytes = Vec::new();
        clock.encode(&mut bytes);
        write_section(&mut bytes, 0x77, &[1, 2, 3]);
        core.encode(&mut bytes);

        let blobs = parse_blobs(&bytes)?;
        assert_eq!(blobs, vec![clock, core]);
        Ok(())
    }

    #[test]
    fn overrun_is_rejected() {
        let mut bytes = Vec::new();
        write_section(&mut bytes, TAG_WM, &[0; 8]);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(parse_blobs(&bytes), Err(IfeError::OutOfBounds(_))));
    }

    #[test]
    fn count_guard() {
        let mut w = BlobWriter::default();
        w.u32(u32::MAX);
        let bytes = w.into_bytes();
        let mut r = BlobReader::new(&bytes);
        assert!(WmConfig::decode(&mut r).is_err());
    }
}
