// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Hardware-version strategies.
//!
//! An [`IspPipeline`] owns everything that depends on the chip but not on a
//! particular IQ module: packing the module enables into the top-level
//! registers, clock gating and flush setup, output throttling, UBWC mode
//! selection and the register-dump blobs used for flush read-back and hang
//! post-mortems. One strategy is selected at node creation from the chip id.

pub mod enable;
pub mod regdump;
mod v1;
mod v2;
mod v3;

pub use enable::ModuleEnable;
pub use regdump::{CapturedDump, DumpType, RegisterIo};
pub use v1::V1Pipeline;
pub use v2::V2Pipeline;
pub use v3::V3Pipeline;

use crate::{
    capability::{Capability, ModuleId, ModuleType},
    error::{IfeError, Result},
    format::{Dimension, Format, Rect},
    hw::{HwVersion, ReadRange, RegRange, RegWrite, RegisterMap},
    iq::{CalculatedData, StatsConfig},
    packet::cmd_buffer::{CommandBuffer, DMI_HEADER_WORDS, REG_WRITE_WORDS},
    split::{Instance, SplitMode},
};
use std::{collections::BTreeMap, io::Write};
use tracing::{debug, trace, warn};

/// Command and dump buffer sizes of one version, in 32-bit words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSizes {
    pub cmd_words: usize,
    pub dump_words: usize,
}

impl BufferSizes {
    /// Sums the register table: every module register, LUT and top-level
    /// write a request can emit, and a dual hang dump of every group.
    pub fn from_map(map: &RegisterMap) -> Self {
        let modules: usize = map
            .modules
            .iter()
            .map(|m| {
                let regs = m.regs.count as usize * REG_WRITE_WORDS;
                let lut = m.lut.map_or(0, |l| {
                    REG_WRITE_WORDS + DMI_HEADER_WORDS + l.words as usize
                });
                regs + lut
            })
            .sum();
        let top = map.enable_registers.len()
            + map.cgc_override.len()
            + usize::from(map.flush_halt.is_some())
            + usize::from(map.throttle.is_some())
            + map.bus_read.map_or(0, |r| r.count as usize);
        let cmd_words = modules + top * REG_WRITE_WORDS;

        let groups: Vec<ReadRange> = map.hang_dump.iter().map(|g| g.range).collect();
        let dump_bytes = regdump::blob_size(&[
            (DumpType::LeftInstance, groups.clone()),
            (DumpType::RightInstance, groups),
        ]);
        Self {
            cmd_words,
            dump_words: dump_bytes.div_ceil(4),
        }
    }
}

/// UBWC parameters chosen for one output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UbwcMode {
    pub version: u32,
    pub lossy: bool,
}

/// Output throttle duty cycle derived from the expected throughput.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottlePattern {
    Disabled,
    Percent75,
    Percent50,
    Percent25,
}

impl ThrottlePattern {
    pub fn for_throughput(throughput: f32) -> Self {
        if throughput > 0.75 {
            ThrottlePattern::Disabled
        } else if throughput > 0.5 {
            ThrottlePattern::Percent75
        } else if throughput > 0.25 {
            ThrottlePattern::Percent50
        } else {
            ThrottlePattern::Percent25
        }
    }

    /// Pass pattern over 32 cycles.
    pub fn pattern(&self) -> u32 {
        match self {
            ThrottlePattern::Disabled => 0xffff_ffff,
            ThrottlePattern::Percent75 => 0x7777_7777,
            ThrottlePattern::Percent50 => 0x5555_5555,
            ThrottlePattern::Percent25 => 0x1111_1111,
        }
    }
}

/// Next LUT bank per module, read back from a flush dump.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BankUpdate {
    pub next: BTreeMap<ModuleId, u8>,
}

/// Packed enables and register snapshots for tuning tools.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuningDump {
    pub enables: Vec<u32>,
    pub modules: Vec<(ModuleId, Instance, Vec<RegWrite>)>,
}

/// Default stats region grid for a frame.
pub fn default_stats_config(version: HwVersion, kind: ModuleType, frame: Dimension) -> Option<StatsConfig> {
    let regions = match (kind, version) {
        (ModuleType::BHist, _) => Dimension::new(1, 1),
        (ModuleType::AwbBg, HwVersion::V3) => Dimension::new(32, 24),
        (ModuleType::AwbBg, _) => Dimension::new(64, 48),
        (ModuleType::Bf, _) => Dimension::new(1, 1),
        _ => return None,
    };
    Some(StatsConfig {
        roi: Rect::full(frame),
        regions,
    })
}

/// Chip-specific configuration shared by every module.
pub trait IspPipeline: Send {
    fn version(&self) -> HwVersion;

    fn sizes(&self) -> BufferSizes;

    fn capability(&self) -> &'static Capability {
        Capability::lookup(self.version())
    }

    fn registers(&self) -> &'static RegisterMap {
        self.version().registers()
    }

    /// Register command buffer size per segment, fixed per version.
    fn cmd_size_words(&self) -> usize {
        self.sizes().cmd_words
    }

    /// Hang dump buffer size, fixed per version.
    fn dump_size_words(&self) -> usize {
        self.sizes().dump_words
    }

    /// Writes the top-level enable registers and returns their values.
    ///
    /// Enables set at stream start in `common` stay set whatever the request
    /// asks for.
    fn program_module_enable_config(
        &self,
        common: ModuleEnable,
        request: ModuleEnable,
        cmd: &mut CommandBuffer,
    ) -> Result<Vec<u32>> {
        let map = self.registers();
        let packed = (common | request).pack(map);
        let mut burst = cmd.burst();
        for (offset, value) in map.enable_registers.iter().zip(&packed) {
            burst.write(*offset, *value);
        }
        burst.finish()?;
        trace!(?packed, "module enables");
        Ok(packed)
    }

    fn fill_cgc_config(&self, cmd: &mut CommandBuffer) -> Result<()> {
        let mut burst = cmd.burst();
        burst.write_all(self.registers().cgc_override.iter().copied());
        burst.finish()
    }

    fn fill_flush_config(&self, cmd: &mut CommandBuffer) -> Result<()> {
        match self.registers().flush_halt {
            Some(halt) => cmd.write_reg(halt.offset, halt.value),
            None => Ok(()),
        }
    }

    fn set_throttle_pattern(&self, throughput: f32, cmd: &mut CommandBuffer) -> Result<()> {
        let Some(offset) = self.registers().throttle else {
            trace!("no output throttle on {:?}", self.version());
            return Ok(());
        };
        let pattern = ThrottlePattern::for_throughput(throughput);
        debug!(?pattern, throughput, "output throttle");
        cmd.write_reg(offset, pattern.pattern())
    }

    /// UBWC parameters for an output, `None` for linear outputs.
    fn ubwc_mode(&self, _format: Format, _dims: Dimension) -> Option<UbwcMode> {
        None
    }

    /// Forces every double-buffered LUT to `bank`.
    fn update_dmi_bank_select(&self, bank: u8, cmd: &mut CommandBuffer) -> Result<()> {
        let mut burst = cmd.burst();
        for module in self.registers().lut_modules() {
            if let Some(lut) = module.lut {
                burst.write(lut.bank_select, (bank & 1) as u32);
            }
        }
        burst.finish()
    }

    /// Programs the bus-read engine for offline input.
    fn fill_bus_read_config(&self, _input: Dimension, _format: Format, _cmd: &mut CommandBuffer) -> Result<()> {
        Err(IfeError::Unsupported(format!(
            "{:?} has no bus-read engine",
            self.version()
        )))
    }

    /// Dump blob reading back the bank select of every LUT module.
    fn setup_flush_reg_dump(&self) -> Result<Vec<u8>> {
        let ranges = self
            .registers()
            .lut_modules()
            .filter_map(|m| m.lut)
            .map(|l| ReadRange::Reg(RegRange::new(l.bank_select, 1)))
            .collect();
        regdump::build(&[(DumpType::Aux, ranges)])
    }

    /// Maps a captured flush dump back to the bank each LUT module writes next.
    fn parse_flush_reg_dump(&self, bytes: &[u8]) -> Result<BankUpdate> {
        let map = self.registers();
        let mut update = BankUpdate::default();
        for dump in regdump::parse_captures(bytes)? {
            for value in dump.values {
                let module = map
                    .lut_modules()
                    .find(|m| m.lut.is_some_and(|l| l.bank_select == value.offset));
                match module {
                    Some(m) => {
                        update.next.insert(m.id(), ((value.value & 1) ^ 1) as u8);
                    }
                    None => warn!("unknown offset {:#x} in flush dump", value.offset),
                }
            }
        }
        Ok(update)
    }

    /// Dump blob for a hang post-mortem, one descriptor per active core.
    fn setup_hang_reg_dump(&self, mode: SplitMode, mask: u32) -> Result<Vec<u8>> {
        let ranges: Vec<ReadRange> = self
            .registers()
            .hang_dump
            .iter()
            .filter(|g| g.mask & mask != 0)
            .map(|g| g.range)
            .collect();
        match mode {
            SplitMode::Single => regdump::build(&[(DumpType::LeftInstance, ranges)]),
            SplitMode::Dual => regdump::build(&[
                (DumpType::LeftInstance, ranges.clone()),
                (DumpType::RightInstance, ranges),
            ]),
        }
    }

    /// Writes a captured hang dump as `0xOFFSET=0xVALUE` lines and returns the
    /// number of registers written.
    fn parse_hang_reg_dump(&self, bytes: &[u8], out: &mut dyn Write) -> Result<usize> {
        let mut written = 0;
        for dump in regdump::parse_captures(bytes)? {
            writeln!(out, "# {:?} request {}", dump.kind, dump.request_id)?;
            for value in &dump.values {
                writeln!(out, "0x{:X}=0x{:X}", value.offset, value.value)?;
            }
            written += dump.values.len();
        }
        Ok(written)
    }

    /// Packed enables plus the register snapshots of enabled modules.
    fn tuning_dump(&self, packed: &[u32], data: &CalculatedData) -> TuningDump {
        let enables = ModuleEnable::unpack(self.registers(), packed);
        let modules = data
            .snapshots
            .iter()
            .filter(|((id, _), _)| enables.intersects(ModuleEnable::for_module(*id)))
            .map(|((id, instance), regs)| (*id, *instance, regs.clone()))
            .collect();
        TuningDump {
            enables: packed.to_vec(),
            modules,
        }
    }
}

/// UBWC selection shared by the versions that have it.
pub(crate) fn select_ubwc(cap: &Capability, format: Format, dims: Dimension) -> Option<UbwcMode> {
    if !format.is_ubwc() || !cap.supports_ubwc() {
        return None;
    }
    use crate::capability::UbwcVersions;
    let version = if cap.ubwc.contains(UbwcVersions::V4) {
        4
    } else if cap.ubwc.contains(UbwcVersions::V3) {
        3
    } else {
        2
    };
    let limit = if format.is_10bit() {
        cap.lossy_10bit_max
    } else {
        cap.lossy_8bit_max
    };
    let lossy = !limit.is_zero() && dims.width <= limit.width && dims.height <= limit.height;
    Some(UbwcMode { version, lossy })
}

/// Selects the strategy for a hardware version.
pub fn create(version: HwVersion) -> Box<dyn IspPipeline> {
    match version {
        HwVersion::V1 => Box::new(V1Pipeline::new()),
        HwVersion::V2 => Box::new(V2Pipeline::new()),
        HwVersion::V3 => Box::new(V3Pipeline::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::Command;

    #[test]
    fn append_only_enables() -> Result<()> {
        let pipeline = create(HwVersion::V2);
        let mut cmd = CommandBuffer::with_capacity(64);
        let common = ModuleEnable::LINEARIZATION | ModuleEnable::OUT_FULL;
        let packed = pipeline.program_module_enable_config(common, ModuleEnable::BF, &mut cmd)?;
        let enables = ModuleEnable::unpack(pipeline.registers(), &packed);
        assert!(enables.contains(common | ModuleEnable::BF));
        assert_eq!(cmd.commands().len(), 5);
        Ok(())
    }

    #[test]
    fn throttle_steps() {
        assert_eq!(ThrottlePattern::for_throughput(1.0), ThrottlePattern::Disabled);
        assert_eq!(ThrottlePattern::for_throughput(0.75), ThrottlePattern::Percent75);
        assert_eq!(ThrottlePattern::for_throughput(0.5), ThrottlePattern::Percent50);
        assert_eq!(ThrottlePattern::for_throughput(0.1), ThrottlePattern::Percent25);
    }

    #[test]
    fn v1_has_no_throttle() -> Result<()> {
        let mut cmd = CommandBuffer::with_capacity(16);
        create(HwVersion::V1).set_throttle_pattern(0.3, &mut cmd)?;
        assert!(cmd.is_empty());
        create(HwVersion::V2).set_throttle_pattern(0.3, &mut cmd)?;
        assert_eq!(
            cmd.commands(),
            &[Command::Reg(RegWrite::new(0x40c0, 0x5555_5555))]
        );
        Ok(())
    }

    #[test]
    fn sizes_fixed_per_version() {
        let v1 = create(HwVersion::V1);
        let v2 = create(HwVersion::V2);
        assert!(v2.cmd_size_words() > v1.cmd_size_words());
        assert_eq!(v1.sizes(), BufferSizes::from_map(HwVersion::V1.registers()));
    }

    #[test]
    fn ubwc_lossy_limits() {
        let v2 = create(HwVersion::V2);
        assert_eq!(
            v2.ubwc_mode(Format::UbwcNv12, Dimension::new(1920, 1080)),
            Some(UbwcMode {
                version: 4,
                lossy: true
            })
        );
        assert_eq!(
            v2.ubwc_mode(Format::UbwcTp10, Dimension::new(1920, 1080)).map(|m| m.lossy),
            Some(false)
        );
        assert_eq!(v2.ubwc_mode(Format::Nv12, Dimension::new(1920, 1080)), None);
        assert_eq!(
            create(HwVersion::V3).ubwc_mode(Format::UbwcNv12, Dimension::new(640, 480)),
            None
        );
    }
}
