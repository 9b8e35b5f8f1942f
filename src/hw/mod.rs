// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Chip identification and the per-version register tables.
//!
//! The tables are read-only data. Offsets and counts are what the command
//! builders and dump descriptors need; individual bitfields are owned by the
//! module that programs them.

use crate::{
    capability::{ModuleId, ModuleType, PipelinePath},
    error::{IfeError, Result},
    pipeline::ModuleEnable,
};
use std::fmt;

pub(crate) mod v1;
pub(crate) mod v2;
pub(crate) mod v3;

/// Raw chip identifier read from the camera subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChipId(pub u32);

impl ChipId {
    pub const IFE_170: ChipId = ChipId(0x170);
    pub const IFE_175: ChipId = ChipId(0x175);
    pub const IFE_480: ChipId = ChipId(0x480);
    pub const TFE_530: ChipId = ChipId(0x530);
}

impl fmt::Display for ChipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Hardware generation; selects capability, registers and pipeline strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HwVersion {
    /// Base IFE
    V1,
    /// Extended channel set with display path
    V2,
    /// Bus-read capable TFE used for offline processing
    V3,
}

impl TryFrom<ChipId> for HwVersion {
    type Error = IfeError;

    fn try_from(chip: ChipId) -> Result<Self> {
        match chip {
            ChipId::IFE_170 | ChipId::IFE_175 => Ok(HwVersion::V1),
            ChipId::IFE_480 => Ok(HwVersion::V2),
            ChipId::TFE_530 => Ok(HwVersion::V3),
            other => Err(IfeError::Unsupported(format!("chip {other}"))),
        }
    }
}

impl HwVersion {
    pub fn registers(&self) -> &'static RegisterMap {
        match self {
            HwVersion::V1 => &v1::REGISTERS,
            HwVersion::V2 => &v2::REGISTERS,
            HwVersion::V3 => &v3::REGISTERS,
        }
    }
}

/// A single register write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegWrite {
    pub offset: u32,
    pub value: u32,
}

impl RegWrite {
    pub const fn new(offset: u32, value: u32) -> Self {
        Self { offset, value }
    }
}

/// Contiguous register range, `count` 32-bit registers from `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegRange {
    pub offset: u32,
    pub count: u32,
}

impl RegRange {
    pub const fn new(offset: u32, count: u32) -> Self {
        Self { offset, count }
    }

    pub fn contains(&self, offset: u32) -> bool {
        offset >= self.offset && offset < self.offset + self.count * 4
    }
}

/// Maximum setup writes before and after a DMI read-back.
pub const MAX_DMI_WRITES: usize = 5;

/// LUT read-back through the DMI port, bracketed by select writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmiRead {
    pub pre: &'static [RegWrite],
    pub read: RegRange,
    pub post: &'static [RegWrite],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadRange {
    Reg(RegRange),
    Dmi(DmiRead),
}

impl ReadRange {
    /// Registers captured by this read.
    pub fn count(&self) -> u32 {
        match self {
            ReadRange::Reg(r) => r.count,
            ReadRange::Dmi(d) => d.read.count,
        }
    }
}

/// One maskable group of the hang dump.
#[derive(Debug, Clone, Copy)]
pub struct DumpGroup {
    pub mask: u32,
    pub name: &'static str,
    pub range: ReadRange,
}

/// DMI-backed LUT of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LutRegion {
    /// DMI configuration register the LUT select is written to
    pub dmi_cfg: u32,
    /// Module register holding the active bank
    pub bank_select: u32,
    /// LUT identifier in the DMI address space
    pub lut_select: u32,
    /// Table size in 32-bit words
    pub words: u32,
}

/// Register footprint of one module instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleRegion {
    pub kind: ModuleType,
    pub path: PipelinePath,
    pub regs: RegRange,
    pub lut: Option<LutRegion>,
}

impl ModuleRegion {
    pub fn id(&self) -> ModuleId {
        ModuleId::new(self.kind, self.path)
    }

    /// Offset of the `index`th register of the module.
    pub fn reg(&self, index: u32) -> u32 {
        self.regs.offset + index * 4
    }
}

/// Placement of one enable flag in the top-level enable registers.
#[derive(Debug, Clone, Copy)]
pub struct EnableField {
    pub flag: ModuleEnable,
    /// Index into [`RegisterMap::enable_registers`]
    pub register: usize,
    pub bit: u8,
}

/// Full register description of one hardware version.
#[derive(Debug)]
pub struct RegisterMap {
    pub name: &'static str,
    pub enable_registers: &'static [u32],
    pub enable_fields: &'static [EnableField],
    pub modules: &'static [ModuleRegion],
    pub cgc_override: &'static [RegWrite],
    pub flush_halt: Option<RegWrite>,
    pub throttle: Option<u32>,
    /// Bus-read engine configuration, offline input only
    pub bus_read: Option<RegRange>,
    pub hang_dump: &'static [DumpGroup],
}

impl RegisterMap {
    pub fn module(&self, kind: ModuleType, path: PipelinePath) -> Option<&'static ModuleRegion> {
        self.modules
            .iter()
            .find(|m| m.kind == kind && m.path == path)
    }

    /// Modules whose LUTs are double buffered.
    pub fn lut_modules(&self) -> impl Iterator<Item = &'static ModuleRegion> {
        self.modules.iter().filter(|m| m.lut.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chip_resolution() {
        assert_eq!(HwVersion::try_from(ChipId::IFE_175).ok(), Some(HwVersion::V1));
        assert_eq!(HwVersion::try_from(ChipId::IFE_480).ok(), Some(HwVersion::V2));
        assert!(matches!(
            HwVersion::try_from(ChipId(0x999)),
            Err(IfeError::Unsupported(_))
        ));
    }

    #[test]
    fn tables_have_no_overlapping_modules() {
        for version in [HwVersion::V1, HwVersion::V2, HwVersion::V3] {
            let regs = version.registers();
            for (i, a) in regs.modules.iter().enumerate() {
                for b in &regs.modules[i + 1..] {
                    let end_a = a.regs.offset + a.regs.count * 4;
                    let end_b = b.regs.offset + b.regs.count * 4;
                    assert!(
                        end_a <= b.regs.offset || end_b <= a.regs.offset,
                        "{}: {:?} overlaps {:?}",
                        regs.name,
                        a.id(),
                        b.id()
                    );
                }
            }
        }
    }

    #[test]
    fn every_installed_module_has_registers() {
        use crate::capability::Capability;
        for version in [HwVersion::V1, HwVersion::V2, HwVersion::V3] {
            let regs = version.registers();
            for entry in Capability::lookup(version).installed() {
                assert!(
                    regs.module(entry.kind, entry.path).is_some(),
                    "{:?} missing {:?}",
                    version,
                    entry.id()
                );
            }
        }
    }
}
