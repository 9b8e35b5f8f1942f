// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Register map for V3 (TFE 530). Single core with a bus-read engine for
//! offline input.

use super::*;

const DMI_CFG: u32 = 0x1c24;

pub(crate) static REGISTERS: RegisterMap = RegisterMap {
    name: "tfe-v3",
    enable_registers: &[
        0x1040, // CORE_EN
        0x1044, // OUT_EN
        0x1048, // STATS_EN
    ],
    enable_fields: &[
        EnableField { flag: ModuleEnable::LINEARIZATION, register: 0, bit: 0 },
        EnableField { flag: ModuleEnable::LSC, register: 0, bit: 2 },
        EnableField { flag: ModuleEnable::DEMOSAIC, register: 0, bit: 3 },
        EnableField { flag: ModuleEnable::WHITE_BALANCE, register: 0, bit: 4 },
        EnableField { flag: ModuleEnable::GAMMA, register: 0, bit: 5 },
        EnableField { flag: ModuleEnable::OUT_FULL, register: 1, bit: 0 },
        EnableField { flag: ModuleEnable::MNDS_FULL, register: 1, bit: 1 },
        EnableField { flag: ModuleEnable::CROP_FULL, register: 1, bit: 2 },
        EnableField { flag: ModuleEnable::OUT_PIXEL_RAW, register: 1, bit: 3 },
        EnableField { flag: ModuleEnable::CROP_PIXEL_RAW, register: 1, bit: 4 },
        EnableField { flag: ModuleEnable::BHIST, register: 2, bit: 0 },
        EnableField { flag: ModuleEnable::AWB_BG, register: 2, bit: 1 },
        EnableField { flag: ModuleEnable::BF, register: 2, bit: 2 },
    ],
    modules: &[
        ModuleRegion {
            kind: ModuleType::Linearization,
            path: PipelinePath::Common,
            regs: RegRange::new(0x1600, 9),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0x15f0, lut_select: 0x1, words: 36 }),
        },
        ModuleRegion {
            kind: ModuleType::Lsc,
            path: PipelinePath::Common,
            regs: RegRange::new(0x1800, 6),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0x17f0, lut_select: 0x2, words: 442 }),
        },
        ModuleRegion {
            kind: ModuleType::Demosaic,
            path: PipelinePath::Common,
            regs: RegRange::new(0x1900, 6),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::WhiteBalance,
            path: PipelinePath::Common,
            regs: RegRange::new(0x1980, 5),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Gamma,
            path: PipelinePath::Common,
            regs: RegRange::new(0x1a00, 2),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0x19f0, lut_select: 0x3, words: 192 }),
        },
        ModuleRegion {
            kind: ModuleType::Mnds,
            path: PipelinePath::Full,
            regs: RegRange::new(0x1d00, 6),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Crop,
            path: PipelinePath::Full,
            regs: RegRange::new(0x1d40, 4),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Crop,
            path: PipelinePath::PixelRaw,
            regs: RegRange::new(0x1d80, 4),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::BHist,
            path: PipelinePath::Common,
            regs: RegRange::new(0x1f00, 3),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::AwbBg,
            path: PipelinePath::Common,
            regs: RegRange::new(0x1f40, 5),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Bf,
            path: PipelinePath::Common,
            regs: RegRange::new(0x1f80, 6),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0x1f7c, lut_select: 0x4, words: 180 }),
        },
    ],
    cgc_override: &[
        RegWrite::new(0x1014, 0xffff_ffff),
        RegWrite::new(0x1018, 0x0000_ffff),
    ],
    flush_halt: None,
    throttle: Some(0x10c4),
    bus_read: Some(RegRange::new(0x1100, 6)),
    hang_dump: &[
        DumpGroup { mask: 1 << 0, name: "top", range: ReadRange::Reg(RegRange::new(0x1000, 20)) },
        DumpGroup { mask: 1 << 1, name: "bus_rd", range: ReadRange::Reg(RegRange::new(0x1100, 6)) },
        DumpGroup { mask: 1 << 2, name: "core", range: ReadRange::Reg(RegRange::new(0x1600, 0x100)) },
        DumpGroup { mask: 1 << 5, name: "out", range: ReadRange::Reg(RegRange::new(0x1d00, 36)) },
        DumpGroup { mask: 1 << 6, name: "stats", range: ReadRange::Reg(RegRange::new(0x1f00, 38)) },
    ],
};
