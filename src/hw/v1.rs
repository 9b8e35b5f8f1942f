// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Register map for V1 (IFE 170/175).

use super::*;

const DMI_CFG: u32 = 0xc24;

pub(crate) static REGISTERS: RegisterMap = RegisterMap {
    name: "ife-v1",
    enable_registers: &[
        0x040, // LENS_EN
        0x044, // COLOR_EN
        0x048, // ZOOM_EN
        0x04c, // STATS_EN
    ],
    enable_fields: &[
        EnableField { flag: ModuleEnable::LINEARIZATION, register: 0, bit: 0 },
        EnableField { flag: ModuleEnable::LSC, register: 0, bit: 7 },
        EnableField { flag: ModuleEnable::DEMOSAIC, register: 0, bit: 8 },
        EnableField { flag: ModuleEnable::WHITE_BALANCE, register: 1, bit: 1 },
        EnableField { flag: ModuleEnable::GAMMA, register: 1, bit: 2 },
        EnableField { flag: ModuleEnable::OUT_FULL, register: 2, bit: 0 },
        EnableField { flag: ModuleEnable::MNDS_FULL, register: 2, bit: 1 },
        EnableField { flag: ModuleEnable::CROP_FULL, register: 2, bit: 2 },
        EnableField { flag: ModuleEnable::OUT_FD, register: 2, bit: 3 },
        EnableField { flag: ModuleEnable::MNDS_FD, register: 2, bit: 4 },
        EnableField { flag: ModuleEnable::CROP_FD, register: 2, bit: 5 },
        EnableField { flag: ModuleEnable::OUT_DS4, register: 2, bit: 6 },
        EnableField { flag: ModuleEnable::MNDS_DS4, register: 2, bit: 7 },
        EnableField { flag: ModuleEnable::OUT_PIXEL_RAW, register: 2, bit: 8 },
        EnableField { flag: ModuleEnable::CROP_PIXEL_RAW, register: 2, bit: 9 },
        EnableField { flag: ModuleEnable::BHIST, register: 3, bit: 0 },
        EnableField { flag: ModuleEnable::AWB_BG, register: 3, bit: 1 },
        EnableField { flag: ModuleEnable::BF, register: 3, bit: 2 },
    ],
    modules: &[
        ModuleRegion {
            kind: ModuleType::Linearization,
            path: PipelinePath::Common,
            regs: RegRange::new(0x600, 9),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0x5f0, lut_select: 0x1, words: 36 }),
        },
        ModuleRegion {
            kind: ModuleType::Lsc,
            path: PipelinePath::Common,
            regs: RegRange::new(0x800, 6),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0x7f0, lut_select: 0x2, words: 442 }),
        },
        ModuleRegion {
            kind: ModuleType::Demosaic,
            path: PipelinePath::Common,
            regs: RegRange::new(0x900, 6),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::WhiteBalance,
            path: PipelinePath::Common,
            regs: RegRange::new(0x980, 5),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Gamma,
            path: PipelinePath::Common,
            regs: RegRange::new(0xa00, 2),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0x9f0, lut_select: 0x3, words: 192 }),
        },
        ModuleRegion {
            kind: ModuleType::Mnds,
            path: PipelinePath::Full,
            regs: RegRange::new(0xd00, 6),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Crop,
            path: PipelinePath::Full,
            regs: RegRange::new(0xd40, 4),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Mnds,
            path: PipelinePath::Fd,
            regs: RegRange::new(0xd80, 6),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Crop,
            path: PipelinePath::Fd,
            regs: RegRange::new(0xdc0, 4),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Mnds,
            path: PipelinePath::Ds4,
            regs: RegRange::new(0xe00, 6),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Crop,
            path: PipelinePath::PixelRaw,
            regs: RegRange::new(0xe40, 4),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::BHist,
            path: PipelinePath::Common,
            regs: RegRange::new(0xf00, 3),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::AwbBg,
            path: PipelinePath::Common,
            regs: RegRange::new(0xf40, 5),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Bf,
            path: PipelinePath::Common,
            regs: RegRange::new(0xf80, 6),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0xf7c, lut_select: 0x4, words: 180 }),
        },
    ],
    cgc_override: &[
        RegWrite::new(0x014, 0xffff_ffff),
        RegWrite::new(0x018, 0xffff_ffff),
        RegWrite::new(0x01c, 0xffff_ffff),
    ],
    flush_halt: Some(RegWrite::new(0x0a0, 0b1010_1010_1010_1010)),
    throttle: None,
    bus_read: None,
    hang_dump: &[
        DumpGroup { mask: 1 << 0, name: "top", range: ReadRange::Reg(RegRange::new(0x000, 24)) },
        DumpGroup { mask: 1 << 1, name: "linearization", range: ReadRange::Reg(RegRange::new(0x600, 9)) },
        DumpGroup { mask: 1 << 2, name: "lsc", range: ReadRange::Reg(RegRange::new(0x800, 6)) },
        DumpGroup { mask: 1 << 3, name: "color", range: ReadRange::Reg(RegRange::new(0x900, 38)) },
        DumpGroup { mask: 1 << 4, name: "gamma", range: ReadRange::Reg(RegRange::new(0xa00, 2)) },
        DumpGroup { mask: 1 << 5, name: "zoom", range: ReadRange::Reg(RegRange::new(0xd00, 84)) },
        DumpGroup { mask: 1 << 6, name: "stats", range: ReadRange::Reg(RegRange::new(0xf00, 38)) },
        DumpGroup { mask: 1 << 7, name: "bus_wr", range: ReadRange::Reg(RegRange::new(0x2000, 64)) },
    ],
};
