// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Register map for V2 (IFE 480), which adds the display path and a
//! programmable output throttle.

use super::*;

const DMI_CFG: u32 = 0x4c24;
const DMI_ADDR: u32 = 0x4c28;
const DMI_DATA: u32 = 0x4c2c;

// Gamma LUT read-back: select the LUT with auto-increment, read, deselect.
const GAMMA_DMI_PRE: [RegWrite; 2] = [
    RegWrite::new(DMI_CFG, 0x100 | 0x3),
    RegWrite::new(DMI_ADDR, 0),
];
const GAMMA_DMI_POST: [RegWrite; 1] = [RegWrite::new(DMI_CFG, 0)];

pub(crate) static REGISTERS: RegisterMap = RegisterMap {
    name: "ife-v2",
    enable_registers: &[
        0x4040, // LENS_EN
        0x4044, // COLOR_EN
        0x4048, // ZOOM_EN
        0x404c, // DISP_EN
        0x4050, // STATS_EN
    ],
    enable_fields: &[
        EnableField { flag: ModuleEnable::LINEARIZATION, register: 0, bit: 1 },
        EnableField { flag: ModuleEnable::LSC, register: 0, bit: 7 },
        EnableField { flag: ModuleEnable::DEMOSAIC, register: 0, bit: 9 },
        EnableField { flag: ModuleEnable::WHITE_BALANCE, register: 1, bit: 0 },
        EnableField { flag: ModuleEnable::GAMMA, register: 1, bit: 3 },
        EnableField { flag: ModuleEnable::OUT_FULL, register: 2, bit: 0 },
        EnableField { flag: ModuleEnable::MNDS_FULL, register: 2, bit: 1 },
        EnableField { flag: ModuleEnable::CROP_FULL, register: 2, bit: 2 },
        EnableField { flag: ModuleEnable::OUT_FD, register: 2, bit: 4 },
        EnableField { flag: ModuleEnable::MNDS_FD, register: 2, bit: 5 },
        EnableField { flag: ModuleEnable::CROP_FD, register: 2, bit: 6 },
        EnableField { flag: ModuleEnable::OUT_DS4, register: 2, bit: 8 },
        EnableField { flag: ModuleEnable::MNDS_DS4, register: 2, bit: 9 },
        EnableField { flag: ModuleEnable::OUT_PIXEL_RAW, register: 2, bit: 12 },
        EnableField { flag: ModuleEnable::CROP_PIXEL_RAW, register: 2, bit: 13 },
        EnableField { flag: ModuleEnable::OUT_DISPLAY, register: 3, bit: 0 },
        EnableField { flag: ModuleEnable::MNDS_DISPLAY, register: 3, bit: 1 },
        EnableField { flag: ModuleEnable::CROP_DISPLAY, register: 3, bit: 2 },
        EnableField { flag: ModuleEnable::GAMMA_DISPLAY, register: 3, bit: 3 },
        EnableField { flag: ModuleEnable::BHIST, register: 4, bit: 4 },
        EnableField { flag: ModuleEnable::AWB_BG, register: 4, bit: 5 },
        EnableField { flag: ModuleEnable::BF, register: 4, bit: 6 },
    ],
    modules: &[
        ModuleRegion {
            kind: ModuleType::Linearization,
            path: PipelinePath::Common,
            regs: RegRange::new(0x4600, 9),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0x45f0, lut_select: 0x1, words: 36 }),
        },
        ModuleRegion {
            kind: ModuleType::Lsc,
            path: PipelinePath::Common,
            regs: RegRange::new(0x4800, 6),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0x47f0, lut_select: 0x2, words: 442 }),
        },
        ModuleRegion {
            kind: ModuleType::Demosaic,
            path: PipelinePath::Common,
            regs: RegRange::new(0x4900, 6),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::WhiteBalance,
            path: PipelinePath::Common,
            regs: RegRange::new(0x4980, 5),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Gamma,
            path: PipelinePath::Full,
            regs: RegRange::new(0x4a00, 2),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0x49f0, lut_select: 0x3, words: 192 }),
        },
        ModuleRegion {
            kind: ModuleType::Gamma,
            path: PipelinePath::Display,
            regs: RegRange::new(0x4a40, 2),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0x4a3c, lut_select: 0x5, words: 192 }),
        },
        ModuleRegion {
            kind: ModuleType::Mnds,
            path: PipelinePath::Full,
            regs: RegRange::new(0x4d00, 6),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Crop,
            path: PipelinePath::Full,
            regs: RegRange::new(0x4d40, 4),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Mnds,
            path: PipelinePath::Fd,
            regs: RegRange::new(0x4d80, 6),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Crop,
            path: PipelinePath::Fd,
            regs: RegRange::new(0x4dc0, 4),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Mnds,
            path: PipelinePath::Ds4,
            regs: RegRange::new(0x4e00, 6),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Crop,
            path: PipelinePath::PixelRaw,
            regs: RegRange::new(0x4e40, 4),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Mnds,
            path: PipelinePath::Display,
            regs: RegRange::new(0x4e80, 6),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Crop,
            path: PipelinePath::Display,
            regs: RegRange::new(0x4ec0, 4),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::BHist,
            path: PipelinePath::Common,
            regs: RegRange::new(0x4f00, 3),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::AwbBg,
            path: PipelinePath::Common,
            regs: RegRange::new(0x4f40, 5),
            lut: None,
        },
        ModuleRegion {
            kind: ModuleType::Bf,
            path: PipelinePath::Common,
            regs: RegRange::new(0x4f80, 6),
            lut: Some(LutRegion { dmi_cfg: DMI_CFG, bank_select: 0x4f7c, lut_select: 0x4, words: 180 }),
        },
    ],
    cgc_override: &[
        RegWrite::new(0x4014, 0xffff_ffff),
        RegWrite::new(0x4018, 0xffff_ffff),
        RegWrite::new(0x401c, 0xffff_ffff),
        RegWrite::new(0x4020, 0x0000_00ff),
    ],
    flush_halt: Some(RegWrite::new(0x40a0, 0b1010_1010_1010_1010)),
    throttle: Some(0x40c0),
    bus_read: None,
    hang_dump: &[
        DumpGroup { mask: 1 << 0, name: "top", range: ReadRange::Reg(RegRange::new(0x4000, 52)) },
        DumpGroup { mask: 1 << 1, name: "linearization", range: ReadRange::Reg(RegRange::new(0x4600, 9)) },
        DumpGroup { mask: 1 << 2, name: "lsc", range: ReadRange::Reg(RegRange::new(0x4800, 6)) },
        DumpGroup { mask: 1 << 3, name: "color", range: ReadRange::Reg(RegRange::new(0x4900, 38)) },
        DumpGroup { mask: 1 << 4, name: "gamma", range: ReadRange::Reg(RegRange::new(0x4a00, 18)) },
        DumpGroup {
            mask: 1 << 4,
            name: "gamma_lut",
            range: ReadRange::Dmi(DmiRead {
                pre: &GAMMA_DMI_PRE,
                read: RegRange::new(DMI_DATA, 64),
                post: &GAMMA_DMI_POST,
            }),
        },
        DumpGroup { mask: 1 << 5, name: "zoom", range: ReadRange::Reg(RegRange::new(0x4d00, 116)) },
        DumpGroup { mask: 1 << 6, name: "stats", range: ReadRange::Reg(RegRange::new(0x4f00, 38)) },
        DumpGroup { mask: 1 << 7, name: "bus_wr", range: ReadRange::Reg(RegRange::new(0x6000, 96)) },
    ],
};
