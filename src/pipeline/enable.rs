// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    capability::{ModuleId, ModuleType, PipelinePath},
    hw::RegisterMap,
};
use bitflags::bitflags;

bitflags! {
    /// Version-independent module and output enables.
    ///
    /// Each version's register map places these flags into its own enable
    /// registers; flags a version has no field for are ignored when packing.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
    pub struct ModuleEnable: u64 {
        const LINEARIZATION = 1 << 0;
        const LSC = 1 << 1;
        const DEMOSAIC = 1 << 2;
        const WHITE_BALANCE = 1 << 3;
        const GAMMA = 1 << 4;
        const GAMMA_DISPLAY = 1 << 5;
        const MNDS_FULL = 1 << 6;
        const CROP_FULL = 1 << 7;
        const MNDS_FD = 1 << 8;
        const CROP_FD = 1 << 9;
        const MNDS_DISPLAY = 1 << 10;
        const CROP_DISPLAY = 1 << 11;
        const MNDS_DS4 = 1 << 12;
        const CROP_PIXEL_RAW = 1 << 13;
        const BHIST = 1 << 16;
        const AWB_BG = 1 << 17;
        const BF = 1 << 18;
        const OUT_FULL = 1 << 24;
        const OUT_FD = 1 << 25;
        const OUT_DISPLAY = 1 << 26;
        const OUT_DS4 = 1 << 27;
        const OUT_PIXEL_RAW = 1 << 28;
    }
}

impl ModuleEnable {
    /// Flag controlling a module instance; empty for ids no version has.
    pub fn for_module(id: ModuleId) -> ModuleEnable {
        use ModuleType::*;
        use PipelinePath::*;
        match (id.kind, id.path) {
            (Linearization, _) => Self::LINEARIZATION,
            (Lsc, _) => Self::LSC,
            (Demosaic, _) => Self::DEMOSAIC,
            (WhiteBalance, _) => Self::WHITE_BALANCE,
            (Gamma, Display) => Self::GAMMA_DISPLAY,
            (Gamma, _) => Self::GAMMA,
            (Mnds, Full) => Self::MNDS_FULL,
            (Mnds, Fd) => Self::MNDS_FD,
            (Mnds, Display) => Self::MNDS_DISPLAY,
            (Mnds, Ds4) => Self::MNDS_DS4,
            (Crop, Full) => Self::CROP_FULL,
            (Crop, Fd) => Self::CROP_FD,
            (Crop, Display) => Self::CROP_DISPLAY,
            (Crop, PixelRaw) => Self::CROP_PIXEL_RAW,
            (BHist, _) => Self::BHIST,
            (AwbBg, _) => Self::AWB_BG,
            (Bf, _) => Self::BF,
            _ => Self::empty(),
        }
    }

    /// Write-master enable of an output path.
    pub fn for_output(path: PipelinePath) -> ModuleEnable {
        match path {
            PipelinePath::Full => Self::OUT_FULL,
            PipelinePath::Fd => Self::OUT_FD,
            PipelinePath::Display => Self::OUT_DISPLAY,
            PipelinePath::Ds4 => Self::OUT_DS4,
            PipelinePath::PixelRaw => Self::OUT_PIXEL_RAW,
            PipelinePath::Common => Self::empty(),
        }
    }

    /// Packs the flags into one value per enable register of `map`.
    pub fn pack(&self, map: &RegisterMap) -> Vec<u32> {
        let mut values = vec![0u32; map.enable_registers.len()];
        for field in map.enable_fields {
            if self.contains(field.flag) {
                values[field.register] |= 1 << field.bit;
            }
        }
        values
    }

    /// Inverse of [`ModuleEnable::pack`].
    pub fn unpack(map: &RegisterMap, values: &[u32]) -> ModuleEnable {
        map.enable_fields
            .iter()
            .filter(|f| {
                values
                    .get(f.register)
                    .is_some_and(|v| v & (1 << f.bit) != 0)
            })
            .fold(ModuleEnable::empty(), |acc, f| acc | f.flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hw::HwVersion;

    #[test]
    fn gamma_paths() {
        let full = ModuleId::new(ModuleType::Gamma, PipelinePath::Full);
        let display = ModuleId::new(ModuleType::Gamma, PipelinePath::Display);
        assert_eq!(ModuleEnable::for_module(full), ModuleEnable::GAMMA);
        assert_eq!(ModuleEnable::for_module(display), ModuleEnable::GAMMA_DISPLAY);
    }

    #[test]
    fn pack_unpack() {
        let map = HwVersion::V2.registers();
        let flags = ModuleEnable::LINEARIZATION | ModuleEnable::BF | ModuleEnable::OUT_DISPLAY;
        let packed = flags.pack(map);
        assert_eq!(packed.len(), 5);
        assert_eq!(packed[0], 1 << 1);
        assert_eq!(packed[3], 1);
        assert_eq!(packed[4], 1 << 6);
        assert_eq!(ModuleEnable::unpack(map, &packed), flags);
    }

    #[test]
    fn unknown_flags_ignored() {
        // V1 has no display path.
        let map = HwVersion::V1.registers();
        let packed = ModuleEnable::GAMMA_DISPLAY.pack(map);
        assert!(packed.iter().all(|v| *v == 0));
    }
}
