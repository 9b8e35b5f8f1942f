// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use super::{select_ubwc, BufferSizes, IspPipeline, UbwcMode};
use crate::{
    format::{Dimension, Format},
    hw::HwVersion,
};

/// Base IFE. Lossless UBWC only and no output throttle.
#[derive(Debug)]
pub struct V1Pipeline {
    sizes: BufferSizes,
}

impl V1Pipeline {
    pub fn new() -> Self {
        Self {
            sizes: BufferSizes::from_map(HwVersion::V1.registers()),
        }
    }
}

impl Default for V1Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl IspPipeline for V1Pipeline {
    fn version(&self) -> HwVersion {
        HwVersion::V1
    }

    fn sizes(&self) -> BufferSizes {
        self.sizes
    }

    fn ubwc_mode(&self, format: Format, dims: Dimension) -> Option<UbwcMode> {
        // 10-bit UBWC arrived with V2.
        if format.is_10bit() {
            return None;
        }
        select_ubwc(self.capability(), format, dims)
    }
}
