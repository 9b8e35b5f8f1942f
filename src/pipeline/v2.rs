// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use super::{select_ubwc, BufferSizes, IspPipeline, UbwcMode};
use crate::{
    format::{Dimension, Format},
    hw::HwVersion,
};

/// Extended channel set with the display path and lossy UBWC.
#[derive(Debug)]
pub struct V2Pipeline {
    sizes: BufferSizes,
}

impl V2Pipeline {
    pub fn new() -> Self {
        Self {
            sizes: BufferSizes::from_map(HwVersion::V2.registers()),
        }
    }
}

impl Default for V2Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl IspPipeline for V2Pipeline {
    fn version(&self) -> HwVersion {
        HwVersion::V2
    }

    fn sizes(&self) -> BufferSizes {
        self.sizes
    }

    fn ubwc_mode(&self, format: Format, dims: Dimension) -> Option<UbwcMode> {
        select_ubwc(self.capability(), format, dims)
    }
}
