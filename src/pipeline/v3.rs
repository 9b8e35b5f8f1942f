// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use super::{BufferSizes, IspPipeline};
use crate::{
    error::{IfeError, Result},
    format::{align_up, Dimension, Format},
    hw::HwVersion,
    packet::CommandBuffer,
};
use tracing::debug;

const BUS_READ_ENABLE: u32 = 1;
const BUS_READ_STRIDE_ALIGN: u32 = 16;

/// Single-core TFE with a bus-read engine for offline input.
#[derive(Debug)]
pub struct V3Pipeline {
    sizes: BufferSizes,
}

impl V3Pipeline {
    pub fn new() -> Self {
        Self {
            sizes: BufferSizes::from_map(HwVersion::V3.registers()),
        }
    }
}

impl Default for V3Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl IspPipeline for V3Pipeline {
    fn version(&self) -> HwVersion {
        HwVersion::V3
    }

    fn sizes(&self) -> BufferSizes {
        self.sizes
    }

    fn fill_bus_read_config(&self, input: Dimension, format: Format, cmd: &mut CommandBuffer) -> Result<()> {
        let Some(range) = self.registers().bus_read else {
            return Err(IfeError::Unsupported("bus-read registers missing".to_owned()));
        };
        if !format.is_raw() {
            return Err(IfeError::InvalidArgument(format!(
                "bus read needs a raw format, got {format:?}"
            )));
        }
        let stride = align_up(
            (input.width * format.bits_per_pixel()).div_ceil(8),
            BUS_READ_STRIDE_ALIGN,
        );
        debug!(%input, stride, "bus read");
        let values = [
            BUS_READ_ENABLE,
            input.width,
            input.height,
            stride,
            format.code(),
            0,
        ];
        let mut burst = cmd.burst();
        for (i, value) in values.iter().take(range.count as usize).enumerate() {
            burst.write(range.offset + i as u32 * 4, *value);
        }
        burst.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{hw::RegWrite, packet::Command, pipeline};

    #[test]
    fn bus_read_only_on_v3() -> Result<()> {
        let mut cmd = CommandBuffer::with_capacity(64);
        let input = Dimension::new(4000, 3000);
        assert!(matches!(
            pipeline::create(HwVersion::V2).fill_bus_read_config(input, Format::RawMipi10, &mut cmd),
            Err(IfeError::Unsupported(_))
        ));
        V3Pipeline::new().fill_bus_read_config(input, Format::RawMipi10, &mut cmd)?;
        assert_eq!(cmd.commands().len(), 6);
        assert_eq!(cmd.commands()[3], Command::Reg(RegWrite::new(0x110c, 5008)));
        Ok(())
    }
}
