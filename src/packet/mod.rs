// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Kernel packet assembly: per-instance command segments plus blob sections.

pub mod blob;
pub mod cmd_buffer;

pub use blob::Blob;
pub use cmd_buffer::{Command, CommandBuffer, WriteBurst};

use crate::{
    error::{IfeError, Result},
    split::Instance,
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read};

const PACKET_MAGIC: u32 = 0x5045_4649; // "IFEP"
const PACKET_VERSION: u32 = 1;

/// Stream-on configuration or per-request update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Init = 0,
    Update = 1,
}

/// One logical submission. Config shared by both cores goes to the common
/// segment; in dual mode each core also gets its own segment.
#[derive(Debug, Clone)]
pub struct Packet {
    pub request_id: u64,
    pub kind: PacketKind,
    common: CommandBuffer,
    left: Option<CommandBuffer>,
    right: Option<CommandBuffer>,
    blobs: Vec<Blob>,
}

impl Packet {
    pub fn new(request_id: u64, kind: PacketKind, capacity_words: usize, dual: bool) -> Self {
        let segment = || dual.then(|| CommandBuffer::with_capacity(capacity_words));
        Self {
            request_id,
            kind,
            common: CommandBuffer::with_capacity(capacity_words),
            left: segment(),
            right: segment(),
            blobs: Vec::new(),
        }
    }

    pub fn is_dual(&self) -> bool {
        self.left.is_some()
    }

    pub fn segment(&self, instance: Instance) -> Option<&CommandBuffer> {
        match instance {
            Instance::Common => Some(&self.common),
            Instance::Left => self.left.as_ref(),
            Instance::Right => self.right.as_ref(),
        }
    }

    pub fn segment_mut(&mut self, instance: Instance) -> Result<&mut CommandBuffer> {
        match instance {
            Instance::Common => Some(&mut self.common),
            Instance::Left => self.left.as_mut(),
            Instance::Right => self.right.as_mut(),
        }
        .ok_or_else(|| {
            IfeError::InvalidArgument(format!("{instance:?} segment in a single-core packet"))
        })
    }

    pub fn common_mut(&mut self) -> &mut CommandBuffer {
        &mut self.common
    }

    pub fn add_blob(&mut self, blob: Blob) {
        self.blobs.push(blob);
    }

    pub fn blobs(&self) -> &[Blob] {
        &self.blobs
    }

    /// Words used across all segments.
    pub fn len_words(&self) -> usize {
        [Instance::Common, Instance::Left, Instance::Right]
            .into_iter()
            .filter_map(|i| self.segment(i))
            .map(CommandBuffer::len_words)
            .sum()
    }

    /// Serializes the packet for the kernel transport.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len_words() * 4 + 64);
        let _ = out.write_u32::<LittleEndian>(PACKET_MAGIC);
        let _ = out.write_u32::<LittleEndian>(PACKET_VERSION);
        let _ = out.write_u64::<LittleEndian>(self.request_id);
        let _ = out.write_u32::<LittleEndian>(self.kind as u32);

        let segments: Vec<(Instance, &CommandBuffer)> =
            [Instance::Common, Instance::Left, Instance::Right]
                .into_iter()
                .filter_map(|i| self.segment(i).map(|s| (i, s)))
                .collect();
        let _ = out.write_u32::<LittleEndian>(segments.len() as u32);
        for (instance, segment) in segments {
            let bytes = segment.to_bytes();
            let _ = out.write_u32::<LittleEndian>(instance as u32);
            let _ = out.write_u32::<LittleEndian>(bytes.len() as u32);
            out.extend_from_slice(&bytes);
        }

        let mut blobs = Vec::new();
        for blob in &self.blobs {
            blob.encode(&mut blobs);
        }
        let _ = out.write_u32::<LittleEndian>(blobs.len() as u32);
        out.extend_from_slice(&blobs);
        out
    }
}

/// Packet contents recovered from [`Packet::encode`] output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPacket {
    pub request_id: u64,
    pub kind: PacketKind,
    pub segments: Vec<(Instance, Vec<Command>)>,
    pub blobs: Vec<Blob>,
}

impl DecodedPacket {
    pub fn segment(&self, instance: Instance) -> Option<&[Command]> {
        self.segments
            .iter()
            .find(|(i, _)| *i == instance)
            .map(|(_, c)| c.as_slice())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let truncated = |_| IfeError::OutOfBounds("truncated packet".to_owned());
        let mut cursor = Cursor::new(bytes);
        if cursor.read_u32::<LittleEndian>().map_err(truncated)? != PACKET_MAGIC {
            return Err(IfeError::InvalidArgument("bad packet magic".to_owned()));
        }
        let version = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        if version != PACKET_VERSION {
            return Err(IfeError::Unsupported(format!("packet version {version}")));
        }
        let request_id = cursor.read_u64::<LittleEndian>().map_err(truncated)?;
        let kind = match cursor.read_u32::<LittleEndian>().map_err(truncated)? {
            0 => PacketKind::Init,
            _ => PacketKind::Update,
        };

        let count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let mut segments = Vec::new();
        for _ in 0..count.min(3) {
            let instance = match cursor.read_u32::<LittleEndian>().map_err(truncated)? {
                1 => Instance::Left,
                2 => Instance::Right,
                _ => Instance::Common,
            };
            let len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
            let bytes = read_exact(&mut cursor, len)?;
            segments.push((instance, CommandBuffer::decode(&bytes)?));
        }

        let len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        let blob_bytes = read_exact(&mut cursor, len)?;
        Ok(Self {
            request_id,
            kind,
            segments,
            blobs: blob::parse_blobs(&blob_bytes)?,
        })
    }
}

fn read_exact(cursor: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>> {
    let remaining = cursor.get_ref().len() - cursor.position() as usize;
    if len > remaining {
        return Err(IfeError::OutOfBounds(format!(
            "section of {len} bytes, {remaining} left"
        )));
    }
    let mut bytes = vec![0; len];
    cursor.read_exact(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::blob::{CoreConfig, DualConfig};
    use crate::{format::Dimension, split::DualSplitParams};

    #[test]
    fn single_packet_has_no_instance_segments() {
        let mut packet = Packet::new(3, PacketKind::Update, 32, false);
        assert!(packet.segment_mut(Instance::Left).is_err());
        assert!(packet.segment_mut(Instance::Common).is_ok());
    }

    #[test]
    fn dual_packet_decodes() -> Result<()> {
        let mut packet = Packet::new(42, PacketKind::Update, 32, true);
        packet.common_mut().write_reg(0x40, 1)?;
        packet.segment_mut(Instance::Left)?.write_reg(0x600, 2)?;
        packet.segment_mut(Instance::Right)?.write_reg(0x600, 3)?;
        packet.add_blob(Blob::Core(CoreConfig {
            input: Dimension::new(4000, 3000),
            pattern: 0,
            dual: true,
            bus_read: false,
        }));
        packet.add_blob(Blob::Dual(DualConfig {
            split: DualSplitParams {
                split_point: 2000,
                left_padding: 64,
                right_padding: 64,
            },
            ports: Vec::new(),
        }));

        let decoded = DecodedPacket::decode(&packet.encode())?;
        assert_eq!(decoded.request_id, 42);
        assert_eq!(decoded.segments.len(), 3);
        assert_eq!(
            decoded.segment(Instance::Right),
            Some(packet.segment(Instance::Right).map(|s| s.commands()).unwrap_or_default())
        );
        assert_eq!(decoded.blobs, packet.blobs());
        Ok(())
    }
}
