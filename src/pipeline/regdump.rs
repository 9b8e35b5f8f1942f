// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Register-dump blob.
//!
//! Layout, all fields little-endian `u32` unless noted:
//!
//! ```text
//! header      numberOfDumps, offsets[MAX_DUMPS]      (descriptor byte offsets)
//! descriptor  type, bufferOffset, bufferSize, numReadRanges, ranges...
//! range       kind=0, registerOffset, registerCount
//!           | kind=1, numPre, pre[5] (offset, value), readOffset, readCount,
//!                     numPost, post[5] (offset, value)
//! data        per descriptor at bufferOffset from the end of the descriptor
//!             table: requestId (u64), byteCount, (offset, value) pairs
//! ```
//!
//! The data region is zeroed when the blob is built and filled by the capture
//! mechanism. A captured dump is only trusted when both its request id and
//! byte count are non-zero.

use crate::{
    error::{IfeError, Result},
    hw::{DmiRead, ReadRange, RegRange, RegWrite, MAX_DMI_WRITES},
};
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

/// Descriptor slots in the header.
pub const MAX_DUMPS: usize = 4;

const HEADER_BYTES: usize = 4 + MAX_DUMPS * 4;
const DESCRIPTOR_BYTES: usize = 16;
const REG_RANGE_BYTES: usize = 12;
const DMI_RANGE_BYTES: usize = 4 + 4 + MAX_DMI_WRITES * 8 + 8 + 4 + MAX_DMI_WRITES * 8;
/// requestId and byteCount in front of the captured pairs.
const DATA_HEADER_BYTES: usize = 12;

const RANGE_REG: u32 = 0;
const RANGE_DMI: u32 = 1;

/// Which hardware a dump region was captured from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpType {
    LeftInstance = 0,
    RightInstance = 1,
    Aux = 2,
}

impl TryFrom<u32> for DumpType {
    type Error = IfeError;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(DumpType::LeftInstance),
            1 => Ok(DumpType::RightInstance),
            2 => Ok(DumpType::Aux),
            other => Err(IfeError::InvalidArgument(format!("dump type {other}"))),
        }
    }
}

/// One read range decoded from a blob. DMI setup writes are owned here since
/// decoded blobs do not borrow the static tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedRange {
    Reg(RegRange),
    Dmi {
        pre: Vec<RegWrite>,
        read: RegRange,
        post: Vec<RegWrite>,
    },
}

impl DecodedRange {
    pub fn count(&self) -> u32 {
        match self {
            DecodedRange::Reg(r) => r.count,
            DecodedRange::Dmi { read, .. } => read.count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DumpDescriptor {
    pub kind: DumpType,
    /// Byte offset of the captured data, from the end of the descriptor table
    pub buffer_offset: u32,
    pub buffer_size: u32,
    pub ranges: Vec<DecodedRange>,
}

/// Values captured for one descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedDump {
    pub kind: DumpType,
    pub request_id: u64,
    pub values: Vec<RegWrite>,
}

/// Register access used while capturing.
pub trait RegisterIo {
    fn read(&mut self, offset: u32) -> u32;
    fn write(&mut self, offset: u32, value: u32);
}

fn range_bytes(range: &ReadRange) -> usize {
    match range {
        ReadRange::Reg(_) => REG_RANGE_BYTES,
        ReadRange::Dmi(_) => DMI_RANGE_BYTES,
    }
}

/// Bytes of captured data a set of ranges needs.
pub fn buffer_size(ranges: &[ReadRange]) -> u32 {
    let regs: u32 = ranges.iter().map(ReadRange::count).sum();
    (DATA_HEADER_BYTES as u32) + regs * 8
}

/// Total blob bytes for a set of dumps.
pub fn blob_size(dumps: &[(DumpType, Vec<ReadRange>)]) -> usize {
    let table: usize = dumps
        .iter()
        .map(|(_, r)| DESCRIPTOR_BYTES + r.iter().map(range_bytes).sum::<usize>())
        .sum();
    let data: u32 = dumps.iter().map(|(_, r)| buffer_size(r)).sum();
    HEADER_BYTES + table + data as usize
}

fn write_writes(out: &mut Vec<u8>, writes: &[RegWrite]) {
    let _ = out.write_u32::<LittleEndian>(writes.len() as u32);
    for slot in 0..MAX_DMI_WRITES {
        let w = writes.get(slot).copied().unwrap_or(RegWrite::new(0, 0));
        let _ = out.write_u32::<LittleEndian>(w.offset);
        let _ = out.write_u32::<LittleEndian>(w.value);
    }
}

fn write_dmi(out: &mut Vec<u8>, dmi: &DmiRead) {
    let _ = out.write_u32::<LittleEndian>(RANGE_DMI);
    write_writes(out, dmi.pre);
    let _ = out.write_u32::<LittleEndian>(dmi.read.offset);
    let _ = out.write_u32::<LittleEndian>(dmi.read.count);
    write_writes(out, dmi.post);
}

/// Builds a blob with a zeroed data region.
///
/// Fails with [`IfeError::OutOfBounds`] for more than [`MAX_DUMPS`] dumps or
/// a DMI range with more than [`MAX_DMI_WRITES`] setup writes.
pub fn build(dumps: &[(DumpType, Vec<ReadRange>)]) -> Result<Vec<u8>> {
    if dumps.len() > MAX_DUMPS {
        return Err(IfeError::OutOfBounds(format!(
            "{} register dumps, header holds {MAX_DUMPS}",
            dumps.len()
        )));
    }
    for (_, ranges) in dumps {
        for range in ranges {
            if let ReadRange::Dmi(d) = range {
                if d.pre.len() > MAX_DMI_WRITES || d.post.len() > MAX_DMI_WRITES {
                    return Err(IfeError::OutOfBounds(format!(
                        "DMI read at {:#x} has too many setup writes",
                        d.read.offset
                    )));
                }
            }
        }
    }

    let mut out = Vec::with_capacity(blob_size(dumps));
    let _ = out.write_u32::<LittleEndian>(dumps.len() as u32);
    let mut descriptor_offset = HEADER_BYTES;
    for slot in 0..MAX_DUMPS {
        let offset = match dumps.get(slot) {
            Some((_, ranges)) => {
                let current = descriptor_offset;
                descriptor_offset +=
                    DESCRIPTOR_BYTES + ranges.iter().map(range_bytes).sum::<usize>();
                current as u32
            }
            None => 0,
        };
        let _ = out.write_u32::<LittleEndian>(offset);
    }

    let mut buffer_offset = 0u32;
    for (kind, ranges) in dumps {
        let size = buffer_size(ranges);
        let _ = out.write_u32::<LittleEndian>(*kind as u32);
        let _ = out.write_u32::<LittleEndian>(buffer_offset);
        let _ = out.write_u32::<LittleEndian>(size);
        let _ = out.write_u32::<LittleEndian>(ranges.len() as u32);
        for range in ranges {
            match range {
                ReadRange::Reg(r) => {
                    let _ = out.write_u32::<LittleEndian>(RANGE_REG);
                    let _ = out.write_u32::<LittleEndian>(r.offset);
                    let _ = out.write_u32::<LittleEndian>(r.count);
                }
                ReadRange::Dmi(d) => write_dmi(&mut out, d),
            }
        }
        buffer_offset += size;
    }
    out.resize(out.len() + buffer_offset as usize, 0);
    Ok(out)
}

fn truncated(_: std::io::Error) -> IfeError {
    IfeError::OutOfBounds("truncated register dump".to_owned())
}

fn read_writes(cursor: &mut Cursor<&[u8]>) -> Result<Vec<RegWrite>> {
    let count = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    if count > MAX_DMI_WRITES {
        return Err(IfeError::OutOfBounds(format!("{count} DMI setup writes")));
    }
    let mut writes = Vec::with_capacity(count);
    for slot in 0..MAX_DMI_WRITES {
        let offset = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let value = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        if slot < count {
            writes.push(RegWrite::new(offset, value));
        }
    }
    Ok(writes)
}

/// Decodes the descriptor table. Returns the descriptors and the byte offset
/// where the data region starts.
pub fn decode_descriptors(bytes: &[u8]) -> Result<(Vec<DumpDescriptor>, usize)> {
    let mut cursor = Cursor::new(bytes);
    let count = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    if count > MAX_DUMPS {
        return Err(IfeError::OutOfBounds(format!("{count} register dumps")));
    }
    let mut offsets = [0u32; MAX_DUMPS];
    for offset in offsets.iter_mut() {
        *offset = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
    }

    let mut descriptors = Vec::with_capacity(count);
    let mut table_end = HEADER_BYTES;
    for offset in &offsets[..count] {
        cursor.set_position(*offset as u64);
        let kind = DumpType::try_from(cursor.read_u32::<LittleEndian>().map_err(truncated)?)?;
        let buffer_offset = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let buffer_size = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let num_ranges = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
        let mut ranges = Vec::new();
        for _ in 0..num_ranges {
            match cursor.read_u32::<LittleEndian>().map_err(truncated)? {
                RANGE_REG => {
                    let offset = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                    let count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                    ranges.push(DecodedRange::Reg(RegRange::new(offset, count)));
                }
                RANGE_DMI => {
                    let pre = read_writes(&mut cursor)?;
                    let offset = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                    let count = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                    let post = read_writes(&mut cursor)?;
                    ranges.push(DecodedRange::Dmi {
                        pre,
                        read: RegRange::new(offset, count),
                        post,
                    });
                }
                other => {
                    return Err(IfeError::InvalidArgument(format!(
                        "unknown read range kind {other}"
                    )))
                }
            }
        }
        table_end = table_end.max(cursor.position() as usize);
        descriptors.push(DumpDescriptor {
            kind,
            buffer_offset,
            buffer_size,
            ranges,
        });
    }
    Ok((descriptors, table_end))
}

fn data_slice(bytes: &[u8], base: usize, d: &DumpDescriptor) -> Result<(usize, usize)> {
    let start = base + d.buffer_offset as usize;
    let end = start + d.buffer_size as usize;
    if end > bytes.len() || (d.buffer_size as usize) < DATA_HEADER_BYTES {
        return Err(IfeError::OutOfBounds(format!(
            "dump buffer {start}..{end} outside blob of {} bytes",
            bytes.len()
        )));
    }
    Ok((start, end))
}

/// Fills the data region the way the capture engine does.
pub fn capture(blob: &mut [u8], request_id: u64, io: &mut dyn RegisterIo) -> Result<()> {
    let (descriptors, base) = decode_descriptors(blob)?;
    for d in &descriptors {
        let (start, end) = data_slice(blob, base, d)?;
        let mut pairs = Vec::new();
        for range in &d.ranges {
            match range {
                DecodedRange::Reg(r) => {
                    for i in 0..r.count {
                        let offset = r.offset + i * 4;
                        pairs.push(RegWrite::new(offset, io.read(offset)));
                    }
                }
                DecodedRange::Dmi { pre, read, post } => {
                    for w in pre {
                        io.write(w.offset, w.value);
                    }
                    // The data port auto-increments, so every read hits the
                    // same offset.
                    for _ in 0..read.count {
                        pairs.push(RegWrite::new(read.offset, io.read(read.offset)));
                    }
                    for w in post {
                        io.write(w.offset, w.value);
                    }
                }
            }
        }

        let data = &mut blob[start..end];
        let byte_count = (pairs.len() * 8).min(data.len() - DATA_HEADER_BYTES);
        LittleEndian::write_u64(&mut data[0..8], request_id);
        LittleEndian::write_u32(&mut data[8..12], byte_count as u32);
        for (i, pair) in pairs.iter().take(byte_count / 8).enumerate() {
            let at = DATA_HEADER_BYTES + i * 8;
            LittleEndian::write_u32(&mut data[at..at + 4], pair.offset);
            LittleEndian::write_u32(&mut data[at + 4..at + 8], pair.value);
        }
    }
    Ok(())
}

/// Reads back every valid captured dump. Dumps whose request id or byte
/// count is zero were never written and are skipped.
pub fn parse_captures(bytes: &[u8]) -> Result<Vec<CapturedDump>> {
    let (descriptors, base) = decode_descriptors(bytes)?;
    let mut dumps = Vec::with_capacity(descriptors.len());
    for d in &descriptors {
        let (start, end) = data_slice(bytes, base, d)?;
        let data = &bytes[start..end];
        let request_id = LittleEndian::read_u64(&data[0..8]);
        let byte_count = LittleEndian::read_u32(&data[8..12]) as usize;
        if request_id == 0 || byte_count == 0 {
            continue;
        }
        let pairs = (byte_count / 8).min((data.len() - DATA_HEADER_BYTES) / 8);
        let values = (0..pairs)
            .map(|i| {
                let at = DATA_HEADER_BYTES + i * 8;
                RegWrite::new(
                    LittleEndian::read_u32(&data[at..at + 4]),
                    LittleEndian::read_u32(&data[at + 4..at + 8]),
                )
            })
            .collect();
        dumps.push(CapturedDump {
            kind: d.kind,
            request_id,
            values,
        });
    }
    Ok(dumps)
}
