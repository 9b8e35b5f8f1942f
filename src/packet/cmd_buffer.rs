// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    error::{IfeError, Result},
    hw::{LutRegion, RegWrite},
};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::Cursor;

const CMD_REG: u32 = 0x1;
const CMD_DMI: u32 = 0x2;

/// Words taken by one register write.
pub const REG_WRITE_WORDS: usize = 2;
/// Header words in front of a DMI table.
pub const DMI_HEADER_WORDS: usize = 4;

/// One entry of a command buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reg(RegWrite),
    /// LUT upload through the DMI port into `bank`
    Dmi {
        cfg: u32,
        select: u32,
        bank: u8,
        data: Vec<u32>,
    },
}

impl Command {
    pub fn words(&self) -> usize {
        match self {
            Command::Reg(_) => REG_WRITE_WORDS,
            Command::Dmi { data, .. } => DMI_HEADER_WORDS + data.len(),
        }
    }

    fn encode(&self, out: &mut Vec<u8>) {
        // Writes into a Vec cannot fail.
        match self {
            Command::Reg(w) => {
                let _ = out.write_u32::<LittleEndian>(CMD_REG);
                let _ = out.write_u32::<LittleEndian>(w.offset);
                let _ = out.write_u32::<LittleEndian>(w.value);
            }
            Command::Dmi {
                cfg,
                select,
                bank,
                data,
            } => {
                let _ = out.write_u32::<LittleEndian>(CMD_DMI);
                let _ = out.write_u32::<LittleEndian>(*cfg);
                let _ = out.write_u32::<LittleEndian>(select | ((*bank as u32) << 8));
                let _ = out.write_u32::<LittleEndian>(data.len() as u32);
                for word in data {
                    let _ = out.write_u32::<LittleEndian>(*word);
                }
            }
        }
    }
}

/// Ordered register writes and DMI tables built for one request.
///
/// The capacity is fixed when the buffer is created; a write that does not fit
/// fails with [`IfeError::OutOfBounds`] and leaves the buffer unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandBuffer {
    commands: Vec<Command>,
    used_words: usize,
    capacity_words: usize,
}

impl CommandBuffer {
    pub fn with_capacity(capacity_words: usize) -> Self {
        Self {
            commands: Vec::new(),
            used_words: 0,
            capacity_words,
        }
    }

    pub fn len_words(&self) -> usize {
        self.used_words
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Position marker for [`CommandBuffer::rewind`].
    pub fn mark(&self) -> usize {
        self.commands.len()
    }

    /// Drops every command appended after `mark`.
    pub fn rewind(&mut self, mark: usize) {
        for command in self.commands.drain(mark.min(self.commands.len())..) {
            self.used_words -= command.words();
        }
    }

    pub fn clear(&mut self) {
        self.commands.clear();
        self.used_words = 0;
    }

    fn push(&mut self, command: Command) -> Result<()> {
        let words = command.words();
        if self.used_words + words > self.capacity_words {
            return Err(IfeError::OutOfBounds(format!(
                "command buffer full: {} + {} > {} words",
                self.used_words, words, self.capacity_words
            )));
        }
        self.used_words += words;
        self.commands.push(command);
        Ok(())
    }

    pub fn write_reg(&mut self, offset: u32, value: u32) -> Result<()> {
        self.push(Command::Reg(RegWrite::new(offset, value)))
    }

    /// Queues a LUT upload into `bank` of the table described by `lut`.
    pub fn write_dmi(&mut self, lut: &LutRegion, bank: u8, data: &[u32]) -> Result<()> {
        if data.len() > lut.words as usize {
            return Err(IfeError::OutOfBounds(format!(
                "LUT {:#x}: {} words exceeds table size {}",
                lut.lut_select,
                data.len(),
                lut.words
            )));
        }
        self.push(Command::Dmi {
            cfg: lut.dmi_cfg,
            select: lut.lut_select,
            bank,
            data: data.to_vec(),
        })
    }

    /// Starts a burst of writes whose failures are collected and reported once.
    pub fn burst(&mut self) -> WriteBurst<'_> {
        WriteBurst {
            buffer: self,
            status: Ok(()),
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        encode_commands(&self.commands, out);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.used_words * 4 + self.commands.len() * 4);
        self.encode(&mut out);
        out
    }

    /// Parses bytes produced by [`CommandBuffer::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Vec<Command>> {
        let truncated = |_| IfeError::OutOfBounds("truncated command stream".to_owned());
        let mut cursor = Cursor::new(bytes);
        let mut commands = Vec::new();
        while (cursor.position() as usize) < bytes.len() {
            let kind = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
            match kind {
                CMD_REG => {
                    let offset = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                    let value = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                    commands.push(Command::Reg(RegWrite::new(offset, value)));
                }
                CMD_DMI => {
                    let cfg = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                    let sel = cursor.read_u32::<LittleEndian>().map_err(truncated)?;
                    let len = cursor.read_u32::<LittleEndian>().map_err(truncated)? as usize;
                    let remaining = bytes.len() - cursor.position() as usize;
                    if len * 4 > remaining {
                        return Err(IfeError::OutOfBounds(format!(
                            "DMI table of {len} words overruns command stream"
                        )));
                    }
                    let mut data = Vec::with_capacity(len);
                    for _ in 0..len {
                        data.push(cursor.read_u32::<LittleEndian>().map_err(truncated)?);
                    }
                    commands.push(Command::Dmi {
                        cfg,
                        select: sel & 0xff,
                        bank: (sel >> 8) as u8,
                        data,
                    });
                }
                other => {
                    return Err(IfeError::InvalidArgument(format!(
                        "unknown command type {other:#x}"
                    )))
                }
            }
        }
        Ok(commands)
    }
}

pub fn encode_commands(commands: &[Command], out: &mut Vec<u8>) {
    for command in commands {
        command.encode(out);
    }
}

/// A group of writes checked once at the end.
///
/// Every write is attempted even after one fails; [`WriteBurst::finish`]
/// returns the first failure.
pub struct WriteBurst<'a> {
    buffer: &'a mut CommandBuffer,
    status: Result<()>,
}

impl WriteBurst<'_> {
    fn record(&mut self, result: Result<()>) {
        if let Err(e) = result {
            if self.status.is_ok() {
                self.status = Err(e);
            }
        }
    }

    pub fn write(&mut self, offset: u32, value: u32) -> &mut Self {
        let result = self.buffer.write_reg(offset, value);
        self.record(result);
        self
    }

    pub fn write_all<I>(&mut self, writes: I) -> &mut Self
    where
        I: IntoIterator<Item = RegWrite>,
    {
        for w in writes {
            self.write(w.offset, w.value);
        }
        self
    }

    pub fn dmi(&mut self, lut: &LutRegion, bank: u8, data: &[u32]) -> &mut Self {
        let result = self.buffer.write_dmi(lut, bank, data);
        self.record(result);
        self
    }

    pub fn finish(self) -> Result<()> {
        self.status
    }
}
