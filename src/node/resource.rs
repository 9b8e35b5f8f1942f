// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Hardware resource acquisition and the kernel transport.
//!
//! [`KernelDevice`] is the seam to the driver: the node acquires a device
//! handle for the negotiated stream, submits packets against it and releases
//! it once. [`LoopbackDevice`] stands in for the driver in tests and the
//! simulator: it applies every submitted register write to an in-memory
//! register file so dumps can be captured back from it.

use super::negotiation::{FinalPort, PortSource};
use crate::{
    error::{IfeError, Result},
    format::{Dimension, Format},
    packet::{Command, Packet},
    pipeline::regdump::{self, RegisterIo},
    sensor::{LaneType, SensorMode, StreamKind},
    split::{Instance, PerInstance},
};
use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};
use tracing::{debug, info, warn};

/// CSI input stream description for the acquire call.
#[derive(Debug, Clone, PartialEq)]
pub struct InputResource {
    pub lanes: u8,
    pub lane_type: LaneType,
    pub vc: u8,
    pub dt: u8,
    pub format: Format,
    pub dims: Dimension,
    pub pixel_clock_hz: u64,
    /// Virtual channel and data type of each side-channel sub-stream
    pub side_channels: Vec<(StreamKind, u8, u8)>,
}

impl InputResource {
    pub fn from_sensor(sensor: &SensorMode) -> Self {
        Self {
            lanes: sensor.lanes,
            lane_type: sensor.lane_type,
            vc: sensor.vc,
            dt: sensor.dt,
            format: sensor.format,
            dims: sensor.output,
            pixel_clock_hz: sensor.pixel_clock_hz,
            side_channels: sensor
                .streams
                .iter()
                .filter(|s| s.kind != StreamKind::Image)
                .map(|s| (s.kind, s.vc, s.dt))
                .collect(),
        }
    }
}

/// One output port to reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputResource {
    pub port: u32,
    pub source: PortSource,
    pub format: Format,
    pub dims: Dimension,
}

impl From<&FinalPort> for OutputResource {
    fn from(port: &FinalPort) -> Self {
        Self {
            port: port.port,
            source: port.source,
            format: port.format,
            dims: port.dims,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AcquireRequest {
    pub input: InputResource,
    pub outputs: Vec<OutputResource>,
    pub dual: bool,
    /// Input is read from memory instead of the CSI receiver
    pub bus_read: bool,
}

/// Handle to acquired hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub u64);

/// Kernel driver operations the node depends on.
pub trait KernelDevice: Send {
    fn acquire(&mut self, request: &AcquireRequest) -> Result<DeviceHandle>;

    fn start(&mut self, handle: DeviceHandle) -> Result<()>;

    fn submit(&mut self, handle: DeviceHandle, packet: &Packet) -> Result<()>;

    /// Runs the dump descriptors in `blob` and writes the captured values
    /// into its data region.
    fn capture_dump(&mut self, handle: DeviceHandle, blob: &mut [u8], request_id: u64) -> Result<()>;

    fn stop(&mut self, handle: DeviceHandle) -> Result<()>;

    fn release(&mut self, handle: DeviceHandle) -> Result<()>;
}

/// What a [`LoopbackDevice`] has seen, shared with whoever created it.
#[derive(Debug, Default)]
pub struct DeviceLog {
    pub acquires: usize,
    pub releases: usize,
    pub streaming: bool,
    /// Encoded packets in submission order
    pub submitted: Vec<Vec<u8>>,
    pub last_acquire: Option<AcquireRequest>,
}

/// In-memory device that executes register writes.
#[derive(Debug, Default)]
pub struct LoopbackDevice {
    next_handle: u64,
    active: Option<DeviceHandle>,
    /// Left core registers live in the common file
    registers: PerInstance<BTreeMap<u32, u32>>,
    /// DMI tables by (config register, bank)
    luts: BTreeMap<(u32, u8), Vec<u32>>,
    fail_acquire: bool,
    log: Arc<Mutex<DeviceLog>>,
}

impl LoopbackDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Device whose acquire call always fails.
    pub fn failing() -> Self {
        Self {
            fail_acquire: true,
            ..Self::default()
        }
    }

    pub fn log(&self) -> Arc<Mutex<DeviceLog>> {
        Arc::clone(&self.log)
    }

    fn record<F: FnOnce(&mut DeviceLog)>(&self, f: F) {
        match self.log.lock() {
            Ok(mut log) => f(&mut log),
            Err(_) => warn!("device log poisoned"),
        }
    }

    fn check(&self, handle: DeviceHandle) -> Result<()> {
        match self.active {
            Some(active) if active == handle => Ok(()),
            _ => Err(IfeError::Device(format!("stale handle {}", handle.0))),
        }
    }

    /// Applies one command segment to an instance's register file. Common
    /// writes reach both cores.
    fn apply(&mut self, instance: Instance, commands: &[Command]) {
        let targets: &[Instance] = match instance {
            Instance::Common => &[Instance::Common, Instance::Right],
            Instance::Left => &[Instance::Common],
            Instance::Right => &[Instance::Right],
        };
        for command in commands {
            match command {
                Command::Reg(w) => {
                    for t in targets {
                        self.registers.get_mut(*t).insert(w.offset, w.value);
                    }
                }
                Command::Dmi {
                    cfg, bank, data, ..
                } => {
                    self.luts.insert((*cfg, *bank), data.clone());
                }
            }
        }
    }

    /// Register value as the given core sees it.
    pub fn register(&self, instance: Instance, offset: u32) -> Option<u32> {
        let file = match instance {
            Instance::Right => Instance::Right,
            _ => Instance::Common,
        };
        self.registers.get(file).get(&offset).copied()
    }

    pub fn lut(&self, cfg: u32, bank: u8) -> Option<&[u32]> {
        self.luts.get(&(cfg, bank)).map(Vec::as_slice)
    }
}

// Dumps read the left core.
impl RegisterIo for LoopbackDevice {
    fn read(&mut self, offset: u32) -> u32 {
        self.register(Instance::Common, offset).unwrap_or(0)
    }

    fn write(&mut self, offset: u32, value: u32) {
        self.registers.get_mut(Instance::Common).insert(offset, value);
    }
}

impl KernelDevice for LoopbackDevice {
    fn acquire(&mut self, request: &AcquireRequest) -> Result<DeviceHandle> {
        if self.fail_acquire {
            return Err(IfeError::Device("acquire rejected".to_owned()));
        }
        if self.active.is_some() {
            return Err(IfeError::Device("device already acquired".to_owned()));
        }
        self.next_handle += 1;
        let handle = DeviceHandle(self.next_handle);
        self.active = Some(handle);
        info!(handle = handle.0, outputs = request.outputs.len(), dual = request.dual, "device acquired");
        self.record(|log| {
            log.acquires += 1;
            log.last_acquire = Some(request.clone());
        });
        Ok(handle)
    }

    fn start(&mut self, handle: DeviceHandle) -> Result<()> {
        self.check(handle)?;
        self.record(|log| log.streaming = true);
        Ok(())
    }

    fn submit(&mut self, handle: DeviceHandle, packet: &Packet) -> Result<()> {
        self.check(handle)?;
        for instance in Instance::ALL {
            if let Some(segment) = packet.segment(instance) {
                self.apply(instance, segment.commands());
            }
        }
        debug!(request = packet.request_id, words = packet.len_words(), "packet applied");
        let bytes = packet.encode();
        self.record(|log| log.submitted.push(bytes));
        Ok(())
    }

    fn capture_dump(&mut self, handle: DeviceHandle, blob: &mut [u8], request_id: u64) -> Result<()> {
        self.check(handle)?;
        regdump::capture(blob, request_id, self)
    }

    fn stop(&mut self, handle: DeviceHandle) -> Result<()> {
        self.check(handle)?;
        self.record(|log| log.streaming = false);
        Ok(())
    }

    fn release(&mut self, handle: DeviceHandle) -> Result<()> {
        self.check(handle)?;
        self.active = None;
        self.record(|log| log.releases += 1);
        info!(handle = handle.0, "device released");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketKind;

    fn request() -> AcquireRequest {
        let sensor = SensorMode::new("test", Dimension::new(1920, 1080), 30.0);
        AcquireRequest {
            input: InputResource::from_sensor(&sensor),
            outputs: Vec::new(),
            dual: false,
            bus_read: false,
        }
    }

    #[test]
    fn handle_released_once() -> Result<()> {
        let mut dev = LoopbackDevice::new();
        let handle = dev.acquire(&request())?;
        assert!(dev.acquire(&request()).is_err());
        dev.release(handle)?;
        assert!(matches!(dev.release(handle), Err(IfeError::Device(_))));
        let log = dev.log();
        let log = log.lock().map_err(|_| IfeError::Device("poisoned".into()))?;
        assert_eq!((log.acquires, log.releases), (1, 1));
        Ok(())
    }

    #[test]
    fn submitted_writes_land_per_core() -> Result<()> {
        let mut dev = LoopbackDevice::new();
        let handle = dev.acquire(&request())?;
        let mut packet = Packet::new(1, PacketKind::Update, 64, true);
        packet.common_mut().write_reg(0x10, 7)?;
        packet.segment_mut(Instance::Left)?.write_reg(0x20, 1)?;
        packet.segment_mut(Instance::Right)?.write_reg(0x20, 2)?;
        dev.submit(handle, &packet)?;
        assert_eq!(dev.register(Instance::Left, 0x10), Some(7));
        assert_eq!(dev.register(Instance::Right, 0x10), Some(7));
        assert_eq!(dev.register(Instance::Left, 0x20), Some(1));
        assert_eq!(dev.register(Instance::Right, 0x20), Some(2));
        Ok(())
    }
}
