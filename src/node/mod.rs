// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! The IFE processing node.
//!
//! [`IfeNode`] drives one pipeline instance through its lifecycle:
//!
//! ```text
//! Uninitialized -> Initialized -> StreamConfigured -> Acquired
//!     -> Streaming <-> Processing -> Deactivated -> Released
//! ```
//!
//! Buffer negotiation happens once per configuration, hardware is acquired
//! once per stream, and [`IfeNode::execute_process_request`] runs per frame:
//! it runs every IQ and stats module once per core, programs the enables,
//! attaches the clock and bandwidth votes and submits the packet. A request
//! whose 3A stats have not arrived is deferred rather than failed; the caller
//! submits it again later.

pub mod bandwidth;
pub mod metadata;
pub mod negotiation;
pub mod resource;
pub mod ring;

pub use metadata::{MetadataPool, MetadataTag, MetadataValue, PdafCapability};
pub use negotiation::{
    BufferRequirement, FinalPort, InputRequirement, OutputPortConfig, OutputRequirement, PortSource,
};
pub use resource::{AcquireRequest, DeviceHandle, DeviceLog, KernelDevice, LoopbackDevice};
pub use ring::{ConfigRing, RequestSnapshot};

use crate::{
    capability::{Capability, ModuleCreateData},
    error::{IfeError, Result},
    format::{align_up, Rect},
    hw::{ChipId, HwVersion},
    iq::{
        ActivePort, CalculatedData, FrameInput, HalTags, IspModule, ProcessingContext, StatsUpdate,
        TuningMode,
    },
    packet::{
        blob::{BwConfig, ClockConfig, CoreConfig, HfrConfig, HfrPort, UbwcConfig, UbwcPort, WmConfig, WmPort},
        Blob, Packet, PacketKind,
    },
    pipeline::{self, BankUpdate, IspPipeline, ModuleEnable},
    sensor::SensorMode,
    settings::Settings,
    split::{decide_mode, SplitCoordinator, SplitMode, StripePortRequest, StripingLibrary},
};
use resource::{InputResource, OutputResource};
use std::io::Write;
use tracing::{debug, debug_span, error, info, info_span, warn};

/// Lifecycle state of an [`IfeNode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    Uninitialized,
    Initialized,
    StreamConfigured,
    Acquired,
    Streaming,
    Processing,
    Deactivated,
    Released,
}

/// Upstream data a request is waiting on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependency {
    Stats,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnmetDependency {
    pub request_id: u64,
    pub dependency: Dependency,
}

/// One frame's worth of controls and 3A input.
#[derive(Debug, Clone, Default)]
pub struct ProcessRequest {
    pub request_id: u64,
    pub hal: HalTags,
    /// 3A results, `None` while they have not arrived
    pub stats: Option<StatsUpdate>,
    pub tuning: TuningMode,
}

/// What was submitted for a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSummary {
    pub request_id: u64,
    pub mode: SplitMode,
    /// Packed top-level enable registers
    pub enables: Vec<u32>,
    pub cmd_words: usize,
    /// Modules dropped for this request after a soft failure
    pub disabled: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    Submitted(RequestSummary),
    /// Not an error: submit the same request again once the dependency is met.
    Deferred(UnmetDependency),
}

/// Everything built for one packet.
struct BuiltPacket {
    packet: Packet,
    data: CalculatedData,
    enables: Vec<u32>,
    mode: SplitMode,
    clock: ClockConfig,
    bandwidth: BwConfig,
    disabled: usize,
}

/// IFE processing node for one pipeline.
pub struct IfeNode {
    state: NodeState,
    version: HwVersion,
    cap: &'static Capability,
    settings: Settings,
    pipeline: Box<dyn IspPipeline>,
    device: Box<dyn KernelDevice>,
    split: SplitCoordinator,
    modules: Vec<Box<dyn IspModule>>,
    max_downscale: u32,
    outputs: Vec<OutputRequirement>,
    input: Option<InputRequirement>,
    ports: Vec<FinalPort>,
    active: Vec<ActivePort>,
    sensor: Option<SensorMode>,
    pdaf: Option<PdafCapability>,
    mode: SplitMode,
    offline: bool,
    handle: Option<DeviceHandle>,
    common_enables: ModuleEnable,
    last_request: u64,
    metadata: MetadataPool,
    ring: ConfigRing<RequestSnapshot>,
}

impl IfeNode {
    /// Creates a node for `chip`. Unknown chips are rejected here.
    pub fn create(
        chip: ChipId,
        settings: Settings,
        device: Box<dyn KernelDevice>,
        striping: Box<dyn StripingLibrary>,
    ) -> Result<Self> {
        let version = HwVersion::try_from(chip)?;
        let pipeline = pipeline::create(version);
        let cap = pipeline.capability();
        info!(%chip, ?version, registers = pipeline.registers().name, "IFE node created");
        Ok(Self {
            state: NodeState::Uninitialized,
            version,
            cap,
            split: SplitCoordinator::new(striping, settings.striping_padding),
            metadata: MetadataPool::new(settings.queue_depth),
            ring: ConfigRing::new(settings.queue_depth),
            settings,
            pipeline,
            device,
            modules: Vec::new(),
            max_downscale: cap.max_downscale,
            outputs: Vec::new(),
            input: None,
            ports: Vec::new(),
            active: Vec::new(),
            sensor: None,
            pdaf: None,
            mode: SplitMode::Single,
            offline: false,
            handle: None,
            common_enables: ModuleEnable::empty(),
            last_request: 0,
        })
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    pub fn version(&self) -> HwVersion {
        self.version
    }

    pub fn mode(&self) -> SplitMode {
        self.mode
    }

    /// Negotiated buffers, valid once buffer properties are final.
    pub fn ports(&self) -> &[FinalPort] {
        &self.ports
    }

    /// Enables programmed at stream start.
    pub fn common_enables(&self) -> ModuleEnable {
        self.common_enables
    }

    pub fn metadata(&self) -> &MetadataPool {
        &self.metadata
    }

    pub fn request_snapshot(&self, request_id: u64) -> Option<&RequestSnapshot> {
        self.ring.get(request_id)
    }

    fn expect_state(&self, operation: &'static str, allowed: &[NodeState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(IfeError::InvalidState {
                operation,
                state: format!("{:?}", self.state),
            })
        }
    }

    fn acquired_handle(&self, operation: &'static str) -> Result<DeviceHandle> {
        self.handle.ok_or_else(|| IfeError::InvalidState {
            operation,
            state: format!("{:?} without a device handle", self.state),
        })
    }

    /// Instantiates every installed module for the chip.
    pub fn initialize(&mut self) -> Result<()> {
        self.expect_state("initialize", &[NodeState::Uninitialized])?;
        self.max_downscale = match self.settings.max_downscale {
            0 => self.cap.max_downscale,
            ratio => ratio,
        };
        let registers = self.pipeline.registers();
        let mut modules = Vec::new();
        for entry in self.cap.installed() {
            let region = registers.module(entry.kind, entry.path).ok_or_else(|| {
                IfeError::Unsupported(format!("{} has no registers on {}", entry.id(), registers.name))
            })?;
            let data = ModuleCreateData {
                id: entry.id(),
                version: self.version,
                region,
                max_downscale: self.max_downscale,
            };
            modules.push((entry.create)(&data)?);
        }
        info!(
            modules = modules.len(),
            cmd_words = self.pipeline.cmd_size_words(),
            dump_words = self.pipeline.dump_size_words(),
            "initialized"
        );
        self.modules = modules;
        self.state = NodeState::Initialized;
        Ok(())
    }

    /// Backward negotiation pass; may be repeated until streaming starts.
    pub fn finalize_input_requirement(&mut self, ports: &[OutputPortConfig]) -> Result<InputRequirement> {
        self.expect_state(
            "finalize_input_requirement",
            &[NodeState::Initialized, NodeState::StreamConfigured],
        )?;
        let (input, outputs) = negotiation::finalize_input_requirement(self.cap, &self.settings, ports)?;
        self.input = Some(input);
        self.outputs = outputs;
        self.state = NodeState::Initialized;
        Ok(input)
    }

    /// Forward negotiation pass against the chosen sensor mode. Also fixes
    /// the single or dual decision for the stream.
    pub fn finalize_buffer_properties(&mut self, sensor: SensorMode) -> Result<&[FinalPort]> {
        self.expect_state("finalize_buffer_properties", &[NodeState::Initialized])?;
        if self.input.is_none() {
            return Err(IfeError::InvalidState {
                operation: "finalize_buffer_properties",
                state: "input requirement not finalized".to_owned(),
            });
        }
        let ports = negotiation::finalize_buffer_properties(
            self.cap,
            &self.settings,
            &sensor,
            &self.outputs,
            self.max_downscale,
        )?;
        self.active = ports
            .iter()
            .filter_map(|p| match p.source {
                PortSource::Pixel(path) if !p.dims.is_zero() => Some(ActivePort {
                    port: p.port,
                    path,
                    dims: p.dims,
                    format: p.format,
                }),
                _ => None,
            })
            .collect();
        self.mode = decide_mode(
            self.cap,
            &self.settings,
            &sensor,
            self.active.iter().map(|p| (p.path, p.dims)),
        );
        self.pdaf = sensor.pdaf.as_ref().map(|info| PdafCapability {
            sensor_type: info.sensor_type,
            buffer_format: info.buffer_format,
            buffer: ports
                .iter()
                .find(|p| p.source == PortSource::Pdaf)
                .map(|p| p.dims)
                .unwrap_or_default(),
        });
        info!(sensor = %sensor.name, mode = ?self.mode, ports = ports.len(), "buffer properties final");
        self.ports = ports;
        self.sensor = Some(sensor);
        self.state = NodeState::StreamConfigured;
        Ok(&self.ports)
    }

    /// Selects memory input through the bus-read engine.
    pub fn set_offline_input(&mut self, offline: bool) -> Result<()> {
        self.expect_state(
            "set_offline_input",
            &[NodeState::Initialized, NodeState::StreamConfigured],
        )?;
        if offline && !self.cap.bus_read {
            return Err(IfeError::Unsupported(format!(
                "{:?} cannot read input from memory",
                self.version
            )));
        }
        self.offline = offline;
        Ok(())
    }

    /// Reserves the hardware for the negotiated stream.
    pub fn acquire_resources(&mut self) -> Result<()> {
        self.expect_state("acquire_resources", &[NodeState::StreamConfigured])?;
        let sensor = self.sensor.as_ref().ok_or(IfeError::InvalidState {
            operation: "acquire_resources",
            state: "no sensor mode".to_owned(),
        })?;
        let request = AcquireRequest {
            input: InputResource::from_sensor(sensor),
            outputs: self
                .ports
                .iter()
                .filter(|p| !p.dims.is_zero())
                .map(OutputResource::from)
                .collect(),
            dual: self.mode == SplitMode::Dual,
            bus_read: self.offline,
        };
        let handle = self.device.acquire(&request).inspect_err(|e| {
            error!("acquire failed, stream cannot start: {e}");
        })?;
        self.handle = Some(handle);
        self.state = NodeState::Acquired;
        Ok(())
    }

    /// Submits the stream-on configuration and starts the hardware.
    pub fn prepare_stream_on(&mut self) -> Result<()> {
        self.expect_state(
            "prepare_stream_on",
            &[NodeState::Acquired, NodeState::Deactivated],
        )?;
        let handle = self.acquired_handle("prepare_stream_on")?;
        let hal = HalTags::default();
        let stats = StatsUpdate::neutral(0);
        let built = self.build_packet(0, PacketKind::Init, &hal, Some(&stats), TuningMode::default())?;
        self.device.submit(handle, &built.packet)?;
        self.device.start(handle)?;
        info!(
            mode = ?built.mode,
            enables = ?self.common_enables,
            words = built.packet.len_words(),
            "stream on"
        );
        self.state = NodeState::Streaming;
        Ok(())
    }

    /// Processes one request, or defers it while its 3A stats are missing.
    pub fn execute_process_request(&mut self, request: &ProcessRequest) -> Result<ProcessOutcome> {
        self.expect_state("execute_process_request", &[NodeState::Streaming])?;
        let _span = info_span!("process_request", request = request.request_id).entered();
        if request.stats.is_none() && request.request_id > self.settings.startup_frames_without_stats {
            debug!("3A stats not available, deferring");
            return Ok(ProcessOutcome::Deferred(UnmetDependency {
                request_id: request.request_id,
                dependency: Dependency::Stats,
            }));
        }
        self.state = NodeState::Processing;
        let result = self.process(request);
        self.state = NodeState::Streaming;
        match result {
            Ok(summary) => Ok(ProcessOutcome::Submitted(summary)),
            Err(e) => {
                error!(code = e.code(), "request {} failed: {e}", request.request_id);
                Err(e)
            }
        }
    }

    fn process(&mut self, request: &ProcessRequest) -> Result<RequestSummary> {
        let handle = self.acquired_handle("execute_process_request")?;
        let built = self.build_packet(
            request.request_id,
            PacketKind::Update,
            &request.hal,
            request.stats.as_ref(),
            request.tuning,
        )?;
        let hang_dump = if self.settings.per_frame_reg_dump {
            Some(self.pipeline.setup_hang_reg_dump(built.mode, self.settings.reg_dump_mask)?)
        } else {
            None
        };
        self.device.submit(handle, &built.packet)?;
        self.last_request = request.request_id;

        let frame = self.sensor.as_ref().map(|s| s.output).unwrap_or_default();
        let full = Rect::full(frame);
        let hal_crop = request
            .hal
            .crop_region
            .and_then(|c| c.intersect(&full))
            .unwrap_or(full);
        self.metadata
            .publish_request(request.request_id, hal_crop, request.hal.shading_map, &built.data);
        if let Some(pdaf) = self.pdaf {
            self.metadata
                .publish(request.request_id, MetadataTag::PdafCapability, MetadataValue::Pdaf(pdaf));
        }

        let summary = RequestSummary {
            request_id: request.request_id,
            mode: built.mode,
            enables: built.enables.clone(),
            cmd_words: built.packet.len_words(),
            disabled: built.disabled,
        };
        self.ring.insert(
            request.request_id,
            RequestSnapshot {
                request_id: request.request_id,
                mode: built.mode,
                tuning: self.pipeline.tuning_dump(&built.enables, &built.data),
                enables: built.enables,
                cmd_words: summary.cmd_words,
                clock: built.clock,
                bandwidth: built.bandwidth,
                hang_dump,
            },
        );
        debug!(words = summary.cmd_words, disabled = summary.disabled, "request submitted");
        Ok(summary)
    }

    /// Runs the module sequence once per core and assembles the packet.
    fn build_packet(
        &mut self,
        request_id: u64,
        kind: PacketKind,
        hal: &HalTags,
        stats: Option<&StatsUpdate>,
        tuning: TuningMode,
    ) -> Result<BuiltPacket> {
        let sensor = self.sensor.as_ref().ok_or(IfeError::InvalidState {
            operation: "build_packet",
            state: "no sensor mode".to_owned(),
        })?;
        let init = kind == PacketKind::Init;
        let input = FrameInput {
            request_id,
            sensor,
            ports: &self.active,
            hal,
            stats,
            tuning,
            force_update: init,
        };
        let stripe_ports = self
            .active
            .iter()
            .map(|p| StripePortRequest {
                port: p.port,
                path: p.path,
                output: p.dims,
            })
            .collect();
        // Holds the striping result until this function returns.
        let plan = self
            .split
            .plan(self.mode, sensor.output, input.crop_region(), stripe_ports)?;
        let dual = plan.mode() == SplitMode::Dual;
        let mut packet = Packet::new(request_id, kind, self.pipeline.cmd_size_words(), dual);

        if init {
            let common = packet.common_mut();
            self.pipeline.fill_cgc_config(common)?;
            self.pipeline.fill_flush_config(common)?;
            self.pipeline.set_throttle_pattern(self.settings.throughput, common)?;
            self.pipeline.update_dmi_bank_select(0, common)?;
            if self.offline {
                self.pipeline
                    .fill_bus_read_config(sensor.output, sensor.format, common)?;
            }
        }

        let (data, disabled) = run_modules(&mut self.modules, &input, &plan.contexts(), &mut packet)?;

        let outputs = self
            .active
            .iter()
            .fold(ModuleEnable::empty(), |acc, p| acc | ModuleEnable::for_output(p.path));
        let request_enables = data.request_enables() | outputs;
        if init {
            self.common_enables = request_enables;
        }
        let enables = self.pipeline.program_module_enable_config(
            self.common_enables,
            request_enables,
            packet.common_mut(),
        )?;

        let max_clock = match self.settings.max_clock_hz {
            0 => self.cap.max_clock_hz,
            hz => hz,
        };
        let rdi_ports = self
            .ports
            .iter()
            .filter(|p| matches!(p.source, PortSource::Rdi(_)))
            .count();
        let clock = bandwidth::clock_config(sensor, plan.split(), rdi_ports, max_clock)?;
        let raw_ports: Vec<FinalPort> = self
            .ports
            .iter()
            .filter(|p| !matches!(p.source, PortSource::Pixel(_) | PortSource::Stats(_)))
            .copied()
            .collect();
        let bw = bandwidth::bandwidth_config(
            &data.wm,
            &raw_ports,
            sensor.fps,
            dual,
            &self.settings,
            self.pipeline.as_ref(),
        );

        if init {
            packet.add_blob(Blob::Core(CoreConfig {
                input: sensor.output,
                pattern: sensor.pattern as u32,
                dual,
                bus_read: self.offline,
            }));
            let written: Vec<&FinalPort> = self.ports.iter().filter(|p| !p.dims.is_zero()).collect();
            packet.add_blob(Blob::Hfr(HfrConfig {
                ports: written
                    .iter()
                    .map(|p| HfrPort {
                        port: p.port,
                        subsample_pattern: 1,
                        subsample_period: 1,
                        framedrop_pattern: 1,
                        framedrop_period: 1,
                    })
                    .collect(),
            }));
            packet.add_blob(Blob::Wm(WmConfig {
                ports: written
                    .iter()
                    .map(|p| WmPort {
                        port: p.port,
                        width: p.dims.width,
                        height: p.dims.height,
                        format: p.format.code(),
                        stride: align_up(p.dims.width, p.alignment[0].stride.max(1)),
                    })
                    .collect(),
            }));
            packet.add_blob(Blob::Ubwc(UbwcConfig {
                ports: written
                    .iter()
                    .filter_map(|p| {
                        self.pipeline.ubwc_mode(p.format, p.dims).map(|m| UbwcPort {
                            port: p.port,
                            version: m.version,
                            lossy: m.lossy,
                        })
                    })
                    .collect(),
            }));
        }
        packet.add_blob(Blob::Clock(clock.clone()));
        packet.add_blob(Blob::Bandwidth(bw.clone()));
        if let Some(dual_config) = plan.dual_config() {
            packet.add_blob(Blob::Dual(dual_config));
        }

        Ok(BuiltPacket {
            mode: plan.mode(),
            packet,
            data,
            enables,
            clock,
            bandwidth: bw,
            disabled,
        })
    }

    /// Re-synchronises LUT banks with the hardware after a flush.
    pub fn recover_from_flush(&mut self) -> Result<BankUpdate> {
        self.expect_state("recover_from_flush", &[NodeState::Streaming])?;
        let handle = self.acquired_handle("recover_from_flush")?;
        let mut blob = self.pipeline.setup_flush_reg_dump()?;
        self.device.capture_dump(handle, &mut blob, self.last_request)?;
        let update = self.pipeline.parse_flush_reg_dump(&blob)?;
        for module in self.modules.iter_mut() {
            if let Some(next) = update.next.get(&module.id()) {
                debug!(id = %module.id(), next, "LUT bank resumed");
                module.resume_lut_bank(*next);
            }
        }
        Ok(update)
    }

    /// Captures the hang dump registers and writes them to `out`.
    pub fn dump_hang(&mut self, out: &mut dyn Write) -> Result<usize> {
        self.expect_state("dump_hang", &[NodeState::Streaming, NodeState::Deactivated])?;
        let handle = self.acquired_handle("dump_hang")?;
        let mut blob = self
            .pipeline
            .setup_hang_reg_dump(self.mode, self.settings.reg_dump_mask)?;
        self.device.capture_dump(handle, &mut blob, self.last_request)?;
        self.pipeline.parse_hang_reg_dump(&blob, out)
    }

    pub fn on_stream_off(&mut self) -> Result<()> {
        self.expect_state("on_stream_off", &[NodeState::Streaming])?;
        let handle = self.acquired_handle("on_stream_off")?;
        self.device.stop(handle)?;
        self.state = NodeState::Deactivated;
        info!(last_request = self.last_request, "stream off");
        Ok(())
    }

    /// Releases the hardware. Calling it again is a no-op.
    pub fn release_resources(&mut self) -> Result<()> {
        if self.state == NodeState::Streaming {
            self.on_stream_off()?;
        }
        match self.handle.take() {
            Some(handle) => self.device.release(handle)?,
            None => debug!("no hardware held"),
        }
        if matches!(self.state, NodeState::Acquired | NodeState::Deactivated) {
            self.state = NodeState::Released;
        }
        Ok(())
    }
}

impl Drop for IfeNode {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            if let Err(e) = self.device.release(handle) {
                warn!("release on drop failed: {e}");
            }
        }
    }
}

/// Runs every module once per context. A module's output is merged only
/// after it succeeded on every core. A soft failure on any core rewinds what
/// it wrote on all of them and drops it for this request.
fn run_modules(
    modules: &mut [Box<dyn IspModule>],
    input: &FrameInput<'_>,
    contexts: &[ProcessingContext<'_>],
    packet: &mut Packet,
) -> Result<(CalculatedData, usize)> {
    let mut data = CalculatedData::default();
    let mut disabled = 0;
    for module in modules.iter_mut() {
        let id = module.id();
        let mut marks = Vec::with_capacity(contexts.len());
        let mut outputs = Vec::with_capacity(contexts.len());
        let mut failure = None;
        for ctx in contexts {
            let _span = debug_span!("module", %id, instance = ?ctx.instance).entered();
            let segment = packet.segment_mut(ctx.instance)?;
            marks.push((ctx.instance, segment.mark()));
            match module.execute(input, ctx, segment) {
                Ok(output) => outputs.push((ctx.instance, output)),
                Err(e) if e.is_module_soft_failure() => {
                    failure = Some((ctx.instance, e));
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        match failure {
            None => {
                for (instance, output) in outputs {
                    data.record_snapshot(id, instance, module.dump_registers(instance));
                    data.merge(id, instance, output);
                }
            }
            Some((instance, e)) => {
                for (written, mark) in marks {
                    packet.segment_mut(written)?.rewind(mark);
                }
                warn!(%id, ?instance, "module disabled for request: {e}");
                data.disable(id);
                disabled += 1;
            }
        }
    }
    Ok((data, disabled))
}
