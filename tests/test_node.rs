// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use edgefirst_ife::{
    capability::{ModuleType, PipelinePath},
    error::IfeError,
    format::{Dimension, Format},
    hw::ChipId,
    iq::StatsUpdate,
    node::{
        BufferRequirement, DeviceLog, IfeNode, LoopbackDevice, MetadataTag, MetadataValue, NodeState,
        OutputPortConfig, PortSource, ProcessOutcome, ProcessRequest,
    },
    packet::{blob::DataPath, Blob, DecodedPacket, PacketKind},
    sensor::{PdBufferFormat, PdafInfo, PdafType, SensorMode, StreamKind, SubStream},
    settings::Settings,
    split::{BalancedStriping, SplitMode},
};
use serial_test::serial;
use std::{
    error::Error,
    sync::{Arc, Mutex},
};

fn port(port: u32, source: PortSource, format: Format, dims: Dimension) -> OutputPortConfig {
    OutputPortConfig {
        port,
        source,
        format,
        consumers: vec![BufferRequirement::new(dims)],
    }
}

fn pdaf_sensor() -> SensorMode {
    let mut sensor = SensorMode::new("imx_pdaf", Dimension::new(4000, 3000), 30.0);
    sensor.streams = vec![
        SubStream {
            kind: StreamKind::Pdaf,
            dims: Dimension::new(496, 1488),
            format: Format::RawPlain16,
            vc: 1,
            dt: 0x30,
        },
        SubStream {
            kind: StreamKind::Meta,
            dims: Dimension::new(4000, 2),
            format: Format::Blob,
            vc: 0,
            dt: 0x12,
        },
    ];
    sensor.pdaf = Some(PdafInfo {
        sensor_type: PdafType::Type2,
        native_format: PdBufferFormat::Unpacked16,
        buffer_format: PdBufferFormat::Unpacked16,
    });
    sensor
}

fn node(chip: ChipId, settings: Settings) -> Result<(IfeNode, Arc<Mutex<DeviceLog>>), Box<dyn Error>> {
    let device = LoopbackDevice::new();
    let log = device.log();
    let mut node = IfeNode::create(chip, settings, Box::new(device), Box::new(BalancedStriping::new()))?;
    node.initialize()?;
    Ok((node, log))
}

fn request(request_id: u64) -> ProcessRequest {
    ProcessRequest {
        request_id,
        stats: Some(StatsUpdate::neutral(request_id - 1)),
        ..ProcessRequest::default()
    }
}

fn packets(log: &Arc<Mutex<DeviceLog>>) -> Result<Vec<DecodedPacket>, Box<dyn Error>> {
    let log = log.lock().map_err(|_| "device log poisoned")?;
    Ok(log
        .submitted
        .iter()
        .map(|b| DecodedPacket::decode(b))
        .collect::<Result<_, _>>()?)
}

#[test]
#[serial]
fn test_mixed_ports() -> Result<(), Box<dyn Error>> {
    let (mut node, log) = node(ChipId::IFE_480, Settings::default())?;
    node.finalize_input_requirement(&[
        port(0, PortSource::Pixel(PipelinePath::Full), Format::Nv12, Dimension::new(1920, 1080)),
        port(1, PortSource::Pixel(PipelinePath::Fd), Format::Nv12, Dimension::new(640, 480)),
        port(2, PortSource::Stats(ModuleType::BHist), Format::Blob, Dimension::default()),
        port(3, PortSource::Stats(ModuleType::AwbBg), Format::Blob, Dimension::default()),
        port(4, PortSource::Rdi(0), Format::RawMipi10, Dimension::default()),
        port(5, PortSource::Pdaf, Format::Blob, Dimension::default()),
        port(6, PortSource::Meta, Format::Blob, Dimension::default()),
    ])?;
    let ports = node.finalize_buffer_properties(pdaf_sensor())?.to_vec();
    let dims = |p: u32| ports.iter().find(|f| f.port == p).map(|f| f.dims);

    assert_eq!(dims(0), Some(Dimension::new(1920, 1080)));
    assert_eq!(dims(1), Some(Dimension::new(640, 480)));
    assert!(dims(2).is_some_and(|d| !d.is_zero()));
    assert!(dims(3).is_some_and(|d| !d.is_zero()));
    assert_eq!(dims(4), Some(Dimension::new(4000, 3000)));
    assert_eq!(dims(5), Some(Dimension::new(496 * 1488 * 2, 1)));
    assert_eq!(dims(6), Some(Dimension::new(8000, 1)));

    node.acquire_resources()?;
    let acquired = log.lock().map_err(|_| "poisoned")?.last_acquire.clone();
    let acquired = acquired.ok_or("no acquire recorded")?;
    assert_eq!(acquired.outputs.len(), 7);
    assert_eq!(acquired.input.side_channels.len(), 2);

    node.prepare_stream_on()?;
    for id in 1..=4 {
        node.execute_process_request(&request(id))?;
    }
    assert!(matches!(
        node.metadata().get(4, MetadataTag::PdafCapability),
        Some(MetadataValue::Pdaf(p)) if p.buffer == Dimension::new(496 * 1488 * 2, 1)
    ));
    let json = node.metadata().to_json(4)?;
    assert!(json.contains("crop_info"));
    assert!(json.contains("stats_config"));

    let bw = node.request_snapshot(4).map(|s| s.bandwidth.clone()).ok_or("no snapshot")?;
    for path in [DataPath::Video, DataPath::Stats, DataPath::Rdi0, DataPath::Pdaf] {
        assert!(bw.vote(path).is_some_and(|v| v.external > 0), "{path:?}");
    }

    node.release_resources()?;
    Ok(())
}

#[test]
#[serial]
fn test_init_packet_blobs() -> Result<(), Box<dyn Error>> {
    let (mut node, log) = node(ChipId::IFE_175, Settings::default())?;
    node.finalize_input_requirement(&[
        port(0, PortSource::Pixel(PipelinePath::Full), Format::UbwcNv12, Dimension::new(1920, 1080)),
        port(1, PortSource::Stats(ModuleType::Bf), Format::Blob, Dimension::default()),
    ])?;
    node.finalize_buffer_properties(SensorMode::new("12mp", Dimension::new(4000, 3000), 30.0))?;
    node.acquire_resources()?;
    node.prepare_stream_on()?;
    node.execute_process_request(&request(1))?;

    let packets = packets(&log)?;
    assert_eq!(packets.len(), 2);
    let init = &packets[0];
    assert_eq!(init.kind, PacketKind::Init);
    let wm = init.blobs.iter().find_map(|b| match b {
        Blob::Wm(wm) => Some(wm),
        _ => None,
    });
    assert_eq!(wm.map(|w| w.ports.len()), Some(2));
    assert!(init.blobs.iter().any(|b| matches!(b, Blob::Hfr(h) if h.ports.len() == 2)));
    assert!(init.blobs.iter().any(|b| matches!(b, Blob::Core(c) if !c.dual && !c.bus_read)));
    assert!(init.blobs.iter().any(|b| matches!(b, Blob::Ubwc(u) if u.ports.len() == 1)));

    let update = &packets[1];
    assert_eq!(update.kind, PacketKind::Update);
    assert!(update.blobs.iter().any(|b| matches!(b, Blob::Clock(_))));
    assert!(update.blobs.iter().any(|b| matches!(b, Blob::Bandwidth(_))));
    assert!(!update.blobs.iter().any(|b| matches!(b, Blob::Wm(_) | Blob::Dual(_))));
    node.release_resources()?;
    Ok(())
}

#[test]
#[serial]
fn test_offline_input() -> Result<(), Box<dyn Error>> {
    let (mut node, log) = node(ChipId::TFE_530, Settings::default())?;
    node.set_offline_input(true)?;
    node.finalize_input_requirement(&[port(
        0,
        PortSource::Pixel(PipelinePath::Full),
        Format::Nv12,
        Dimension::new(1920, 1080),
    )])?;
    node.finalize_buffer_properties(SensorMode::new("8mp", Dimension::new(3840, 2160), 30.0))?;
    assert_eq!(node.mode(), SplitMode::Single);
    node.acquire_resources()?;
    node.prepare_stream_on()?;
    node.execute_process_request(&request(1))?;

    assert!(log
        .lock()
        .map_err(|_| "poisoned")?
        .last_acquire
        .as_ref()
        .is_some_and(|a| a.bus_read));
    let init = &packets(&log)?[0];
    assert!(init.blobs.iter().any(|b| matches!(b, Blob::Core(c) if c.bus_read)));
    node.release_resources()?;
    Ok(())
}

#[test]
#[serial]
fn test_request_ring_depth() -> Result<(), Box<dyn Error>> {
    let settings = Settings::from_json(r#"{ "queue_depth": 4 }"#)?;
    let (mut node, _log) = node(ChipId::IFE_175, settings)?;
    node.finalize_input_requirement(&[port(
        0,
        PortSource::Pixel(PipelinePath::Full),
        Format::Nv12,
        Dimension::new(1280, 720),
    )])?;
    node.finalize_buffer_properties(SensorMode::new("12mp", Dimension::new(4000, 3000), 30.0))?;
    node.acquire_resources()?;
    node.prepare_stream_on()?;
    for id in 1..=10 {
        let outcome = node.execute_process_request(&request(id))?;
        assert!(matches!(outcome, ProcessOutcome::Submitted(s) if s.request_id == id));
    }
    assert!(node.request_snapshot(10).is_some());
    assert!(node.request_snapshot(7).is_some());
    assert!(node.request_snapshot(6).is_none());
    assert!(node.metadata().get(2, MetadataTag::CropInfo).is_none());
    node.release_resources()?;
    assert_eq!(node.state(), NodeState::Released);
    Ok(())
}

#[test]
#[serial]
fn test_negotiation_retry() -> Result<(), Box<dyn Error>> {
    let (mut node, _log) = node(ChipId::IFE_480, Settings::default())?;
    let conflicting = OutputPortConfig {
        port: 0,
        source: PortSource::Pixel(PipelinePath::Full),
        format: Format::Nv12,
        consumers: vec![
            BufferRequirement::new(Dimension::new(1920, 1080))
                .with_bounds(Dimension::new(1920, 1080), Dimension::new(1920, 1080)),
            BufferRequirement::new(Dimension::new(640, 480))
                .with_bounds(Dimension::new(320, 240), Dimension::new(640, 480)),
        ],
    };
    assert!(matches!(
        node.finalize_input_requirement(&[conflicting]),
        Err(IfeError::Negotiation(_))
    ));
    assert_eq!(node.state(), NodeState::Initialized);
    let input = node.finalize_input_requirement(&[port(
        0,
        PortSource::Pixel(PipelinePath::Full),
        Format::Nv12,
        Dimension::new(1920, 1080),
    )])?;
    assert!(!input.rdi_only);
    assert_eq!(input.requirement.optimal, Dimension::new(1920, 1080));
    Ok(())
}
