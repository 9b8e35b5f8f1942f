// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_ife::{
    capability::PipelinePath,
    format::{Dimension, Format},
    hw::ChipId,
    iq::StatsUpdate,
    node::{BufferRequirement, IfeNode, LoopbackDevice, OutputPortConfig, PortSource, ProcessRequest},
    sensor::SensorMode,
    settings::Settings,
    split::BalancedStriping,
};

fn streaming_node(chip: ChipId, sensor: Dimension) -> IfeNode {
    let mut node = IfeNode::create(
        chip,
        Settings::default(),
        Box::new(LoopbackDevice::new()),
        Box::new(BalancedStriping::new()),
    )
    .unwrap();
    node.initialize().unwrap();
    node.finalize_input_requirement(&[
        OutputPortConfig {
            port: 0,
            source: PortSource::Pixel(PipelinePath::Full),
            format: Format::Nv12,
            consumers: vec![BufferRequirement::new(Dimension::new(1920, 1080))],
        },
        OutputPortConfig {
            port: 1,
            source: PortSource::Pixel(PipelinePath::Fd),
            format: Format::Nv12,
            consumers: vec![BufferRequirement::new(Dimension::new(640, 480))],
        },
    ])
    .unwrap();
    node.finalize_buffer_properties(SensorMode::new("bench", sensor, 10.0))
        .unwrap();
    node.acquire_resources().unwrap();
    node.prepare_stream_on().unwrap();
    node
}

pub fn benchmark_request(c: &mut Criterion) {
    let cases = [
        ("v1-12mp", ChipId::IFE_175, Dimension::new(4000, 3000)),
        ("v2-12mp", ChipId::IFE_480, Dimension::new(4000, 3000)),
        ("v2-48mp-dual", ChipId::IFE_480, Dimension::new(8000, 6000)),
    ];
    let mut group = c.benchmark_group("process_request");
    for (name, chip, sensor) in cases {
        let mut node = streaming_node(chip, sensor);

        // Identical inputs every frame: modules only re-emit stored state.
        let mut id = 0;
        group.bench_function(format!("{name}/steady"), |b| {
            b.iter(|| {
                id += 1;
                let request = ProcessRequest {
                    request_id: id,
                    stats: Some(StatsUpdate::neutral(0)),
                    ..ProcessRequest::default()
                };
                node.execute_process_request(&request).unwrap()
            })
        });

        // New 3A results every frame force every dependent module to recalculate.
        group.bench_function(format!("{name}/changing"), |b| {
            b.iter(|| {
                id += 1;
                let mut stats = StatsUpdate::neutral(id - 1);
                stats.cct = 2800 + (id % 40) as u32 * 100;
                let request = ProcessRequest {
                    request_id: id,
                    stats: Some(stats),
                    ..ProcessRequest::default()
                };
                node.execute_process_request(&request).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_request);
criterion_main!(benches);
