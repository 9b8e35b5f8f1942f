// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use criterion::{criterion_group, criterion_main, Criterion};
use edgefirst_ife::{
    hw::HwVersion,
    node::LoopbackDevice,
    pipeline::{self, regdump, ModuleEnable},
    split::SplitMode,
};
use std::io;

pub fn benchmark_regdump(c: &mut Criterion) {
    for version in [HwVersion::V1, HwVersion::V2, HwVersion::V3] {
        let pipeline = pipeline::create(version);
        let mut device = LoopbackDevice::new();
        let mut group = c.benchmark_group(format!("regdump/{version:?}"));

        group.bench_function("hang_setup", |b| {
            b.iter(|| pipeline.setup_hang_reg_dump(SplitMode::Dual, u32::MAX).unwrap())
        });

        let mut hang = pipeline
            .setup_hang_reg_dump(SplitMode::Single, u32::MAX)
            .unwrap();
        group.bench_function("hang_capture_parse", |b| {
            b.iter(|| {
                regdump::capture(&mut hang, 1, &mut device).unwrap();
                pipeline.parse_hang_reg_dump(&hang, &mut io::sink()).unwrap()
            })
        });

        let registers = version.registers();
        let all = ModuleEnable::all();
        group.bench_function("enable_pack", |b| {
            b.iter(|| ModuleEnable::unpack(registers, &all.pack(registers)))
        });

        let mut flush = pipeline.setup_flush_reg_dump().unwrap();
        group.bench_function("flush_capture_parse", |b| {
            b.iter(|| {
                regdump::capture(&mut flush, 1, &mut device).unwrap();
                pipeline.parse_flush_reg_dump(&flush).unwrap()
            })
        });
        group.finish();
    }
}

criterion_group!(benches, benchmark_regdump);
criterion_main!(benches);
