// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_ife::{
    args::Args,
    error::{IfeError, Result},
    format::Dimension,
    iq::StatsUpdate,
    node::{IfeNode, LoopbackDevice, ProcessOutcome, ProcessRequest},
    sensor::SensorMode,
    settings::Settings,
    split::BalancedStriping,
};
use kanal::{AsyncReceiver, AsyncSender, Receiver};
use std::{error::Error, fs, io, path::Path, time::Duration};
use tracing::{debug, error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{layer::SubscriberExt, Layer, Registry};

/// Per-pipeline totals printed when the stream ends.
#[derive(Debug, Default)]
struct PipelineReport {
    pipeline: usize,
    submitted: u64,
    deferred: u64,
    dual: bool,
    packet_words: usize,
}

fn init_tracing(args: &Args) -> Result<(), Box<dyn Error>> {
    let level = if args.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let stdout = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_filter(level);
    let journald = match tracing_journald::layer() {
        Ok(layer) => Some(layer.with_filter(level)),
        Err(e) => {
            eprintln!("journald unavailable, logging to stdout only: {e}");
            None
        }
    };
    let tracy = if args.tracy {
        tracy_client::Client::start();
        Some(tracing_tracy::TracyLayer::default().with_filter(LevelFilter::TRACE))
    } else {
        None
    };
    let console = args.tokio_console.then(console_subscriber::spawn);

    let subscriber = Registry::default()
        .with(console)
        .with(stdout)
        .with(journald)
        .with(tracy);
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

/// Produces the request stream and, for late requests, the stats that
/// arrive after them.
async fn feed_requests(
    frames: u64,
    stats_delay: u64,
    frame_period: Duration,
    requests: AsyncSender<ProcessRequest>,
    late_stats: AsyncSender<StatsUpdate>,
) {
    for request_id in 1..=frames {
        let stats = StatsUpdate::neutral(request_id.saturating_sub(1));
        let late = stats_delay != 0 && request_id % stats_delay == 0;
        let mut request = ProcessRequest {
            request_id,
            stats: (!late).then(|| stats.clone()),
            ..ProcessRequest::default()
        };
        request.hal.shading_map = request_id % 10 == 0;
        if requests.send(request).await.is_err() {
            return;
        }
        if late {
            tokio::time::sleep(frame_period).await;
            if late_stats.send(stats).await.is_err() {
                return;
            }
        }
    }
}

fn dump_request(dir: &Path, pipeline: usize, node: &IfeNode, request_id: u64, packet: Option<&[u8]>) -> Result<()> {
    if let Some(bytes) = packet {
        fs::write(dir.join(format!("ife{pipeline}_{request_id:06}.pkt")), bytes)?;
    }
    let json = node.metadata().to_json(request_id)?;
    fs::write(dir.join(format!("ife{pipeline}_{request_id:06}.json")), json)?;
    Ok(())
}

fn run_pipeline(
    pipeline: usize,
    args: Args,
    sensor: SensorMode,
    settings: Settings,
    requests: Receiver<ProcessRequest>,
    late_stats: Receiver<StatsUpdate>,
) -> Result<PipelineReport> {
    let device = LoopbackDevice::new();
    let log = device.log();
    let mut node = IfeNode::create(
        args.chip(),
        settings,
        Box::new(device),
        Box::new(BalancedStriping::new()),
    )?;
    node.initialize()?;
    let input = node.finalize_input_requirement(&args.port_configs())?;
    debug!(?input, "input requirement");
    for port in node.finalize_buffer_properties(sensor)? {
        info!(pipeline, port = port.port, source = ?port.source, dims = %port.dims, format = ?port.format, "port");
    }
    node.set_offline_input(args.offline)?;
    node.acquire_resources()?;
    node.prepare_stream_on()?;

    let mut report = PipelineReport {
        pipeline,
        dual: node.mode() == edgefirst_ife::split::SplitMode::Dual,
        ..PipelineReport::default()
    };
    while let Ok(mut request) = requests.recv() {
        let summary = loop {
            match node.execute_process_request(&request)? {
                ProcessOutcome::Submitted(summary) => break summary,
                ProcessOutcome::Deferred(unmet) => {
                    report.deferred += 1;
                    debug!(request = unmet.request_id, dependency = ?unmet.dependency, "waiting");
                    let stats = late_stats
                        .recv()
                        .map_err(|e| IfeError::Device(format!("stats source closed: {e}")))?;
                    request.stats = Some(stats);
                }
            }
        };
        report.submitted += 1;
        report.packet_words = report.packet_words.max(summary.cmd_words);
        if summary.disabled > 0 {
            warn!(request = summary.request_id, disabled = summary.disabled, "modules disabled");
        }
        if let Some(dir) = &args.dump_dir {
            let packet = log.lock().ok().and_then(|l| l.submitted.last().cloned());
            dump_request(dir, pipeline, &node, summary.request_id, packet.as_deref())?;
        }
    }

    if args.hang_dump {
        let written = match &args.dump_dir {
            Some(dir) => node.dump_hang(&mut fs::File::create(dir.join(format!("ife{pipeline}_hang.txt")))?)?,
            None => node.dump_hang(&mut io::stdout().lock())?,
        };
        info!(pipeline, registers = written, "hang dump written");
    }
    node.on_stream_off()?;
    node.release_resources()?;
    Ok(report)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_tracing(&args)?;

    let mut sensor = match &args.sensor {
        Some(path) => SensorMode::from_file(path)?,
        None => SensorMode::new("default_12mp", Dimension::new(4000, 3000), 30.0),
    };
    if let Some(fps) = args.fps.filter(|f| *f > 0.0) {
        sensor.pixel_clock_hz = (sensor.pixel_clock_hz as f64 * (fps / sensor.fps) as f64) as u64;
        sensor.fps = fps;
    }
    let settings = match &args.settings {
        Some(path) => Settings::from_file(path)?,
        None => Settings::default(),
    };
    if let Some(dir) = &args.dump_dir {
        fs::create_dir_all(dir)?;
    }
    info!(chip = %args.chip(), sensor = %sensor.name, frames = args.frames, "IFE simulator");

    let frame_period = Duration::from_secs_f32(1.0 / sensor.fps.max(1.0));
    let mut workers = Vec::new();
    for pipeline in 0..args.pipelines.max(1) {
        let (req_tx, req_rx): (AsyncSender<ProcessRequest>, AsyncReceiver<ProcessRequest>) =
            kanal::bounded_async(settings.queue_depth);
        let (stats_tx, stats_rx) = kanal::bounded_async(settings.queue_depth);
        tokio::spawn(feed_requests(args.frames, args.stats_delay, frame_period, req_tx, stats_tx));

        let (args, sensor, settings) = (args.clone(), sensor.clone(), settings.clone());
        workers.push(tokio::task::spawn_blocking(move || {
            run_pipeline(pipeline, args, sensor, settings, req_rx.to_sync(), stats_rx.to_sync())
        }));
    }

    let mut failed = false;
    for worker in workers {
        match worker.await? {
            Ok(report) => info!(
                pipeline = report.pipeline,
                submitted = report.submitted,
                deferred = report.deferred,
                dual = report.dual,
                max_words = report.packet_words,
                "stream complete"
            ),
            Err(e) => {
                error!(code = e.code(), "pipeline failed: {e}");
                failed = true;
            }
        }
    }
    if failed {
        return Err("one or more pipelines failed".into());
    }
    Ok(())
}
