// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use crate::{
    capability::{ModuleType, PipelinePath},
    format::{Dimension, Format},
    hw::ChipId,
    node::{BufferRequirement, OutputPortConfig, PortSource},
};
use clap::Parser;
use std::{path::PathBuf, str::FromStr};

/// One output port requested on the command line.
///
/// Written as `SOURCE:WIDTHxHEIGHT[:FORMAT]`, for example `full:1920x1080`,
/// `fd:640x480:nv12` or `rdi0:0x0`. Side channels such as `pdaf` and `meta`
/// take their size from the sensor and accept `0x0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortArg {
    pub source: PortSource,
    pub dims: Dimension,
    pub format: Format,
}

fn parse_source(name: &str) -> Result<PortSource, String> {
    let source = match name {
        "pdaf" => PortSource::Pdaf,
        "meta" => PortSource::Meta,
        "hdr" => PortSource::Hdr,
        "bhist" => PortSource::Stats(ModuleType::BHist),
        "awb_bg" => PortSource::Stats(ModuleType::AwbBg),
        "bf" => PortSource::Stats(ModuleType::Bf),
        rdi if rdi.starts_with("rdi") => {
            let n: u8 = rdi[3..].parse().map_err(|_| format!("bad RDI index in {rdi}"))?;
            if n > 3 {
                return Err(format!("RDI index {n} above 3"));
            }
            PortSource::Rdi(n)
        }
        path => PortSource::Pixel(
            serde_json::from_value::<PipelinePath>(serde_json::Value::String(path.to_owned()))
                .map_err(|_| format!("unknown port source {path}"))?,
        ),
    };
    Ok(source)
}

fn parse_dims(text: &str) -> Result<Dimension, String> {
    let (w, h) = text
        .split_once('x')
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {text}"))?;
    let w = w.parse().map_err(|_| format!("bad width {w}"))?;
    let h = h.parse().map_err(|_| format!("bad height {h}"))?;
    Ok(Dimension::new(w, h))
}

impl FromStr for PortArg {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let source = parse_source(parts.next().unwrap_or_default())?;
        let dims = parse_dims(parts.next().ok_or_else(|| format!("missing size in {s}"))?)?;
        let format = match parts.next() {
            Some(name) => serde_json::from_value(serde_json::Value::String(name.to_owned()))
                .map_err(|_| format!("unknown format {name}"))?,
            None => match source {
                PortSource::Pixel(PipelinePath::PixelRaw) | PortSource::Rdi(_) | PortSource::Hdr => {
                    Format::RawMipi10
                }
                PortSource::Pixel(_) => Format::Nv12,
                _ => Format::Blob,
            },
        };
        if parts.next().is_some() {
            return Err(format!("trailing fields in {s}"));
        }
        Ok(Self {
            source,
            dims,
            format,
        })
    }
}

fn parse_chip(s: &str) -> Result<u32, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(digits, 16).map_err(|e| format!("bad chip id {s}: {e}"))
}

/// Command-line arguments for the IFE simulator.
///
/// The simulator negotiates buffers for the requested ports, streams
/// `--frames` requests through one or more IFE nodes backed by an in-memory
/// device and reports what each request programmed. Arguments can be given
/// on the command line or through environment variables.
///
/// # Example
///
/// ```bash
/// edgefirst-ife --chip 0x480 --port full:1920x1080 --port fd:640x480
///
/// export CHIP=0x175
/// export FRAMES=120
/// edgefirst-ife
/// ```
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Chip identifier in hex (0x170, 0x175, 0x480 or 0x530)
    #[arg(long, env = "CHIP", default_value = "0x175", value_parser = parse_chip)]
    pub chip: u32,

    /// Sensor mode JSON file; a 12MP 30fps Bayer mode when absent
    #[arg(long, env = "SENSOR")]
    pub sensor: Option<PathBuf>,

    /// Node settings JSON file
    #[arg(long, env = "SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Output ports as SOURCE:WIDTHxHEIGHT[:FORMAT] (repeatable)
    #[arg(
        long = "port",
        env = "PORTS",
        default_value = "full:1920x1080",
        value_delimiter = ',',
        num_args = 1..
    )]
    pub ports: Vec<PortArg>,

    /// Number of requests to stream
    #[arg(long, env = "FRAMES", default_value = "30")]
    pub frames: u64,

    /// Overrides the sensor mode frame rate
    #[arg(long, env = "FPS")]
    pub fps: Option<f32>,

    /// Number of independent pipelines to run concurrently
    #[arg(long, env = "PIPELINES", default_value = "1")]
    pub pipelines: usize,

    /// Every Nth request arrives before its 3A stats (0 disables)
    #[arg(long, env = "STATS_DELAY", default_value = "0")]
    pub stats_delay: u64,

    /// Read the input from memory through the bus-read engine
    #[arg(long, env = "OFFLINE")]
    pub offline: bool,

    /// Directory for per-request packet and metadata dumps
    #[arg(long, env = "DUMP_DIR")]
    pub dump_dir: Option<PathBuf>,

    /// Write a register hang dump when the stream stops
    #[arg(long, env = "HANG_DUMP")]
    pub hang_dump: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Enable Tokio async runtime console for debugging
    #[arg(long, env = "TOKIO_CONSOLE")]
    pub tokio_console: bool,

    /// Enable Tracy profiler for performance analysis
    #[arg(long, env = "TRACY")]
    pub tracy: bool,
}

impl Args {
    pub fn chip(&self) -> ChipId {
        ChipId(self.chip)
    }

    /// Port configurations with one consumer each, numbered in order.
    pub fn port_configs(&self) -> Vec<OutputPortConfig> {
        self.ports
            .iter()
            .enumerate()
            .map(|(i, p)| OutputPortConfig {
                port: i as u32,
                source: p.source,
                format: p.format,
                consumers: vec![BufferRequirement::new(p.dims)],
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_syntax() {
        let full: PortArg = "full:1920x1080".parse().unwrap();
        assert_eq!(full.source, PortSource::Pixel(PipelinePath::Full));
        assert_eq!(full.dims, Dimension::new(1920, 1080));
        assert_eq!(full.format, Format::Nv12);

        let rdi: PortArg = "rdi2:0x0".parse().unwrap();
        assert_eq!(rdi.source, PortSource::Rdi(2));
        assert_eq!(rdi.format, Format::RawMipi10);

        let fd: PortArg = "fd:640x480:ubwc_nv12".parse().unwrap();
        assert_eq!(fd.format, Format::UbwcNv12);

        assert!("rdi7:0x0".parse::<PortArg>().is_err());
        assert!("full".parse::<PortArg>().is_err());
        assert!("full:1920x1080:nv12:x".parse::<PortArg>().is_err());
        assert!("preview:1920x1080".parse::<PortArg>().is_err());
    }

    #[test]
    fn chip_is_hex() {
        let args = Args::parse_from(["edgefirst-ife", "--chip", "0x480"]);
        assert_eq!(args.chip(), ChipId::IFE_480);
        let args = Args::parse_from(["edgefirst-ife", "--chip", "530", "--port", "full:1280x720,fd:640x480"]);
        assert_eq!(args.chip(), ChipId::TFE_530);
        assert_eq!(args.port_configs().len(), 2);
        assert_eq!(args.port_configs()[1].port, 1);
    }
}
