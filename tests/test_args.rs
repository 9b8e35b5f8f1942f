// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

use clap::Parser;
use edgefirst_ife::{
    args::Args,
    capability::PipelinePath,
    format::{Dimension, Format},
    hw::ChipId,
    node::PortSource,
};
use serial_test::serial;
use std::{env, error::Error};

const VARS: [&str; 5] = ["CHIP", "PORTS", "FRAMES", "FPS", "STATS_DELAY"];

fn clear_env() {
    for var in VARS {
        env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_defaults() -> Result<(), Box<dyn Error>> {
    clear_env();
    let args = Args::try_parse_from(["edgefirst-ife"])?;
    assert_eq!(args.chip(), ChipId::IFE_175);
    assert_eq!(args.frames, 30);
    assert_eq!(args.fps, None);
    assert_eq!(args.pipelines, 1);
    let ports = args.port_configs();
    assert_eq!(ports.len(), 1);
    assert_eq!(ports[0].source, PortSource::Pixel(PipelinePath::Full));
    assert_eq!(ports[0].consumers[0].optimal, Dimension::new(1920, 1080));
    Ok(())
}

#[test]
#[serial]
fn test_environment() -> Result<(), Box<dyn Error>> {
    clear_env();
    env::set_var("CHIP", "0x480");
    env::set_var("PORTS", "full:3840x2160:ubwc_tp10,fd:640x480,bhist:0x0");
    env::set_var("FRAMES", "120");
    env::set_var("FPS", "60");
    env::set_var("STATS_DELAY", "5");
    let parsed = Args::try_parse_from(["edgefirst-ife"]);
    clear_env();
    let args = parsed?;

    assert_eq!(args.chip(), ChipId::IFE_480);
    assert_eq!(args.frames, 120);
    assert_eq!(args.fps, Some(60.0));
    assert_eq!(args.stats_delay, 5);
    assert_eq!(args.ports.len(), 3);
    assert_eq!(args.ports[0].format, Format::UbwcTp10);
    assert_eq!(args.ports[2].format, Format::Blob);
    Ok(())
}

#[test]
#[serial]
fn test_command_line_wins() -> Result<(), Box<dyn Error>> {
    clear_env();
    env::set_var("CHIP", "0x480");
    let parsed = Args::try_parse_from(["edgefirst-ife", "--chip", "0x530", "--offline"]);
    clear_env();
    let args = parsed?;
    assert_eq!(args.chip(), ChipId::TFE_530);
    assert!(args.offline);

    assert!(Args::try_parse_from(["edgefirst-ife", "--chip", "zz"]).is_err());
    assert!(Args::try_parse_from(["edgefirst-ife", "--port", "full:wide"]).is_err());
    Ok(())
}
