// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! # EdgeFirst IFE Configuration Library
//!
//! Hardware abstraction for the Image Front End: the first stage of the
//! camera ISP, which takes the sensor's Bayer stream and produces processed
//! pixel outputs, raw dumps and 3A statistics.
//!
//! Each frame, the library turns per-request controls and 3A results into
//! a command packet of register writes and LUT uploads for one or two IFE
//! cores, together with the clock, bandwidth and buffer configuration the
//! kernel driver needs.
//!
//! ## Features
//!
//! - **Capability tables**: per-chip limits and the list of installed IQ and
//!   stats modules, with one pipeline strategy per hardware generation.
//! - **Module framework**: IQ and stats modules share one per-request
//!   contract and skip recalculation when their inputs have not changed.
//! - **Dual-IFE striping**: frames wider than one core are split at a column
//!   and every module runs once per core against its apparent frame.
//! - **Buffer negotiation**: a backward and a forward pass reconcile consumer
//!   requirements with hardware limits and the sensor mode.
//! - **Register dumps**: flush read-back for LUT bank recovery and hang
//!   dumps for post-mortem analysis.
//!
//! ## Example
//!
//! ```no_run
//! use edgefirst_ife::{
//!     capability::PipelinePath,
//!     format::{Dimension, Format},
//!     hw::ChipId,
//!     node::{BufferRequirement, IfeNode, LoopbackDevice, OutputPortConfig, PortSource, ProcessRequest},
//!     sensor::SensorMode,
//!     settings::Settings,
//!     split::BalancedStriping,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut node = IfeNode::create(
//!     ChipId::IFE_480,
//!     Settings::default(),
//!     Box::new(LoopbackDevice::new()),
//!     Box::new(BalancedStriping::new()),
//! )?;
//! node.initialize()?;
//! node.finalize_input_requirement(&[OutputPortConfig {
//!     port: 0,
//!     source: PortSource::Pixel(PipelinePath::Full),
//!     format: Format::Nv12,
//!     consumers: vec![BufferRequirement::new(Dimension::new(1920, 1080))],
//! }])?;
//! node.finalize_buffer_properties(SensorMode::new("12mp", Dimension::new(4000, 3000), 30.0))?;
//! node.acquire_resources()?;
//! node.prepare_stream_on()?;
//! node.execute_process_request(&ProcessRequest { request_id: 1, ..Default::default() })?;
//! node.release_resources()?;
//! # Ok(())
//! # }
//! ```

pub mod args;
pub mod capability;
pub mod error;
pub mod format;
pub mod hw;
pub mod iq;
pub mod node;
pub mod packet;
pub mod pipeline;
pub mod sensor;
pub mod settings;
pub mod split;
pub mod stats;
