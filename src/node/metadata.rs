// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Per-request result metadata read by 3A and the application layer.

use super::ring::ConfigRing;
use crate::{
    capability::{ModuleType, PipelinePath},
    error::Result,
    format::{Dimension, Rect},
    iq::{CalculatedData, CropInfo, StatsConfig},
    sensor::{PdBufferFormat, PdafType},
};
use serde::Serialize;
use std::collections::BTreeMap;

/// Published metadata tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataTag {
    CropInfo,
    ResidualCrop,
    GammaInfo,
    CropRegions,
    StatsConfig,
    PdafCapability,
    LensShadingMapMode,
    LensShadingMap,
}

/// What the PD library can expect from this stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PdafCapability {
    pub sensor_type: PdafType,
    pub buffer_format: PdBufferFormat,
    pub buffer: Dimension,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataValue {
    Crop(BTreeMap<PipelinePath, CropInfo>),
    /// HAL crop left to apply downstream, in each output's coordinates
    ResidualCrop(BTreeMap<PipelinePath, Rect>),
    Gamma(BTreeMap<PipelinePath, Vec<u16>>),
    CropRegions(Vec<Rect>),
    Stats(BTreeMap<ModuleType, StatsConfig>),
    Pdaf(PdafCapability),
    ShadingMapMode(bool),
    ShadingMap { grid: Dimension, gains: Vec<u16> },
}

/// Maps the part of `hal` inside `applied` into output coordinates.
pub fn residual_crop(hal: &Rect, applied: &Rect, output: Dimension) -> Option<Rect> {
    let inside = hal.intersect(applied)?;
    if applied.width == 0 || applied.height == 0 {
        return None;
    }
    let sx = |v: u32| (v as u64 * output.width as u64 / applied.width as u64) as u32;
    let sy = |v: u32| (v as u64 * output.height as u64 / applied.height as u64) as u32;
    let local = inside.relative_to(applied);
    Some(Rect::new(
        sx(local.left),
        sy(local.top),
        sx(local.width),
        sy(local.height),
    ))
}

/// Request-indexed property pool.
#[derive(Debug, Clone)]
pub struct MetadataPool {
    ring: ConfigRing<BTreeMap<MetadataTag, MetadataValue>>,
}

impl MetadataPool {
    pub fn new(depth: usize) -> Self {
        Self {
            ring: ConfigRing::new(depth),
        }
    }

    pub fn publish(&mut self, request_id: u64, tag: MetadataTag, value: MetadataValue) {
        self.ring.get_or_default(request_id).insert(tag, value);
    }

    pub fn get(&self, request_id: u64, tag: MetadataTag) -> Option<&MetadataValue> {
        self.ring.get(request_id)?.get(&tag)
    }

    /// Publishes the results every request carries.
    pub fn publish_request(&mut self, request_id: u64, hal_crop: Rect, shading_map: bool, data: &CalculatedData) {
        let residual = data
            .crop
            .iter()
            .filter_map(|(path, c)| residual_crop(&hal_crop, &c.applied, c.output).map(|r| (*path, r)))
            .collect();
        self.publish(request_id, MetadataTag::CropInfo, MetadataValue::Crop(data.crop.clone()));
        self.publish(request_id, MetadataTag::ResidualCrop, MetadataValue::ResidualCrop(residual));
        self.publish(request_id, MetadataTag::CropRegions, MetadataValue::CropRegions(vec![hal_crop]));
        self.publish(request_id, MetadataTag::GammaInfo, MetadataValue::Gamma(data.gamma.clone()));
        self.publish(request_id, MetadataTag::StatsConfig, MetadataValue::Stats(data.stats.clone()));
        self.publish(
            request_id,
            MetadataTag::LensShadingMapMode,
            MetadataValue::ShadingMapMode(shading_map),
        );
        if let Some((grid, gains)) = data.lsc.as_ref().filter(|(_, g)| shading_map && !g.is_empty()) {
            self.publish(
                request_id,
                MetadataTag::LensShadingMap,
                MetadataValue::ShadingMap {
                    grid: *grid,
                    gains: gains.clone(),
                },
            );
        }
    }

    /// Everything published for `request_id` as a JSON object.
    pub fn to_json(&self, request_id: u64) -> Result<String> {
        let empty = BTreeMap::new();
        Ok(serde_json::to_string(self.ring.get(request_id).unwrap_or(&empty))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn residual_in_output_coordinates() {
        let applied = Rect::new(0, 375, 4000, 2250);
        let hal = Rect::new(1000, 375, 2000, 2250);
        let r = residual_crop(&hal, &applied, Dimension::new(1920, 1080));
        assert_eq!(r, Some(Rect::new(480, 0, 960, 1080)));
        assert_eq!(residual_crop(&Rect::new(0, 0, 10, 10), &applied, Dimension::new(1920, 1080)), None);
    }

    #[test]
    fn lookups_are_per_request() -> Result<()> {
        let mut pool = MetadataPool::new(4);
        pool.publish(2, MetadataTag::LensShadingMapMode, MetadataValue::ShadingMapMode(true));
        assert_eq!(
            pool.get(2, MetadataTag::LensShadingMapMode),
            Some(&MetadataValue::ShadingMapMode(true))
        );
        assert_eq!(pool.get(6, MetadataTag::LensShadingMapMode), None);
        assert!(pool.to_json(2)?.contains("shading_map_mode"));
        Ok(())
    }
}
