// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Statistics modules feeding 3A.
//!
//! Stats blocks follow the same module contract as the IQ modules. Each core
//! collects statistics over the columns it owns; the node merges the per-core
//! region configuration into one result for publication.

pub mod awb_bg;
pub mod bf;
pub mod bhist;

use crate::{
    capability::{Capability, ModuleType},
    format::{Format, Rect},
    hw::HwVersion,
    iq::{ProcessingContext, WmDescriptor},
    packet::blob::DataPath,
};

/// Part of `roi` this core collects, in frame coordinates.
pub(crate) fn owned_roi(roi: Rect, ctx: &ProcessingContext<'_>) -> Option<Rect> {
    roi.intersect(&ctx.owned)
}

/// Fixed-size stats buffer written by a stats module.
pub(crate) fn stats_wm(version: HwVersion, kind: ModuleType) -> Option<WmDescriptor> {
    Capability::lookup(version)
        .stats_dims(kind)
        .map(|dims| WmDescriptor {
            path: DataPath::Stats,
            dims,
            format: Format::Blob,
        })
}
