// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Au-Zone Technologies. All Rights Reserved.

//! Frame geometry and pixel formats shared by negotiation, IQ modules and
//! bandwidth accounting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of planes carried by any supported format.
pub const MAX_PLANES: usize = 3;

/// Width and height of a frame or buffer, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimension {
    pub width: u32,
    pub height: u32,
}

impl Dimension {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Width over height, or zero for an empty dimension.
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            0.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A rectangle in sensor or output coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub const fn full(dim: Dimension) -> Self {
        Self::new(0, 0, dim.width, dim.height)
    }

    pub fn right(&self) -> u32 {
        self.left + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.top + self.height
    }

    pub fn dimension(&self) -> Dimension {
        Dimension::new(self.width, self.height)
    }

    /// Smallest rectangle containing both.
    pub fn union(&self, other: &Rect) -> Rect {
        let left = self.left.min(other.left);
        let top = self.top.min(other.top);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(left, top, right - left, bottom - top)
    }

    /// Translates into coordinates relative to `origin`'s top-left corner.
    pub fn relative_to(&self, origin: &Rect) -> Rect {
        Rect::new(
            self.left.saturating_sub(origin.left),
            self.top.saturating_sub(origin.top),
            self.width,
            self.height,
        )
    }

    /// Intersection of two rectangles, `None` when they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(left, top, right - left, bottom - top))
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) {}x{}",
            self.left, self.top, self.width, self.height
        )
    }
}

/// Pixel formats the IFE reads from the sensor or writes to memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    /// MIPI packed 10-bit Bayer
    RawMipi10,
    /// MIPI packed 12-bit Bayer
    RawMipi12,
    /// 16-bit container raw
    RawPlain16,
    /// 8-bit YUV 4:2:0 semi-planar
    Nv12,
    /// 10-bit YUV 4:2:0 in 16-bit containers
    P010,
    /// UBWC compressed NV12
    UbwcNv12,
    /// UBWC compressed 10-bit tight-packed
    UbwcTp10,
    /// Opaque byte stream (stats, PDAF and sensor metadata)
    Blob,
}

impl Format {
    pub fn is_ubwc(&self) -> bool {
        matches!(self, Format::UbwcNv12 | Format::UbwcTp10)
    }

    pub fn is_10bit(&self) -> bool {
        matches!(self, Format::P010 | Format::UbwcTp10 | Format::RawMipi10)
    }

    pub fn is_raw(&self) -> bool {
        matches!(
            self,
            Format::RawMipi10 | Format::RawMipi12 | Format::RawPlain16
        )
    }

    /// Average storage bits per pixel, before compression.
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            Format::RawMipi10 => 10,
            Format::RawMipi12 => 12,
            Format::RawPlain16 => 16,
            Format::Nv12 | Format::UbwcNv12 => 12,
            Format::P010 => 24,
            Format::UbwcTp10 => 15,
            Format::Blob => 8,
        }
    }

    /// Stable code used in kernel blobs.
    pub fn code(&self) -> u32 {
        match self {
            Format::RawMipi10 => 0x10,
            Format::RawMipi12 => 0x11,
            Format::RawPlain16 => 0x12,
            Format::Nv12 => 0x20,
            Format::P010 => 0x21,
            Format::UbwcNv12 => 0x30,
            Format::UbwcTp10 => 0x31,
            Format::Blob => 0x40,
        }
    }

    pub fn planes(&self) -> usize {
        match self {
            Format::Nv12 | Format::P010 | Format::UbwcNv12 | Format::UbwcTp10 => 2,
            _ => 1,
        }
    }
}

/// Stride and scanline alignment required by a consumer for one plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaneAlignment {
    pub stride: u32,
    pub scanline: u32,
}

impl Default for PlaneAlignment {
    fn default() -> Self {
        Self {
            stride: 1,
            scanline: 1,
        }
    }
}

impl PlaneAlignment {
    /// Smallest alignment that satisfies both requirements.
    pub fn combine(&self, other: &PlaneAlignment) -> PlaneAlignment {
        PlaneAlignment {
            stride: lcm(self.stride, other.stride),
            scanline: lcm(self.scanline, other.scanline),
        }
    }
}

pub fn gcd(mut a: u32, mut b: u32) -> u32 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Least common multiple, treating zero as "no constraint".
pub fn lcm(a: u32, b: u32) -> u32 {
    match (a, b) {
        (0, x) | (x, 0) => x,
        _ => a / gcd(a, b) * b,
    }
}

pub fn even_floor(value: u32) -> u32 {
    value & !1
}

pub fn even_ceil(value: u32) -> u32 {
    value.saturating_add(1) & !1
}

pub fn align_up(value: u32, alignment: u32) -> u32 {
    if alignment <= 1 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}
