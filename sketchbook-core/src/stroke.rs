//! # Strokes
//!
//! A stroke is one pen-down-to-pen-up gesture: a polyline and the pen it was drawn with.
//! Positions are relative to the center of the page, in logical pixels.

use crate::color::Argb;

#[derive(Copy, Clone, PartialEq, Debug, Default, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}
impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
    /// Squared distance. Cheaper than the distance and good enough for thresholds.
    #[must_use]
    pub fn dist2(self, other: Self) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx * dx + dy * dy
    }
    #[must_use = "returns a new point without modifying `self`"]
    pub fn offset(self, [dx, dy]: [f32; 2]) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}
impl From<[f32; 2]> for Point {
    fn from([x, y]: [f32; 2]) -> Self {
        Self { x, y }
    }
}

/// Edge treatment used when rasterizing.
#[derive(
    Copy,
    Clone,
    PartialEq,
    Eq,
    Hash,
    Debug,
    Default,
    strum::FromRepr,
    strum::EnumString,
    strum::Display,
)]
#[repr(u8)]
pub enum Smoothing {
    /// Hard, aliased edges.
    #[strum(serialize = "none")]
    None = 0,
    #[default]
    #[strum(serialize = "antialias")]
    AntiAlias = 1,
}

#[derive(Copy, Clone, PartialEq, Debug)]
pub struct PenStyle {
    pub color: Argb,
    /// Diameter, in logical pixels.
    pub width: f32,
    pub smoothing: Smoothing,
}
impl Default for PenStyle {
    fn default() -> Self {
        Self {
            color: Argb::BLACK,
            width: 1.0,
            smoothing: Smoothing::AntiAlias,
        }
    }
}

#[derive(Clone, PartialEq, Debug, Default)]
pub struct Stroke {
    pub style: PenStyle,
    pub points: Vec<Point>,
}
impl Stroke {
    #[must_use]
    pub fn new(style: PenStyle, points: Vec<Point>) -> Self {
        Self { style, points }
    }
}
