//! Software rasterization of strokes into an RGBA image.
//!
//! This is the minimum needed to keep a page cache that can be shown and exported, it makes no
//! attempt at being pretty. Segments are drawn as capsules, with coverage from the distance to
//! the segment.

use crate::{
    color::Argb,
    stroke::{Point, Smoothing, Stroke},
};
use image::{Rgba, RgbaImage};

/// Background of every page.
pub const PAPER: Rgba<u8> = Rgba(Argb::WHITE.to_rgba8());

/// Fill the entire image with paper.
pub fn clear(image: &mut RgbaImage) {
    for pixel in image.pixels_mut() {
        *pixel = PAPER;
    }
}

/// Draw a stroke, where `origin` is the pixel position of the page's center.
///
/// Like a polyline, strokes with fewer than two points draw nothing.
pub fn draw_stroke(image: &mut RgbaImage, origin: [f32; 2], stroke: &Stroke) {
    if stroke.points.len() < 2 {
        return;
    }
    let radius = stroke.style.width.max(0.0) / 2.0;
    let color = stroke.style.color.to_rgba8();
    for segment in stroke.points.windows(2) {
        let [a, b] = [segment[0], segment[1]].map(|p| p.offset(origin));
        draw_segment(image, a, b, radius, color, stroke.style.smoothing);
    }
}

fn draw_segment(
    image: &mut RgbaImage,
    a: Point,
    b: Point,
    radius: f32,
    color: [u8; 4],
    smoothing: Smoothing,
) {
    // One extra pixel of slack for the antialiased fringe.
    let reach = radius + 1.0;
    let min_x = (a.x.min(b.x) - reach).floor().max(0.0);
    let min_y = (a.y.min(b.y) - reach).floor().max(0.0);
    #[allow(clippy::cast_precision_loss)]
    let max_x = (a.x.max(b.x) + reach).ceil().min(image.width() as f32 - 1.0);
    #[allow(clippy::cast_precision_loss)]
    let max_y = (a.y.max(b.y) + reach).ceil().min(image.height() as f32 - 1.0);
    if min_x > max_x || min_y > max_y {
        // Entirely off-image.
        return;
    }

    // Bounds were clamped into the image above, so these casts can't truncate or wrap.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let (min_x, min_y, max_x, max_y) = (min_x as u32, min_y as u32, max_x as u32, max_y as u32);
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            #[allow(clippy::cast_precision_loss)]
            let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
            let dist = distance_to_segment(center, a, b);
            let coverage = match smoothing {
                Smoothing::None => {
                    // Always light at least the pixel the line passes through.
                    if dist <= radius.max(0.5) {
                        1.0
                    } else {
                        0.0
                    }
                }
                Smoothing::AntiAlias => (radius + 0.5 - dist).clamp(0.0, 1.0),
            };
            if coverage > 0.0 {
                blend(image.get_pixel_mut(x, y), color, coverage);
            }
        }
    }
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f32 {
    let ab = [b.x - a.x, b.y - a.y];
    let len2 = ab[0] * ab[0] + ab[1] * ab[1];
    let t = if len2 <= f32::EPSILON {
        0.0
    } else {
        (((p.x - a.x) * ab[0] + (p.y - a.y) * ab[1]) / len2).clamp(0.0, 1.0)
    };
    let closest = Point::new(a.x + ab[0] * t, a.y + ab[1] * t);
    p.dist2(closest).sqrt()
}

/// Straight-alpha source-over.
fn blend(dst: &mut Rgba<u8>, [r, g, b, a]: [u8; 4], coverage: f32) {
    let src_a = f32::from(a) / 255.0 * coverage;
    let dst_a = f32::from(dst.0[3]) / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        *dst = Rgba([0; 4]);
        return;
    }
    let mix = |s: u8, d: u8| -> u8 {
        let v = (f32::from(s) * src_a + f32::from(d) * dst_a * (1.0 - src_a)) / out_a;
        // Clamped, so the cast is exact enough.
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let v = v.round().clamp(0.0, 255.0) as u8;
        v
    };
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let out_alpha = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    *dst = Rgba([
        mix(r, dst.0[0]),
        mix(g, dst.0[1]),
        mix(b, dst.0[2]),
        out_alpha,
    ]);
}
