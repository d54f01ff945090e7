//! Debug overlay: draws the matching zone (red) and object box (blue) onto
//! a camera snapshot so operators can see why a notification was sent.

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;
use std::io::Cursor;

use crate::detect::DetectedObject;
use crate::geometry::{Point, Polygon, Rect};
use crate::zone::Zone;

pub const ZONE_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);
pub const OBJECT_COLOR: Rgba<u8> = Rgba([0, 0, 255, 255]);

const STROKE_PX: i32 = 2;

/// Decodes `snapshot` (any format `image` can read), draws the outlines and
/// returns PNG bytes.
pub fn render_overlay(snapshot: &[u8], zone: &Polygon, object: &Rect) -> Result<Vec<u8>> {
    let mut canvas = image::load_from_memory(snapshot)
        .context("decode snapshot")?
        .to_rgba8();
    draw_outline(&mut canvas, zone.vertices(), ZONE_COLOR);
    draw_outline(&mut canvas, &object.corners(), OBJECT_COLOR);

    let mut out = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
        .context("encode overlay png")?;
    Ok(out)
}

pub fn render_match(snapshot: &[u8], zone: &Zone, object: &DetectedObject) -> Result<Vec<u8>> {
    render_overlay(snapshot, zone.polygon(), &object.bounding_box)
}

fn draw_outline(canvas: &mut RgbaImage, outline: &[Point], color: Rgba<u8>) {
    let (w, h) = canvas.dimensions();
    let to_px = |p: Point| -> (f32, f32) {
        let x = (p.x * f64::from(w)).clamp(0.0, f64::from(w.saturating_sub(1)));
        let y = (p.y * f64::from(h)).clamp(0.0, f64::from(h.saturating_sub(1)));
        (x as f32, y as f32)
    };

    for (i, &start) in outline.iter().enumerate() {
        let end = outline[(i + 1) % outline.len()];
        let (a, b) = (to_px(start), to_px(end));
        for offset in 0..STROKE_PX {
            let d = offset as f32;
            draw_line_segment_mut(canvas, (a.0 + d, a.1), (b.0 + d, b.1), color);
            draw_line_segment_mut(canvas, (a.0, a.1 + d), (b.0, b.1 + d), color);
        }
    }
}
