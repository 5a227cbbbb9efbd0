use font8x8::{BASIC_FONTS, UnicodeFonts};
use image::{Rgba, RgbaImage};
use tracing::trace;

use crate::core::{DevicePoint, DeviceRect};
use crate::error::RecipeResult;
use crate::render::{
    Primitive, RenderFrame, Renderer, TextMeasure, TextPrimitive, bitmap_font_scale,
    bitmap_text_extent,
};

/// Deterministic CPU rasterizer: no antialiasing, fixed 8x8 bitmap font.
///
/// Pixel `(x, y)` covers `[x, x + 1) x [y, y + 1)`; coverage is decided at
/// pixel centers so identical frames always produce identical images.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterRenderer;

impl RasterRenderer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl TextMeasure for RasterRenderer {
    fn measure_text(&self, text: &str, font_size_px: f64) -> (f64, f64) {
        bitmap_text_extent(text, font_size_px)
    }
}

impl Renderer for RasterRenderer {
    fn fingerprint(&self) -> String {
        format!("raster-renderer/{}/font8x8", env!("CARGO_PKG_VERSION"))
    }

    fn render(&mut self, frame: &RenderFrame) -> RecipeResult<RgbaImage> {
        frame.validate()?;
        let mut img = RgbaImage::from_pixel(
            frame.viewport.width,
            frame.viewport.height,
            Rgba(frame.background.to_rgba8()),
        );
        let visible = frame
            .paint_order()
            .into_iter()
            .filter(|item| item.primitive.is_visible());
        for item in visible {
            trace!(
                panel_id = %item.panel_id,
                element_id = item.element_id.as_ref().map(|id| id.as_str()),
                z_order = item.z_order,
                seq = item.seq,
                "rasterizing primitive"
            );
            draw_primitive(&mut img, &item.primitive);
        }
        Ok(img)
    }
}

fn draw_primitive(img: &mut RgbaImage, primitive: &Primitive) {
    match primitive {
        Primitive::Polyline {
            points,
            width,
            color,
        } => {
            let rgba = Rgba(color.to_rgba8());
            if let [single] = points.as_slice() {
                draw_disc(img, single.x, single.y, stroke_radius(*width), rgba);
            }
            for pair in points.windows(2) {
                draw_thick_line(img, pair[0], pair[1], *width, rgba);
            }
        }
        Primitive::Markers {
            centers,
            radius,
            color,
        } => {
            let rgba = Rgba(color.to_rgba8());
            for center in centers {
                draw_disc(img, center.x, center.y, *radius, rgba);
            }
        }
        Primitive::Rect { rect, fill, stroke } => {
            if let Some(fill) = fill {
                fill_rect(img, *rect, Rgba(fill.to_rgba8()));
            }
            if let Some((color, width)) = stroke {
                let rgba = Rgba(color.to_rgba8());
                let corners = [
                    DevicePoint::new(rect.x, rect.y),
                    DevicePoint::new(rect.right(), rect.y),
                    DevicePoint::new(rect.right(), rect.bottom()),
                    DevicePoint::new(rect.x, rect.bottom()),
                    DevicePoint::new(rect.x, rect.y),
                ];
                for pair in corners.windows(2) {
                    draw_thick_line(img, pair[0], pair[1], *width, rgba);
                }
            }
        }
        Primitive::Polygon { points, fill } => fill_polygon(img, points, Rgba(fill.to_rgba8())),
        Primitive::Image {
            rect,
            columns,
            rows,
            cells,
        } => {
            if *columns == 0 || *rows == 0 {
                return;
            }
            let cell_w = rect.width / *columns as f64;
            let cell_h = rect.height / *rows as f64;
            for (index, color) in cells.iter().enumerate() {
                let (row, col) = (index / columns, index % columns);
                let cell = DeviceRect::new(
                    rect.x + col as f64 * cell_w,
                    rect.y + row as f64 * cell_h,
                    cell_w,
                    cell_h,
                );
                fill_rect(img, cell, Rgba(color.to_rgba8()));
            }
        }
        Primitive::Text(text) => draw_text(img, text),
    }
}

fn blend_pixel(dst: Rgba<u8>, src: Rgba<u8>) -> Rgba<u8> {
    let a = f64::from(src[3]) / 255.0;
    if a <= 0.0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }
    let inv = 1.0 - a;
    let mix = |d: u8, s: u8| {
        (f64::from(d) * inv + f64::from(s) * a)
            .round()
            .clamp(0.0, 255.0) as u8
    };
    let out_a = (f64::from(dst[3]) + f64::from(src[3]) * inv)
        .round()
        .clamp(0.0, 255.0) as u8;
    Rgba([mix(dst[0], src[0]), mix(dst[1], src[1]), mix(dst[2], src[2]), out_a])
}

fn put(img: &mut RgbaImage, x: i64, y: i64, color: Rgba<u8>) {
    if x < 0 || y < 0 || x >= i64::from(img.width()) || y >= i64::from(img.height()) {
        return;
    }
    let (x, y) = (x as u32, y as u32);
    let dst = *img.get_pixel(x, y);
    img.put_pixel(x, y, blend_pixel(dst, color));
}

fn stroke_radius(width: f64) -> f64 {
    // Radius below ~0.71 can miss the nearest pixel center and leave gaps.
    (width / 2.0).max(0.75)
}

/// Pixels whose centers fall inside the disc; each pixel painted once.
fn draw_disc(img: &mut RgbaImage, cx: f64, cy: f64, radius: f64, color: Rgba<u8>) {
    let r2 = radius * radius;
    let min_x = (cx - radius - 0.5).floor() as i64;
    let max_x = (cx + radius - 0.5).ceil() as i64;
    let min_y = (cy - radius - 0.5).floor() as i64;
    let max_y = (cy + radius - 0.5).ceil() as i64;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let dx = x as f64 + 0.5 - cx;
            let dy = y as f64 + 0.5 - cy;
            if dx * dx + dy * dy <= r2 {
                put(img, x, y, color);
            }
        }
    }
}

/// Capsule stroke: pixel centers within `radius` of the segment.
fn draw_thick_line(
    img: &mut RgbaImage,
    a: DevicePoint,
    b: DevicePoint,
    width: f64,
    color: Rgba<u8>,
) {
    let radius = stroke_radius(width);
    let r2 = radius * radius;
    let min_x = (a.x.min(b.x) - radius - 0.5).floor() as i64;
    let max_x = (a.x.max(b.x) + radius - 0.5).ceil() as i64;
    let min_y = (a.y.min(b.y) - radius - 0.5).floor() as i64;
    let max_y = (a.y.max(b.y) + radius - 0.5).ceil() as i64;
    for y in min_y..=max_y {
        for x in min_x..=max_x {
            let center = DevicePoint::new(x as f64 + 0.5, y as f64 + 0.5);
            if segment_distance_sq(center, a, b) <= r2 {
                put(img, x, y, color);
            }
        }
    }
}

pub(crate) fn segment_distance_sq(point: DevicePoint, a: DevicePoint, b: DevicePoint) -> f64 {
    let (abx, aby) = (b.x - a.x, b.y - a.y);
    let length_sq = abx * abx + aby * aby;
    let t = if length_sq <= f64::EPSILON {
        0.0
    } else {
        (((point.x - a.x) * abx + (point.y - a.y) * aby) / length_sq).clamp(0.0, 1.0)
    };
    let (px, py) = (a.x + abx * t - point.x, a.y + aby * t - point.y);
    px * px + py * py
}

fn fill_rect(img: &mut RgbaImage, rect: DeviceRect, color: Rgba<u8>) {
    let x0 = (rect.x - 0.5).ceil() as i64;
    let x1 = (rect.right() - 0.5).floor() as i64;
    let y0 = (rect.y - 0.5).ceil() as i64;
    let y1 = (rect.bottom() - 0.5).floor() as i64;
    let w = i64::from(img.width());
    let h = i64::from(img.height());
    for y in y0.max(0)..=y1.min(h - 1) {
        for x in x0.max(0)..=x1.min(w - 1) {
            put(img, x, y, color);
        }
    }
}

/// Even-odd scanline fill sampled at pixel centers.
fn fill_polygon(img: &mut RgbaImage, points: &[DevicePoint], color: Rgba<u8>) {
    if points.len() < 3 {
        return;
    }
    let min_y = points.iter().map(|p| p.y).fold(f64::INFINITY, f64::min);
    let max_y = points.iter().map(|p| p.y).fold(f64::NEG_INFINITY, f64::max);
    let y0 = ((min_y - 0.5).ceil() as i64).max(0);
    let y1 = ((max_y - 0.5).floor() as i64).min(i64::from(img.height()) - 1);
    let mut crossings = Vec::new();
    for y in y0..=y1 {
        let scan = y as f64 + 0.5;
        crossings.clear();
        for (index, a) in points.iter().enumerate() {
            let b = points[(index + 1) % points.len()];
            if (a.y <= scan) != (b.y <= scan) {
                crossings.push(a.x + (scan - a.y) / (b.y - a.y) * (b.x - a.x));
            }
        }
        crossings.sort_by(f64::total_cmp);
        for span in crossings.chunks_exact(2) {
            let x0 = (span[0] - 0.5).ceil() as i64;
            let x1 = (span[1] - 0.5).floor() as i64;
            for x in x0.max(0)..=x1.min(i64::from(img.width()) - 1) {
                put(img, x, y, color);
            }
        }
    }
}

fn draw_text(img: &mut RgbaImage, text: &TextPrimitive) {
    let bounds = text.bounds(bitmap_text_extent(&text.text, text.font_size_px));
    let scale = i64::from(bitmap_font_scale(text.font_size_px));
    let color = Rgba(text.color.to_rgba8());
    let origin_x = bounds.x.round() as i64;
    let mut cursor_y = bounds.y.round() as i64;
    for line in text.text.split('\n') {
        let mut cursor_x = origin_x;
        for ch in line.chars() {
            let Some(glyph) = BASIC_FONTS.get(ch).or_else(|| BASIC_FONTS.get('?')) else {
                cursor_x += 8 * scale;
                continue;
            };
            for (row_idx, row) in glyph.iter().enumerate() {
                for col_idx in 0..8_i64 {
                    if (row >> col_idx) & 1 == 0 {
                        continue;
                    }
                    let px = cursor_x + col_idx * scale;
                    let py = cursor_y + row_idx as i64 * scale;
                    for sy in 0..scale {
                        for sx in 0..scale {
                            put(img, px + sx, py + sy, color);
                        }
                    }
                }
            }
            cursor_x += 8 * scale;
        }
        cursor_y += 8 * scale;
    }
}

#[cfg(test)]
mod tests {
    use image::Rgba;

    use super::RasterRenderer;
    use crate::core::{DevicePoint, DeviceRect, ElementId, PanelId, Viewport};
    use crate::render::{Color, Primitive, RenderFrame, Renderer, SceneItem};

    fn item(z_order: i32, seq: u64, primitive: Primitive) -> SceneItem {
        SceneItem {
            panel_id: PanelId::grid(0, 0),
            element_id: Some(ElementId::new(format!("e{seq}"))),
            z_order,
            seq,
            primitive,
        }
    }

    #[test]
    fn higher_z_order_paints_over_lower_regardless_of_sequence() {
        let red = Primitive::Rect {
            rect: DeviceRect::new(0.0, 0.0, 10.0, 10.0),
            fill: Some(Color::rgb(1.0, 0.0, 0.0)),
            stroke: None,
        };
        let blue = Primitive::Rect {
            rect: DeviceRect::new(0.0, 0.0, 10.0, 10.0),
            fill: Some(Color::rgb(0.0, 0.0, 1.0)),
            stroke: None,
        };
        let frame = RenderFrame::new(Viewport::new(10, 10), Color::WHITE)
            .with_item(item(3, 0, red))
            .with_item(item(2, 1, blue));
        let img = RasterRenderer::new().render(&frame).expect("render");
        assert_eq!(*img.get_pixel(5, 5), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn rendering_is_deterministic() {
        let line = Primitive::Polyline {
            points: vec![DevicePoint::new(1.3, 2.7), DevicePoint::new(17.9, 12.1)],
            width: 1.5,
            color: Color::BLACK,
        };
        let frame =
            RenderFrame::new(Viewport::new(20, 16), Color::WHITE).with_item(item(2, 0, line));
        let mut renderer = RasterRenderer::new();
        let first = renderer.render(&frame).expect("first");
        let second = renderer.render(&frame).expect("second");
        assert_eq!(first.as_raw(), second.as_raw());
        assert!(first.pixels().any(|pixel| *pixel == Rgba([0, 0, 0, 255])));
    }

    #[test]
    fn polygon_fill_covers_interior_only() {
        let triangle = Primitive::Polygon {
            points: vec![
                DevicePoint::new(0.0, 0.0),
                DevicePoint::new(10.0, 0.0),
                DevicePoint::new(0.0, 10.0),
            ],
            fill: Color::BLACK,
        };
        let frame =
            RenderFrame::new(Viewport::new(10, 10), Color::WHITE).with_item(item(2, 0, triangle));
        let img = RasterRenderer::new().render(&frame).expect("render");
        assert_eq!(*img.get_pixel(1, 1), Rgba([0, 0, 0, 255]));
        assert_eq!(*img.get_pixel(8, 8), Rgba([255, 255, 255, 255]));
    }
}
