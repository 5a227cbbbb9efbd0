mod frame;
mod null_renderer;
mod primitives;
mod raster;

pub use frame::{RenderFrame, SceneItem};
pub use null_renderer::NullRenderer;
pub use primitives::{Color, Primitive, TextHAlign, TextPrimitive, TextVAlign};
pub use raster::RasterRenderer;

pub(crate) use raster::segment_distance_sq;

use image::RgbaImage;

use crate::error::RecipeResult;

/// Glyph cell edge of the built-in bitmap font, in font units.
pub const BITMAP_GLYPH_PX: f64 = 8.0;

/// Text extent oracle used while building scenes.
pub trait TextMeasure: Sync {
    /// Returns `(width, height)` in device pixels.
    fn measure_text(&self, text: &str, font_size_px: f64) -> (f64, f64);
}

/// Contract implemented by any rendering backend.
///
/// Backends receive a fully materialized, deterministic `RenderFrame` so
/// drawing code stays isolated from recipe and interaction logic. The same
/// frame rendered twice by the same backend must give identical pixels.
pub trait Renderer: TextMeasure {
    /// Identifies backend and font stack; stored in recipes so replays can
    /// flag a renderer change.
    fn fingerprint(&self) -> String;

    fn render(&mut self, frame: &RenderFrame) -> RecipeResult<RgbaImage>;
}

/// Integer upscaling factor for the bitmap font at `font_size_px`.
#[must_use]
pub fn bitmap_font_scale(font_size_px: f64) -> u32 {
    if !font_size_px.is_finite() {
        return 1;
    }
    (font_size_px / BITMAP_GLYPH_PX).round().max(1.0) as u32
}

/// Extent of `text` drawn with the bitmap font; lines split on `\n`.
#[must_use]
pub fn bitmap_text_extent(text: &str, font_size_px: f64) -> (f64, f64) {
    let cell = BITMAP_GLYPH_PX * f64::from(bitmap_font_scale(font_size_px));
    let lines = text.split('\n');
    let (count, widest) = lines.fold((0usize, 0usize), |(count, widest), line| {
        (count + 1, widest.max(line.chars().count()))
    });
    (widest as f64 * cell, count as f64 * cell)
}

#[cfg(test)]
mod tests {
    use super::{bitmap_font_scale, bitmap_text_extent};

    #[test]
    fn bitmap_extent_scales_by_whole_glyphs() {
        assert_eq!(bitmap_font_scale(3.0), 1);
        assert_eq!(bitmap_font_scale(25.0), 3);
        assert_eq!(bitmap_text_extent("abc", 16.0), (48.0, 16.0));
        assert_eq!(bitmap_text_extent("ab\nwxyz", 8.0), (32.0, 16.0));
    }
}
