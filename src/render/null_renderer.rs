use image::{Rgba, RgbaImage};

use crate::error::RecipeResult;
use crate::render::{RenderFrame, Renderer, TextMeasure, bitmap_text_extent};

/// Headless renderer used by tests and dry runs.
///
/// It validates frame content and returns a background-only raster of the
/// right size, so layout and crop logic can run without drawing.
#[derive(Debug, Default)]
pub struct NullRenderer {
    pub last_item_count: usize,
    pub last_text_count: usize,
}

impl TextMeasure for NullRenderer {
    fn measure_text(&self, text: &str, font_size_px: f64) -> (f64, f64) {
        bitmap_text_extent(text, font_size_px)
    }
}

impl Renderer for NullRenderer {
    fn fingerprint(&self) -> String {
        format!("null-renderer/{}", env!("CARGO_PKG_VERSION"))
    }

    fn render(&mut self, frame: &RenderFrame) -> RecipeResult<RgbaImage> {
        frame.validate()?;
        self.last_item_count = frame.items.len();
        self.last_text_count = frame
            .items
            .iter()
            .filter(|item| matches!(item.primitive, crate::render::Primitive::Text(_)))
            .count();
        Ok(RgbaImage::from_pixel(
            frame.viewport.width,
            frame.viewport.height,
            Rgba(frame.background.to_rgba8()),
        ))
    }
}
