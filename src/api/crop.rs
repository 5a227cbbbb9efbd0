use image::{RgbaImage, imageops};
use serde::{Deserialize, Serialize};

use crate::core::units::mm_to_px;

/// Per-channel distance above which a pixel counts as content.
pub const CONTENT_THRESHOLD: u8 = 10;

/// Pixel window kept from a full render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropBox {
    #[must_use]
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    /// Content bounds padded by `margin_mm` at `dpi`, clamped to the image.
    ///
    /// Opaque images are compared against the median of their four corners;
    /// images with a transparent background use the alpha channel. An image
    /// without content keeps its full extent.
    #[must_use]
    pub fn detect(image: &RgbaImage, margin_mm: f64, dpi: f64) -> Self {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Self::full(width, height);
        }
        let corners = [
            *image.get_pixel(0, 0),
            *image.get_pixel(width - 1, 0),
            *image.get_pixel(0, height - 1),
            *image.get_pixel(width - 1, height - 1),
        ];
        let transparent = corners.iter().all(|pixel| pixel[3] == 0);
        let background: [u8; 3] = std::array::from_fn(|channel| {
            let mut values: Vec<u8> = corners.iter().map(|pixel| pixel[channel]).collect();
            values.sort_unstable();
            // Median of four: mean of the middle pair.
            ((u16::from(values[1]) + u16::from(values[2])) / 2) as u8
        });

        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for (x, y, pixel) in image.enumerate_pixels() {
            let is_content = if transparent {
                pixel[3] > 0
            } else {
                (0..3).any(|channel| {
                    pixel[channel].abs_diff(background[channel]) > CONTENT_THRESHOLD
                })
            };
            if !is_content {
                continue;
            }
            bounds = Some(match bounds {
                None => (x, y, x, y),
                Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
            });
        }
        let Some((x0, y0, x1, y1)) = bounds else {
            return Self::full(width, height);
        };

        let pad = if margin_mm.is_finite() && margin_mm > 0.0 {
            mm_to_px(margin_mm, dpi).round() as u32
        } else {
            0
        };
        let left = x0.saturating_sub(pad);
        let top = y0.saturating_sub(pad);
        let right = x1.saturating_add(1).saturating_add(pad).min(width);
        let bottom = y1.saturating_add(1).saturating_add(pad).min(height);
        Self {
            x: left,
            y: top,
            width: right - left,
            height: bottom - top,
        }
    }

    #[must_use]
    pub fn apply(&self, image: &RgbaImage) -> RgbaImage {
        imageops::crop_imm(image, self.x, self.y, self.width, self.height).to_image()
    }

    #[must_use]
    pub fn is_full(&self, width: u32, height: u32) -> bool {
        *self == Self::full(width, height)
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::CropBox;

    #[test]
    fn detects_content_and_pads_margin() {
        let mut image = RgbaImage::from_pixel(100, 80, Rgba([255, 255, 255, 255]));
        for x in 40..60 {
            for y in 30..50 {
                image.put_pixel(x, y, Rgba([0, 0, 0, 255]));
            }
        }
        // 25.4 mm at 10 dpi is 10 px of padding.
        let crop = CropBox::detect(&image, 25.4, 10.0);
        assert_eq!(
            crop,
            CropBox {
                x: 30,
                y: 20,
                width: 40,
                height: 40
            }
        );
        assert_eq!(crop.apply(&image).dimensions(), (40, 40));
    }

    #[test]
    fn faint_noise_below_threshold_is_background() {
        let mut image = RgbaImage::from_pixel(20, 20, Rgba([255, 255, 255, 255]));
        image.put_pixel(5, 5, Rgba([250, 250, 250, 255]));
        assert!(CropBox::detect(&image, 0.0, 300.0).is_full(20, 20));
    }

    #[test]
    fn transparent_background_uses_alpha() {
        let mut image = RgbaImage::from_pixel(20, 20, Rgba([0, 0, 0, 0]));
        image.put_pixel(10, 12, Rgba([0, 0, 0, 255]));
        let crop = CropBox::detect(&image, 0.0, 300.0);
        assert_eq!((crop.x, crop.y, crop.width, crop.height), (10, 12, 1, 1));
    }

    #[test]
    fn huge_margin_clamps_to_the_image() {
        let mut image = RgbaImage::from_pixel(30, 20, Rgba([255, 255, 255, 255]));
        image.put_pixel(15, 10, Rgba([0, 0, 0, 255]));
        assert!(CropBox::detect(&image, 1e12, 300.0).is_full(30, 20));
    }
}
