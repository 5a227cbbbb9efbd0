//! Millimeter / inch / point / pixel conversions.
//!
//! 1 inch = 25.4 mm = 72 PostScript points. Pixel conversions always go
//! through the figure DPI so the same mm geometry renders identically at any
//! output resolution.

use std::f64::consts::PI;

pub const MM_PER_INCH: f64 = 25.4;
pub const PT_PER_INCH: f64 = 72.0;

#[must_use]
pub fn mm_to_inch(mm: f64) -> f64 {
    mm / MM_PER_INCH
}

#[must_use]
pub fn inch_to_mm(inch: f64) -> f64 {
    inch * MM_PER_INCH
}

#[must_use]
pub fn mm_to_pt(mm: f64) -> f64 {
    mm * PT_PER_INCH / MM_PER_INCH
}

#[must_use]
pub fn pt_to_mm(pt: f64) -> f64 {
    pt * MM_PER_INCH / PT_PER_INCH
}

#[must_use]
pub fn mm_to_px(mm: f64, dpi: f64) -> f64 {
    mm_to_inch(mm) * dpi
}

#[must_use]
pub fn px_to_mm(px: f64, dpi: f64) -> f64 {
    inch_to_mm(px / dpi)
}

#[must_use]
pub fn pt_to_px(pt: f64, dpi: f64) -> f64 {
    pt / PT_PER_INCH * dpi
}

/// Pixel extent of a figure dimension, rounded the way rasterizers size
/// their canvas.
#[must_use]
pub fn mm_extent_to_px(mm: f64, dpi: f64) -> u32 {
    mm_to_px(mm, dpi).round().max(1.0) as u32
}

/// Fraction of `extent_mm` covered by `mm`.
#[must_use]
pub fn mm_to_device_fraction(mm: f64, extent_mm: f64) -> f64 {
    if extent_mm <= 0.0 {
        return 0.0;
    }
    mm / extent_mm
}

#[must_use]
pub fn device_fraction_to_mm(fraction: f64, extent_mm: f64) -> f64 {
    fraction * extent_mm
}

/// Marker area in pt² for a circular marker of the given diameter.
#[must_use]
pub fn mm_to_scatter_size(diameter_mm: f64) -> f64 {
    let diameter_pt = mm_to_pt(diameter_mm);
    PI * (diameter_pt / 2.0).powi(2)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn mm_point_conversions_are_inverse() {
        assert_relative_eq!(mm_to_pt(25.4), 72.0);
        assert_relative_eq!(pt_to_mm(mm_to_pt(0.2)), 0.2, epsilon = 1e-12);
        assert_relative_eq!(mm_to_inch(inch_to_mm(1.7)), 1.7, epsilon = 1e-12);
    }

    #[test]
    fn pixel_extent_follows_dpi() {
        assert_eq!(mm_extent_to_px(25.4, 100.0), 100);
        assert_eq!(mm_extent_to_px(25.4, 300.0), 300);
        assert_relative_eq!(px_to_mm(mm_to_px(12.5, 150.0), 150.0), 12.5, epsilon = 1e-12);
    }

    #[test]
    fn fraction_conversion_handles_degenerate_extent() {
        assert_eq!(mm_to_device_fraction(5.0, 0.0), 0.0);
        assert_relative_eq!(device_fraction_to_mm(mm_to_device_fraction(30.0, 120.0), 120.0), 30.0);
    }

    #[test]
    fn scatter_size_is_marker_area_in_points() {
        let s = mm_to_scatter_size(25.4);
        assert_relative_eq!(s, PI * 36.0 * 36.0, epsilon = 1e-9);
    }
}
