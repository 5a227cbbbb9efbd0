use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{RecipeError, RecipeResult};

/// Mean squared error tolerated before a reproduction counts as mismatched.
pub const DEFAULT_MSE_THRESHOLD: f64 = 100.0;

/// Pixel comparison of an original render against its reproduction.
///
/// Metrics are computed over RGB channels. Images of different size are not
/// compared: `mse` and `psnr` are NaN and `similarity` is zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub mse: f64,
    pub dimension_match: bool,
    pub similarity: f64,
    /// Infinite for identical images.
    pub psnr: f64,
    pub max_diff: u8,
}

impl ValidationReport {
    #[must_use]
    pub fn is_identical(&self) -> bool {
        self.dimension_match && self.mse == 0.0
    }

    #[must_use]
    pub fn is_valid(&self, mse_threshold: f64) -> bool {
        self.dimension_match && self.mse <= mse_threshold
    }
}

#[must_use]
pub fn validate(original: &RgbaImage, reproduced: &RgbaImage) -> ValidationReport {
    if original.dimensions() != reproduced.dimensions() {
        return ValidationReport {
            mse: f64::NAN,
            dimension_match: false,
            similarity: 0.0,
            psnr: f64::NAN,
            max_diff: u8::MAX,
        };
    }

    let mut sum = 0.0_f64;
    let mut count = 0_u64;
    let mut max_diff = 0_u8;
    for (a, b) in original.pixels().zip(reproduced.pixels()) {
        for channel in 0..3 {
            let diff = a[channel].abs_diff(b[channel]);
            max_diff = max_diff.max(diff);
            sum += f64::from(diff) * f64::from(diff);
            count += 1;
        }
    }
    let mse = if count == 0 { 0.0 } else { sum / count as f64 };
    let psnr = if mse == 0.0 {
        f64::INFINITY
    } else {
        10.0 * (255.0_f64 * 255.0 / mse).log10()
    };
    let report = ValidationReport {
        mse,
        dimension_match: true,
        similarity: 1.0 - mse / (255.0 * 255.0),
        psnr,
        max_diff,
    };
    debug!(
        mse = report.mse,
        psnr = report.psnr,
        max_diff = report.max_diff,
        "validated reproduction"
    );
    report
}

/// What to do when a reproduction exceeds the MSE threshold.
///
/// A mismatch can be the intended result of a style edit, so failing is
/// opt-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationPolicy {
    Raise,
    #[default]
    Warn,
    Silent,
}

impl ValidationPolicy {
    pub fn apply(self, report: &ValidationReport, mse_threshold: f64) -> RecipeResult<()> {
        if report.is_valid(mse_threshold) {
            return Ok(());
        }
        match self {
            Self::Raise => Err(RecipeError::ValidationMismatch {
                mse: report.mse,
                dimension_match: report.dimension_match,
            }),
            Self::Warn => {
                warn!(
                    mse = report.mse,
                    dimension_match = report.dimension_match,
                    threshold = mse_threshold,
                    "reproduction differs from original"
                );
                Ok(())
            }
            Self::Silent => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use image::{Rgba, RgbaImage};

    use super::{DEFAULT_MSE_THRESHOLD, ValidationPolicy, validate};
    use crate::error::RecipeError;

    #[test]
    fn identical_images_have_zero_error() {
        let image = RgbaImage::from_pixel(4, 4, Rgba([10, 20, 30, 255]));
        let report = validate(&image, &image.clone());
        assert!(report.is_identical());
        assert!(report.psnr.is_infinite());
        assert_relative_eq!(report.similarity, 1.0);
    }

    #[test]
    fn single_channel_difference_is_averaged() {
        let a = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 255]));
        let mut b = a.clone();
        b.put_pixel(0, 0, Rgba([60, 0, 0, 255]));
        let report = validate(&a, &b);
        // 60^2 over 2 pixels x 3 channels.
        assert_relative_eq!(report.mse, 600.0);
        assert_eq!(report.max_diff, 60);
    }

    #[test]
    fn size_mismatch_is_never_valid() {
        let a = RgbaImage::new(2, 2);
        let b = RgbaImage::new(3, 2);
        let report = validate(&a, &b);
        assert!(!report.dimension_match);
        assert!(report.mse.is_nan());
        assert!(matches!(
            ValidationPolicy::Raise.apply(&report, DEFAULT_MSE_THRESHOLD),
            Err(RecipeError::ValidationMismatch {
                dimension_match: false,
                ..
            })
        ));
        assert!(ValidationPolicy::Silent.apply(&report, DEFAULT_MSE_THRESHOLD).is_ok());
    }
}
