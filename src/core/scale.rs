use serde::{Deserialize, Serialize};

use crate::error::{RecipeError, RecipeResult};

/// Linear mapping between a data domain and a pixel span.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearScale {
    domain_start: f64,
    domain_end: f64,
}

impl LinearScale {
    pub fn new(domain_start: f64, domain_end: f64) -> RecipeResult<Self> {
        if !domain_start.is_finite() || !domain_end.is_finite() || domain_start == domain_end {
            return Err(RecipeError::InvalidData(
                "scale domain must be finite and non-zero".to_owned(),
            ));
        }

        Ok(Self {
            domain_start,
            domain_end,
        })
    }

    #[must_use]
    pub fn domain(self) -> (f64, f64) {
        (self.domain_start, self.domain_end)
    }

    /// Maps `value` into `[pixel_start, pixel_start + pixel_span]`.
    pub fn domain_to_pixel(
        self,
        value: f64,
        pixel_start: f64,
        pixel_span: f64,
    ) -> RecipeResult<f64> {
        if !value.is_finite() {
            return Err(RecipeError::InvalidData("value must be finite".to_owned()));
        }

        let span = self.domain_end - self.domain_start;
        let normalized = (value - self.domain_start) / span;
        Ok(pixel_start + normalized * pixel_span)
    }

    pub fn pixel_to_domain(
        self,
        pixel: f64,
        pixel_start: f64,
        pixel_span: f64,
    ) -> RecipeResult<f64> {
        if !pixel.is_finite() {
            return Err(RecipeError::InvalidData("pixel must be finite".to_owned()));
        }
        if pixel_span == 0.0 {
            return Err(RecipeError::InvalidData(
                "pixel span must be non-zero".to_owned(),
            ));
        }

        let span = self.domain_end - self.domain_start;
        let normalized = (pixel - pixel_start) / pixel_span;
        Ok(self.domain_start + normalized * span)
    }
}

#[cfg(test)]
mod tests {
    use super::LinearScale;

    #[test]
    fn degenerate_domain_is_rejected() {
        assert!(LinearScale::new(1.0, 1.0).is_err());
        assert!(LinearScale::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn inverted_pixel_span_flips_axis() {
        let scale = LinearScale::new(0.0, 10.0).expect("scale");
        let px = scale.domain_to_pixel(2.5, 100.0, -100.0).expect("to pixel");
        assert!((px - 75.0).abs() <= 1e-12);
        let back = scale.pixel_to_domain(px, 100.0, -100.0).expect("to domain");
        assert!((back - 2.5).abs() <= 1e-12);
    }
}
