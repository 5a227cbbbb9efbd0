use serde::{Deserialize, Serialize};

use crate::core::scale::LinearScale;
use crate::core::types::{DevicePoint, DeviceRect};
use crate::error::RecipeResult;

/// Relative padding applied when limits are derived from data.
pub const AUTOSCALE_PAD_FRACTION: f64 = 0.05;

/// Visible data window of one panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataLimits {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

impl Default for DataLimits {
    fn default() -> Self {
        Self {
            x: (0.0, 1.0),
            y: (0.0, 1.0),
        }
    }
}

/// Running min/max of everything a panel draws in data space.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DataExtent {
    x: Option<(f64, f64)>,
    y: Option<(f64, f64)>,
}

impl DataExtent {
    pub fn include_x(&mut self, value: f64) {
        self.x = widen(self.x, value);
    }

    pub fn include_y(&mut self, value: f64) {
        self.y = widen(self.y, value);
    }

    pub fn include(&mut self, x: f64, y: f64) {
        self.include_x(x);
        self.include_y(y);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x.is_none() && self.y.is_none()
    }

    /// Padded limits; explicit limits replace the derived ones axis by axis.
    #[must_use]
    pub fn to_limits(
        self,
        explicit_x: Option<(f64, f64)>,
        explicit_y: Option<(f64, f64)>,
    ) -> DataLimits {
        let defaults = DataLimits::default();
        DataLimits {
            x: explicit_x.unwrap_or_else(|| self.x.map(pad_range).unwrap_or(defaults.x)),
            y: explicit_y.unwrap_or_else(|| self.y.map(pad_range).unwrap_or(defaults.y)),
        }
    }
}

fn widen(range: Option<(f64, f64)>, value: f64) -> Option<(f64, f64)> {
    if !value.is_finite() {
        return range;
    }
    Some(match range {
        Some((lo, hi)) => (lo.min(value), hi.max(value)),
        None => (value, value),
    })
}

fn pad_range((lo, hi): (f64, f64)) -> (f64, f64) {
    if lo == hi {
        let pad = if lo == 0.0 { 0.5 } else { lo.abs() * 0.1 };
        return (lo - pad, hi + pad);
    }
    let pad = (hi - lo) * AUTOSCALE_PAD_FRACTION;
    (lo - pad, hi + pad)
}

/// Data → device pipeline for one panel.
///
/// Device y grows downward while data y grows upward, so the vertical scale
/// maps onto an inverted pixel span.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataTransform {
    x_scale: LinearScale,
    y_scale: LinearScale,
    rect: DeviceRect,
}

impl DataTransform {
    pub fn new(limits: DataLimits, rect: DeviceRect) -> RecipeResult<Self> {
        Ok(Self {
            x_scale: LinearScale::new(limits.x.0, limits.x.1)?,
            y_scale: LinearScale::new(limits.y.0, limits.y.1)?,
            rect,
        })
    }

    #[must_use]
    pub fn rect(&self) -> DeviceRect {
        self.rect
    }

    #[must_use]
    pub fn limits(&self) -> DataLimits {
        DataLimits {
            x: self.x_scale.domain(),
            y: self.y_scale.domain(),
        }
    }

    pub fn x_to_device(&self, x: f64) -> RecipeResult<f64> {
        self.x_scale.domain_to_pixel(x, self.rect.x, self.rect.width)
    }

    pub fn y_to_device(&self, y: f64) -> RecipeResult<f64> {
        self.y_scale
            .domain_to_pixel(y, self.rect.bottom(), -self.rect.height)
    }

    pub fn data_to_device(&self, x: f64, y: f64) -> RecipeResult<DevicePoint> {
        Ok(DevicePoint::new(self.x_to_device(x)?, self.y_to_device(y)?))
    }

    pub fn device_to_data(&self, point: DevicePoint) -> RecipeResult<(f64, f64)> {
        Ok((
            self.x_scale
                .pixel_to_domain(point.x, self.rect.x, self.rect.width)?,
            self.y_scale
                .pixel_to_domain(point.y, self.rect.bottom(), -self.rect.height)?,
        ))
    }
}

/// Evenly spaced "nice" tick values (1/2/5 x 10^k) inside `range`.
#[must_use]
pub fn nice_ticks(range: (f64, f64), target_count: usize) -> Vec<f64> {
    let (lo, hi) = (range.0.min(range.1), range.0.max(range.1));
    if !lo.is_finite() || !hi.is_finite() || lo == hi || target_count == 0 {
        return Vec::new();
    }

    let raw_step = (hi - lo) / target_count as f64;
    let magnitude = 10f64.powf(raw_step.log10().floor());
    let residual = raw_step / magnitude;
    let step = if residual <= 1.0 {
        magnitude
    } else if residual <= 2.0 {
        2.0 * magnitude
    } else if residual <= 5.0 {
        5.0 * magnitude
    } else {
        10.0 * magnitude
    };

    let decimals = (-step.log10().floor()).max(0.0) as i32;
    let unit = 10f64.powi(decimals);
    let mut ticks = Vec::new();
    let mut index = (lo / step).ceil();
    loop {
        let value = index * step;
        if value > hi + step * 1e-9 {
            break;
        }
        // Snap float noise such as 0.6000000000000001.
        ticks.push((value * unit).round() / unit);
        index += 1.0;
    }
    ticks
}
