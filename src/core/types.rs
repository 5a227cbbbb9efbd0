use std::fmt;

use serde::{Deserialize, Serialize};

/// Output raster size in device pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn is_valid(self) -> bool {
        self.width > 0 && self.height > 0
    }
}

/// Stable key of one drawing surface, e.g. `ax_0_1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PanelId(String);

impl PanelId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Conventional key for a panel at a subplot grid position.
    #[must_use]
    pub fn grid(row: u32, col: u32) -> Self {
        Self(format!("ax_{row}_{col}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PanelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable id of one recorded element (call) within its panel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ElementId(String);

impl ElementId {
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ElementId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DevicePoint {
    pub x: f64,
    pub y: f64,
}

impl DevicePoint {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned rectangle. Depending on context the unit is device pixels or
/// fractions of the figure extent; the origin is always top-left.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl DeviceRect {
    #[must_use]
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[must_use]
    pub fn from_corners(a: DevicePoint, b: DevicePoint) -> Self {
        let x0 = a.x.min(b.x);
        let y0 = a.y.min(b.y);
        Self::new(x0, y0, (a.x - b.x).abs(), (a.y - b.y).abs())
    }

    #[must_use]
    pub fn right(self) -> f64 {
        self.x + self.width
    }

    #[must_use]
    pub fn bottom(self) -> f64 {
        self.y + self.height
    }

    #[must_use]
    pub fn center(self) -> DevicePoint {
        DevicePoint::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[must_use]
    pub fn contains(self, point: DevicePoint) -> bool {
        point.x >= self.x
            && point.x <= self.right()
            && point.y >= self.y
            && point.y <= self.bottom()
    }

    #[must_use]
    pub fn union(self, other: Self) -> Self {
        let x0 = self.x.min(other.x);
        let y0 = self.y.min(other.y);
        let x1 = self.right().max(other.right());
        let y1 = self.bottom().max(other.bottom());
        Self::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Scales a fraction-space rectangle into device pixels.
    #[must_use]
    pub fn scaled(self, viewport: Viewport) -> Self {
        let w = f64::from(viewport.width);
        let h = f64::from(viewport.height);
        Self::new(self.x * w, self.y * h, self.width * w, self.height * h)
    }

    #[must_use]
    pub fn translated(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Distance from a point to the rectangle; zero when inside.
    #[must_use]
    pub fn distance_to(self, point: DevicePoint) -> f64 {
        let dx = (self.x - point.x).max(0.0).max(point.x - self.right());
        let dy = (self.y - point.y).max(0.0).max(point.y - self.bottom());
        dx.hypot(dy)
    }
}

/// A displacement in millimeters, the authoritative unit for manual moves.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MmDelta {
    pub dx: f64,
    pub dy: f64,
}

impl MmDelta {
    #[must_use]
    pub const fn new(dx: f64, dy: f64) -> Self {
        Self { dx, dy }
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        self.dx == 0.0 && self.dy == 0.0
    }

    #[must_use]
    pub fn plus(self, other: Self) -> Self {
        Self::new(self.dx + other.dx, self.dy + other.dy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MmPoint {
    pub x: f64,
    pub y: f64,
}

impl MmPoint {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn offset(self, delta: MmDelta) -> Self {
        Self::new(self.x + delta.dx, self.y + delta.dy)
    }
}

#[cfg(test)]
mod tests {
    use super::{DevicePoint, DeviceRect, PanelId, Viewport};

    #[test]
    fn panel_grid_key_uses_row_col_convention() {
        assert_eq!(PanelId::grid(1, 2).as_str(), "ax_1_2");
    }

    #[test]
    fn rect_distance_is_zero_inside_and_euclidean_outside() {
        let rect = DeviceRect::new(10.0, 10.0, 20.0, 10.0);
        assert_eq!(rect.distance_to(DevicePoint::new(15.0, 15.0)), 0.0);
        assert!((rect.distance_to(DevicePoint::new(33.0, 24.0)) - 5.0).abs() <= 1e-12);
    }

    #[test]
    fn fraction_rect_scales_to_viewport() {
        let rect = DeviceRect::new(0.25, 0.5, 0.5, 0.25).scaled(Viewport::new(400, 200));
        assert_eq!(rect, DeviceRect::new(100.0, 100.0, 200.0, 50.0));
    }
}
