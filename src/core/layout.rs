use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::core::types::{DeviceRect, MmPoint, PanelId, Viewport};
use crate::core::units::mm_to_device_fraction;
use crate::error::{RecipeError, RecipeResult};

/// Tolerance used when comparing accumulated mm sums against the figure size.
const LAYOUT_EPSILON_MM: f64 = 1e-9;

/// Millimeter layout of a subplot grid.
///
/// These values are the only stored source of truth for placement; device
/// rectangles are always derived through [`solve_layout`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutParameters {
    pub axes_width_mm: f64,
    pub axes_height_mm: f64,
    #[serde(default = "default_margin_left_mm")]
    pub margin_left_mm: f64,
    #[serde(default = "default_margin_right_mm")]
    pub margin_right_mm: f64,
    #[serde(default = "default_margin_top_mm")]
    pub margin_top_mm: f64,
    #[serde(default = "default_margin_bottom_mm")]
    pub margin_bottom_mm: f64,
    #[serde(default = "default_space_w_mm")]
    pub space_w_mm: f64,
    #[serde(default = "default_space_h_mm")]
    pub space_h_mm: f64,
    /// Post-render crop: keep this much margin around detected content.
    #[serde(default)]
    pub crop_margin_mm: Option<f64>,
}

impl Default for LayoutParameters {
    fn default() -> Self {
        Self::new(40.0, 28.0)
    }
}

impl LayoutParameters {
    #[must_use]
    pub fn new(axes_width_mm: f64, axes_height_mm: f64) -> Self {
        Self {
            axes_width_mm,
            axes_height_mm,
            margin_left_mm: default_margin_left_mm(),
            margin_right_mm: default_margin_right_mm(),
            margin_top_mm: default_margin_top_mm(),
            margin_bottom_mm: default_margin_bottom_mm(),
            space_w_mm: default_space_w_mm(),
            space_h_mm: default_space_h_mm(),
            crop_margin_mm: None,
        }
    }

    /// Sets all four outer margins.
    #[must_use]
    pub fn with_margins(mut self, left: f64, right: f64, top: f64, bottom: f64) -> Self {
        self.margin_left_mm = left;
        self.margin_right_mm = right;
        self.margin_top_mm = top;
        self.margin_bottom_mm = bottom;
        self
    }

    /// Sets horizontal and vertical spacing between grid cells.
    #[must_use]
    pub fn with_spacing(mut self, space_w_mm: f64, space_h_mm: f64) -> Self {
        self.space_w_mm = space_w_mm;
        self.space_h_mm = space_h_mm;
        self
    }

    #[must_use]
    pub fn with_crop_margin_mm(mut self, crop_margin_mm: Option<f64>) -> Self {
        self.crop_margin_mm = crop_margin_mm;
        self
    }

    pub fn validate(&self) -> RecipeResult<()> {
        for (name, value) in [
            ("axes_width_mm", self.axes_width_mm),
            ("axes_height_mm", self.axes_height_mm),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(RecipeError::InvalidData(format!(
                    "layout `{name}` must be finite and > 0"
                )));
            }
        }
        for (name, value) in [
            ("margin_left_mm", self.margin_left_mm),
            ("margin_right_mm", self.margin_right_mm),
            ("margin_top_mm", self.margin_top_mm),
            ("margin_bottom_mm", self.margin_bottom_mm),
            ("space_w_mm", self.space_w_mm),
            ("space_h_mm", self.space_h_mm),
            ("crop_margin_mm", self.crop_margin_mm.unwrap_or(0.0)),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RecipeError::InvalidData(format!(
                    "layout `{name}` must be finite and >= 0"
                )));
            }
        }
        Ok(())
    }

    /// Exact figure size needed by a `nrows` x `ncols` grid.
    #[must_use]
    pub fn figure_size_mm(&self, nrows: u32, ncols: u32) -> (f64, f64) {
        let nrows = f64::from(nrows.max(1));
        let ncols = f64::from(ncols.max(1));
        let width = self.margin_left_mm
            + ncols * self.axes_width_mm
            + (ncols - 1.0) * self.space_w_mm
            + self.margin_right_mm;
        let height = self.margin_top_mm
            + nrows * self.axes_height_mm
            + (nrows - 1.0) * self.space_h_mm
            + self.margin_bottom_mm;
        (width, height)
    }

    fn cell_mm(&self, row: u32, col: u32) -> PanelGeometryMm {
        PanelGeometryMm {
            left_mm: self.margin_left_mm + f64::from(col) * (self.axes_width_mm + self.space_w_mm),
            top_mm: self.margin_top_mm + f64::from(row) * (self.axes_height_mm + self.space_h_mm),
            width_mm: self.axes_width_mm,
            height_mm: self.axes_height_mm,
        }
    }
}

fn default_margin_left_mm() -> f64 {
    20.0
}

fn default_margin_right_mm() -> f64 {
    5.0
}

fn default_margin_top_mm() -> f64 {
    10.0
}

fn default_margin_bottom_mm() -> f64 {
    15.0
}

fn default_space_w_mm() -> f64 {
    10.0
}

fn default_space_h_mm() -> f64 {
    15.0
}

/// Explicit mm placement of one panel, top-left origin.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelGeometryMm {
    pub left_mm: f64,
    pub top_mm: f64,
    pub width_mm: f64,
    pub height_mm: f64,
}

impl PanelGeometryMm {
    #[must_use]
    pub fn right_mm(self) -> f64 {
        self.left_mm + self.width_mm
    }

    #[must_use]
    pub fn bottom_mm(self) -> f64 {
        self.top_mm + self.height_mm
    }

    #[must_use]
    pub fn center(self) -> MmPoint {
        MmPoint::new(
            self.left_mm + self.width_mm / 2.0,
            self.top_mm + self.height_mm / 2.0,
        )
    }
}

/// Layout input for one panel.
#[derive(Debug, Clone, PartialEq)]
pub struct PanelPlacement {
    pub panel_id: PanelId,
    pub row: u32,
    pub col: u32,
    pub geometry: Option<PanelGeometryMm>,
}

/// Solved placement for every panel of a figure.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutSolution {
    figure_size_mm: (f64, f64),
    fractions: IndexMap<PanelId, DeviceRect>,
}

impl LayoutSolution {
    #[must_use]
    pub fn figure_size_mm(&self) -> (f64, f64) {
        self.figure_size_mm
    }

    /// Placement as fractions of the figure, independent of output pixels.
    #[must_use]
    pub fn fractions(&self) -> &IndexMap<PanelId, DeviceRect> {
        &self.fractions
    }

    #[must_use]
    pub fn fraction_rect(&self, panel_id: &PanelId) -> Option<DeviceRect> {
        self.fractions.get(panel_id).copied()
    }

    #[must_use]
    pub fn pixel_rect(&self, panel_id: &PanelId, viewport: Viewport) -> Option<DeviceRect> {
        self.fraction_rect(panel_id).map(|rect| rect.scaled(viewport))
    }

    #[must_use]
    pub fn mm_rect(&self, panel_id: &PanelId) -> Option<PanelGeometryMm> {
        let (width_mm, height_mm) = self.figure_size_mm;
        self.fraction_rect(panel_id).map(|rect| PanelGeometryMm {
            left_mm: rect.x * width_mm,
            top_mm: rect.y * height_mm,
            width_mm: rect.width * width_mm,
            height_mm: rect.height * height_mm,
        })
    }

    /// Converts a device-pixel displacement into millimeters.
    #[must_use]
    pub fn px_delta_to_mm(&self, dx_px: f64, dy_px: f64, viewport: Viewport) -> (f64, f64) {
        let (width_mm, height_mm) = self.figure_size_mm;
        (
            dx_px / f64::from(viewport.width.max(1)) * width_mm,
            dy_px / f64::from(viewport.height.max(1)) * height_mm,
        )
    }

    #[must_use]
    pub fn mm_delta_to_px(&self, dx_mm: f64, dy_mm: f64, viewport: Viewport) -> (f64, f64) {
        let (width_mm, height_mm) = self.figure_size_mm;
        (
            mm_to_device_fraction(dx_mm, width_mm) * f64::from(viewport.width),
            mm_to_device_fraction(dy_mm, height_mm) * f64::from(viewport.height),
        )
    }
}

/// Translates mm geometry into figure-fraction rectangles.
///
/// This is the single place where placement is computed; replay and hit
/// testing both consume its result. Declared geometry that does not fit the
/// figure fails with `LayoutOverflow` instead of being clipped.
pub fn solve_layout(
    panels: &[PanelPlacement],
    params: &LayoutParameters,
    figure_size_mm: (f64, f64),
) -> RecipeResult<LayoutSolution> {
    params.validate()?;
    let (fig_w, fig_h) = figure_size_mm;
    if !fig_w.is_finite() || !fig_h.is_finite() || fig_w <= 0.0 || fig_h <= 0.0 {
        return Err(RecipeError::InvalidData(
            "figure size must be finite and > 0".to_owned(),
        ));
    }

    let grid_panels = panels.iter().filter(|panel| panel.geometry.is_none());
    let ncols = grid_panels.clone().map(|panel| panel.col + 1).max().unwrap_or(0);
    let nrows = grid_panels.map(|panel| panel.row + 1).max().unwrap_or(0);
    if ncols > 0 {
        let (required_w, required_h) = params.figure_size_mm(nrows, ncols);
        check_fits("horizontal", required_w, fig_w)?;
        check_fits("vertical", required_h, fig_h)?;
    }

    let mut fractions = IndexMap::with_capacity(panels.len());
    for panel in panels {
        let geometry = match panel.geometry {
            Some(geometry) => {
                if geometry.left_mm < -LAYOUT_EPSILON_MM || geometry.top_mm < -LAYOUT_EPSILON_MM {
                    return Err(RecipeError::InvalidData(format!(
                        "panel `{}` geometry starts outside the figure",
                        panel.panel_id
                    )));
                }
                check_fits("horizontal", geometry.right_mm(), fig_w)?;
                check_fits("vertical", geometry.bottom_mm(), fig_h)?;
                geometry
            }
            None => params.cell_mm(panel.row, panel.col),
        };
        if fractions.contains_key(&panel.panel_id) {
            return Err(RecipeError::InvalidData(format!(
                "duplicate panel id `{}` in layout",
                panel.panel_id
            )));
        }
        fractions.insert(
            panel.panel_id.clone(),
            DeviceRect::new(
                mm_to_device_fraction(geometry.left_mm, fig_w),
                mm_to_device_fraction(geometry.top_mm, fig_h),
                mm_to_device_fraction(geometry.width_mm, fig_w),
                mm_to_device_fraction(geometry.height_mm, fig_h),
            ),
        );
    }

    Ok(LayoutSolution {
        figure_size_mm,
        fractions,
    })
}

fn check_fits(axis: &'static str, required_mm: f64, available_mm: f64) -> RecipeResult<()> {
    if required_mm > available_mm + LAYOUT_EPSILON_MM {
        return Err(RecipeError::LayoutOverflow {
            axis,
            required_mm,
            available_mm,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{LayoutParameters, PanelGeometryMm, PanelPlacement, solve_layout};
    use crate::core::types::PanelId;
    use crate::error::RecipeError;

    fn grid(rows: u32, cols: u32) -> Vec<PanelPlacement> {
        let mut out = Vec::new();
        for row in 0..rows {
            for col in 0..cols {
                out.push(PanelPlacement {
                    panel_id: PanelId::grid(row, col),
                    row,
                    col,
                    geometry: None,
                });
            }
        }
        out
    }

    #[test]
    fn exact_fit_grid_solves_without_overflow() {
        let params = LayoutParameters::new(40.0, 30.0)
            .with_margins(10.0, 10.0, 10.0, 10.0)
            .with_spacing(5.0, 5.0);
        let size = params.figure_size_mm(1, 2);
        assert_eq!(size, (105.0, 50.0));
        let solution = solve_layout(&grid(1, 2), &params, size).expect("solve");
        let right = solution.mm_rect(&PanelId::grid(0, 1)).expect("right panel");
        assert!((right.left_mm - 55.0).abs() <= 1e-9);
        assert!((right.right_mm() - 95.0).abs() <= 1e-9);
    }

    #[test]
    fn overflowing_grid_is_rejected_instead_of_clipped() {
        let params = LayoutParameters::new(40.0, 30.0);
        let err = solve_layout(&grid(1, 3), &params, (100.0, 100.0)).expect_err("overflow");
        assert!(matches!(err, RecipeError::LayoutOverflow { axis: "horizontal", .. }));
    }

    #[test]
    fn explicit_geometry_outside_figure_overflows() {
        let panels = vec![PanelPlacement {
            panel_id: PanelId::new("inset"),
            row: 0,
            col: 0,
            geometry: Some(PanelGeometryMm {
                left_mm: 50.0,
                top_mm: 10.0,
                width_mm: 60.0,
                height_mm: 20.0,
            }),
        }];
        let err = solve_layout(&panels, &LayoutParameters::default(), (100.0, 80.0))
            .expect_err("overflow");
        assert!(matches!(err, RecipeError::LayoutOverflow { .. }));
    }
}
