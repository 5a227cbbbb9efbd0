use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::core::{LayoutSolution, MmDelta, MmPoint, PanelId};
use crate::error::{RecipeError, RecipeResult};

fn default_grid_mm() -> f64 {
    5.0
}

fn default_capture_mm() -> f64 {
    3.0
}

fn default_magnetic_mm() -> f64 {
    8.0
}

fn default_strength() -> f64 {
    0.7
}

/// Tuning for snapping dragged elements onto guides.
///
/// Inside `capture_mm` a position lands exactly on the guide. Between
/// `capture_mm` and `magnetic_mm` it is pulled part of the way with quadratic
/// easing scaled by `strength`. Beyond `magnetic_mm` it is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapConfig {
    /// Grid pitch; `0` disables grid lines.
    #[serde(default = "default_grid_mm")]
    pub grid_mm: f64,
    #[serde(default = "default_capture_mm")]
    pub capture_mm: f64,
    #[serde(default = "default_magnetic_mm")]
    pub magnetic_mm: f64,
    #[serde(default = "default_strength")]
    pub strength: f64,
}

impl Default for SnapConfig {
    fn default() -> Self {
        Self {
            grid_mm: default_grid_mm(),
            capture_mm: default_capture_mm(),
            magnetic_mm: default_magnetic_mm(),
            strength: default_strength(),
        }
    }
}

impl SnapConfig {
    #[must_use]
    pub fn with_grid_mm(mut self, grid_mm: f64) -> Self {
        self.grid_mm = grid_mm;
        self
    }

    #[must_use]
    pub fn with_capture_mm(mut self, capture_mm: f64) -> Self {
        self.capture_mm = capture_mm;
        self
    }

    #[must_use]
    pub fn with_magnetic_mm(mut self, magnetic_mm: f64) -> Self {
        self.magnetic_mm = magnetic_mm;
        self
    }

    #[must_use]
    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    pub fn validate(&self) -> RecipeResult<()> {
        for (name, value) in [
            ("grid_mm", self.grid_mm),
            ("capture_mm", self.capture_mm),
            ("magnetic_mm", self.magnetic_mm),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(RecipeError::InvalidData(format!(
                    "snap {name} must be finite and >= 0"
                )));
            }
        }
        if !self.strength.is_finite() || !(0.0..=1.0).contains(&self.strength) {
            return Err(RecipeError::InvalidData(
                "snap strength must be in [0, 1]".to_owned(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapKind {
    Grid,
    PanelEdge,
    PanelCenter,
    FigureEdge,
    FigureCenter,
}

/// A guide line at `position_mm` along one axis.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnapLine {
    pub position_mm: f64,
    pub kind: SnapKind,
}

impl SnapLine {
    #[must_use]
    pub const fn new(position_mm: f64, kind: SnapKind) -> Self {
        Self { position_mm, kind }
    }
}

/// Guides available to one drag.
///
/// `vertical` lines constrain x, `horizontal` lines constrain y. Grid lines
/// are implicit: the nearest multiple of the grid pitch is always a
/// candidate.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SnapCandidates {
    pub grid_mm: Option<f64>,
    pub vertical: Vec<SnapLine>,
    pub horizontal: Vec<SnapLine>,
}

impl SnapCandidates {
    /// Grid only.
    #[must_use]
    pub fn grid(grid_mm: f64) -> Self {
        Self {
            grid_mm: (grid_mm.is_finite() && grid_mm > 0.0).then_some(grid_mm),
            ..Self::default()
        }
    }

    /// Grid, figure edges and center, and the edges and centers of every
    /// panel other than `dragged_panel`.
    #[must_use]
    pub fn for_figure(
        layout: &LayoutSolution,
        dragged_panel: Option<&PanelId>,
        config: &SnapConfig,
    ) -> Self {
        let (width_mm, height_mm) = layout.figure_size_mm();
        let mut candidates = Self::grid(config.grid_mm);
        candidates.vertical.extend([
            SnapLine::new(0.0, SnapKind::FigureEdge),
            SnapLine::new(width_mm / 2.0, SnapKind::FigureCenter),
            SnapLine::new(width_mm, SnapKind::FigureEdge),
        ]);
        candidates.horizontal.extend([
            SnapLine::new(0.0, SnapKind::FigureEdge),
            SnapLine::new(height_mm / 2.0, SnapKind::FigureCenter),
            SnapLine::new(height_mm, SnapKind::FigureEdge),
        ]);
        for panel_id in layout.fractions().keys() {
            if Some(panel_id) == dragged_panel {
                continue;
            }
            let Some(rect) = layout.mm_rect(panel_id) else {
                continue;
            };
            let center = rect.center();
            candidates.vertical.extend([
                SnapLine::new(rect.left_mm, SnapKind::PanelEdge),
                SnapLine::new(center.x, SnapKind::PanelCenter),
                SnapLine::new(rect.right_mm(), SnapKind::PanelEdge),
            ]);
            candidates.horizontal.extend([
                SnapLine::new(rect.top_mm, SnapKind::PanelEdge),
                SnapLine::new(center.y, SnapKind::PanelCenter),
                SnapLine::new(rect.bottom_mm(), SnapKind::PanelEdge),
            ]);
        }
        candidates
    }

    fn nearest(&self, lines: &[SnapLine], position_mm: f64) -> Option<(f64, f64)> {
        let mut options: SmallVec<[(OrderedFloat<f64>, f64); 8]> = SmallVec::new();
        if let Some(pitch) = self.grid_mm {
            let line = (position_mm / pitch).round() * pitch;
            options.push((OrderedFloat((line - position_mm).abs()), line));
        }
        options.extend(lines.iter().map(|line| {
            let distance = (line.position_mm - position_mm).abs();
            (OrderedFloat(distance), line.position_mm)
        }));
        options
            .into_iter()
            .min_by_key(|(distance, _)| *distance)
            .map(|(distance, line)| (distance.0, line))
    }
}

/// Keyboard state during a drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DragModifiers {
    /// Place the element exactly where the pointer says.
    pub bypass_snap: bool,
}

impl DragModifiers {
    #[must_use]
    pub const fn bypass() -> Self {
        Self { bypass_snap: true }
    }
}

/// Snaps one coordinate towards the nearest guide.
#[must_use]
pub fn snap_axis(position_mm: f64, nearest: Option<(f64, f64)>, config: &SnapConfig) -> f64 {
    let Some((distance, line)) = nearest else {
        return position_mm;
    };
    if distance <= config.capture_mm {
        return line;
    }
    if distance >= config.magnetic_mm || config.magnetic_mm <= config.capture_mm {
        return position_mm;
    }
    let progress = 1.0 - (distance - config.capture_mm) / (config.magnetic_mm - config.capture_mm);
    let eased = progress * progress * config.strength;
    position_mm + (line - position_mm) * eased
}

/// Adjusts a proposed displacement of the element anchored at `origin` so
/// the anchor lands on or near a guide. Each axis snaps independently.
#[must_use]
pub fn apply_snap(
    origin: MmPoint,
    proposed: MmDelta,
    candidates: &SnapCandidates,
    config: &SnapConfig,
    modifiers: DragModifiers,
) -> MmDelta {
    if modifiers.bypass_snap {
        return proposed;
    }
    let target = origin.offset(proposed);
    let x = snap_axis(target.x, candidates.nearest(&candidates.vertical, target.x), config);
    let y = snap_axis(target.y, candidates.nearest(&candidates.horizontal, target.y), config);
    MmDelta::new(x - origin.x, y - origin.y)
}
