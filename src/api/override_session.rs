use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::api::hit_test::{HitMap, HitTarget, HitTester};
use crate::api::reproducer::{RenderedArtifact, Reproducer, style_layers};
use crate::core::{MmDelta, MmPoint};
use crate::error::{RecipeError, RecipeResult};
use crate::interaction::{DragModifiers, SnapCandidates, SnapConfig, apply_snap};
use crate::overrides::OverrideSet;
use crate::recipe::Recipe;
use crate::render::Renderer;
use crate::style::{ChangeSet, StyleDocument};

fn default_hit_tolerance_px() -> f64 {
    3.0
}

/// Tuning for one editing session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub snap: SnapConfig,
    /// Radius of the proximity fallback when a click misses every element.
    #[serde(default = "default_hit_tolerance_px")]
    pub hit_tolerance_px: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            snap: SnapConfig::default(),
            hit_tolerance_px: default_hit_tolerance_px(),
        }
    }
}

impl SessionConfig {
    #[must_use]
    pub fn with_snap(mut self, snap: SnapConfig) -> Self {
        self.snap = snap;
        self
    }

    #[must_use]
    pub fn with_hit_tolerance_px(mut self, hit_tolerance_px: f64) -> Self {
        self.hit_tolerance_px = hit_tolerance_px;
        self
    }

    pub fn validate(&self) -> RecipeResult<()> {
        self.snap.validate()?;
        if !self.hit_tolerance_px.is_finite() || self.hit_tolerance_px < 0.0 {
            return Err(RecipeError::InvalidData(
                "hit tolerance must be finite and >= 0".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Manual change to one element: leaf style keys plus a move.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementEdit {
    pub style: StyleDocument,
    pub position_delta: MmDelta,
}

impl ElementEdit {
    #[must_use]
    pub fn style(style: StyleDocument) -> Self {
        Self {
            style,
            position_delta: MmDelta::default(),
        }
    }

    #[must_use]
    pub fn moved(position_delta: MmDelta) -> Self {
        Self {
            style: StyleDocument::new(),
            position_delta,
        }
    }
}

/// Editing state for one recipe: the recipe itself is never mutated, every
/// manual edit lands in the session's [`OverrideSet`].
///
/// Each mutating call replays first and only swaps state in once the replay
/// succeeded, so a failed or cancelled commit leaves the session untouched.
#[derive(Debug)]
pub struct OverrideSession<R: Renderer> {
    recipe: Recipe,
    reproducer: Reproducer<R>,
    config: SessionConfig,
    overrides: OverrideSet,
    artifact: RenderedArtifact,
    hit_map: HitMap,
}

impl<R: Renderer> OverrideSession<R> {
    pub fn begin(recipe: Recipe, renderer: R, config: SessionConfig) -> RecipeResult<Self> {
        Self::begin_with(recipe, Reproducer::new(renderer), config)
    }

    /// Starts from a configured reproducer (mode, cancel flag).
    pub fn begin_with(
        recipe: Recipe,
        mut reproducer: Reproducer<R>,
        config: SessionConfig,
    ) -> RecipeResult<Self> {
        config.validate()?;
        let overrides = OverrideSet::new();
        let (artifact, hit_map) = replay(&mut reproducer, &recipe, &overrides)?;
        info!(
            panels = recipe.panels.len(),
            elements = hit_map.palette().len(),
            "override session started"
        );
        Ok(Self {
            recipe,
            reproducer,
            config,
            overrides,
            artifact,
            hit_map,
        })
    }

    #[must_use]
    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[must_use]
    pub fn overrides(&self) -> &OverrideSet {
        &self.overrides
    }

    /// Latest render, including every committed edit.
    #[must_use]
    pub fn artifact(&self) -> &RenderedArtifact {
        &self.artifact
    }

    #[must_use]
    pub fn hit_map(&self) -> &HitMap {
        &self.hit_map
    }

    /// Element under pixel `(x, y)` of the latest render.
    #[must_use]
    pub fn on_click(&self, x: f64, y: f64) -> Option<HitTarget> {
        let target = self.hit_map.pick(x, y, self.config.hit_tolerance_px);
        debug!(x, y, element = ?target.as_ref().map(ToString::to_string), "click resolved");
        target
    }

    /// Converts a pointer displacement into millimeters.
    pub fn on_drag(&self, target: &HitTarget, dx_px: f64, dy_px: f64) -> RecipeResult<MmDelta> {
        self.hit_map.bbox_of(target)?;
        let (dx, dy) = self
            .artifact
            .layout
            .px_delta_to_mm(dx_px, dy_px, self.artifact.viewport);
        Ok(MmDelta::new(dx, dy))
    }

    /// Top-left of the element's current bounds, in figure millimeters.
    pub fn anchor_mm(&self, target: &HitTarget) -> RecipeResult<MmPoint> {
        let bounds = self.hit_map.bbox_of(target)?.bounds().ok_or_else(|| {
            RecipeError::InvalidData(format!("element `{target}` has no geometry"))
        })?;
        let (width_mm, height_mm) = self.artifact.layout.figure_size_mm();
        let viewport = self.artifact.viewport;
        let x_px = bounds.x + f64::from(self.artifact.crop.x);
        let y_px = bounds.y + f64::from(self.artifact.crop.y);
        Ok(MmPoint::new(
            x_px / f64::from(viewport.width.max(1)) * width_mm,
            y_px / f64::from(viewport.height.max(1)) * height_mm,
        ))
    }

    /// Guides for dragging an element of `target`'s panel.
    #[must_use]
    pub fn snap_candidates(&self, target: &HitTarget) -> SnapCandidates {
        SnapCandidates::for_figure(
            &self.artifact.layout,
            Some(&target.panel_id),
            &self.config.snap,
        )
    }

    /// Snaps a proposed move of `target` onto the session's guides.
    pub fn apply_snap(
        &self,
        target: &HitTarget,
        proposed: MmDelta,
        modifiers: DragModifiers,
    ) -> RecipeResult<MmDelta> {
        let origin = self.anchor_mm(target)?;
        let candidates = self.snap_candidates(target);
        Ok(apply_snap(
            origin,
            proposed,
            &candidates,
            &self.config.snap,
            modifiers,
        ))
    }

    /// Records `edit` for `target` and replays.
    pub fn commit(&mut self, target: &HitTarget, edit: &ElementEdit) -> RecipeResult<&OverrideSet> {
        if self
            .recipe
            .find_call(&target.panel_id, &target.element_id)
            .is_none()
        {
            return Err(RecipeError::InvalidData(format!(
                "no element `{target}` in recipe"
            )));
        }
        let mut next = self.overrides.clone();
        next.apply_element(
            &target.panel_id,
            &target.element_id,
            &edit.style,
            edit.position_delta,
        );
        self.swap_in(next)?;
        debug!(
            element = %target,
            dx_mm = edit.position_delta.dx,
            dy_mm = edit.position_delta.dy,
            "committed element edit"
        );
        Ok(&self.overrides)
    }

    /// Records a figure-wide style edit and replays.
    pub fn commit_style(&mut self, changes: &StyleDocument) -> RecipeResult<&OverrideSet> {
        let mut next = self.overrides.clone();
        next.apply_style(changes);
        self.swap_in(next)?;
        Ok(&self.overrides)
    }

    /// Drops every manual edit and replays the recipe as recorded.
    pub fn restore(&mut self) -> RecipeResult<()> {
        self.swap_in(OverrideSet::new())?;
        info!("manual overrides restored");
        Ok(())
    }

    /// Manual changes relative to the recorded style.
    #[must_use]
    pub fn changes(&self) -> ChangeSet {
        style_layers(&self.recipe, Some(&self.overrides)).changes()
    }

    /// Writes the override sidecar; an empty set deletes it instead.
    pub fn save_overrides(&self, path: &Path) -> RecipeResult<()> {
        if self.overrides.is_empty() {
            OverrideSet::delete(path)?;
            return Ok(());
        }
        self.overrides.save(path)
    }

    /// Replaces the session's edits with the sidecar at `path`.
    pub fn load_overrides(&mut self, path: &Path) -> RecipeResult<()> {
        let loaded = OverrideSet::load(path)?;
        self.swap_in(loaded)
    }

    #[must_use]
    pub fn into_parts(self) -> (Recipe, OverrideSet) {
        (self.recipe, self.overrides)
    }

    fn swap_in(&mut self, overrides: OverrideSet) -> RecipeResult<()> {
        let (artifact, hit_map) = replay(&mut self.reproducer, &self.recipe, &overrides)?;
        self.overrides = overrides;
        self.artifact = artifact;
        self.hit_map = hit_map;
        Ok(())
    }
}

fn replay<R: Renderer>(
    reproducer: &mut Reproducer<R>,
    recipe: &Recipe,
    overrides: &OverrideSet,
) -> RecipeResult<(RenderedArtifact, HitMap)> {
    let artifact = reproducer.reproduce(recipe, Some(overrides))?;
    let hit_map = HitTester::build(
        &artifact.frame,
        reproducer.renderer_mut(),
        Some(artifact.crop),
    )?;
    Ok((artifact, hit_map))
}
