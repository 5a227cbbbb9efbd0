use image::RgbaImage;
use tracing::{debug, warn};

use crate::api::crop::CropBox;
use crate::api::scene_builder::{
    CancelFlag, ReplayMode, SceneRequest, SkippedCall, build_scene,
};
use crate::api::validation::{ValidationPolicy, ValidationReport, validate};
use crate::core::{LayoutSolution, Viewport};
use crate::error::RecipeResult;
use crate::overrides::OverrideSet;
use crate::recipe::Recipe;
use crate::render::{RenderFrame, Renderer};
use crate::style::{StyleDocument, StyleLayers};

/// Output of one replay.
#[derive(Debug)]
pub struct RenderedArtifact {
    /// Final raster, cropped when the layout asks for a crop margin.
    pub image: RgbaImage,
    /// Scene before cropping, in full-figure device coordinates.
    pub frame: RenderFrame,
    pub layout: LayoutSolution,
    pub viewport: Viewport,
    /// Window of the full render kept in `image`.
    pub crop: CropBox,
    pub style: StyleDocument,
    pub skipped: Vec<SkippedCall>,
    pub fingerprint_mismatch: bool,
    pub renderer_fingerprint: String,
}

/// Style layers of a recipe plus an optional override set.
#[must_use]
pub fn style_layers(recipe: &Recipe, overrides: Option<&OverrideSet>) -> StyleLayers {
    let manual = overrides.map(OverrideSet::manual_layer).unwrap_or_default();
    StyleLayers::new(
        recipe.style_ref.base_document(),
        recipe.style_ref.programmatic.clone(),
    )
    .with_manual(manual)
}

/// Replays recipes through a renderer.
#[derive(Debug)]
pub struct Reproducer<R: Renderer> {
    renderer: R,
    mode: ReplayMode,
    cancel: CancelFlag,
}

impl<R: Renderer> Reproducer<R> {
    #[must_use]
    pub fn new(renderer: R) -> Self {
        Self {
            renderer,
            mode: ReplayMode::default(),
            cancel: CancelFlag::new(),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ReplayMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    #[must_use]
    pub fn mode(&self) -> ReplayMode {
        self.mode
    }

    #[must_use]
    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    #[must_use]
    pub fn into_renderer(self) -> R {
        self.renderer
    }

    /// Resolves style, solves layout, builds and renders the scene, then
    /// applies the crop margin. Nothing outside the returned artifact is
    /// touched, so a cancelled replay leaves no trace.
    pub fn reproduce(
        &mut self,
        recipe: &Recipe,
        overrides: Option<&OverrideSet>,
    ) -> RecipeResult<RenderedArtifact> {
        self.cancel.check()?;
        let style = style_layers(recipe, overrides).effective();
        let layout = recipe.solve_layout()?;
        let empty = OverrideSet::default();
        let request = SceneRequest {
            recipe,
            style: &style,
            overrides: overrides.unwrap_or(&empty),
            layout: &layout,
            mode: self.mode,
            cancel: &self.cancel,
        };
        let scene = build_scene(&request, &self.renderer)?;
        self.cancel.check()?;

        let full = self.renderer.render(&scene.frame)?;
        self.cancel.check()?;
        let crop = match recipe.layout.crop_margin_mm {
            Some(margin_mm) => CropBox::detect(&full, margin_mm, recipe.figure.dpi),
            None => CropBox::full(full.width(), full.height()),
        };
        let image = if crop.is_full(full.width(), full.height()) {
            full
        } else {
            crop.apply(&full)
        };

        let renderer_fingerprint = self.renderer.fingerprint();
        let fingerprint_mismatch = renderer_fingerprint != recipe.renderer_fingerprint;
        if fingerprint_mismatch {
            warn!(
                recorded = %recipe.renderer_fingerprint,
                current = %renderer_fingerprint,
                "renderer fingerprint differs from recording; pixels may not match"
            );
        }
        debug!(
            panels = recipe.panels.len(),
            calls = recipe.call_count(),
            skipped = scene.skipped.len(),
            width = image.width(),
            height = image.height(),
            "reproduced recipe"
        );
        Ok(RenderedArtifact {
            image,
            viewport: scene.frame.viewport,
            frame: scene.frame,
            layout,
            crop,
            style,
            skipped: scene.skipped,
            fingerprint_mismatch,
            renderer_fingerprint,
        })
    }

    /// Reproduces and compares against `original`, applying `policy` when the
    /// MSE exceeds `mse_threshold`.
    pub fn reproduce_and_validate(
        &mut self,
        recipe: &Recipe,
        overrides: Option<&OverrideSet>,
        original: &RgbaImage,
        policy: ValidationPolicy,
        mse_threshold: f64,
    ) -> RecipeResult<(RenderedArtifact, ValidationReport)> {
        let artifact = self.reproduce(recipe, overrides)?;
        let report = validate(original, &artifact.image);
        policy.apply(&report, mse_threshold)?;
        Ok((artifact, report))
    }
}
