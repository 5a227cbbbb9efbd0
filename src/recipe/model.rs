use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

use crate::core::units::mm_extent_to_px;
use crate::core::{
    LayoutParameters, LayoutSolution, PanelGeometryMm, PanelId, PanelPlacement, Viewport,
    solve_layout,
};
use crate::error::{RecipeError, RecipeResult};
use crate::recipe::call::Call;
use crate::recipe::ops::CallCategory;
use crate::style::{StyleDocument, StylePreset};

/// Document format written by this crate.
pub const FORMAT_VERSION: &str = "1.0";

/// Physical figure description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FigureSpec {
    pub size_mm: (f64, f64),
    #[serde(default = "default_dpi")]
    pub dpi: f64,
    #[serde(default = "default_background")]
    pub background: String,
}

fn default_dpi() -> f64 {
    300.0
}

fn default_background() -> String {
    "#ffffff".to_owned()
}

impl FigureSpec {
    #[must_use]
    pub fn new(width_mm: f64, height_mm: f64) -> Self {
        Self {
            size_mm: (width_mm, height_mm),
            dpi: default_dpi(),
            background: default_background(),
        }
    }

    /// Figure sized to fit a `nrows` x `ncols` grid exactly.
    #[must_use]
    pub fn for_grid(layout: &LayoutParameters, nrows: u32, ncols: u32) -> Self {
        let (width_mm, height_mm) = layout.figure_size_mm(nrows, ncols);
        Self::new(width_mm, height_mm)
    }

    #[must_use]
    pub fn with_dpi(mut self, dpi: f64) -> Self {
        self.dpi = dpi;
        self
    }

    #[must_use]
    pub fn with_background(mut self, background: impl Into<String>) -> Self {
        self.background = background.into();
        self
    }

    pub fn validate(&self) -> RecipeResult<()> {
        let (width, height) = self.size_mm;
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(RecipeError::InvalidData(
                "figure size must be finite and > 0".to_owned(),
            ));
        }
        if !self.dpi.is_finite() || self.dpi <= 0.0 {
            return Err(RecipeError::InvalidData(
                "figure dpi must be finite and > 0".to_owned(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn viewport(&self) -> Viewport {
        self.viewport_at(self.dpi)
    }

    #[must_use]
    pub fn viewport_at(&self, dpi: f64) -> Viewport {
        Viewport::new(
            mm_extent_to_px(self.size_mm.0, dpi),
            mm_extent_to_px(self.size_mm.1, dpi),
        )
    }
}

/// Grid position and optional explicit mm geometry of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanelLayout {
    pub position: (u32, u32),
    #[serde(default)]
    pub geometry_mm: Option<PanelGeometryMm>,
}

/// One drawing surface. Its id is the key in [`Recipe::panels`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Panel {
    #[serde(flatten)]
    pub layout: PanelLayout,
    #[serde(default)]
    pub calls: Vec<Call>,
    #[serde(default)]
    pub decorations: Vec<Call>,
}

impl Panel {
    #[must_use]
    pub fn new(row: u32, col: u32) -> Self {
        Self {
            layout: PanelLayout {
                position: (row, col),
                geometry_mm: None,
            },
            calls: Vec::new(),
            decorations: Vec::new(),
        }
    }

    #[must_use]
    pub fn sequence(&self, category: CallCategory) -> &[Call] {
        match category {
            CallCategory::Data => &self.calls,
            CallCategory::Decoration => &self.decorations,
        }
    }

    pub(crate) fn sequence_mut(&mut self, category: CallCategory) -> &mut Vec<Call> {
        match category {
            CallCategory::Data => &mut self.calls,
            CallCategory::Decoration => &mut self.decorations,
        }
    }

    /// Decorations with shadowed entries removed: for a repeated id only the
    /// last recorded call survives, at its own position in the sequence.
    #[must_use]
    pub fn effective_decorations(&self) -> Vec<&Call> {
        self.decorations
            .iter()
            .enumerate()
            .filter(|(index, call)| {
                !self.decorations[index + 1..]
                    .iter()
                    .any(|later| later.id == call.id)
            })
            .map(|(_, call)| call)
            .collect()
    }

    pub fn all_calls(&self) -> impl Iterator<Item = &Call> {
        self.calls.iter().chain(self.decorations.iter())
    }
}

/// Reference to the style layers a recipe was recorded with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleRef {
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default)]
    pub programmatic: StyleDocument,
}

fn default_preset() -> String {
    StylePreset::Default.name().to_owned()
}

impl Default for StyleRef {
    fn default() -> Self {
        Self::preset(StylePreset::Default)
    }
}

impl StyleRef {
    #[must_use]
    pub fn preset(preset: StylePreset) -> Self {
        Self {
            preset: preset.name().to_owned(),
            programmatic: StyleDocument::new(),
        }
    }

    #[must_use]
    pub fn with_programmatic(mut self, programmatic: StyleDocument) -> Self {
        self.programmatic = programmatic;
        self
    }

    /// Base layer document; unknown preset names fall back to `default`.
    #[must_use]
    pub fn base_document(&self) -> StyleDocument {
        StylePreset::from_name(&self.preset)
            .unwrap_or_default()
            .document()
    }
}

/// Portable description of a composed figure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipe {
    pub format_version: String,
    pub created: DateTime<Utc>,
    pub renderer_fingerprint: String,
    pub figure: FigureSpec,
    pub layout: LayoutParameters,
    #[serde(deserialize_with = "deserialize_unique_panels")]
    pub panels: IndexMap<PanelId, Panel>,
    #[serde(default)]
    pub style_ref: StyleRef,
    /// Directory external data paths are relative to. Not serialized.
    #[serde(skip)]
    pub data_root: Option<PathBuf>,
}

impl Recipe {
    #[must_use]
    pub fn panel(&self, panel_id: &PanelId) -> Option<&Panel> {
        self.panels.get(panel_id)
    }

    #[must_use]
    pub fn data_root(&self) -> Option<&Path> {
        self.data_root.as_deref()
    }

    #[must_use]
    pub fn placements(&self) -> Vec<PanelPlacement> {
        self.panels
            .iter()
            .map(|(panel_id, panel)| PanelPlacement {
                panel_id: panel_id.clone(),
                row: panel.layout.position.0,
                col: panel.layout.position.1,
                geometry: panel.layout.geometry_mm,
            })
            .collect()
    }

    pub fn solve_layout(&self) -> RecipeResult<LayoutSolution> {
        self.figure.validate()?;
        solve_layout(&self.placements(), &self.layout, self.figure.size_mm)
    }

    pub fn call_count(&self) -> usize {
        self.panels
            .values()
            .map(|panel| panel.calls.len() + panel.decorations.len())
            .sum()
    }

    /// Finds a call by panel and element id. For shadowed decorations the
    /// surviving (last) call is returned.
    #[must_use]
    pub fn find_call(
        &self,
        panel_id: &PanelId,
        element_id: &crate::core::ElementId,
    ) -> Option<&Call> {
        let panel = self.panels.get(panel_id)?;
        panel
            .calls
            .iter()
            .rev()
            .chain(panel.decorations.iter().rev())
            .find(|call| &call.id == element_id)
    }

    pub fn to_json_pretty(&self) -> RecipeResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| RecipeError::InvalidData(format!("failed to serialize recipe: {err}")))
    }
}

/// Duplicate panel keys are structural corruption, not last-wins.
fn deserialize_unique_panels<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<IndexMap<PanelId, Panel>, D::Error> {
    struct UniquePanels;

    impl<'de> Visitor<'de> for UniquePanels {
        type Value = IndexMap<PanelId, Panel>;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a map of panel id to panel")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut panels = IndexMap::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((panel_id, panel)) = access.next_entry::<PanelId, Panel>()? {
                if panels.contains_key(&panel_id) {
                    return Err(serde::de::Error::custom(format!(
                        "duplicate panel id `{panel_id}`"
                    )));
                }
                panels.insert(panel_id, panel);
            }
            Ok(panels)
        }
    }

    deserializer.deserialize_map(UniquePanels)
}

#[cfg(test)]
mod tests {
    use super::{FigureSpec, Panel};
    use crate::core::{ElementId, Viewport};
    use crate::recipe::call::Call;
    use crate::recipe::ops::Operation;

    fn decoration(id: &str, seq: u64) -> Call {
        Call {
            id: ElementId::new(id),
            op: Operation::SetTitle,
            args: Vec::new(),
            kwargs: Default::default(),
            seq,
            z_order: None,
        }
    }

    #[test]
    fn later_decoration_shadows_earlier_one_with_same_id() {
        let mut panel = Panel::new(0, 0);
        panel.decorations.push(decoration("title", 0));
        panel.decorations.push(decoration("xlabel", 1));
        panel.decorations.push(decoration("title", 2));
        let seqs: Vec<u64> = panel.effective_decorations().iter().map(|call| call.seq).collect();
        assert_eq!(seqs, vec![1, 2]);
    }

    #[test]
    fn viewport_scales_with_dpi() {
        let figure = FigureSpec::new(25.4, 50.8).with_dpi(100.0);
        assert_eq!(figure.viewport(), Viewport::new(100, 200));
        assert_eq!(figure.viewport_at(50.0), Viewport::new(50, 100));
    }
}
