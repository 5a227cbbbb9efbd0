//! Manual edits kept beside a recipe, never merged into it.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::core::{ElementId, MmDelta, PanelId};
use crate::error::{RecipeError, RecipeResult};
use crate::persist::{remove_if_exists, write_atomic};
use crate::style::StyleDocument;

/// Style section holding per-element edits in the manual layer.
pub const ELEMENTS_SECTION: &str = "elements";

/// Key of one element inside [`ELEMENTS_SECTION`] and [`OverrideSet::elements`].
#[must_use]
pub fn element_key(panel_id: &PanelId, element_id: &ElementId) -> String {
    format!("{panel_id}/{element_id}")
}

/// Sidecar path for a recipe at `recipe_path`: `<stem>.overrides.json`.
#[must_use]
pub fn sidecar_path(recipe_path: &Path) -> PathBuf {
    let stem = recipe_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();
    recipe_path.with_file_name(format!("{stem}.overrides.json"))
}

/// Manual edits of one element.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ElementOverride {
    /// Changed element-level style leaves (`color`, `alpha`, `linewidth_mm`,
    /// `fontsize_pt`, `visible`).
    #[serde(default)]
    pub changed: StyleDocument,
    #[serde(default)]
    pub position_delta_mm: (f64, f64),
}

impl ElementOverride {
    #[must_use]
    pub fn position_delta(&self) -> MmDelta {
        MmDelta::new(self.position_delta_mm.0, self.position_delta_mm.1)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.position_delta().is_zero()
    }
}

/// The manual style layer plus per-element position deltas.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OverrideSet {
    #[serde(default)]
    pub modified: Option<DateTime<Utc>>,
    #[serde(default)]
    pub manual_style: StyleDocument,
    #[serde(default)]
    pub elements: IndexMap<String, ElementOverride>,
}

impl OverrideSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.manual_style.is_empty() && self.elements.values().all(ElementOverride::is_empty)
    }

    #[must_use]
    pub fn element(&self, panel_id: &PanelId, element_id: &ElementId) -> Option<&ElementOverride> {
        self.elements.get(&element_key(panel_id, element_id))
    }

    #[must_use]
    pub fn position_delta(&self, panel_id: &PanelId, element_id: &ElementId) -> MmDelta {
        self.element(panel_id, element_id)
            .map(ElementOverride::position_delta)
            .unwrap_or_default()
    }

    /// Records element changes; the position delta accumulates.
    pub fn apply_element(
        &mut self,
        panel_id: &PanelId,
        element_id: &ElementId,
        changes: &StyleDocument,
        delta: MmDelta,
    ) {
        let entry = self
            .elements
            .entry(element_key(panel_id, element_id))
            .or_default();
        entry.changed = entry.changed.merged_with(changes);
        let total = entry.position_delta().plus(delta);
        entry.position_delta_mm = (total.dx, total.dy);
        self.modified = Some(Utc::now());
    }

    pub fn apply_style(&mut self, changes: &StyleDocument) {
        self.manual_style = self.manual_style.merged_with(changes);
        self.modified = Some(Utc::now());
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// The manual layer as one style document: global edits plus element
    /// edits under `elements.<panel>/<element>`.
    #[must_use]
    pub fn manual_layer(&self) -> StyleDocument {
        let element_map: Map<String, Value> = self
            .elements
            .iter()
            .filter(|(_, element)| !element.changed.is_empty())
            .map(|(key, element)| (key.clone(), Value::Object(element.changed.as_map().clone())))
            .collect();
        if element_map.is_empty() {
            return self.manual_style.clone();
        }
        let mut section = Map::new();
        section.insert(ELEMENTS_SECTION.to_owned(), Value::Object(element_map));
        self.manual_style
            .merged_with(&StyleDocument::from_map(section))
    }

    pub fn to_json_pretty(&self) -> RecipeResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| RecipeError::InvalidData(format!("override set encode failed: {err}")))
    }

    pub fn save(&self, path: &Path) -> RecipeResult<()> {
        write_atomic(path, self.to_json_pretty()?.as_bytes())?;
        debug!(path = %path.display(), elements = self.elements.len(), "saved override sidecar");
        Ok(())
    }

    /// Reads a sidecar; a missing file yields an empty set.
    pub fn load(path: &Path) -> RecipeResult<Self> {
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(RecipeError::io(path, err)),
        };
        serde_json::from_str(&source).map_err(|err| {
            RecipeError::RecipeCorrupt(format!("override sidecar `{}`: {err}", path.display()))
        })
    }

    /// Restore is a pure deletion of the sidecar.
    pub fn delete(path: &Path) -> RecipeResult<bool> {
        remove_if_exists(path)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{OverrideSet, element_key, sidecar_path};
    use crate::core::{ElementId, MmDelta, PanelId};
    use crate::style::StyleDocument;

    fn color_change(value: &str) -> StyleDocument {
        StyleDocument::from_value(json!({ "color": value })).expect("object")
    }

    #[test]
    fn element_edits_land_under_elements_section() {
        let panel = PanelId::grid(0, 0);
        let element = ElementId::new("plot_000");
        let mut overrides = OverrideSet::new();
        overrides.apply_element(&panel, &element, &color_change("#ff0000"), MmDelta::default());

        let manual = overrides.manual_layer();
        let key = element_key(&panel, &element);
        assert_eq!(
            manual
                .get("elements")
                .and_then(|elements| elements.get(&key))
                .and_then(|element| element.get("color")),
            Some(&json!("#ff0000"))
        );
        assert!(overrides.modified.is_some());
    }

    #[test]
    fn position_deltas_accumulate() {
        let panel = PanelId::grid(0, 0);
        let element = ElementId::new("title");
        let mut overrides = OverrideSet::new();
        overrides.apply_element(&panel, &element, &StyleDocument::new(), MmDelta::new(2.0, 0.0));
        overrides.apply_element(&panel, &element, &StyleDocument::new(), MmDelta::new(3.0, -1.0));
        assert_eq!(overrides.position_delta(&panel, &element), MmDelta::new(5.0, -1.0));
    }

    #[test]
    fn sidecar_round_trips_and_deletes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = sidecar_path(&dir.path().join("figure.json"));
        assert!(path.ends_with("figure.overrides.json"));

        let mut overrides = OverrideSet::new();
        overrides.apply_element(
            &PanelId::grid(0, 0),
            &ElementId::new("plot_000"),
            &color_change("#00ff00"),
            MmDelta::new(1.0, 0.5),
        );
        overrides.save(&path).expect("save");
        let loaded = OverrideSet::load(&path).expect("load");
        assert_eq!(loaded, overrides);

        assert!(OverrideSet::delete(&path).expect("delete"));
        assert!(!OverrideSet::delete(&path).expect("second delete"));
        assert!(OverrideSet::load(&path).expect("missing is empty").is_empty());
    }
}
