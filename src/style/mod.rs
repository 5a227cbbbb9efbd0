//! Layered style resolution.
//!
//! A figure's effective style is composed from three explicit layers:
//! the preset named by the recipe (base), the programmatic layer recorded
//! with the recipe, and the manual layer written by an editing session.
//! Nothing here is global; every function works on values passed in.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::error::{RecipeError, RecipeResult};

/// Nested key/value style tree, addressed with dotted paths such as
/// `lines.trace_mm`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StyleDocument(Map<String, Value>);

impl StyleDocument {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> RecipeResult<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(RecipeError::InvalidData(format!(
                "style document must be an object, got {other}"
            ))),
        }
    }

    #[must_use]
    pub fn from_map(map: Map<String, Value>) -> Self {
        Self(map)
    }

    pub fn from_json_str(source: &str) -> RecipeResult<Self> {
        let value = serde_json::from_str(source)
            .map_err(|err| RecipeError::InvalidData(format!("style document: {err}")))?;
        Self::from_value(value)
    }

    pub fn from_json_file(path: &Path) -> RecipeResult<Self> {
        let source = fs::read_to_string(path).map_err(|err| RecipeError::io(path, err))?;
        Self::from_json_str(&source)
    }

    #[must_use]
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Value> {
        let segments: Vec<&str> = path.split('.').collect();
        self.get_segments(&segments)
    }

    /// Lookup by explicit key segments; keys may themselves contain `.`.
    #[must_use]
    pub fn get_segments<S: AsRef<str>>(&self, segments: &[S]) -> Option<&Value> {
        let (first, rest) = segments.split_first()?;
        let mut current = self.0.get(first.as_ref())?;
        for segment in rest {
            current = current.as_object()?.get(segment.as_ref())?;
        }
        Some(current)
    }

    #[must_use]
    pub fn get_f64(&self, path: &str) -> Option<f64> {
        self.get(path).and_then(Value::as_f64)
    }

    #[must_use]
    pub fn get_str(&self, path: &str) -> Option<&str> {
        self.get(path).and_then(Value::as_str)
    }

    #[must_use]
    pub fn get_bool(&self, path: &str) -> Option<bool> {
        self.get(path).and_then(Value::as_bool)
    }

    /// Sets a leaf, creating intermediate objects. A non-object value on the
    /// way is replaced by an object.
    pub fn set_path(&mut self, path: &str, value: Value) -> RecipeResult<()> {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(RecipeError::InvalidData(format!(
                "style path `{path}` has an empty segment"
            )));
        }
        let (leaf, parents) = segments
            .split_last()
            .ok_or_else(|| RecipeError::InvalidData("empty style path".to_owned()))?;
        let mut current = &mut self.0;
        for segment in parents {
            let entry = current
                .entry((*segment).to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(map) = entry else {
                return Err(RecipeError::InvalidData(format!(
                    "style path `{path}` crosses a non-object value"
                )));
            };
            current = map;
        }
        current.insert((*leaf).to_owned(), value);
        Ok(())
    }

    /// Deep, right-biased merge: `other` wins on leaves, objects recurse and
    /// keys absent from `other` are inherited.
    #[must_use]
    pub fn merged_with(&self, other: &Self) -> Self {
        let mut out = self.0.clone();
        merge_into(&mut out, &other.0);
        Self(out)
    }

    /// Every leaf as `(dotted path, value)`, in document order.
    #[must_use]
    pub fn leaves(&self) -> Vec<(String, &Value)> {
        self.leaf_segments()
            .into_iter()
            .map(|(segments, value)| (segments.join("."), value))
            .collect()
    }

    fn leaf_segments(&self) -> Vec<(Vec<&str>, &Value)> {
        let mut out = Vec::new();
        collect_leaves(&self.0, &mut Vec::new(), &mut out);
        out
    }
}

fn merge_into(target: &mut Map<String, Value>, layer: &Map<String, Value>) {
    for (key, value) in layer {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_into(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

fn collect_leaves<'a>(
    map: &'a Map<String, Value>,
    prefix: &mut Vec<&'a str>,
    out: &mut Vec<(Vec<&'a str>, &'a Value)>,
) {
    for (key, value) in map {
        prefix.push(key.as_str());
        match value {
            Value::Object(nested) if !nested.is_empty() => collect_leaves(nested, prefix, out),
            _ => out.push((prefix.clone(), value)),
        }
        prefix.pop();
    }
}

/// Composes base, programmatic and manual layers into the effective style.
#[must_use]
pub fn merge(
    base: &StyleDocument,
    programmatic: &StyleDocument,
    manual: &StyleDocument,
) -> StyleDocument {
    base.merged_with(programmatic).merged_with(manual)
}

/// One changed leaf; `None` means the key is absent on that side.
///
/// `path` joins `segments` with `.` for display; `segments` stays exact
/// when a key contains a dot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StyleChange {
    pub path: String,
    pub segments: Vec<String>,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    pub changes: Vec<StyleChange>,
}

impl ChangeSet {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|change| change.path.as_str())
    }

    #[must_use]
    pub fn get(&self, path: &str) -> Option<&StyleChange> {
        self.changes.iter().find(|change| change.path == path)
    }
}

/// Leaf-level difference between two effective styles.
#[must_use]
pub fn diff(original: &StyleDocument, modified: &StyleDocument) -> ChangeSet {
    let change = |segments: &[&str], old: Option<&Value>, new: Option<&Value>| StyleChange {
        path: segments.join("."),
        segments: segments.iter().map(|segment| (*segment).to_owned()).collect(),
        old: old.cloned(),
        new: new.cloned(),
    };
    let mut changes = Vec::new();
    for (segments, new) in modified.leaf_segments() {
        let old = original.get_segments(&segments);
        if old != Some(new) {
            changes.push(change(&segments, old, Some(new)));
        }
    }
    for (segments, old) in original.leaf_segments() {
        if modified.get_segments(&segments).is_none() {
            changes.push(change(&segments, Some(old), None));
        }
    }
    ChangeSet { changes }
}

/// Built-in base styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StylePreset {
    #[default]
    Default,
    Scientific,
}

impl StylePreset {
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "default" => Some(Self::Default),
            "scientific" => Some(Self::Scientific),
            _ => None,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Scientific => "scientific",
        }
    }

    #[must_use]
    pub fn document(self) -> StyleDocument {
        let base = json!({
            "fonts": {
                "family": "bitmap8x8",
                "title_pt": 8.0,
                "label_pt": 7.0,
                "tick_pt": 6.0,
                "text_pt": 7.0,
                "legend_pt": 6.0
            },
            "lines": {
                "trace_mm": 0.3,
                "axis_mm": 0.2,
                "grid_mm": 0.1,
                "errorbar_mm": 0.2,
                "reference_mm": 0.2
            },
            "markers": {
                "size_mm": 1.0
            },
            "axes": {
                "facecolor": "#ffffff",
                "edgecolor": "#000000",
                "grid": false,
                "grid_color": "#d0d0d0"
            },
            "ticks": {
                "length_mm": 0.8,
                "count": 5,
                "color": "#000000"
            },
            "legend": {
                "visible": true,
                "frame": true,
                "location": "upper right"
            },
            "theme": {
                "mode": "light",
                "text_color": "#000000",
                "span_alpha": 0.25
            },
            "colors": {
                "palette": [
                    "#0077bb", "#ee7733", "#009988", "#cc3311", "#33bbee", "#ee3377", "#bbbbbb"
                ]
            },
            "output": {
                "dpi": 300.0,
                "transparent": false
            },
            "elements": {}
        });
        let mut document = object_document(base);
        if self == Self::Scientific {
            let overlay = json!({
                "fonts": { "title_pt": 7.0, "label_pt": 6.0, "tick_pt": 5.0, "text_pt": 6.0 },
                "lines": { "trace_mm": 0.2, "axis_mm": 0.15 },
                "markers": { "size_mm": 0.8 },
                "axes": { "grid": true },
                "ticks": { "count": 4 },
                "legend": { "frame": false },
                "colors": {
                    "palette": [
                        "#000000", "#e69f00", "#56b4e9", "#009e73", "#0072b2", "#d55e00", "#cc79a7"
                    ]
                }
            });
            document = document.merged_with(&object_document(overlay));
        }
        document
    }
}

fn object_document(value: Value) -> StyleDocument {
    match value {
        Value::Object(map) => StyleDocument(map),
        _ => StyleDocument::new(),
    }
}

/// The three layers of one figure, kept separate so manual edits can be
/// diffed and dropped without touching the recipe.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyleLayers {
    pub base: StyleDocument,
    pub programmatic: StyleDocument,
    pub manual: StyleDocument,
}

impl StyleLayers {
    #[must_use]
    pub fn new(base: StyleDocument, programmatic: StyleDocument) -> Self {
        Self {
            base,
            programmatic,
            manual: StyleDocument::new(),
        }
    }

    #[must_use]
    pub fn with_manual(mut self, manual: StyleDocument) -> Self {
        self.manual = manual;
        self
    }

    /// Effective style before any manual edit.
    #[must_use]
    pub fn original(&self) -> StyleDocument {
        self.base.merged_with(&self.programmatic)
    }

    #[must_use]
    pub fn effective(&self) -> StyleDocument {
        merge(&self.base, &self.programmatic, &self.manual)
    }

    #[must_use]
    pub fn changes(&self) -> ChangeSet {
        diff(&self.original(), &self.effective())
    }

    /// Drops the manual layer and returns the re-merged style.
    pub fn restore(&mut self) -> StyleDocument {
        self.manual = StyleDocument::new();
        self.effective()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{StyleDocument, StyleLayers, StylePreset, diff, merge};

    fn doc(value: serde_json::Value) -> StyleDocument {
        StyleDocument::from_value(value).expect("object")
    }

    #[test]
    fn later_layers_win_and_absent_keys_inherit() {
        let base = doc(json!({
            "lines": {"trace_mm": 0.3, "axis_mm": 0.2},
            "fonts": {"title_pt": 8}
        }));
        let programmatic = doc(json!({"lines": {"trace_mm": 0.5}}));
        let manual = doc(json!({"fonts": {"title_pt": 12}}));
        let effective = merge(&base, &programmatic, &manual);
        assert_eq!(effective.get_f64("lines.trace_mm"), Some(0.5));
        assert_eq!(effective.get_f64("lines.axis_mm"), Some(0.2));
        assert_eq!(effective.get_f64("fonts.title_pt"), Some(12.0));
    }

    #[test]
    fn diff_lists_changed_leaves_with_old_and_new() {
        let original = doc(json!({"a": {"x": 1, "y": 2}}));
        let modified = doc(json!({"a": {"x": 1, "y": 3}, "b": true}));
        let changes = diff(&original, &modified);
        let paths: Vec<&str> = changes.paths().collect();
        assert_eq!(paths, vec!["a.y", "b"]);
        let change = changes.get("a.y").expect("a.y");
        assert_eq!(change.old, Some(json!(2)));
        assert_eq!(change.new, Some(json!(3)));
    }

    #[test]
    fn dotted_element_keys_compare_by_segment() {
        let original = doc(json!({"elements": {"ax_0_0/fig.title": {"color": "#000000"}}}));
        assert!(diff(&original, &original.clone()).is_empty());
        assert_eq!(
            original.get_segments(&["elements", "ax_0_0/fig.title", "color"]),
            Some(&json!("#000000"))
        );

        let modified = doc(json!({"elements": {"ax_0_0/fig.title": {"color": "#ff0000"}}}));
        let changes = diff(&original, &modified);
        assert_eq!(changes.len(), 1);
        let change = &changes.changes[0];
        assert_eq!(change.segments, vec!["elements", "ax_0_0/fig.title", "color"]);
        assert_eq!(change.old, Some(json!("#000000")));
        assert_eq!(change.new, Some(json!("#ff0000")));
    }

    #[test]
    fn set_path_creates_parents_and_restore_clears_manual() {
        let mut layers = StyleLayers::new(StylePreset::Default.document(), StyleDocument::new());
        layers
            .manual
            .set_path("elements.plot_000.color", json!("#ff0000"))
            .expect("set");
        assert_eq!(layers.changes().len(), 1);
        assert_eq!(
            layers.effective().get_str("elements.plot_000.color"),
            Some("#ff0000")
        );
        let restored = layers.restore();
        assert_eq!(restored, layers.original());
        assert!(layers.manual.is_empty());
    }

    #[test]
    fn presets_resolve_by_name() {
        let scientific = StylePreset::from_name("scientific").expect("preset").document();
        assert_eq!(scientific.get_bool("axes.grid"), Some(true));
        assert_eq!(scientific.get_f64("lines.axis_mm"), Some(0.15));
        assert_eq!(StylePreset::Default.document().get_bool("axes.grid"), Some(false));
    }
}
