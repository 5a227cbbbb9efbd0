use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::LayoutParameters;
use crate::error::{RecipeError, RecipeResult};
use crate::persist::write_atomic;
use crate::recipe::call::{ArgSlot, Call};
use crate::recipe::externalize::{
    Classification, DEFAULT_INLINE_THRESHOLD, DataExternalizer, classify, inline_materialize,
};
use crate::recipe::ledger::CallLedger;
use crate::recipe::model::{FORMAT_VERSION, FigureSpec, Recipe, StyleRef};
use crate::recipe::value::ArgValue;

/// Format versions this crate can load.
pub const SUPPORTED_FORMAT_VERSIONS: &[&str] = &[FORMAT_VERSION];

/// Options for writing recipes to disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeConfig {
    /// Arrays with more elements than this are stored externally.
    #[serde(default = "default_inline_threshold")]
    pub inline_threshold: usize,
    /// Appended to the recipe file stem to name the data directory.
    #[serde(default = "default_data_dir_suffix")]
    pub data_dir_suffix: String,
}

fn default_inline_threshold() -> usize {
    DEFAULT_INLINE_THRESHOLD
}

fn default_data_dir_suffix() -> String {
    "_data".to_owned()
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            inline_threshold: default_inline_threshold(),
            data_dir_suffix: default_data_dir_suffix(),
        }
    }
}

impl RecipeConfig {
    #[must_use]
    pub fn with_inline_threshold(mut self, inline_threshold: usize) -> Self {
        self.inline_threshold = inline_threshold;
        self
    }

    #[must_use]
    pub fn with_data_dir_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.data_dir_suffix = suffix.into();
        self
    }
}

/// Builds a recipe from recorded calls.
///
/// Bulk arguments go through `externalizer` when one is given. Without it
/// everything stays inline, which fails for arrays holding NaN/inf.
/// The layout is solved once so an overflowing figure is rejected here
/// rather than at replay.
pub fn serialize(
    ledger: &CallLedger,
    figure: FigureSpec,
    layout: LayoutParameters,
    style_ref: StyleRef,
    renderer_fingerprint: &str,
    mut externalizer: Option<&mut DataExternalizer>,
) -> RecipeResult<Recipe> {
    let mut panels = ledger.panels().clone();
    let mut externalized = 0_usize;
    for panel in panels.values_mut() {
        for call in panel.calls.iter_mut().chain(panel.decorations.iter_mut()) {
            for arg in &mut call.args {
                let ArgSlot::Inline(value) = &arg.value else {
                    continue;
                };
                let threshold = externalizer
                    .as_deref()
                    .map_or(DEFAULT_INLINE_THRESHOLD, DataExternalizer::threshold);
                if classify(value, threshold) == Classification::Inline {
                    continue;
                }
                match externalizer.as_deref_mut() {
                    Some(externalizer) => {
                        let data_ref = externalizer.externalize(&call.id, &arg.name, value)?;
                        arg.value = ArgSlot::External(data_ref);
                        externalized += 1;
                    }
                    None if value.has_non_finite() => {
                        return Err(RecipeError::DataFidelity {
                            element_id: call.id.to_string(),
                            argument: arg.name.clone(),
                            reason: "non-finite values need external storage".to_owned(),
                        });
                    }
                    None => {}
                }
            }
        }
    }

    let style_ref = StyleRef {
        programmatic: style_ref.programmatic.merged_with(ledger.style()),
        preset: style_ref.preset,
    };
    let recipe = Recipe {
        format_version: FORMAT_VERSION.to_owned(),
        created: Utc::now(),
        renderer_fingerprint: renderer_fingerprint.to_owned(),
        figure,
        layout,
        panels,
        style_ref,
        data_root: externalizer.map(|externalizer| externalizer.base_dir().to_path_buf()),
    };
    recipe.solve_layout()?;
    debug!(
        panels = recipe.panels.len(),
        calls = recipe.call_count(),
        externalized,
        "serialized recipe"
    );
    Ok(recipe)
}

#[derive(Deserialize)]
struct VersionHeader {
    #[serde(default)]
    format_version: Option<serde_json::Value>,
}

/// Parses a recipe document.
///
/// The format version is checked before anything else. Malformed documents
/// fail as a whole; unknown operations are kept as non-replayable calls.
/// External data is not read here; see [`RecipeResolver`].
pub fn deserialize(source: &str, data_root: Option<&Path>) -> RecipeResult<Recipe> {
    let header: VersionHeader = serde_json::from_str(source)
        .map_err(|err| RecipeError::RecipeCorrupt(err.to_string()))?;
    let version = match header.format_version {
        Some(serde_json::Value::String(version)) => version,
        Some(other) => {
            return Err(RecipeError::RecipeCorrupt(format!(
                "format_version must be a string, got {other}"
            )));
        }
        None => {
            return Err(RecipeError::RecipeCorrupt(
                "missing format_version".to_owned(),
            ));
        }
    };
    if !SUPPORTED_FORMAT_VERSIONS.contains(&version.as_str()) {
        return Err(RecipeError::UnsupportedFormatVersion {
            found: version,
            supported: SUPPORTED_FORMAT_VERSIONS.join(", "),
        });
    }

    let mut recipe: Recipe = serde_json::from_str(source)
        .map_err(|err| RecipeError::RecipeCorrupt(err.to_string()))?;
    validate_structure(&recipe)?;
    recipe.data_root = data_root.map(Path::to_path_buf);
    debug!(
        panels = recipe.panels.len(),
        calls = recipe.call_count(),
        "deserialized recipe"
    );
    Ok(recipe)
}

fn validate_structure(recipe: &Recipe) -> RecipeResult<()> {
    recipe
        .figure
        .validate()
        .map_err(|err| RecipeError::RecipeCorrupt(err.to_string()))?;
    recipe
        .layout
        .validate()
        .map_err(|err| RecipeError::RecipeCorrupt(err.to_string()))?;

    let mut seqs = HashSet::new();
    for (panel_id, panel) in &recipe.panels {
        let mut data_ids = HashSet::new();
        for call in &panel.calls {
            if !data_ids.insert(&call.id) {
                return Err(RecipeError::RecipeCorrupt(format!(
                    "panel `{panel_id}` repeats data element id `{}`",
                    call.id
                )));
            }
        }
        for call in panel.all_calls() {
            if !seqs.insert(call.seq) {
                return Err(RecipeError::RecipeCorrupt(format!(
                    "sequence index {} is used twice",
                    call.seq
                )));
            }
            if !call.op.is_known() {
                warn!(
                    panel_id = %panel_id,
                    element_id = %call.id,
                    operation = %call.op,
                    "recipe contains an unsupported operation; it will be skipped at replay"
                );
            }
        }
        if let Some(call) = panel.decorations.iter().find(|call| data_ids.contains(&call.id)) {
            return Err(RecipeError::RecipeCorrupt(format!(
                "panel `{panel_id}` uses element id `{}` for data and decoration",
                call.id
            )));
        }
    }
    Ok(())
}

impl Recipe {
    pub fn write_to(&self, path: &Path) -> RecipeResult<()> {
        let json = self.to_json_pretty()?;
        write_atomic(path, json.as_bytes())
    }
}

fn data_dir_name(path: &Path, config: &RecipeConfig) -> RecipeResult<PathBuf> {
    let stem = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| {
            RecipeError::InvalidData(format!("recipe path `{}` has no file stem", path.display()))
        })?;
    Ok(PathBuf::from(format!("{stem}{}", config.data_dir_suffix)))
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf)
}

/// Serializes the ledger to `path`, externalizing bulk data into
/// `<stem>_data/` next to it.
pub fn save_recipe(
    path: &Path,
    ledger: &CallLedger,
    figure: FigureSpec,
    layout: LayoutParameters,
    style_ref: StyleRef,
    renderer_fingerprint: &str,
    config: &RecipeConfig,
) -> RecipeResult<Recipe> {
    let base_dir = parent_dir(path);
    let mut externalizer = DataExternalizer::new(&base_dir, data_dir_name(path, config)?)
        .with_threshold(config.inline_threshold);
    let recipe = serialize(
        ledger,
        figure,
        layout,
        style_ref,
        renderer_fingerprint,
        Some(&mut externalizer),
    )?;
    recipe.write_to(path)?;
    debug!(path = %path.display(), files = externalizer.written().len(), "saved recipe");
    Ok(recipe)
}

/// Reads a recipe file; external data resolves relative to its directory.
pub fn load_recipe(path: &Path) -> RecipeResult<Recipe> {
    let source = fs::read_to_string(path).map_err(|err| RecipeError::io(path, err))?;
    deserialize(&source, Some(&parent_dir(path)))
}

/// Lazily dereferences external arguments, caching each file once.
#[derive(Debug, Clone, Default)]
pub struct RecipeResolver {
    data_root: Option<PathBuf>,
    cache: HashMap<PathBuf, ArgValue>,
}

impl RecipeResolver {
    #[must_use]
    pub fn new(data_root: Option<PathBuf>) -> Self {
        Self {
            data_root,
            cache: HashMap::new(),
        }
    }

    #[must_use]
    pub fn for_recipe(recipe: &Recipe) -> Self {
        Self::new(recipe.data_root.clone())
    }

    /// Positional argument values of `call`, with external refs materialized.
    pub fn resolve_args(&mut self, call: &Call) -> RecipeResult<Vec<ArgValue>> {
        call.args
            .iter()
            .map(|arg| match &arg.value {
                ArgSlot::Inline(value) => Ok(value.clone()),
                ArgSlot::External(data_ref) => {
                    if let Some(value) = self.cache.get(&data_ref.path) {
                        return Ok(value.clone());
                    }
                    let Some(root) = &self.data_root else {
                        return Err(RecipeError::BrokenDataRef {
                            element_id: call.id.to_string(),
                            argument: arg.name.clone(),
                            path: data_ref.path.clone(),
                            reason: "recipe was loaded without a data root".to_owned(),
                        });
                    };
                    let value = inline_materialize(root, &call.id, &arg.name, data_ref)?;
                    self.cache.insert(data_ref.path.clone(), value.clone());
                    Ok(value)
                }
            })
            .collect()
    }

    /// Materializes every external ref of the recipe into a fully inline copy.
    pub fn inline_all(&mut self, recipe: &Recipe) -> RecipeResult<Recipe> {
        let mut out = recipe.clone();
        for panel in out.panels.values_mut() {
            for call in panel.calls.iter_mut().chain(panel.decorations.iter_mut()) {
                let values = self.resolve_args(call)?;
                for (arg, value) in call.args.iter_mut().zip(values) {
                    arg.value = ArgSlot::Inline(value);
                }
            }
        }
        Ok(out)
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
