//! Single-file packaging of a recipe with everything it references.
//!
//! A bundle is a JSON document mapping relative paths to base64 payloads:
//! the recipe, its override sidecar, its style, every externalized data
//! file and optionally the last rendered image. Unpacking writes each
//! payload back byte for byte.

use std::fs;
use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use base64::{Engine as _, engine::general_purpose::STANDARD};
use chrono::{DateTime, Utc};
use image::{ImageFormat, RgbaImage};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::style_layers;
use crate::error::{RecipeError, RecipeResult};
use crate::overrides::sidecar_path;
use crate::persist::write_atomic;
use crate::recipe::{Recipe, load_recipe};

pub const BUNDLE_FORMAT_VERSION: &str = "1.0";
/// Entry name of the effective recorded style.
pub const STYLE_ENTRY: &str = "style.json";
/// Entry name of the last rendered image.
pub const RENDER_ENTRY: &str = "render.png";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bundle {
    pub format_version: String,
    pub created: DateTime<Utc>,
    /// Relative `/`-separated path to base64 payload, in pack order.
    pub entries: IndexMap<String, String>,
}

impl Default for Bundle {
    fn default() -> Self {
        Self::new()
    }
}

impl Bundle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            format_version: BUNDLE_FORMAT_VERSION.to_owned(),
            created: Utc::now(),
            entries: IndexMap::new(),
        }
    }

    /// Adds or replaces the payload at `relative_path`.
    pub fn insert(&mut self, relative_path: &Path, bytes: &[u8]) -> RecipeResult<()> {
        let key = entry_key(relative_path)?;
        self.entries.insert(key, STANDARD.encode(bytes));
        Ok(())
    }

    pub fn get(&self, relative_path: &str) -> RecipeResult<Option<Vec<u8>>> {
        self.entries
            .get(relative_path)
            .map(|payload| decode_entry(relative_path, payload))
            .transpose()
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Packs the files at `relative_paths` under `root`.
    pub fn pack<P: AsRef<Path>>(root: &Path, relative_paths: &[P]) -> RecipeResult<Self> {
        let mut bundle = Self::new();
        for relative in relative_paths {
            let relative = relative.as_ref();
            let absolute = root.join(relative);
            let bytes = fs::read(&absolute).map_err(|err| RecipeError::io(&absolute, err))?;
            bundle.insert(relative, &bytes)?;
        }
        Ok(bundle)
    }

    /// Packs a saved recipe: the document, its override sidecar if present,
    /// every data file it references, its recorded style and `rendered`.
    pub fn pack_recipe(recipe_path: &Path, rendered: Option<&RgbaImage>) -> RecipeResult<Self> {
        let recipe = load_recipe(recipe_path)?;
        let root = recipe
            .data_root()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let file_name = recipe_path.file_name().ok_or_else(|| {
            RecipeError::InvalidData(format!(
                "recipe path `{}` has no file name",
                recipe_path.display()
            ))
        })?;

        let mut relative_paths = vec![PathBuf::from(file_name)];
        let sidecar = sidecar_path(recipe_path);
        if sidecar.is_file() {
            if let Some(name) = sidecar.file_name() {
                relative_paths.push(PathBuf::from(name));
            }
        }
        relative_paths.extend(referenced_files(&recipe));
        let mut bundle = Self::pack(&root, &relative_paths)?;

        let style = style_layers(&recipe, None).original();
        let style_json = serde_json::to_vec_pretty(&style)
            .map_err(|err| RecipeError::InvalidData(format!("style encode failed: {err}")))?;
        bundle.insert(Path::new(STYLE_ENTRY), &style_json)?;

        if let Some(image) = rendered {
            let mut png = Cursor::new(Vec::new());
            image
                .write_to(&mut png, ImageFormat::Png)
                .map_err(|err| RecipeError::InvalidData(format!("png encode failed: {err}")))?;
            bundle.insert(Path::new(RENDER_ENTRY), png.get_ref())?;
        }
        debug!(
            recipe = %recipe_path.display(),
            entries = bundle.len(),
            "packed recipe bundle"
        );
        Ok(bundle)
    }

    pub fn to_json_pretty(&self) -> RecipeResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| RecipeError::InvalidData(format!("bundle encode failed: {err}")))
    }

    pub fn write_to(&self, path: &Path) -> RecipeResult<()> {
        write_atomic(path, self.to_json_pretty()?.as_bytes())
    }

    pub fn read_from(path: &Path) -> RecipeResult<Self> {
        let source = fs::read_to_string(path).map_err(|err| RecipeError::io(path, err))?;
        let bundle: Self = serde_json::from_str(&source).map_err(|err| {
            RecipeError::RecipeCorrupt(format!("bundle `{}`: {err}", path.display()))
        })?;
        if bundle.format_version != BUNDLE_FORMAT_VERSION {
            return Err(RecipeError::UnsupportedFormatVersion {
                found: bundle.format_version,
                supported: BUNDLE_FORMAT_VERSION.to_owned(),
            });
        }
        for key in bundle.entries.keys() {
            entry_key(Path::new(key))?;
        }
        Ok(bundle)
    }

    /// Writes every entry below `dir`; returns the written paths.
    ///
    /// All payloads are decoded before the first write, so a corrupt
    /// bundle leaves `dir` untouched.
    pub fn unpack(&self, dir: &Path) -> RecipeResult<Vec<PathBuf>> {
        let mut decoded = Vec::with_capacity(self.entries.len());
        for (key, payload) in &self.entries {
            entry_key(Path::new(key))?;
            decoded.push((dir.join(key), decode_entry(key, payload)?));
        }
        let mut written = Vec::with_capacity(decoded.len());
        for (path, bytes) in decoded {
            write_atomic(&path, &bytes)?;
            written.push(path);
        }
        debug!(dir = %dir.display(), files = written.len(), "unpacked bundle");
        Ok(written)
    }
}

fn decode_entry(key: &str, payload: &str) -> RecipeResult<Vec<u8>> {
    STANDARD
        .decode(payload)
        .map_err(|err| RecipeError::RecipeCorrupt(format!("bundle entry `{key}`: {err}")))
}

/// Normalized key of a relative path; rejects anything that could leave
/// the unpack directory.
fn entry_key(path: &Path) -> RecipeResult<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part.to_str().ok_or_else(|| {
                RecipeError::InvalidData(format!("bundle path `{}` is not UTF-8", path.display()))
            })?),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(RecipeError::InvalidData(format!(
                    "bundle path `{}` must stay inside the bundle",
                    path.display()
                )));
            }
        }
    }
    if parts.is_empty() {
        return Err(RecipeError::InvalidData("bundle path is empty".to_owned()));
    }
    Ok(parts.join("/"))
}

/// Data files referenced by the recipe, first reference first.
fn referenced_files(recipe: &Recipe) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = Vec::new();
    for panel in recipe.panels.values() {
        for call in panel.all_calls() {
            for arg in &call.args {
                if let Some(data_ref) = arg.value.external() {
                    if !files.contains(&data_ref.path) {
                        files.push(data_ref.path.clone());
                    }
                }
            }
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;

    use super::{Bundle, entry_key};

    #[test]
    fn entry_keys_reject_escaping_paths() {
        assert_eq!(entry_key(Path::new("./data/x.csv")).expect("relative"), "data/x.csv");
        assert!(entry_key(Path::new("../x.csv")).is_err());
        assert!(entry_key(Path::new("/etc/passwd")).is_err());
        assert!(entry_key(Path::new("")).is_err());
    }

    #[test]
    fn unpack_writes_identical_bytes() {
        let source = tempfile::tempdir().expect("tempdir");
        fs::create_dir_all(source.path().join("fig_data")).expect("mkdir");
        fs::write(source.path().join("fig.json"), b"{\"a\": 1}\n").expect("write");
        fs::write(source.path().join("fig_data/y.bin"), [0_u8, 159, 255, 7]).expect("write");
        let bundle = Bundle::pack(source.path(), &["fig.json", "fig_data/y.bin"]).expect("pack");

        let archive = source.path().join("fig.bundle.json");
        bundle.write_to(&archive).expect("write bundle");
        let restored = Bundle::read_from(&archive).expect("read bundle");
        let target = tempfile::tempdir().expect("tempdir");
        let written = restored.unpack(target.path()).expect("unpack");

        assert_eq!(written.len(), 2);
        assert_eq!(
            fs::read(target.path().join("fig_data/y.bin")).expect("read"),
            vec![0_u8, 159, 255, 7]
        );
        assert_eq!(
            fs::read(target.path().join("fig.json")).expect("read"),
            b"{\"a\": 1}\n".to_vec()
        );
    }
}
