use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{RecipeError, RecipeResult};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `bytes` through a sibling temp file and renames it into place, so
/// readers never observe a half-written document.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> RecipeResult<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|err| RecipeError::io(parent, err))?;
    }
    let tmp_path = temp_path(path);
    {
        let file = File::create(&tmp_path).map_err(|err| RecipeError::io(&tmp_path, err))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(bytes)
            .and_then(|()| writer.flush())
            .map_err(|err| RecipeError::io(&tmp_path, err))?;
        writer
            .get_ref()
            .sync_all()
            .map_err(|err| RecipeError::io(&tmp_path, err))?;
    }
    fs::rename(&tmp_path, path).map_err(|err| RecipeError::io(path, err))
}

/// Removes `path` if present; a missing file is not an error.
pub(crate) fn remove_if_exists(path: &Path) -> RecipeResult<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(RecipeError::io(path, err)),
    }
}
