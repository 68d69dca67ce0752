//! Atomic file output.

use crate::util::{VoxRegError, VoxRegResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Writes `path` through a sibling temporary file that is renamed over the
/// destination once `write` succeeded.
///
/// On any failure the temporary file is removed and the destination is left
/// untouched.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> VoxRegResult<()>
where
    F: FnOnce(&Path) -> VoxRegResult<()>,
{
    let tmp = temp_sibling(path)?;
    let result = write(&tmp).and_then(|()| {
        fs::rename(&tmp, path).map_err(|err| io_error(path, &err))
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

/// Writes `contents` to `path` atomically.
pub(crate) fn write_string_atomic(path: &Path, contents: &str) -> VoxRegResult<()> {
    write_atomic(path, |tmp| {
        fs::write(tmp, contents).map_err(|err| io_error(tmp, &err))
    })
}

pub(crate) fn io_error(path: &Path, err: &dyn std::fmt::Display) -> VoxRegError {
    VoxRegError::Io {
        path: path.display().to_string(),
        reason: err.to_string(),
    }
}

fn temp_sibling(path: &Path) -> VoxRegResult<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| VoxRegError::invalid(format!("'{}' is not a file path", path.display())))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(name);
    tmp_name.push(format!(".{}.tmp", std::process::id()));
    Ok(path.with_file_name(tmp_name))
}
