//! Path and name validation.
//!
//! Pipes and restore files are named deterministically from the database
//! name and the backup level:
//!
//! ```text
//! <dir>/<db_name>_bk<level>v000
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::BackupLevel;
use nix::unistd::{access, AccessFlags};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};

/// Maximum length of any path handled by the library, in bytes.
pub const MAX_PATH_LEN: usize = 4096;

/// Maximum length of a database name, in bytes.
pub const MAX_DB_NAME_LEN: usize = 17;

/// Fails if `path` is too long to be used.
pub fn check_path_length(path: &Path) -> CoreResult<()> {
    let len = path.as_os_str().as_bytes().len();
    if len >= MAX_PATH_LEN - 1 {
        return Err(CoreError::resource(format!(
            "path is {len} bytes long, limit is {}",
            MAX_PATH_LEN - 2
        )));
    }
    Ok(())
}

/// Checks that `path` is an existing, readable, writable and searchable
/// directory.
pub fn validate_dir(path: &Path) -> CoreResult<()> {
    let len = path.as_os_str().as_bytes().len();
    if len == 0 || len >= MAX_PATH_LEN {
        return Err(CoreError::resource(format!(
            "directory path length {len} is out of range"
        )));
    }

    access(path, AccessFlags::R_OK | AccessFlags::W_OK | AccessFlags::X_OK).map_err(|e| {
        CoreError::resource(format!("cannot access {}: {e}", path.display()))
    })?;

    let metadata = std::fs::metadata(path)?;
    if !metadata.is_dir() {
        return Err(CoreError::resource(format!(
            "{} is not a directory",
            path.display()
        )));
    }
    Ok(())
}

/// Checks a database name: non-empty, at most [`MAX_DB_NAME_LEN`] bytes, and
/// free of path separators and NUL bytes.
pub fn validate_db_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::invalid_argument("database name is empty"));
    }
    if name.len() > MAX_DB_NAME_LEN {
        return Err(CoreError::invalid_argument(format!(
            "database name {name:?} exceeds {MAX_DB_NAME_LEN} bytes"
        )));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(CoreError::invalid_argument(format!(
            "database name {name:?} contains a path separator or NUL"
        )));
    }
    Ok(())
}

/// File name used for both the backup pipe and the restore file.
pub fn backup_file_name(db_name: &str, level: BackupLevel) -> String {
    format!("{db_name}_bk{}v000", level.ordinal())
}

/// Full path of the backup pipe or restore file inside `dir`, length checked.
pub fn backup_file_path(dir: &Path, db_name: &str, level: BackupLevel) -> CoreResult<PathBuf> {
    let path = dir.join(backup_file_name(db_name, level));
    check_path_length(&path)?;
    Ok(path)
}

/// Returns true if `name` looks like a file produced by [`backup_file_name`].
pub fn is_backup_file_name(name: &str) -> bool {
    let Some(stem) = name.strip_suffix("v000") else {
        return false;
    };
    let Some((db, level)) = stem.rsplit_once("_bk") else {
        return false;
    };
    !db.is_empty() && matches!(level, "0" | "1" | "2")
}
