//! Crash-safe file replacement
//!
//! Every write goes to a temp file that is renamed over the target, and the
//! previous content is kept in a `.bak` sidecar until the rename succeeds.
//! A reader therefore sees either the old or the new content, and a crash
//! mid-write leaves the sidecar behind for `recover` to inspect.

use chrono::Local;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{FocusError, Result};

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Sidecar holding the previous content while a write is in flight
pub fn sidecar_path(path: &Path) -> PathBuf {
    with_suffix(path, ".bak")
}

/// Write `contents` to a temp file next to `path`, fsync, then rename over it
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| FocusError::io("create directory", parent, e))?;
    }

    let tmp_path = with_suffix(path, ".tmp");
    let write = || -> std::io::Result<()> {
        let mut file = File::create(&tmp_path)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    };

    write().map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        FocusError::io("write", path, e)
    })
}

/// Replace `path` with `contents`, keeping the old content in the sidecar
/// until the new content is in place. On failure the old content is put back.
pub fn replace_with_backup(path: &Path, contents: &[u8]) -> Result<()> {
    let sidecar = sidecar_path(path);
    let had_previous = path.exists();

    if had_previous {
        fs::copy(path, &sidecar).map_err(|e| FocusError::io("back up", path, e))?;
    }

    match write_atomic(path, contents) {
        Ok(()) => {
            if had_previous {
                if let Err(e) = fs::remove_file(&sidecar) {
                    warn!(path = %sidecar.display(), error = %e, "failed to remove write sidecar");
                }
            }
            Ok(())
        }
        Err(err) => {
            if had_previous {
                match fs::copy(&sidecar, path) {
                    Ok(_) => {
                        let _ = fs::remove_file(&sidecar);
                    }
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "failed to restore from sidecar");
                    }
                }
            }
            Err(err)
        }
    }
}

/// Finish or roll back a write that was interrupted.
///
/// If a sidecar exists, the main file is kept when `is_valid` accepts it
/// (the write completed) and the sidecar is restored otherwise. Returns true
/// when the sidecar content was restored.
pub fn recover(path: &Path, is_valid: impl Fn(&[u8]) -> bool) -> Result<bool> {
    let sidecar = sidecar_path(path);
    if !sidecar.exists() {
        return Ok(false);
    }

    let current_ok = fs::read(path).map(|bytes| is_valid(&bytes)).unwrap_or(false);
    if current_ok {
        debug!(path = %path.display(), "dropping stale write sidecar");
        fs::remove_file(&sidecar).map_err(|e| FocusError::io("remove", &sidecar, e))?;
        return Ok(false);
    }

    warn!(path = %path.display(), "interrupted write detected, restoring previous content");
    fs::copy(&sidecar, path).map_err(|e| FocusError::io("restore", path, e))?;
    fs::remove_file(&sidecar).map_err(|e| FocusError::io("remove", &sidecar, e))?;
    Ok(true)
}

/// Copy `path` to a timestamped backup next to it and return the backup path
pub fn snapshot(path: &Path, label: &str) -> Result<PathBuf> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup".to_string());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_else(|| "json".to_string());
    let stamp = Local::now().format("%Y%m%d-%H%M%S");

    let mut backup = path.with_file_name(format!("{}.{}-{}.{}", stem, label, stamp, ext));
    let mut n = 1;
    while backup.exists() {
        backup = path.with_file_name(format!("{}.{}-{}-{}.{}", stem, label, stamp, n, ext));
        n += 1;
    }

    fs::copy(path, &backup).map_err(|e| FocusError::io("back up", path, e))?;
    debug!(from = %path.display(), to = %backup.display(), "snapshot written");
    Ok(backup)
}

/// True if the bytes parse as any JSON document
pub fn is_json(bytes: &[u8]) -> bool {
    serde_json::from_slice::<serde_json::Value>(bytes).is_ok()
}
