// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Destination paths given on the command line may be relative, may contain
//! `.` and `..` segments, and usually do not exist yet. Dataset derivation
//! needs a stable absolute form of such paths without touching the
//! filesystem, so normalization here is purely lexical.

use std::{
    io,
    path::{Component, Path, PathBuf},
};

/// Turn a possibly-relative path into an absolute, lexically normalized one.
///
/// Unlike [`std::fs::canonicalize`], the path does not need to exist and
/// symlinks are not resolved.
///
/// # Errors
///
/// - Return [`std::io::Error`] if the current working directory cannot be
///   determined.
pub fn absolutize(path: impl AsRef<Path>) -> io::Result<PathBuf> {
    let path = path.as_ref();
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    Ok(normalize(&absolute))
}

/// Lexically remove `.` and `..` segments from an absolute path.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }

    normalized
}
