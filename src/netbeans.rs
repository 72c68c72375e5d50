// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! NetBeans project metadata rewriting.
//!
//! NetBeans stores the display name of a project inside
//! `nbproject/project.xml`. After a clone that name still refers to the
//! origin, which makes two open projects indistinguishable in the IDE. The
//! rewrite here is a plain string substitution of the name element, with the
//! original file preserved as `project.xml.bak`.

use std::path::Path;
use tracing::{debug, info};

/// Rewrite the project name field from `old_name` to `new_name`.
///
/// Returns `true` when a rewrite happened, `false` when the directory holds
/// no NetBeans metadata or the name field does not mention `old_name`.
///
/// # Errors
///
/// - Return [`NetbeansError::Read`]/[`NetbeansError::Write`] if the project
///   file or its backup cannot be accessed.
pub fn rename_project(
    project_dir: impl AsRef<Path>,
    old_name: impl AsRef<str>,
    new_name: impl AsRef<str>,
) -> Result<bool> {
    let path = project_dir.as_ref().join("nbproject").join("project.xml");
    if !path.exists() {
        debug!("no NetBeans metadata at {:?}", path.display());
        return Ok(false);
    }

    let contents = std::fs::read_to_string(&path).map_err(|source| NetbeansError::Read {
        path: path.clone(),
        source,
    })?;

    let old_field = format!("<name>{}</name>", old_name.as_ref());
    let new_field = format!("<name>{}</name>", new_name.as_ref());
    if !contents.contains(&old_field) {
        debug!("project name field does not mention {}", old_name.as_ref());
        return Ok(false);
    }

    // Keep the original around for manual inspection.
    let backup = path.with_extension("xml.bak");
    std::fs::write(&backup, &contents).map_err(|source| NetbeansError::Write {
        path: backup.clone(),
        source,
    })?;

    let rewritten = contents.replace(&old_field, &new_field);
    std::fs::write(&path, rewritten).map_err(|source| NetbeansError::Write {
        path: path.clone(),
        source,
    })?;

    info!(
        "renamed NetBeans project {} -> {}",
        old_name.as_ref(),
        new_name.as_ref()
    );

    Ok(true)
}

/// All possible error types for NetBeans metadata rewriting.
#[derive(Debug, thiserror::Error)]
pub enum NetbeansError {
    /// Project file cannot be read.
    #[error("failed to read {:?}", path.display())]
    Read {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Project file or backup cannot be written.
    #[error("failed to write {:?}", path.display())]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Friendly result alias :3
pub type Result<T, E = NetbeansError> = std::result::Result<T, E>;
