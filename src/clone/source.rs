// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Clone source classification.
//!
//! A clone source is either a __local__ directory backed by a mounted
//! dataset, or a __remote__ connection string. Remote sources are opaque
//! until git contacts them; local sources are validated eagerly because the
//! whole snapshot-and-clone path depends on them.

use crate::{
    clone::{CloneError, Result},
    zfs::{DatasetId, ZfsProvider},
};

use std::path::PathBuf;
use tracing::debug;

/// Classified clone source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSpec {
    /// Existing, mounted, dataset-backed repository on this machine.
    Local { path: PathBuf, dataset: DatasetId },

    /// Opaque connection string; no local validation performed.
    Remote { url: String },
}

impl SourceSpec {
    /// Dataset backing the source, when local.
    pub fn dataset(&self) -> Option<&DatasetId> {
        match self {
            Self::Local { dataset, .. } => Some(dataset),
            Self::Remote { .. } => None,
        }
    }
}

/// Classify `raw` as a local path or remote URL.
///
/// Classification is read-only and deterministic: the same input always
/// yields the same kind.
///
/// # Errors
///
/// - Return [`CloneError::SourceMissing`] if a local source does not exist
///   as a directory.
/// - Return [`CloneError::SourceNotARepository`] if it carries no `.git`.
/// - Return [`CloneError::SourceNotOnZfs`] if its filesystem is not a
///   mounted dataset.
pub fn classify(raw: &str, zfs: &impl ZfsProvider) -> Result<SourceSpec> {
    if looks_remote(raw) {
        debug!("classified {raw:?} as remote");
        return Ok(SourceSpec::Remote { url: raw.into() });
    }

    let path = crate::path::absolutize(raw)?;
    if !path.is_dir() {
        return Err(CloneError::SourceMissing { path });
    }

    if !path.join(".git").exists() {
        return Err(CloneError::SourceNotARepository { path });
    }

    let dataset = zfs
        .backing_dataset(&path)?
        .ok_or_else(|| CloneError::SourceNotOnZfs { path: path.clone() })?;

    debug!("classified {raw:?} as local on dataset {dataset}");
    Ok(SourceSpec::Local { path, dataset })
}

/// Recognize `scheme://...` URLs and SCP-style `[user@]host:path` addresses.
fn looks_remote(raw: &str) -> bool {
    if raw.contains("://") {
        return true;
    }

    // SCP-style: a colon before any slash marks a host segment. A colon
    // after a slash is just a weird filename.
    match (raw.find(':'), raw.find('/')) {
        (Some(colon), Some(slash)) => colon < slash,
        (Some(_), None) => true,
        (None, _) => false,
    }
}
