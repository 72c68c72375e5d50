// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Destination dataset resolution.
//!
//! The user asks for a filesystem path; provisioning needs a dataset name
//! and, when the dataset's default mountpoint would land somewhere else, an
//! explicit mountpoint override. Resolution walks an ordered list of
//! strategies and takes the first match:
//!
//! 1. [`reuse_mounted_root`] — the destination already is a mounted dataset
//!    root, so its backing dataset is reused as-is.
//! 2. [`child_of_parent`] — the destination's parent directory is a mounted
//!    dataset root, so the destination becomes a child dataset of it.
//! 3. [`sibling_of_origin`] (local sources) — the destination becomes a
//!    sibling of the source's dataset, i.e. clones default to living next to
//!    their origin. [`under_cwd`] (remote sources) — there is no origin
//!    dataset to be a sibling of, so the destination goes under whatever
//!    backs the current working directory; a derivation that yields anything
//!    other than a plausible dataset name is fatal, because remote clones
//!    cannot fall back to ordinary directories.
//!
//! When no strategy matches (say, only the destination's grandparent is a
//!    dataset root) resolution fails explicitly rather than mis-deriving a
//! name.
//!
//! The override is recorded only when the derived dataset's default
//! mountpoint diverges from the literal requested path, preserving whatever
//! the user literally asked for.

use crate::{
    clone::{source::SourceSpec, CloneError, Result},
    zfs::{DatasetId, ZfsProvider},
};

use std::path::{Path, PathBuf};
use tracing::debug;

/// Resolved destination: the dataset to materialize and where to mount it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationSpec {
    /// Path the user literally asked for, absolutized.
    pub requested_path: PathBuf,

    /// Derived dataset name; never user-supplied directly.
    pub dataset: DatasetId,

    /// Explicit mountpoint, set only when the dataset's default mountpoint
    /// would differ from the requested path.
    pub mountpoint_override: Option<PathBuf>,
}

/// Derive a [`DestinationSpec`] for `dest` (absolute, possibly nonexistent).
///
/// # Errors
///
/// - Return [`CloneError::ImplausibleDataset`] if the remote-source
///   derivation yields a name that cannot be a dataset.
/// - Return [`CloneError::Unresolvable`] if no strategy matches.
pub fn resolve(
    dest: &Path,
    source: &SourceSpec,
    zfs: &impl ZfsProvider,
) -> Result<DestinationSpec> {
    let cwd = std::env::current_dir()?;

    if let Some(spec) = reuse_mounted_root(dest, zfs)? {
        debug!("destination {:?} is already a dataset root", dest.display());
        return Ok(spec);
    }

    if let Some(spec) = child_of_parent(dest, zfs)? {
        debug!("destination {:?} derived from its parent dataset", dest.display());
        return Ok(spec);
    }

    let fallback = match source {
        SourceSpec::Local { dataset, .. } => sibling_of_origin(dest, dataset, zfs)?,
        SourceSpec::Remote { .. } => under_cwd(dest, &cwd, zfs)?,
    };
    if let Some(spec) = fallback {
        debug!("destination {:?} derived by fallback heuristic", dest.display());
        return Ok(spec);
    }

    Err(CloneError::Unresolvable {
        path: dest.to_path_buf(),
    })
}

/// Tier 1: destination path is itself a mounted dataset root.
pub(crate) fn reuse_mounted_root(
    dest: &Path,
    zfs: &impl ZfsProvider,
) -> Result<Option<DestinationSpec>> {
    let Some(dataset) = dataset_rooted_at(dest, zfs)? else {
        return Ok(None);
    };

    Ok(Some(DestinationSpec {
        requested_path: dest.to_path_buf(),
        dataset,
        mountpoint_override: None,
    }))
}

/// Tier 2: destination's parent directory is a mounted dataset root.
pub(crate) fn child_of_parent(
    dest: &Path,
    zfs: &impl ZfsProvider,
) -> Result<Option<DestinationSpec>> {
    let (Some(parent_dir), Some(basename)) = (dest.parent(), basename_of(dest)) else {
        return Ok(None);
    };
    let Some(parent_dataset) = dataset_rooted_at(parent_dir, zfs)? else {
        return Ok(None);
    };

    let dataset = parent_dataset.child(&basename);
    let default_mount = zfs
        .mountpoint(&parent_dataset)?
        .map(|mount| mount.join(&basename));

    Ok(Some(DestinationSpec {
        requested_path: dest.to_path_buf(),
        dataset,
        mountpoint_override: override_for(default_mount, dest),
    }))
}

/// Tier 3 for local sources: destination becomes a sibling of the origin's
/// dataset.
pub(crate) fn sibling_of_origin(
    dest: &Path,
    source_dataset: &DatasetId,
    zfs: &impl ZfsProvider,
) -> Result<Option<DestinationSpec>> {
    let (Some(parent_dataset), Some(basename)) = (source_dataset.parent(), basename_of(dest))
    else {
        return Ok(None);
    };

    let dataset = parent_dataset.child(&basename);
    let default_mount = zfs
        .mountpoint(&parent_dataset)?
        .map(|mount| mount.join(&basename));

    Ok(Some(DestinationSpec {
        requested_path: dest.to_path_buf(),
        dataset,
        mountpoint_override: override_for(default_mount, dest),
    }))
}

/// Tier 3 for remote sources: destination goes under the current working
/// directory's backing dataset.
///
/// The working directory's mount entry may well not be a dataset (a plain
/// block device, an NFS export, the swap pseudo-device); the derived name is
/// vetted before any provisioning side effect can happen.
pub(crate) fn under_cwd(
    dest: &Path,
    cwd: &Path,
    zfs: &impl ZfsProvider,
) -> Result<Option<DestinationSpec>> {
    let Some(basename) = basename_of(dest) else {
        return Ok(None);
    };
    let Some(device) = zfs.backing_device(cwd)? else {
        return Ok(None);
    };

    let dataset = DatasetId::new(format!("{device}/{basename}"));
    if !dataset.is_plausible() {
        return Err(CloneError::ImplausibleDataset {
            dataset: dataset.as_str().to_string(),
        });
    }

    let default_mount = zfs
        .mountpoint(&DatasetId::new(device))?
        .map(|mount| mount.join(&basename));

    Ok(Some(DestinationSpec {
        requested_path: dest.to_path_buf(),
        dataset,
        mountpoint_override: override_for(default_mount, dest),
    }))
}

/// Dataset mounted exactly at `path`, if any.
fn dataset_rooted_at(path: &Path, zfs: &impl ZfsProvider) -> Result<Option<DatasetId>> {
    let Some(dataset) = zfs.backing_dataset(path)? else {
        return Ok(None);
    };

    if zfs.mountpoint(&dataset)?.as_deref() == Some(path) {
        Ok(Some(dataset))
    } else {
        Ok(None)
    }
}

/// Record an override only when the default mountpoint diverges from the
/// literal request.
fn override_for(default_mount: Option<PathBuf>, requested: &Path) -> Option<PathBuf> {
    match default_mount {
        Some(default) if default == requested => None,
        _ => Some(requested.to_path_buf()),
    }
}

fn basename_of(path: &Path) -> Option<String> {
    path.file_name().map(|name| name.to_string_lossy().into_owned())
}
