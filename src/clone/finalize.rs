// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Post-provision finalization.
//!
//! First the destination gets its mountpoint: the recorded override, or the
//! backend's inherited default. That step is fatal on failure; a dataset
//! nobody can reach is not a successful clone.
//!
//! Everything after that is cosmetics on a working clone and only ever
//! warns: local clones get their remote bookkeeping rewired (`origin` of
//! the origin becomes `origin-parent`, a fresh `origin` points back at the
//! source), the current branch starts tracking the new origin, and NetBeans
//! project metadata is renamed so the IDE can tell the two working copies
//! apart.

use crate::{
    clone::{provision::ProvisionResult, resolve::DestinationSpec, source::SourceSpec, CloneError, Result},
    config::Settings,
    zfs::ZfsProvider,
};

use git2::{BranchType, Repository};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Apply mountpoint settings and rewrite post-clone metadata.
///
/// # Errors
///
/// - Return [`CloneError::Mountpoint`] if the mountpoint cannot be applied.
///   Metadata rewrites never fail the clone; they warn and continue.
#[instrument(skip_all, level = "debug")]
pub fn finalize(
    source: &SourceSpec,
    dest: &DestinationSpec,
    outcome: &ProvisionResult,
    settings: &Settings,
    zfs: &impl ZfsProvider,
) -> Result<()> {
    if !outcome.mountpoint_applied {
        apply_mountpoint(dest, zfs)?;
    }

    let SourceSpec::Local { path: source_path, .. } = source else {
        return Ok(());
    };

    let mount_dir = match mount_dir(dest, outcome, zfs)? {
        Some(dir) => dir,
        None => {
            warn!("{} reports no mountpoint; skipping metadata rewrites", dest.dataset);
            return Ok(());
        }
    };

    match Repository::open(&mount_dir) {
        Ok(repo) => {
            if let Err(error) = rewire_remotes(&repo, source_path, &mount_dir) {
                warn!("failed to rewire remotes: {error}");
            } else if let Err(error) = track_new_origin(&repo) {
                warn!("failed to configure branch tracking: {error}");
            }
        }
        Err(error) => warn!("cannot open cloned repository at {:?}: {error}", mount_dir.display()),
    }

    if settings.rewrite_ide_metadata {
        let old_name = basename(source_path);
        let new_name = basename(&mount_dir);
        if let Err(error) = crate::netbeans::rename_project(&mount_dir, &old_name, &new_name) {
            warn!("failed to rewrite IDE metadata: {error}");
        }
    }

    Ok(())
}

fn apply_mountpoint(dest: &DestinationSpec, zfs: &impl ZfsProvider) -> Result<()> {
    let applied = match &dest.mountpoint_override {
        Some(path) => {
            info!("set mountpoint of {} to {:?}", dest.dataset, path.display());
            zfs.set_mountpoint(&dest.dataset, path)
        }
        None => {
            debug!("inherit mountpoint for {}", dest.dataset);
            zfs.inherit_mountpoint(&dest.dataset)
        }
    };

    applied.map_err(|source| CloneError::Mountpoint {
        dataset: dest.dataset.clone(),
        source,
    })
}

fn mount_dir(
    dest: &DestinationSpec,
    outcome: &ProvisionResult,
    zfs: &impl ZfsProvider,
) -> Result<Option<PathBuf>> {
    if let Some(dir) = &outcome.mountpoint {
        return Ok(Some(dir.clone()));
    }
    if let Some(dir) = &dest.mountpoint_override {
        return Ok(Some(dir.clone()));
    }

    Ok(zfs.mountpoint(&dest.dataset)?)
}

/// Point `origin` back at the clone source, demoting the inherited remote.
///
/// The clone carries the origin's own remotes verbatim, so its `origin`
/// still names the origin's upstream. That remote becomes `origin-parent`
/// (a stale `origin-parent` from an earlier run is removed first, making
/// the rename idempotent), and a fresh `origin` points at the source path —
/// relative when both working copies share a parent directory, absolute
/// otherwise.
pub(crate) fn rewire_remotes(
    repo: &Repository,
    source_path: &Path,
    dest_dir: &Path,
) -> std::result::Result<(), git2::Error> {
    // Remove if present; absence is not an error.
    if repo.find_remote("origin-parent").is_ok() {
        debug!("removing stale origin-parent remote");
        repo.remote_delete("origin-parent")?;
    }

    if repo.find_remote("origin").is_ok() {
        repo.remote_rename("origin", "origin-parent")?;
    }

    let url = origin_url(source_path, dest_dir);
    info!("adding origin -> {url}");
    repo.remote("origin", &url)?;

    Ok(())
}

/// URL for the new `origin` remote.
pub(crate) fn origin_url(source_path: &Path, dest_dir: &Path) -> String {
    if source_path.parent() == dest_dir.parent() {
        format!("../{}", basename(source_path))
    } else {
        source_path.display().to_string()
    }
}

/// Make the current branch track the new `origin`.
///
/// The preferred call needs the remote-tracking reference to exist, which
/// it does not until the first fetch; older tooling lacks it entirely. The
/// fallback writes the tracking configuration keys directly.
pub(crate) fn track_new_origin(repo: &Repository) -> std::result::Result<(), git2::Error> {
    let branch_name = repo
        .head()?
        .shorthand()
        .unwrap_or("HEAD")
        .to_string();

    let mut branch = repo.find_branch(&branch_name, BranchType::Local)?;
    if branch
        .set_upstream(Some(&format!("origin/{branch_name}")))
        .is_ok()
    {
        return Ok(());
    }

    debug!("falling back to direct tracking configuration for {branch_name}");
    let mut config = repo.config()?;
    config.set_str(&format!("branch.{branch_name}.remote"), "origin")?;
    config.set_str(
        &format!("branch.{branch_name}.merge"),
        &format!("refs/heads/{branch_name}"),
    )?;

    Ok(())
}

fn basename(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
