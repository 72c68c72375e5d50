// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Dataset-backed repository cloning.
//!
//! Cloning a repository that lives on a ZFS dataset is cheap: snapshot the
//! dataset, clone the snapshot, and the new working copy shares every block
//! with its origin until either side diverges. This module orchestrates that
//! workflow as four strictly sequential stages:
//!
//! 1. [`source`] classifies the clone source as a local dataset-backed
//!    directory or a remote URL.
//! 2. [`resolve`] derives the destination dataset name and mountpoint from
//!    the requested path through an ordered list of fallback strategies.
//! 3. [`provision`] materializes the destination: snapshot-and-clone for
//!    local sources, create-and-git-clone for remote ones.
//! 4. [`finalize`] applies the mountpoint and rewires post-clone metadata
//!    (git remotes, branch tracking, IDE project name).
//!
//! No stage revisits an earlier one, and nothing already created is rolled
//! back when a later stage fails; partially provisioned state is left in
//! place for manual inspection.
//!
//! # Exit Codes
//!
//! Fatal failures carry the process exit code through
//! [`CloneError::exit_code`]: `1` for validation and provisioning failures,
//! `2` for a pre-existing destination or unusable ZFS tooling, and `3` for
//! input shapes no resolution strategy covers. Post-provision problems only
//! warn and never change a successful exit code.

pub mod finalize;
pub mod provision;
pub mod resolve;
pub mod source;

use crate::{
    config::Settings,
    zfs::{DatasetId, ZfsError, ZfsProvider},
};

use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Clone `from` (path or URL) into a freshly provisioned dataset mounted at
/// `dest`.
///
/// # Errors
///
/// - Return [`CloneError::ZfsUnavailable`] if the backend tooling is broken.
/// - Return classification, resolution, provisioning, or finalization errors
///   as described on [`CloneError`].
#[instrument(skip(from, dest, settings, zfs), level = "debug")]
pub fn run(
    from: &str,
    dest: &Path,
    settings: &Settings,
    zfs: &impl ZfsProvider,
) -> Result<()> {
    zfs.check_available().map_err(CloneError::ZfsUnavailable)?;

    let dest = crate::path::absolutize(dest)?;
    let source = source::classify(from, zfs)?;
    let spec = resolve::resolve(&dest, &source, zfs)?;
    info!("resolved destination dataset {}", spec.dataset);

    let tag = snapshot_tag(&settings.snapshot_prefix);
    let outcome = provision::provision(&source, &spec, &tag, zfs)?;
    finalize::finalize(&source, &spec, &outcome, settings, zfs)?;

    info!(
        "cloned {from} into {} (dataset {})",
        spec.requested_path.display(),
        spec.dataset
    );

    Ok(())
}

/// Timestamp tag for clone snapshots: UTC, second precision, sortable.
fn snapshot_tag(prefix: &str) -> String {
    format!("{prefix}-{}", Utc::now().format("%Y%m%dT%H%M%SZ"))
}

/// All possible error types for the clone workflow.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    /// Source path does not exist or is not a directory.
    #[error("source {:?} does not exist or is not a directory", path.display())]
    SourceMissing { path: PathBuf },

    /// Source directory carries no version-control metadata.
    #[error("source {:?} is not a git repository", path.display())]
    SourceNotARepository { path: PathBuf },

    /// Source directory is not backed by a mounted dataset.
    #[error("source {:?} is not on a mounted ZFS dataset", path.display())]
    SourceNotOnZfs { path: PathBuf },

    /// Destination dataset already exists where it must not.
    #[error("destination dataset {dataset} already exists")]
    DestinationExists { dataset: DatasetId },

    /// Pre-existing destination dataset holds data.
    #[error("destination dataset {dataset} exists but its mountpoint {:?} is not empty", mountpoint.display())]
    DestinationNotEmpty {
        dataset: DatasetId,
        mountpoint: PathBuf,
    },

    /// Pre-existing destination dataset has no usable mountpoint.
    #[error("destination dataset {dataset} exists but is not mounted")]
    DestinationNotMounted { dataset: DatasetId },

    /// Derived destination name cannot be a real dataset.
    #[error(
        "derived name {dataset:?} is not a plausible dataset; \
         remote clones require the working directory to be dataset-backed"
    )]
    ImplausibleDataset { dataset: String },

    /// No resolution strategy covers this destination shape.
    #[error(
        "cannot derive a destination dataset for {:?}; \
         neither the path, its parent, nor the origin provides one", path.display()
    )]
    Unresolvable { path: PathBuf },

    /// Backend tooling missing or not functional.
    #[error("zfs is not usable: {0}")]
    ZfsUnavailable(#[source] ZfsError),

    /// Snapshot or clone failed; carries remediation guidance.
    #[error("{0}")]
    Provision(provision::ProvisionFailure),

    /// Mountpoint could not be applied to the provisioned dataset.
    #[error("failed to set mountpoint on {dataset}")]
    Mountpoint {
        dataset: DatasetId,
        #[source]
        source: ZfsError,
    },

    /// Storage backend interaction fails.
    #[error(transparent)]
    Zfs(#[from] ZfsError),

    /// Git interaction fails.
    #[error(transparent)]
    Git(#[from] crate::git::GitError),

    /// Filesystem plumbing fails.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CloneError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::DestinationExists { .. }
            | Self::DestinationNotEmpty { .. }
            | Self::DestinationNotMounted { .. }
            | Self::ZfsUnavailable(_) => 2,
            Self::Unresolvable { .. } => 3,
            _ => 1,
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = CloneError> = std::result::Result<T, E>;
