// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Destination provisioning.
//!
//! Local sources get the cheap path: a recursive, timestamp-tagged snapshot
//! of the origin dataset followed by a clone of that snapshot, unmounted so
//! that finalization governs where it appears. Remote sources get an empty
//! dataset (fresh, or a reused pre-existing empty one) and an ordinary git
//! clone into its mounted directory — the one place remote sourcing differs
//! qualitatively from local.
//!
//! Snapshot and clone failures usually come down to missing ZFS delegation,
//! so the error carries the exact commands attempted, a suggested minimal
//! `zfs allow` grant set, and a dump of the current permissions on both ends
//! for diagnosis. That payload is part of the contract, not incidental
//! logging.

use crate::{
    clone::{resolve::DestinationSpec, source::SourceSpec, CloneError, Result},
    zfs::{DatasetId, ZfsError, ZfsProvider},
};

use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Properties governed by finalization rather than property copying.
const MOUNT_GOVERNED_PROPERTIES: [&str; 2] = ["canmount", "mountpoint"];

/// Outcome of provisioning, consumed by finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionResult {
    /// Dataset that now exists.
    pub dataset: DatasetId,

    /// Where the dataset is mounted, when provisioning already mounted it.
    pub mountpoint: Option<PathBuf>,

    /// Remote provisioning applies the mountpoint at creation time;
    /// finalization must not apply it again.
    pub mountpoint_applied: bool,
}

/// Materialize the destination dataset and populate it.
///
/// # Errors
///
/// - Return [`CloneError::DestinationExists`] if a local clone would collide
///   with an existing dataset.
/// - Return [`CloneError::DestinationNotEmpty`] if a pre-existing remote
///   target holds data.
/// - Return [`CloneError::Provision`] if snapshot or clone fails, with
///   remediation guidance attached.
#[instrument(skip(source, dest, tag, zfs), level = "debug")]
pub fn provision(
    source: &SourceSpec,
    dest: &DestinationSpec,
    tag: &str,
    zfs: &impl ZfsProvider,
) -> Result<ProvisionResult> {
    match source {
        SourceSpec::Local { dataset, .. } => provision_local(dataset, dest, tag, zfs),
        SourceSpec::Remote { url } => provision_remote(url, dest, zfs),
    }
}

fn provision_local(
    source_dataset: &DatasetId,
    dest: &DestinationSpec,
    tag: &str,
    zfs: &impl ZfsProvider,
) -> Result<ProvisionResult> {
    // INVARIANT: Collision check precedes the snapshot; a name clash must
    // leave the source untouched.
    if zfs.dataset_exists(&dest.dataset)? {
        return Err(CloneError::DestinationExists {
            dataset: dest.dataset.clone(),
        });
    }

    let snapshot_name = source_dataset.snapshot(tag);
    let snapshot = zfs
        .snapshot_recursive(source_dataset, tag)
        .map_err(|cause| clone_failure(source_dataset, dest, &snapshot_name, cause, zfs))?;
    info!("snapshot {snapshot} taken");

    zfs.clone_snapshot(&snapshot, &dest.dataset)
        .map_err(|cause| clone_failure(source_dataset, dest, &snapshot, cause, zfs))?;
    info!("cloned {snapshot} to {}", dest.dataset);

    copy_local_properties(source_dataset, &dest.dataset, zfs)?;

    Ok(ProvisionResult {
        dataset: dest.dataset.clone(),
        mountpoint: None,
        mountpoint_applied: false,
    })
}

fn provision_remote(
    url: &str,
    dest: &DestinationSpec,
    zfs: &impl ZfsProvider,
) -> Result<ProvisionResult> {
    let mountpoint = prepare_remote_dataset(dest, zfs)?;
    crate::git::clone_into(url, &mountpoint)?;

    Ok(ProvisionResult {
        dataset: dest.dataset.clone(),
        mountpoint: Some(mountpoint),
        mountpoint_applied: true,
    })
}

/// Ensure the remote clone target exists as an empty, mounted dataset and
/// return its mountpoint.
///
/// A pre-existing dataset is reused only when its mountpoint directory is
/// empty; there is no snapshot/clone relationship to protect, but silently
/// cloning into occupied space would be destructive.
pub(crate) fn prepare_remote_dataset(
    dest: &DestinationSpec,
    zfs: &impl ZfsProvider,
) -> Result<PathBuf> {
    if zfs.dataset_exists(&dest.dataset)? {
        let current = zfs
            .mountpoint(&dest.dataset)?
            .ok_or_else(|| CloneError::DestinationNotMounted {
                dataset: dest.dataset.clone(),
            })?;

        if !current.is_dir() || std::fs::read_dir(&current)?.next().is_some() {
            return Err(CloneError::DestinationNotEmpty {
                dataset: dest.dataset.clone(),
                mountpoint: current,
            });
        }

        info!("reusing empty dataset {}", dest.dataset);
        if let Some(requested) = &dest.mountpoint_override {
            if requested != &current {
                zfs.set_mountpoint(&dest.dataset, requested)?;
                return Ok(requested.clone());
            }
        }

        return Ok(current);
    }

    zfs.create_dataset(&dest.dataset, dest.mountpoint_override.as_deref())?;
    info!("created empty dataset {}", dest.dataset);

    match &dest.mountpoint_override {
        Some(requested) => Ok(requested.clone()),
        None => zfs
            .mountpoint(&dest.dataset)?
            .ok_or_else(|| CloneError::DestinationNotMounted {
                dataset: dest.dataset.clone(),
            }),
    }
}

/// Best-effort copy of the source's explicit property overrides.
///
/// Only `local` and `received` values travel; inherited defaults re-derive
/// on the clone, and mount-affecting properties stay with finalization.
fn copy_local_properties(
    source_dataset: &DatasetId,
    target: &DatasetId,
    zfs: &impl ZfsProvider,
) -> Result<()> {
    let properties = match zfs.local_properties(source_dataset) {
        Ok(properties) => properties,
        Err(error) => {
            warn!("cannot read properties of {source_dataset}: {error}");
            return Ok(());
        }
    };

    for (property, value) in properties {
        if MOUNT_GOVERNED_PROPERTIES.contains(&property.as_str()) {
            continue;
        }

        if let Err(error) = zfs.set_property(target, &property, &value) {
            warn!("cannot copy property {property}={value} to {target}: {error}");
        }
    }

    Ok(())
}

fn clone_failure(
    source_dataset: &DatasetId,
    dest: &DestinationSpec,
    snapshot: &str,
    cause: ZfsError,
    zfs: &impl ZfsProvider,
) -> CloneError {
    let parent = dest.dataset.parent().unwrap_or_else(|| dest.dataset.clone());
    let user = std::env::var("USER").unwrap_or_else(|_| "<user>".into());

    CloneError::Provision(ProvisionFailure {
        dataset: dest.dataset.clone(),
        commands: vec![
            format!("zfs snapshot -r {snapshot}"),
            format!("zfs clone -o mountpoint=none {snapshot} {}", dest.dataset),
        ],
        suggested_grants: vec![
            format!("zfs allow -u {user} snapshot,clone {source_dataset}"),
            format!("zfs allow -u {user} create,mount,clone {parent}"),
        ],
        source_permissions: zfs
            .allow_dump(source_dataset)
            .unwrap_or_else(|error| format!("<unavailable: {error}>")),
        parent_permissions: zfs
            .allow_dump(&parent)
            .unwrap_or_else(|error| format!("<unavailable: {error}>")),
        cause,
    })
}

/// Diagnostic payload for a failed snapshot/clone.
#[derive(Debug)]
pub struct ProvisionFailure {
    pub dataset: DatasetId,
    pub commands: Vec<String>,
    pub suggested_grants: Vec<String>,
    pub source_permissions: String,
    pub parent_permissions: String,
    pub cause: ZfsError,
}

impl std::fmt::Display for ProvisionFailure {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(fmt, "failed to provision {}: {}", self.dataset, self.cause)?;
        writeln!(fmt, "commands attempted:")?;
        for command in &self.commands {
            writeln!(fmt, "  {command}")?;
        }
        writeln!(fmt, "suggested permission grants:")?;
        for grant in &self.suggested_grants {
            writeln!(fmt, "  {grant}")?;
        }
        writeln!(fmt, "current permissions on the source:")?;
        writeln!(fmt, "{}", self.source_permissions)?;
        writeln!(fmt, "current permissions on the destination parent:")?;
        write!(fmt, "{}", self.parent_permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zfs::testing::MemoryZfs;
    use pretty_assertions::assert_eq;

    fn local_source(zfs: &MemoryZfs) -> SourceSpec {
        zfs.mount("tank/ws", "/ws", true);
        zfs.mount("tank/ws/proj", "/ws/proj", true);
        SourceSpec::Local {
            path: PathBuf::from("/ws/proj"),
            dataset: DatasetId::new("tank/ws/proj"),
        }
    }

    fn dest(dataset: &str, requested: &str) -> DestinationSpec {
        DestinationSpec {
            requested_path: PathBuf::from(requested),
            dataset: DatasetId::new(dataset),
            mountpoint_override: Some(PathBuf::from(requested)),
        }
    }

    #[test]
    fn local_snapshot_strictly_precedes_clone() {
        let zfs = MemoryZfs::default();
        let source = local_source(&zfs);

        let outcome =
            provision(&source, &dest("tank/ws/proj2", "/tmp/proj2"), "zgit-t0", &zfs).unwrap();
        assert_eq!(outcome.dataset, DatasetId::new("tank/ws/proj2"));
        assert!(!outcome.mountpoint_applied);

        let log = zfs.log.borrow();
        assert_eq!(
            *log,
            vec![
                "snapshot -r tank/ws/proj@zgit-t0".to_string(),
                "clone tank/ws/proj@zgit-t0 tank/ws/proj2".to_string(),
            ]
        );
    }

    #[test]
    fn local_collision_fails_before_any_snapshot() {
        let zfs = MemoryZfs::default();
        let source = local_source(&zfs);
        zfs.mount("tank/ws/proj2", "/ws/proj2", true);

        let error = provision(&source, &dest("tank/ws/proj2", "/tmp/proj2"), "zgit-t0", &zfs)
            .unwrap_err();
        assert!(matches!(error, CloneError::DestinationExists { .. }));
        assert_eq!(error.exit_code(), 2);
        assert!(zfs.log.borrow().is_empty());
    }

    #[test]
    fn reprovisioning_the_same_dataset_fails_without_mutation() {
        let zfs = MemoryZfs::default();
        let source = local_source(&zfs);
        let spec = dest("tank/ws/proj2", "/tmp/proj2");

        provision(&source, &spec, "zgit-t0", &zfs).unwrap();
        let entries_after_first = zfs.log.borrow().len();

        let error = provision(&source, &spec, "zgit-t1", &zfs).unwrap_err();
        assert!(matches!(error, CloneError::DestinationExists { .. }));
        assert_eq!(zfs.log.borrow().len(), entries_after_first);
    }

    #[test]
    fn clone_failure_carries_remediation_payload() {
        let zfs = MemoryZfs::default();
        let source = local_source(&zfs);
        zfs.fail_clone.set(true);

        let error = provision(&source, &dest("tank/ws/proj2", "/tmp/proj2"), "zgit-t0", &zfs)
            .unwrap_err();
        let CloneError::Provision(failure) = error else {
            panic!("expected provision failure, got {error:?}");
        };

        let report = failure.to_string();
        assert!(report.contains("zfs snapshot -r tank/ws/proj@zgit-t0"));
        assert!(report.contains("zfs clone -o mountpoint=none tank/ws/proj@zgit-t0 tank/ws/proj2"));
        assert!(report.contains("zfs allow"));
        assert!(report.contains("tank/ws"));
    }

    #[test]
    fn property_copy_skips_mount_governed_properties() {
        let zfs = MemoryZfs::default();
        let source = local_source(&zfs);
        zfs.properties.borrow_mut().insert(
            "tank/ws/proj".into(),
            vec![
                ("compression".into(), "zstd".into()),
                ("mountpoint".into(), "/ws/proj".into()),
                ("canmount".into(), "on".into()),
                ("com.example:note".into(), "keep me".into()),
            ],
        );

        provision(&source, &dest("tank/ws/proj2", "/tmp/proj2"), "zgit-t0", &zfs).unwrap();

        assert!(zfs.log_contains("set compression=zstd tank/ws/proj2"));
        assert!(zfs.log_contains("set com.example:note=keep me tank/ws/proj2"));
        assert!(!zfs.log_contains("set mountpoint="));
        assert!(!zfs.log_contains("set canmount="));
    }

    #[test]
    fn remote_target_reuses_pre_existing_empty_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let mount = dir.path().join("repo");
        std::fs::create_dir(&mount).unwrap();

        let zfs = MemoryZfs::default();
        zfs.mount("tank/work/repo", &mount, true);

        let spec = DestinationSpec {
            requested_path: mount.clone(),
            dataset: DatasetId::new("tank/work/repo"),
            mountpoint_override: None,
        };

        let result = prepare_remote_dataset(&spec, &zfs).unwrap();
        assert_eq!(result, mount);
        // Reuse, not re-create.
        assert!(!zfs.log_contains("create"));
    }

    #[test]
    fn remote_target_rejects_occupied_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let mount = dir.path().join("repo");
        std::fs::create_dir(&mount).unwrap();
        std::fs::write(mount.join("occupied.txt"), "data").unwrap();

        let zfs = MemoryZfs::default();
        zfs.mount("tank/work/repo", &mount, true);

        let spec = DestinationSpec {
            requested_path: mount.clone(),
            dataset: DatasetId::new("tank/work/repo"),
            mountpoint_override: None,
        };

        let error = prepare_remote_dataset(&spec, &zfs).unwrap_err();
        assert!(matches!(error, CloneError::DestinationNotEmpty { .. }));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn remote_target_creates_missing_dataset_with_override() {
        let dir = tempfile::tempdir().unwrap();
        let mount = dir.path().join("repo");

        let zfs = MemoryZfs::default();
        zfs.create_dirs.set(true);
        zfs.mount("tank/work", dir.path(), true);

        let spec = DestinationSpec {
            requested_path: mount.clone(),
            dataset: DatasetId::new("tank/work/repo"),
            mountpoint_override: Some(mount.clone()),
        };

        let result = prepare_remote_dataset(&spec, &zfs).unwrap();
        assert_eq!(result, mount);
        assert!(mount.is_dir());
        assert!(zfs.log_contains("create tank/work/repo"));
    }
}
