// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Storage backend integration.
//!
//! Everything zgit knows about ZFS goes through the narrow [`ZfsProvider`]
//! interface so that dataset derivation and provisioning logic can be tested
//! against in-memory fakes. [`SystemZfs`] implements the interface over the
//! host `zfs` CLI plus the kernel mount table; `mounts` isolates the mount
//! table parsing and `system` isolates shell execution and output parsing.
//!
//! # Datasets
//!
//! A __dataset__ is a named, independently snapshot-able and mountable
//! storage unit. Dataset names form a slash-separated hierarchy rooted at a
//! pool name (`tank/ws/proj`), and every mounted dataset appears in the mount
//! table with its name in the device column. That reverse mapping from a
//! filesystem path to the dataset backing it is the backbone of destination
//! resolution.

mod mounts;
mod system;

pub use system::SystemZfs;

use std::path::{Path, PathBuf};

/// Name of a dataset in the storage backend's namespace.
///
/// The name is kept opaque apart from its slash-separated hierarchy, which
/// dataset derivation navigates through [`DatasetId::parent`] and
/// [`DatasetId::child`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetId(String);

impl DatasetId {
    /// Construct new dataset identifier.
    ///
    /// Performs no validation. Use [`DatasetId::is_plausible`] when the name
    /// comes from a heuristic rather than the backend itself.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Treat dataset identifier as string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parent dataset, if any.
    ///
    /// Pool roots (`tank`) have no parent.
    pub fn parent(&self) -> Option<DatasetId> {
        self.0.rsplit_once('/').map(|(parent, _)| Self(parent.into()))
    }

    /// Final component of the dataset name.
    pub fn basename(&self) -> &str {
        self.0.rsplit_once('/').map_or(self.0.as_str(), |(_, base)| base)
    }

    /// Child dataset under this one.
    pub fn child(&self, name: impl AsRef<str>) -> DatasetId {
        Self(format!("{}/{}", self.0, name.as_ref()))
    }

    /// Full snapshot name for a given tag.
    pub fn snapshot(&self, tag: impl AsRef<str>) -> String {
        format!("{}@{}", self.0, tag.as_ref())
    }

    /// Check that the name can possibly refer to a real dataset.
    ///
    /// Derivation heuristics build names out of mount table device fields,
    /// which may turn out to be block device paths, NFS addresses, or the
    /// reserved swap pseudo-device rather than datasets. Such names must be
    /// rejected before any provisioning side effect happens.
    pub fn is_plausible(&self) -> bool {
        !self.0.is_empty()
            && !self.0.starts_with('/')
            && !self.0.contains(':')
            && self.0 != "swap"
            && !self.0.starts_with("swap/")
            && !self.0.contains(char::is_whitespace)
    }
}

impl std::fmt::Display for DatasetId {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fmt.write_str(&self.0)
    }
}

impl From<&str> for DatasetId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Layer of indirection for storage backend access.
///
/// Methods are read-only queries unless documented otherwise. All mutating
/// operations act on the backend's shared dataset namespace; no locking is
/// performed, concurrent invocations against the same names are unguarded.
pub trait ZfsProvider {
    /// Verify that the backend tooling is present and functional.
    fn check_available(&self) -> Result<()>;

    /// Raw device field of the mount entry backing `path`, regardless of
    /// filesystem type.
    fn backing_device(&self, path: &Path) -> Result<Option<String>>;

    /// Dataset backing `path`, if its filesystem is a mounted dataset.
    ///
    /// The path itself does not need to exist; the lookup matches the longest
    /// mounted dataset root that is a lexical prefix of the path.
    fn backing_dataset(&self, path: &Path) -> Result<Option<DatasetId>>;

    /// Mountpoint of a dataset, or `None` when unmountable (`none`/`legacy`).
    fn mountpoint(&self, dataset: &DatasetId) -> Result<Option<PathBuf>>;

    /// Existence probe against the backend namespace.
    fn dataset_exists(&self, dataset: &DatasetId) -> Result<bool>;

    /// Take a recursive snapshot of `dataset` tagged `tag`.
    ///
    /// Returns the full snapshot name. (Mutates backend state.)
    fn snapshot_recursive(&self, dataset: &DatasetId, tag: &str) -> Result<String>;

    /// Clone `snapshot` to `target` without mounting it.
    ///
    /// The clone is created with `mountpoint=none` so that mounting stays
    /// governed by the finalization step. (Mutates backend state.)
    fn clone_snapshot(&self, snapshot: &str, target: &DatasetId) -> Result<()>;

    /// Create a fresh, empty dataset.
    ///
    /// With `mountpoint` given the dataset mounts there immediately;
    /// otherwise the backend's inherited default applies. (Mutates backend
    /// state.)
    fn create_dataset(&self, target: &DatasetId, mountpoint: Option<&Path>) -> Result<()>;

    /// Set an explicit mountpoint. (Mutates backend state.)
    fn set_mountpoint(&self, dataset: &DatasetId, path: &Path) -> Result<()>;

    /// Revert the mountpoint to the inherited default. (Mutates backend
    /// state.)
    fn inherit_mountpoint(&self, dataset: &DatasetId) -> Result<()>;

    /// Properties whose value is a `local` or `received` override on
    /// `dataset`, excluding everything merely inherited.
    fn local_properties(&self, dataset: &DatasetId) -> Result<Vec<(String, String)>>;

    /// Set a single property. (Mutates backend state.)
    fn set_property(&self, dataset: &DatasetId, property: &str, value: &str) -> Result<()>;

    /// Human-readable dump of the delegated permissions on `dataset`.
    fn allow_dump(&self, dataset: &DatasetId) -> Result<String>;
}

/// All possible error types for storage backend interaction.
#[derive(Debug, thiserror::Error)]
pub enum ZfsError {
    /// Backend tooling missing or not functional.
    #[error("zfs tooling unusable: {reason}")]
    Unavailable { reason: String },

    /// Backend command exited with a failure status.
    #[error("command `{command}` failed:\n{message}")]
    CommandFailed { command: String, message: String },

    /// Backend command output did not parse.
    #[error("cannot parse output of `{command}`: {reason}")]
    UnexpectedOutput { command: String, reason: String },

    /// Mount table or process plumbing failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Friendly result alias :3
pub type Result<T, E = ZfsError> = std::result::Result<T, E>;

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory [`ZfsProvider`] for unit tests.

    use super::*;
    use std::{
        cell::{Cell, RefCell},
        collections::BTreeMap,
    };

    /// Fake provider over plain maps, with an event log for asserting call
    /// order and side effects.
    #[derive(Debug, Default)]
    pub(crate) struct MemoryZfs {
        /// Mount table rows: device, mountpoint, is-zfs.
        pub(crate) mounts: RefCell<Vec<(String, PathBuf, bool)>>,
        /// Dataset name to mountpoint.
        pub(crate) datasets: RefCell<BTreeMap<String, Option<PathBuf>>>,
        /// Local/received property overrides per dataset.
        pub(crate) properties: RefCell<BTreeMap<String, Vec<(String, String)>>>,
        /// Mutating operations, in invocation order.
        pub(crate) log: RefCell<Vec<String>>,
        /// Make the next `clone_snapshot` fail.
        pub(crate) fail_clone: Cell<bool>,
        /// Mirror dataset mountpoints onto the real filesystem.
        pub(crate) create_dirs: Cell<bool>,
    }

    impl MemoryZfs {
        pub(crate) fn mount(&self, device: &str, point: impl Into<PathBuf>, is_zfs: bool) {
            let point = point.into();
            self.mounts
                .borrow_mut()
                .push((device.to_string(), point.clone(), is_zfs));
            if is_zfs {
                self.datasets
                    .borrow_mut()
                    .insert(device.to_string(), Some(point));
            }
        }

        pub(crate) fn log_contains(&self, needle: &str) -> bool {
            self.log.borrow().iter().any(|entry| entry.contains(needle))
        }

        fn default_mountpoint(&self, dataset: &DatasetId) -> Option<PathBuf> {
            let parent = dataset.parent()?;
            let datasets = self.datasets.borrow();
            let parent_mount = datasets.get(parent.as_str())?.clone()?;
            Some(parent_mount.join(dataset.basename()))
        }

        fn mirror_dir(&self, mountpoint: Option<&Path>) {
            if self.create_dirs.get() {
                if let Some(path) = mountpoint {
                    std::fs::create_dir_all(path).expect("mirror mountpoint dir");
                }
            }
        }
    }

    impl ZfsProvider for MemoryZfs {
        fn check_available(&self) -> Result<()> {
            Ok(())
        }

        fn backing_device(&self, path: &Path) -> Result<Option<String>> {
            let mounts = self.mounts.borrow();
            Ok(mounts
                .iter()
                .filter(|(_, point, _)| path.starts_with(point))
                .max_by_key(|(_, point, _)| point.as_os_str().len())
                .map(|(device, _, _)| device.clone()))
        }

        fn backing_dataset(&self, path: &Path) -> Result<Option<DatasetId>> {
            let mounts = self.mounts.borrow();
            Ok(mounts
                .iter()
                .filter(|(_, _, is_zfs)| *is_zfs)
                .filter(|(_, point, _)| path.starts_with(point))
                .max_by_key(|(_, point, _)| point.as_os_str().len())
                .map(|(device, _, _)| DatasetId::new(device.clone())))
        }

        fn mountpoint(&self, dataset: &DatasetId) -> Result<Option<PathBuf>> {
            Ok(self
                .datasets
                .borrow()
                .get(dataset.as_str())
                .cloned()
                .flatten())
        }

        fn dataset_exists(&self, dataset: &DatasetId) -> Result<bool> {
            Ok(self.datasets.borrow().contains_key(dataset.as_str()))
        }

        fn snapshot_recursive(&self, dataset: &DatasetId, tag: &str) -> Result<String> {
            let snapshot = dataset.snapshot(tag);
            self.log.borrow_mut().push(format!("snapshot -r {snapshot}"));
            Ok(snapshot)
        }

        fn clone_snapshot(&self, snapshot: &str, target: &DatasetId) -> Result<()> {
            if self.fail_clone.get() {
                return Err(ZfsError::CommandFailed {
                    command: format!("zfs clone -o mountpoint=none {snapshot} {target}"),
                    message: "permission denied".into(),
                });
            }

            self.log
                .borrow_mut()
                .push(format!("clone {snapshot} {target}"));
            self.datasets
                .borrow_mut()
                .insert(target.as_str().to_string(), None);
            Ok(())
        }

        fn create_dataset(&self, target: &DatasetId, mountpoint: Option<&Path>) -> Result<()> {
            let mountpoint = mountpoint
                .map(Path::to_path_buf)
                .or_else(|| self.default_mountpoint(target));
            self.log.borrow_mut().push(format!(
                "create {target} mountpoint={:?}",
                mountpoint.as_ref().map(|p| p.display().to_string())
            ));
            self.mirror_dir(mountpoint.as_deref());
            self.datasets
                .borrow_mut()
                .insert(target.as_str().to_string(), mountpoint);
            Ok(())
        }

        fn set_mountpoint(&self, dataset: &DatasetId, path: &Path) -> Result<()> {
            self.log
                .borrow_mut()
                .push(format!("set mountpoint={} {dataset}", path.display()));
            self.mirror_dir(Some(path));
            self.datasets
                .borrow_mut()
                .insert(dataset.as_str().to_string(), Some(path.to_path_buf()));
            Ok(())
        }

        fn inherit_mountpoint(&self, dataset: &DatasetId) -> Result<()> {
            let mountpoint = self.default_mountpoint(dataset);
            self.log
                .borrow_mut()
                .push(format!("inherit mountpoint {dataset}"));
            self.mirror_dir(mountpoint.as_deref());
            self.datasets
                .borrow_mut()
                .insert(dataset.as_str().to_string(), mountpoint);
            Ok(())
        }

        fn local_properties(&self, dataset: &DatasetId) -> Result<Vec<(String, String)>> {
            Ok(self
                .properties
                .borrow()
                .get(dataset.as_str())
                .cloned()
                .unwrap_or_default())
        }

        fn set_property(&self, dataset: &DatasetId, property: &str, value: &str) -> Result<()> {
            self.log
                .borrow_mut()
                .push(format!("set {property}={value} {dataset}"));
            Ok(())
        }

        fn allow_dump(&self, dataset: &DatasetId) -> Result<String> {
            Ok(format!("---- Permissions on {dataset} ----\n"))
        }
    }
}
