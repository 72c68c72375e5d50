// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Storage backend access through the host `zfs` CLI.

use crate::zfs::{
    mounts::{backing_entry, parse_mounts, read_mount_table},
    DatasetId, Result, ZfsError, ZfsProvider,
};

use std::{
    path::{Path, PathBuf},
    process::Command,
};
use tracing::debug;

/// [`ZfsProvider`] implementation over the host `zfs` command.
#[derive(Debug, Clone)]
pub struct SystemZfs {
    zfs_bin: PathBuf,
}

impl SystemZfs {
    /// Construct new provider invoking the given `zfs` binary.
    pub fn new(zfs_bin: impl Into<PathBuf>) -> Self {
        Self {
            zfs_bin: zfs_bin.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<String> {
        let command = render_command(&self.zfs_bin, args);
        debug!("run {command}");

        let output = Command::new(&self.zfs_bin).args(args).output()?;
        let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
        let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();

        if !output.status.success() {
            return Err(ZfsError::CommandFailed {
                command,
                message: chomp(if stderr.is_empty() { stdout } else { stderr }),
            });
        }

        Ok(chomp(stdout))
    }
}

impl ZfsProvider for SystemZfs {
    fn check_available(&self) -> Result<()> {
        // `zfs version` both proves the binary exists and that the kernel
        // module answers.
        self.run(&["version"]).map(|_| ()).map_err(|error| ZfsError::Unavailable {
            reason: error.to_string(),
        })
    }

    fn backing_device(&self, path: &Path) -> Result<Option<String>> {
        let table = read_mount_table()?;
        let entries = parse_mounts(&table);
        Ok(backing_entry(&entries, path, None).map(|entry| entry.device.clone()))
    }

    fn backing_dataset(&self, path: &Path) -> Result<Option<DatasetId>> {
        let table = read_mount_table()?;
        let entries = parse_mounts(&table);
        Ok(backing_entry(&entries, path, Some("zfs"))
            .map(|entry| DatasetId::new(entry.device.clone())))
    }

    fn mountpoint(&self, dataset: &DatasetId) -> Result<Option<PathBuf>> {
        let value = self.run(&["get", "-H", "-o", "value", "mountpoint", dataset.as_str()])?;
        Ok(parse_mountpoint_value(&value))
    }

    fn dataset_exists(&self, dataset: &DatasetId) -> Result<bool> {
        match self.run(&["list", "-H", "-o", "name", dataset.as_str()]) {
            Ok(_) => Ok(true),
            Err(ZfsError::CommandFailed { message, .. })
                if message.contains("does not exist") =>
            {
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    fn snapshot_recursive(&self, dataset: &DatasetId, tag: &str) -> Result<String> {
        let snapshot = dataset.snapshot(tag);
        self.run(&["snapshot", "-r", &snapshot])?;
        Ok(snapshot)
    }

    fn clone_snapshot(&self, snapshot: &str, target: &DatasetId) -> Result<()> {
        self.run(&["clone", "-o", "mountpoint=none", snapshot, target.as_str()])?;
        Ok(())
    }

    fn create_dataset(&self, target: &DatasetId, mountpoint: Option<&Path>) -> Result<()> {
        match mountpoint {
            Some(path) => {
                let option = format!("mountpoint={}", path.display());
                self.run(&["create", "-o", &option, target.as_str()])?;
            }
            None => {
                self.run(&["create", target.as_str()])?;
            }
        }

        Ok(())
    }

    fn set_mountpoint(&self, dataset: &DatasetId, path: &Path) -> Result<()> {
        let assignment = format!("mountpoint={}", path.display());
        self.run(&["set", &assignment, dataset.as_str()])?;
        Ok(())
    }

    fn inherit_mountpoint(&self, dataset: &DatasetId) -> Result<()> {
        self.run(&["inherit", "mountpoint", dataset.as_str()])?;
        Ok(())
    }

    fn local_properties(&self, dataset: &DatasetId) -> Result<Vec<(String, String)>> {
        let command = render_command(&self.zfs_bin, &["get", "all", dataset.as_str()]);
        let output = self.run(&[
            "get",
            "-H",
            "-p",
            "-s",
            "local,received",
            "-o",
            "property,value",
            "all",
            dataset.as_str(),
        ])?;

        parse_property_table(&output).map_err(|reason| ZfsError::UnexpectedOutput {
            command,
            reason,
        })
    }

    fn set_property(&self, dataset: &DatasetId, property: &str, value: &str) -> Result<()> {
        let assignment = format!("{property}={value}");
        self.run(&["set", &assignment, dataset.as_str()])?;
        Ok(())
    }

    fn allow_dump(&self, dataset: &DatasetId) -> Result<String> {
        self.run(&["allow", dataset.as_str()])
    }
}

/// Interpret the value column of `zfs get mountpoint`.
///
/// `none` and `legacy` both mean the dataset has no usable mountpoint of its
/// own; `-` shows up for snapshots and unset properties.
pub(crate) fn parse_mountpoint_value(value: &str) -> Option<PathBuf> {
    match value.trim() {
        "" | "-" | "none" | "legacy" => None,
        path => Some(PathBuf::from(path)),
    }
}

/// Parse the tab-separated `property<TAB>value` projection of `zfs get`.
pub(crate) fn parse_property_table(output: &str) -> std::result::Result<Vec<(String, String)>, String> {
    let mut properties = Vec::new();
    for line in output.lines() {
        if line.trim().is_empty() {
            continue;
        }

        let (property, value) = line
            .split_once('\t')
            .ok_or_else(|| format!("line without tab separator: {line:?}"))?;
        properties.push((property.to_string(), value.to_string()));
    }

    Ok(properties)
}

fn render_command(bin: &Path, args: &[&str]) -> String {
    let mut rendered = bin.display().to_string();
    for arg in args {
        rendered.push(' ');
        rendered.push_str(arg);
    }

    rendered
}

// INVARIANT: Chomp trailing newlines.
fn chomp(message: String) -> String {
    message
        .strip_suffix("\r\n")
        .or(message.strip_suffix('\n'))
        .map(ToString::to_string)
        .unwrap_or(message)
}
