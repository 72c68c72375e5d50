// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Mount table parsing.
//!
//! Reverse mountpoint lookup (path to backing dataset) reads the kernel
//! mount table. For ZFS mounts the device column is the dataset name itself,
//! so no extra translation step is needed.

use std::{
    env, fs, io,
    path::{Path, PathBuf},
};

pub(crate) const MOUNTS_OVERRIDE_ENV: &str = "ZGIT_MOUNTS_PATH";

/// One line of the mount table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MountEntry {
    pub(crate) device: String,
    pub(crate) point: PathBuf,
    pub(crate) fstype: String,
}

pub(crate) fn read_mount_table() -> io::Result<String> {
    if let Ok(path) = env::var(MOUNTS_OVERRIDE_ENV) {
        return fs::read_to_string(path);
    }

    fs::read_to_string("/proc/mounts")
}

pub(crate) fn parse_mounts(mounts: &str) -> Vec<MountEntry> {
    let mut entries = Vec::new();
    for line in mounts.lines() {
        let mut parts = line.split_whitespace();
        let (Some(device), Some(point), Some(fstype)) =
            (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };

        entries.push(MountEntry {
            device: unescape_mount_field(device),
            point: PathBuf::from(unescape_mount_field(point)),
            fstype: fstype.to_string(),
        });
    }

    entries
}

/// Mount entry backing `path`: the longest mountpoint that is a lexical
/// prefix of it, optionally restricted to one filesystem type.
pub(crate) fn backing_entry<'a>(
    entries: &'a [MountEntry],
    path: &Path,
    fstype: Option<&str>,
) -> Option<&'a MountEntry> {
    entries
        .iter()
        .filter(|entry| fstype.is_none_or(|fstype| entry.fstype == fstype))
        .filter(|entry| path.starts_with(&entry.point))
        .max_by_key(|entry| entry.point.as_os_str().len())
}

// The kernel escapes space, tab, newline, and backslash as octal triples.
fn unescape_mount_field(input: &str) -> String {
    let mut chars = input.chars().peekable();
    let mut output = String::with_capacity(input.len());

    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }

        let mut oct = String::new();
        for _ in 0..3 {
            match chars.peek() {
                Some(next) if next.is_ascii_digit() => oct.push(chars.next().unwrap()),
                _ => break,
            }
        }

        match u8::from_str_radix(&oct, 8) {
            Ok(value) if oct.len() == 3 => output.push(value as char),
            _ => {
                output.push('\\');
                output.push_str(&oct);
            }
        }
    }

    output
}
