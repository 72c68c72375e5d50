// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Git workflow automation for repositories living on ZFS datasets.
//!
//! The heart of zgit is [`clone::run`]: cloning a repository whose working
//! tree sits on a ZFS dataset by snapshotting and cloning the dataset rather
//! than copying files, so the new working copy shares storage with its
//! origin. Remote URLs are supported too, in which case a fresh dataset is
//! provisioned and populated with an ordinary git clone. Around the clone
//! live the small recurring workflows in [`workflow`]: fast-forward pulling
//! from and pushing to every configured remote.
//!
//! All ZFS access flows through the [`zfs::ZfsProvider`] interface so the
//! decision logic stays testable without a pool at hand.

pub mod clone;
pub mod config;
pub mod git;
pub mod netbeans;
pub mod path;
pub mod workflow;
pub mod zfs;

pub use clone::CloneError;
pub use config::Settings;
pub use zfs::{DatasetId, SystemZfs, ZfsProvider};
