// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Recurring multi-remote workflows.
//!
//! Day-to-day plumbing around a repository with more than one remote:
//! `pull` brings the current branch up to date from everywhere without ever
//! creating a merge commit, and `sync` publishes the current branch
//! everywhere first and then does the same pull. Both operate on the
//! repository containing the current working directory.

use crate::git::{self, Result};

use tracing::{info, instrument};

/// Fast-forward-only pull from all remotes.
///
/// # Errors
///
/// - Return [`git::GitError`] if there is no repository, no remote, no
///   upstream, or the branch has diverged.
#[instrument(level = "debug")]
pub fn pull() -> Result<()> {
    let repo = git::discover_current()?;
    let branch = git::current_branch(&repo)?;
    info!("pulling {branch} from all remotes");
    git::fast_forward_pull(&repo)
}

/// Push the current branch to all remotes, then pull.
///
/// # Errors
///
/// - Return [`git::GitError`] as for [`pull`]; individual push rejections
///   only warn.
#[instrument(level = "debug")]
pub fn sync() -> Result<()> {
    let repo = git::discover_current()?;
    let branch = git::current_branch(&repo)?;
    info!("syncing {branch} with all remotes");
    git::push_current_branch_all(&repo)?;
    git::fast_forward_pull(&repo)
}
