// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

//! Git operations.
//!
//! Thin wrappers over libgit2 for the handful of repository operations zgit
//! needs: cloning from a remote URL into a provisioned directory, enumerating
//! remotes for fetch and push, and moving the current branch forward when its
//! history is a strict linear extension of upstream (a __fast-forward__ — no
//! merge commit is ever created here).
//!
//! Credentials are resolved through `auth-git2` using the user's existing
//! Git configuration, ssh-agent, and credential helpers.

use auth_git2::GitAuthenticator;
use git2::{
    build::{CheckoutBuilder, RepoBuilder},
    Branch, Config, FetchOptions, RemoteCallbacks, Repository,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::Path, time};
use tracing::{debug, info, instrument, warn};

/// Clone a repository from `url` into `path`.
///
/// The target directory may already exist as long as it is empty; this is
/// exactly the state a freshly mounted dataset is in. Transfer progress is
/// displayed through a progress bar.
///
/// # Errors
///
/// - Return [`GitError::Git2`] if libgit2 operations fail.
/// - Return [`GitError::IndicatifStyleTemplate`] if the progress bar style
///   cannot be built.
#[instrument(skip(url, path), level = "debug")]
pub fn clone_into(url: impl AsRef<str>, path: impl AsRef<Path>) -> Result<Repository> {
    let url = url.as_ref();
    info!("clone {url} into {:?}", path.as_ref().display());

    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<50}  [{wide_bar:.yellow/blue}]",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);
    bar.set_message(url.to_string());
    bar.enable_steady_tick(time::Duration::from_millis(100));

    let authenticator = GitAuthenticator::default();
    let config = Config::open_default()?;

    let progress = bar.clone();
    let mut throttle = time::Instant::now();
    let mut rc = RemoteCallbacks::new();
    rc.credentials(authenticator.credentials(&config));
    rc.transfer_progress(move |stats| {
        let bar_size = stats.total_objects() as u64;
        let bar_pos = stats.received_objects() as u64;
        if throttle.elapsed() > time::Duration::from_millis(10) {
            throttle = time::Instant::now();
            progress.set_length(bar_size);
            progress.set_position(bar_pos);
        }
        true
    });

    let mut fo = FetchOptions::new();
    fo.remote_callbacks(rc);
    let repository = RepoBuilder::new()
        .fetch_options(fo)
        .clone(url, path.as_ref())?;
    bar.finish_and_clear();

    Ok(repository)
}

/// Open the repository containing the current working directory.
///
/// # Errors
///
/// - Return [`GitError::Git2`] if no repository is found upward of the
///   current working directory.
pub fn discover_current() -> Result<Repository> {
    Ok(Repository::discover(".")?)
}

/// Name of the branch HEAD currently points at.
///
/// # Errors
///
/// - Return [`GitError::DetachedHead`] if HEAD does not point at a branch.
pub fn current_branch(repo: &Repository) -> Result<String> {
    let head = repo.head()?;
    if !head.is_branch() {
        return Err(GitError::DetachedHead);
    }

    head.shorthand()
        .map(ToString::to_string)
        .ok_or(GitError::DetachedHead)
}

/// Fetch every configured remote, then fast-forward the current branch to
/// its upstream.
///
/// A branch that has diverged from upstream is left untouched and reported
/// as an error; this operation never creates a merge commit.
///
/// # Errors
///
/// - Return [`GitError::NoRemotes`] if the repository has no remotes.
/// - Return [`GitError::NoUpstream`] if the current branch tracks nothing.
/// - Return [`GitError::Diverged`] if upstream is not a linear extension of
///   the current branch.
/// - Return [`GitError::Git2`] if libgit2 operations fail.
#[instrument(skip(repo), level = "debug")]
pub fn fast_forward_pull(repo: &Repository) -> Result<()> {
    let branch = current_branch(repo)?;
    fetch_all_remotes(repo)?;

    let head_ref = repo.find_reference(&format!("refs/heads/{branch}"))?;
    let local = Branch::wrap(head_ref);
    let upstream = local.upstream().map_err(|_| GitError::NoUpstream {
        branch: branch.clone(),
    })?;
    let target = upstream
        .get()
        .target()
        .ok_or_else(|| GitError::NoUpstream {
            branch: branch.clone(),
        })?;

    let annotated = repo.reference_to_annotated_commit(upstream.get())?;
    let (analysis, _) = repo.merge_analysis(&[&annotated])?;
    if analysis.is_up_to_date() {
        info!("{branch} already up to date");
        return Ok(());
    }

    if !analysis.is_fast_forward() {
        return Err(GitError::Diverged { branch });
    }

    let refname = format!("refs/heads/{branch}");
    let mut reference = repo.find_reference(&refname)?;
    reference.set_target(target, "zgit: fast-forward")?;
    repo.set_head(&refname)?;
    repo.checkout_head(Some(CheckoutBuilder::default().force()))?;
    info!("fast-forwarded {branch} to {target}");

    Ok(())
}

/// Push the current branch to every configured remote.
///
/// A remote that rejects the push is reported and skipped; the remaining
/// remotes are still attempted.
///
/// # Errors
///
/// - Return [`GitError::NoRemotes`] if the repository has no remotes.
/// - Return [`GitError::DetachedHead`] if HEAD does not point at a branch.
#[instrument(skip(repo), level = "debug")]
pub fn push_current_branch_all(repo: &Repository) -> Result<()> {
    let branch = current_branch(repo)?;
    let refspec = format!("refs/heads/{branch}:refs/heads/{branch}");
    let remotes = remote_names(repo)?;

    let authenticator = GitAuthenticator::default();
    let config = repo.config()?;
    for name in &remotes {
        info!("push {branch} to {name}");
        let mut remote = repo.find_remote(name)?;
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        let mut options = git2::PushOptions::new();
        options.remote_callbacks(rc);

        if let Err(error) = remote.push(&[refspec.as_str()], Some(&mut options)) {
            warn!("push to {name} failed: {error}");
        }
    }

    Ok(())
}

fn fetch_all_remotes(repo: &Repository) -> Result<()> {
    let remotes = remote_names(repo)?;
    let authenticator = GitAuthenticator::default();
    let config = repo.config()?;

    for name in &remotes {
        debug!("fetch {name}");
        let mut remote = repo.find_remote(name)?;
        let mut rc = RemoteCallbacks::new();
        rc.credentials(authenticator.credentials(&config));
        let mut options = FetchOptions::new();
        options.remote_callbacks(rc);

        // Empty refspec list means "use the remote's configured refspecs".
        remote.fetch(&[] as &[&str], Some(&mut options), None)?;
    }

    Ok(())
}

fn remote_names(repo: &Repository) -> Result<Vec<String>> {
    let remotes = repo.remotes()?;
    let names: Vec<String> = remotes.iter().flatten().map(ToString::to_string).collect();
    if names.is_empty() {
        return Err(GitError::NoRemotes);
    }

    Ok(names)
}

/// All possible error types for Git interaction.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),

    /// Style template cannot be set for progress bars.
    #[error(transparent)]
    IndicatifStyleTemplate(#[from] indicatif::style::TemplateError),

    /// HEAD does not point at a branch.
    #[error("HEAD is detached; check out a branch first")]
    DetachedHead,

    /// Current branch has no upstream configured.
    #[error("branch {branch} tracks no upstream")]
    NoUpstream { branch: String },

    /// Current branch and upstream have diverged.
    #[error("branch {branch} has diverged from upstream; refusing to merge")]
    Diverged { branch: String },

    /// Repository has no remotes to talk to.
    #[error("repository has no configured remotes")]
    NoRemotes,
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use git2::RepositoryInitOptions;
    use tempfile::tempdir;

    fn init_repo(path: &Path) -> Repository {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head("main");
        let repo = Repository::init_opts(path, &opts).unwrap();

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config().unwrap();
        config.set_str("user.name", "John Doe").unwrap();
        config.set_str("user.email", "john@doe.com").unwrap();

        repo
    }

    fn commit_file(repo: &Repository, name: &str, contents: &str) {
        let workdir = repo.workdir().unwrap();
        std::fs::write(workdir.join(name), contents).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(name)).unwrap();
        let tree_oid = index.write_tree().unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(tree_oid).unwrap();

        let signature = repo.signature().unwrap();
        let parents = repo
            .head()
            .ok()
            .and_then(|head| head.target())
            .and_then(|oid| repo.find_commit(oid).ok());
        let parents: Vec<_> = parents.iter().collect();
        repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &format!("chore: add {name}"),
            &tree,
            &parents,
        )
        .unwrap();
    }

    #[test]
    fn current_branch_reports_head_branch() {
        let dir = tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "README.md", "hello");

        assert_eq!(current_branch(&repo).unwrap(), "main");
    }

    #[test]
    fn current_branch_rejects_detached_head() {
        let dir = tempdir().unwrap();
        let repo = init_repo(dir.path());
        commit_file(&repo, "README.md", "hello");

        let oid = repo.head().unwrap().target().unwrap();
        repo.set_head_detached(oid).unwrap();

        assert!(matches!(current_branch(&repo), Err(GitError::DetachedHead)));
    }

    #[test]
    fn clone_into_populates_empty_directory() {
        let dir = tempdir().unwrap();
        let origin_path = dir.path().join("origin");
        let origin = init_repo(&origin_path);
        commit_file(&origin, "README.md", "hello");

        let target = dir.path().join("copy");
        std::fs::create_dir(&target).unwrap();

        let url = format!("file://{}", origin_path.display());
        let cloned = clone_into(&url, &target).unwrap();

        assert!(target.join(".git").exists());
        assert!(target.join("README.md").exists());
        assert_eq!(current_branch(&cloned).unwrap(), "main");
    }

    #[test]
    fn fast_forward_pull_advances_behind_branch() {
        let dir = tempdir().unwrap();
        let origin_path = dir.path().join("origin");
        let origin = init_repo(&origin_path);
        commit_file(&origin, "README.md", "hello");

        let target = dir.path().join("copy");
        let url = format!("file://{}", origin_path.display());
        let cloned = clone_into(&url, &target).unwrap();

        // New upstream commit after the clone.
        commit_file(&origin, "CHANGELOG.md", "news");
        let upstream_tip = origin.head().unwrap().target().unwrap();

        fast_forward_pull(&cloned).unwrap();
        assert_eq!(cloned.head().unwrap().target().unwrap(), upstream_tip);
        assert!(target.join("CHANGELOG.md").exists());
    }

    #[test]
    fn fast_forward_pull_rejects_diverged_history() {
        let dir = tempdir().unwrap();
        let origin_path = dir.path().join("origin");
        let origin = init_repo(&origin_path);
        commit_file(&origin, "README.md", "hello");

        let target = dir.path().join("copy");
        let url = format!("file://{}", origin_path.display());
        let cloned = clone_into(&url, &target).unwrap();

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = cloned.config().unwrap();
        config.set_str("user.name", "John Doe").unwrap();
        config.set_str("user.email", "john@doe.com").unwrap();

        // Both sides move forward independently.
        commit_file(&origin, "CHANGELOG.md", "upstream news");
        commit_file(&cloned, "NOTES.md", "local news");

        assert!(matches!(
            fast_forward_pull(&cloned),
            Err(GitError::Diverged { .. })
        ));
    }

    #[test]
    fn remote_names_requires_at_least_one_remote() {
        let dir = tempdir().unwrap();
        let repo = init_repo(dir.path());

        assert!(matches!(remote_names(&repo), Err(GitError::NoRemotes)));
    }
}
