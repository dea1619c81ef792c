// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Multi-branch checkouts sharing one object store.
//!
//! The [`BranchWorktreeCloner`] materializes a local checkout of a remote
//! repository for any requested branch, while keeping exactly one full clone
//! per repository around.
//!
//! # How It Works
//!
//! The default branch of the remote (whatever its symbolic HEAD points at) is
//! shallow cloned into `<root>/<owner>/<name>/<default>`. That checkout owns the
//! real Git directory, and thus the object database. A symbolic link at
//! `<root>/<owner>/<name>/.git` points at it, so Git commands run from the
//! repository root behave as if run from the default branch.
//!
//! Every other branch is fetched shallowly into the default checkout, then
//! attached as a linked worktree at `<root>/<owner>/<name>/<branch>`. Linked
//! worktrees share the default checkout's object database instead of carrying
//! their own.
//!
//! # Resumability
//!
//! There is no record of progress besides the layout on disk. Each step first
//! checks whether its result already exists, and only then does its work. A run
//! that failed half way is finished by simply running it again, without
//! redoing any completed step. Existing checkout directories are trusted as is.

use crate::{
    config::CloneConfig,
    git::{
        head_branch, is_valid_branch_name, registered_worktrees, GitCli, GitClient, GitError,
        WorktreeMode,
    },
    identity::{parse_repository_identity, IdentityError, RepositoryIdentity},
    layout::{LayoutError, RepositoryLayout},
};

use git2::Repository;
use std::{
    fs::read_link,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Result of materializing a branch checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchCheckout {
    /// Working directory checked out at the requested branch.
    pub path: PathBuf,

    /// Branch checked out at `path`.
    pub branch: String,

    /// Default branch reported by the remote.
    pub default_branch: String,

    /// Whether `path` holds the full clone or a linked worktree.
    pub kind: CheckoutKind,

    /// Whether this invocation created `path`.
    pub created: bool,
}

/// Kind of branch checkout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutKind {
    /// Full shallow clone owning the object database.
    Default,

    /// Linked worktree attached to the default checkout.
    Worktree,
}

/// Entry reported when listing checkouts of a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutEntry {
    /// Branch checked out, if it can be determined.
    pub branch: Option<String>,

    /// Working directory of the checkout.
    pub path: PathBuf,

    /// Whether this is the full clone or a linked worktree.
    pub kind: CheckoutKind,

    /// Whether the working directory exists on disk.
    pub present: bool,
}

/// Materialize branch checkouts of remote repositories.
#[derive(Debug)]
pub struct BranchWorktreeCloner<G = GitCli>
where
    G: GitClient,
{
    config: CloneConfig,
    git: G,
}

impl BranchWorktreeCloner<GitCli> {
    /// Construct new cloner driving the Git binary named by configuration.
    pub fn new(config: CloneConfig) -> Self {
        let git = GitCli::new(config.git_program.as_str());
        Self { config, git }
    }
}

impl<G> BranchWorktreeCloner<G>
where
    G: GitClient,
{
    /// Construct new cloner with custom Git client.
    pub fn with_client(config: CloneConfig, git: G) -> Self {
        Self { config, git }
    }

    /// Configuration this cloner was built with.
    pub fn config(&self) -> &CloneConfig {
        &self.config
    }

    /// Git client this cloner drives.
    pub fn client(&self) -> &G {
        &self.git
    }

    /// Determine identity and on-disk layout of remote repository.
    ///
    /// # Errors
    ///
    /// - Return [`CloneError::InvalidRepositoryUrl`] if URL is malformed.
    pub fn layout(&self, url: impl AsRef<str>) -> Result<(RepositoryIdentity, RepositoryLayout)> {
        let identity = parse_repository_identity(url)?;
        let layout = RepositoryLayout::new(&self.config.root_dir, &identity);
        Ok((identity, layout))
    }

    /// Compute working directory path of target branch without touching the
    /// network or the file system.
    ///
    /// # Errors
    ///
    /// - Return [`CloneError::InvalidRepositoryUrl`] if URL is malformed.
    /// - Return [`CloneError::InvalidBranchName`] if branch name is unusable.
    pub fn checkout_path(&self, url: impl AsRef<str>, branch: impl AsRef<str>) -> Result<PathBuf> {
        let (_, layout) = self.layout(url)?;
        let branch = validate_branch_name(branch.as_ref())?;
        Ok(layout.checkout_path(branch))
    }

    /// Ensure checkout of target branch exists, and return where it lives.
    ///
    /// Uses the remote's default branch if no branch is given. The default
    /// branch is always materialized first as a shallow clone, and any other
    /// branch is attached to it as a linked worktree. Every step is skipped if
    /// its result already exists on disk.
    ///
    /// # Errors
    ///
    /// - Return [`CloneError::InvalidRepositoryUrl`] if URL is malformed.
    ///   Nothing is touched in this case.
    /// - Return [`CloneError::InvalidBranchName`] if the requested branch
    ///   cannot name a local branch. Nothing is touched in this case either.
    /// - Return [`CloneError::Filesystem`] if repository root or the `.git`
    ///   link cannot be created.
    /// - Return [`CloneError::DefaultBranchUnresolvable`] if the remote does
    ///   not report a symbolic HEAD.
    /// - Return [`CloneError::CloneFailed`] if shallow clone fails.
    /// - Return [`CloneError::WorktreeCreationFailed`] if the branch cannot be
    ///   fetched, or its worktree cannot be added.
    #[instrument(skip(self, url, branch), level = "debug")]
    pub fn ensure_branch_checkout(
        &self,
        url: impl AsRef<str>,
        branch: Option<&str>,
    ) -> Result<BranchCheckout> {
        let url = url.as_ref();
        let (identity, layout) = self.layout(url)?;
        if let Some(branch) = branch {
            validate_branch_name(branch)?;
        }

        info!("materialize {identity} under {:?}", layout.root().display());
        layout.ensure_root()?;

        let default_branch = self.resolve_default_branch(url)?;
        let target_branch = branch.unwrap_or(default_branch.as_str()).to_string();
        info!("branch to checkout: {target_branch} (default branch: {default_branch})");

        let default_created = self.ensure_default_checkout(url, &layout, &default_branch)?;
        layout.ensure_git_link(&default_branch)?;

        if target_branch == default_branch {
            return Ok(BranchCheckout {
                path: layout.checkout_path(&default_branch),
                branch: target_branch,
                default_branch,
                kind: CheckoutKind::Default,
                created: default_created,
            });
        }

        let created = self.ensure_worktree(&layout, &default_branch, &target_branch)?;
        Ok(BranchCheckout {
            path: layout.checkout_path(&target_branch),
            branch: target_branch,
            default_branch,
            kind: CheckoutKind::Worktree,
            created,
        })
    }

    /// List default checkout and linked worktrees of a materialized repository.
    ///
    /// Works offline. The default checkout is found by following the `.git`
    /// link at the repository root.
    ///
    /// # Errors
    ///
    /// - Return [`CloneError::InvalidRepositoryUrl`] if URL is malformed.
    /// - Return [`CloneError::Filesystem`] if the repository root has no
    ///   `.git` link.
    /// - Return [`CloneError::Inspect`] if the repository cannot be read.
    #[instrument(skip(self, url), level = "debug")]
    pub fn list_checkouts(&self, url: impl AsRef<str>) -> Result<Vec<CheckoutEntry>> {
        let (_, layout) = self.layout(url)?;
        let link = layout.git_link_path();
        let gitdir = read_link(&link).map_err(|_| LayoutError::MissingGitLink { path: link })?;
        let default_path = gitdir.parent().map(Path::to_path_buf).unwrap_or_default();

        let inspect = |source: GitError| CloneError::Inspect {
            path: default_path.clone(),
            source,
        };
        let repository = Repository::open(&default_path)
            .map_err(GitError::from)
            .map_err(inspect)?;

        let mut entries = vec![CheckoutEntry {
            branch: head_branch(&repository),
            present: default_path.exists(),
            path: default_path.clone(),
            kind: CheckoutKind::Default,
        }];

        entries.extend(
            registered_worktrees(&default_path)
                .map_err(inspect)?
                .into_iter()
                .map(|worktree| CheckoutEntry {
                    branch: worktree.branch,
                    path: worktree.path,
                    kind: CheckoutKind::Worktree,
                    present: worktree.present,
                }),
        );

        Ok(entries)
    }

    fn resolve_default_branch(&self, url: &str) -> Result<String> {
        let default_branch = self.git.default_branch(url).map_err(|source| {
            CloneError::DefaultBranchUnresolvable {
                url: url.to_string(),
                source,
            }
        })?;
        debug!("remote {url:?} reports default branch {default_branch:?}");

        Ok(default_branch)
    }

    /// Shallow clone default branch unless its checkout already exists.
    fn ensure_default_checkout(
        &self,
        url: &str,
        layout: &RepositoryLayout,
        default_branch: &str,
    ) -> Result<bool> {
        let path = layout.checkout_path(default_branch);
        if layout.has_checkout(default_branch) {
            debug!("default branch checkout {:?} already exists", path.display());
            return Ok(false);
        }

        info!("clone default branch {default_branch:?} into {:?} (shallow)", path.display());
        self.git
            .shallow_clone(url, default_branch, &path)
            .map_err(|source| CloneError::CloneFailed {
                url: url.to_string(),
                branch: default_branch.to_string(),
                path: path.clone(),
                source,
            })?;

        Ok(true)
    }

    /// Attach target branch as worktree of default checkout unless its
    /// checkout already exists.
    fn ensure_worktree(
        &self,
        layout: &RepositoryLayout,
        default_branch: &str,
        branch: &str,
    ) -> Result<bool> {
        let path = layout.checkout_path(branch);
        if layout.has_checkout(branch) {
            debug!("worktree {:?} already exists", path.display());
            return Ok(false);
        }

        let repo = layout.checkout_path(default_branch);
        let failed = |source: GitError| CloneError::WorktreeCreationFailed {
            branch: branch.to_string(),
            path: path.clone(),
            source,
        };

        // INVARIANT: Forget registrations of worktree directories that were removed by hand.
        self.git.prune_worktrees(&repo).map_err(failed)?;

        // INVARIANT: Shallow default clone never carries other branches, so fetch first.
        info!("fetch branch {branch:?} into {:?} (shallow)", repo.display());
        self.git.fetch_branch(&repo, branch).map_err(failed)?;

        let mode = if self.git.has_local_branch(&repo, branch).map_err(failed)? {
            WorktreeMode::Existing
        } else {
            WorktreeMode::Track
        };

        info!("add worktree for branch {branch:?} at {:?}", path.display());
        self.git
            .add_worktree(&repo, branch, &path, mode)
            .map_err(failed)?;

        Ok(true)
    }
}

fn validate_branch_name(branch: &str) -> Result<&str> {
    if is_valid_branch_name(branch) {
        Ok(branch)
    } else {
        Err(CloneError::InvalidBranchName(branch.to_string()))
    }
}

/// All possible error types for checkout materialization.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    /// URL does not match the `<owner>/<name>.git` pattern.
    #[error(transparent)]
    InvalidRepositoryUrl(#[from] IdentityError),

    /// Requested branch cannot name a local branch or checkout directory.
    #[error("invalid branch name {0:?}")]
    InvalidBranchName(String),

    /// Remote did not report a usable symbolic HEAD.
    #[error("cannot determine default branch of {url:?}")]
    DefaultBranchUnresolvable {
        url: String,
        #[source]
        source: GitError,
    },

    /// Shallow clone of default branch failed.
    #[error("failed to clone branch {branch:?} of {url:?} into {path:?}")]
    CloneFailed {
        url: String,
        branch: String,
        path: PathBuf,
        #[source]
        source: GitError,
    },

    /// Worktree of non-default branch could not be created.
    #[error("failed to create worktree for branch {branch:?} at {path:?}")]
    WorktreeCreationFailed {
        branch: String,
        path: PathBuf,
        #[source]
        source: GitError,
    },

    /// Directory or link creation failed.
    #[error(transparent)]
    Filesystem(#[from] LayoutError),

    /// Existing checkout cannot be read.
    #[error("failed to inspect checkout {path:?}")]
    Inspect {
        path: PathBuf,
        #[source]
        source: GitError,
    },
}

impl CloneError {
    /// Stable name of error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRepositoryUrl(_) => "InvalidRepositoryURL",
            Self::InvalidBranchName(_) => "InvalidBranchName",
            Self::DefaultBranchUnresolvable { .. } => "DefaultBranchUnresolvable",
            Self::CloneFailed { .. } => "CloneFailed",
            Self::WorktreeCreationFailed { .. } => "WorktreeCreationFailed",
            Self::Filesystem(_) => "FilesystemError",
            Self::Inspect { .. } => "InspectFailed",
        }
    }
}

/// Friendly result alias :3
type Result<T, E = CloneError> = std::result::Result<T, E>;
