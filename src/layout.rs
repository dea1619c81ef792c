// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! On-disk repository layout.
//!
//! Branchtree keeps no records of its own. The file system layout __is__ the
//! state, so every question the cloner asks ("is the default branch checked
//! out yet?", "does the convenience link exist?") is answered by looking at
//! the layout again.
//!
//! # Layout
//!
//! ```text
//! <root_dir>/<owner>/<name>/           repository root
//! <root_dir>/<owner>/<name>/.git       symlink to <default>/.git
//! <root_dir>/<owner>/<name>/<default>/ full shallow checkout with real .git
//! <root_dir>/<owner>/<name>/<branch>/  linked worktree of <default>
//! ```
//!
//! The repository root is created on first use and never deleted. The `.git`
//! link lets Git tooling run from the repository root as if it were a normal
//! checkout of the default branch.

use crate::identity::RepositoryIdentity;

use std::{
    fs::{create_dir_all, read_link, symlink_metadata},
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Paths making up the layout of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryLayout {
    root: PathBuf,
}

impl RepositoryLayout {
    /// Construct layout of repository under checkout root directory.
    pub fn new(root_dir: impl AsRef<Path>, identity: &RepositoryIdentity) -> Self {
        Self {
            root: root_dir.as_ref().join(identity.relative_root()),
        }
    }

    /// Path to the repository root.
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    /// Path to working directory of target branch.
    pub fn checkout_path(&self, branch: impl AsRef<str>) -> PathBuf {
        self.root.join(branch.as_ref())
    }

    /// Path to the convenience link at the top of the repository root.
    pub fn git_link_path(&self) -> PathBuf {
        self.root.join(".git")
    }

    /// Path the convenience link must point at for target default branch.
    pub fn git_link_target(&self, default_branch: impl AsRef<str>) -> PathBuf {
        self.checkout_path(default_branch).join(".git")
    }

    /// Check if anything exists at checkout path of target branch.
    ///
    /// An existing directory is trusted as is, no attempt is made to verify
    /// that it is a valid checkout.
    pub fn has_checkout(&self, branch: impl AsRef<str>) -> bool {
        self.checkout_path(branch).exists()
    }

    /// Determine current state of the convenience link.
    ///
    /// # Errors
    ///
    /// - Return [`LayoutError::Inspect`] if link path cannot be inspected.
    pub fn git_link_state(&self, default_branch: impl AsRef<str>) -> Result<GitLinkState> {
        let link = self.git_link_path();
        let metadata = match symlink_metadata(&link) {
            Ok(metadata) => metadata,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(GitLinkState::Missing),
            Err(error) => return Err(LayoutError::Inspect { source: error, path: link }),
        };

        if !metadata.file_type().is_symlink() {
            return Ok(GitLinkState::Occupied);
        }

        let target = read_link(&link).map_err(|error| LayoutError::Inspect {
            source: error,
            path: link.clone(),
        })?;

        if target == self.git_link_target(default_branch) {
            Ok(GitLinkState::Linked)
        } else {
            Ok(GitLinkState::LinkedElsewhere(target))
        }
    }

    /// Create repository root directory and its parents.
    ///
    /// Does nothing if the repository root already exists.
    ///
    /// # Errors
    ///
    /// - Return [`LayoutError::CreateRoot`] if directory cannot be created.
    #[instrument(skip(self), level = "debug")]
    pub fn ensure_root(&self) -> Result<()> {
        if self.root.is_dir() {
            debug!("repository root {:?} already exists", self.root.display());
            return Ok(());
        }

        info!("create repository root {:?}", self.root.display());
        create_dir_all(&self.root).map_err(|error| LayoutError::CreateRoot {
            source: error,
            path: self.root.clone(),
        })
    }

    /// Create convenience link to default branch's Git directory.
    ///
    /// Skips creation if a link already exists at the expected location. A
    /// link pointing somewhere else is left alone with a warning.
    ///
    /// # Errors
    ///
    /// - Return [`LayoutError::Inspect`] if link path cannot be inspected.
    /// - Return [`LayoutError::LinkOccupied`] if a regular file or directory
    ///   sits at the link location.
    /// - Return [`LayoutError::CreateLink`] if link cannot be created.
    #[instrument(skip(self, default_branch), level = "debug")]
    pub fn ensure_git_link(&self, default_branch: impl AsRef<str>) -> Result<()> {
        let default_branch = default_branch.as_ref();
        let link = self.git_link_path();
        let target = self.git_link_target(default_branch);

        match self.git_link_state(default_branch)? {
            GitLinkState::Linked => {
                debug!("link {:?} already in place", link.display());
                Ok(())
            }
            GitLinkState::LinkedElsewhere(other) => {
                warn!(
                    "link {:?} points to {:?} instead of {:?}, leaving it alone",
                    link.display(),
                    other.display(),
                    target.display()
                );
                Ok(())
            }
            GitLinkState::Occupied => Err(LayoutError::LinkOccupied { path: link }),
            GitLinkState::Missing => {
                info!("link {:?} to {:?}", link.display(), target.display());
                symlink_dir(&target, &link).map_err(|error| LayoutError::CreateLink {
                    source: error,
                    link,
                    target,
                })
            }
        }
    }
}

/// State of the convenience link at the top of a repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GitLinkState {
    /// Nothing exists at the link location.
    Missing,

    /// Link exists and points at the default branch's Git directory.
    Linked,

    /// Link exists but points at some other location.
    LinkedElsewhere(PathBuf),

    /// Something that is not a symbolic link exists at the link location.
    Occupied,
}

/// Create symbolic link to directory.
#[cfg(unix)]
pub(crate) fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub(crate) fn symlink_dir(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

/// Layout error types.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    /// Repository root cannot be created.
    #[error("failed to create repository root {path:?}")]
    CreateRoot {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Path cannot be inspected.
    #[error("failed to inspect {path:?}")]
    Inspect {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Something other than a symbolic link sits where the link belongs.
    #[error("cannot create link {path:?}, path is occupied by a non-symlink entry")]
    LinkOccupied { path: PathBuf },

    /// Repository root has no link to a default branch checkout.
    #[error("no default branch checkout linked at {path:?}")]
    MissingGitLink { path: PathBuf },

    /// Symbolic link cannot be created.
    #[error("failed to link {link:?} to {target:?}")]
    CreateLink {
        #[source]
        source: std::io::Error,
        link: PathBuf,
        target: PathBuf,
    },
}

impl LayoutError {
    /// Path the failed operation was working on.
    pub fn path(&self) -> &Path {
        match self {
            Self::CreateRoot { path, .. } => path,
            Self::Inspect { path, .. } => path,
            Self::LinkOccupied { path } => path,
            Self::MissingGitLink { path } => path,
            Self::CreateLink { link, .. } => link,
        }
    }
}

/// Friendly result alias :3
type Result<T, E = LayoutError> = std::result::Result<T, E>;
