// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Shallow multi-branch checkouts of remote repositories.
//!
//! Branchtree keeps one shallow clone per remote repository, checked out at
//! the remote's default branch, and attaches every other branch to it as a
//! linked Git worktree. All branches of a repository thus share one object
//! database, while each branch still gets its own plain directory:
//!
//! ```text
//! ~/gh/acme/widgets/.git       -> ~/gh/acme/widgets/main/.git
//! ~/gh/acme/widgets/main/      shallow clone of default branch
//! ~/gh/acme/widgets/17.0/      worktree of branch 17.0
//! ```
//!
//! See [`BranchWorktreeCloner`] for the cloning logic itself.

pub mod cloner;
pub mod config;
pub mod git;
pub mod identity;
pub mod layout;
pub mod path;
pub mod submodule;

pub use cloner::{BranchCheckout, BranchWorktreeCloner, CheckoutEntry, CheckoutKind, CloneError};
pub use config::{CloneConfig, ExtraRepository};
pub use identity::{parse_repository_identity, RepositoryIdentity};
