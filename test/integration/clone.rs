// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::Sandbox;

use anyhow::Result;
use branchtree::{CheckoutKind, CloneError};
use git2::Repository;
use pretty_assertions::assert_eq;
use std::{
    fs::{canonicalize, read_dir, read_link, read_to_string, remove_dir_all, remove_file},
    path::{Path, PathBuf},
    process::Command,
};

fn snapshot(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();
    Ok(entries)
}

#[test]
fn clone_default_branch() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let root = sandbox.repository_root();

    let checkout = sandbox
        .cloner
        .ensure_branch_checkout(sandbox.remote.url(), None)?;
    assert_eq!(checkout.path, root.join("main"));
    assert_eq!(checkout.default_branch, "main");
    assert_eq!(checkout.kind, CheckoutKind::Default);
    assert!(checkout.created);

    assert_eq!(read_to_string(root.join("main").join("README.md"))?, "widgets on main");
    assert!(root.join("main").join(".git").is_dir());
    assert!(root.join("main").join(".git").join("shallow").is_file());
    assert!(!root.join("feature-x").exists());

    // INVARIANT: Top-level link resolves to the default branch's Git directory.
    assert_eq!(read_link(root.join(".git"))?, root.join("main").join(".git"));
    assert_eq!(
        canonicalize(root.join(".git"))?,
        canonicalize(root.join("main").join(".git"))?
    );

    Ok(())
}

#[test]
fn clone_non_default_branch_as_worktree() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let root = sandbox.repository_root();

    let checkout = sandbox
        .cloner
        .ensure_branch_checkout(sandbox.remote.url(), Some("feature-x"))?;
    assert_eq!(checkout.path, root.join("feature-x"));
    assert_eq!(checkout.kind, CheckoutKind::Worktree);
    assert_eq!(read_to_string(root.join("feature-x").join("feature.txt"))?, "feature x");

    // INVARIANT: Worktree carries a pointer file, not its own Git directory.
    let pointer = root.join("feature-x").join(".git");
    assert!(pointer.is_file());
    assert!(read_to_string(&pointer)?.starts_with("gitdir:"));

    let worktree = Repository::open(root.join("feature-x"))?;
    let default = Repository::open(root.join("main"))?;
    assert!(worktree.is_worktree());
    assert_eq!(worktree.head()?.shorthand(), Some("feature-x"));
    assert_eq!(
        canonicalize(worktree.commondir())?,
        canonicalize(default.path())?
    );

    Ok(())
}

#[test]
fn clone_two_non_default_branches_in_turn() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let root = sandbox.repository_root();

    let feature = sandbox
        .cloner
        .ensure_branch_checkout(sandbox.remote.url(), Some("feature-x"))?;
    let release = sandbox
        .cloner
        .ensure_branch_checkout(sandbox.remote.url(), Some("17.0"))?;
    assert!(feature.created);
    assert!(release.created);
    assert_eq!(read_to_string(root.join("feature-x").join("feature.txt"))?, "feature x");
    assert_eq!(read_to_string(root.join("17.0").join("VERSION"))?, "17.0");

    // INVARIANT: Both branches track their remote counterparts.
    let default = Repository::open(root.join("main"))?;
    let config = default.config()?;
    assert_eq!(config.get_string("branch.feature-x.merge")?, "refs/heads/feature-x");
    assert_eq!(config.get_string("branch.17.0.merge")?, "refs/heads/17.0");

    // INVARIANT: Plain fetches keep working with the added refspecs.
    let status = Command::new("git")
        .arg("-C")
        .arg(root.join("main"))
        .args(["fetch", "--depth", "1", "origin"])
        .status()?;
    assert!(status.success());

    Ok(())
}

#[test]
fn second_run_changes_nothing() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let root = sandbox.repository_root();

    let first = sandbox
        .cloner
        .ensure_branch_checkout(sandbox.remote.url(), Some("feature-x"))?;
    let before = snapshot(&root)?;
    let second = sandbox
        .cloner
        .ensure_branch_checkout(sandbox.remote.url(), Some("feature-x"))?;

    assert_eq!(first.path, second.path);
    assert!(!second.created);
    assert_eq!(snapshot(&root)?, before);

    Ok(())
}

#[test]
fn resume_restores_missing_link() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let root = sandbox.repository_root();

    sandbox
        .cloner
        .ensure_branch_checkout(sandbox.remote.url(), None)?;
    remove_file(root.join(".git"))?;

    let checkout = sandbox
        .cloner
        .ensure_branch_checkout(sandbox.remote.url(), None)?;
    assert!(!checkout.created);
    assert_eq!(read_link(root.join(".git"))?, root.join("main").join(".git"));

    Ok(())
}

#[test]
fn recreate_worktree_removed_by_hand() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let root = sandbox.repository_root();

    sandbox
        .cloner
        .ensure_branch_checkout(sandbox.remote.url(), Some("feature-x"))?;
    remove_dir_all(root.join("feature-x"))?;

    let checkout = sandbox
        .cloner
        .ensure_branch_checkout(sandbox.remote.url(), Some("feature-x"))?;
    assert!(checkout.created);
    assert_eq!(read_to_string(root.join("feature-x").join("feature.txt"))?, "feature x");

    Ok(())
}

#[test]
fn unknown_branch_fails_worktree_creation() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let root = sandbox.repository_root();

    let result = sandbox
        .cloner
        .ensure_branch_checkout(sandbox.remote.url(), Some("no-such-branch"));
    assert!(matches!(
        result,
        Err(CloneError::WorktreeCreationFailed { .. })
    ));
    assert!(root.join("main").is_dir());
    assert!(!root.join("no-such-branch").exists());

    Ok(())
}

#[test]
fn unreachable_remote_has_no_default_branch() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let url = format!(
        "file://{}",
        sandbox.tmp.path().join("nowhere").join("acme").join("widgets.git").display()
    );

    let result = sandbox.cloner.ensure_branch_checkout(url, None);
    assert!(matches!(
        result,
        Err(CloneError::DefaultBranchUnresolvable { .. })
    ));

    Ok(())
}

#[test]
fn list_default_checkout_and_worktrees() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let root = sandbox.repository_root();
    sandbox
        .cloner
        .ensure_branch_checkout(sandbox.remote.url(), Some("feature-x"))?;

    let entries = sandbox.cloner.list_checkouts(sandbox.remote.url())?;
    let summary = entries
        .iter()
        .map(|entry| (entry.branch.clone(), entry.kind, entry.present))
        .collect::<Vec<_>>();
    assert_eq!(
        summary,
        vec![
            (Some("main".to_string()), CheckoutKind::Default, true),
            (Some("feature-x".to_string()), CheckoutKind::Worktree, true),
        ]
    );
    assert_eq!(entries[0].path, root.join("main"));
    assert_eq!(canonicalize(&entries[1].path)?, canonicalize(root.join("feature-x"))?);

    Ok(())
}
