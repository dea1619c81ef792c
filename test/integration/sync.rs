// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use crate::Sandbox;

use anyhow::Result;
use branchtree::{submodule::sync_project, BranchWorktreeCloner, CloneConfig, ExtraRepository};
use indicatif::ProgressBar;
use pretty_assertions::assert_eq;
use std::fs::{create_dir_all, read_link, read_to_string, write};

#[test]
fn sync_links_submodule_checkouts() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let project = sandbox.tmp.path().join("project");
    create_dir_all(&project)?;
    write(
        project.join(".gitmodules"),
        format!(
            "[submodule \"widgets\"]\n\tpath = addons/widgets\n\turl = {}\n\tbranch = feature-x\n",
            sandbox.remote.url()
        ),
    )?;

    let linked = sync_project(&project, &sandbox.cloner, None, &ProgressBar::hidden())?;
    let link = project.join(".local").join("addons").join("widgets");
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].link, link);
    assert!(linked[0].linked);
    assert_eq!(read_link(&link)?, sandbox.repository_root().join("feature-x"));
    assert_eq!(read_to_string(link.join("feature.txt"))?, "feature x");
    assert_eq!(read_to_string(project.join(".gitignore"))?, "/.local\n");

    // INVARIANT: Running again leaves everything as is.
    let linked = sync_project(&project, &sandbox.cloner, None, &ProgressBar::hidden())?;
    assert!(!linked[0].linked);
    assert!(!linked[0].checkout.created);
    assert_eq!(read_to_string(project.join(".gitignore"))?, "/.local\n");

    Ok(())
}

#[test]
fn sync_links_extra_repositories_at_branch() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let project = sandbox.tmp.path().join("project");
    create_dir_all(&project)?;

    let mut config = CloneConfig::new(sandbox.tmp.path().join("gh"));
    config.extra_repositories = vec![ExtraRepository::new(sandbox.remote.url(), "widgets")];
    let cloner = BranchWorktreeCloner::new(config);

    let linked = sync_project(&project, &cloner, Some("17.0"), &ProgressBar::hidden())?;
    let link = project.join(".local").join("widgets");
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].name, "widgets");
    assert_eq!(read_link(&link)?, sandbox.repository_root().join("17.0"));
    assert_eq!(read_to_string(link.join("VERSION"))?, "17.0");

    Ok(())
}

#[test]
fn sync_skips_extra_repository_listed_as_submodule() -> Result<()> {
    let sandbox = Sandbox::new()?;
    let project = sandbox.tmp.path().join("project");
    create_dir_all(&project)?;
    write(
        project.join(".gitmodules"),
        format!(
            "[submodule \"widgets\"]\n\tpath = addons/widgets\n\turl = {}\n",
            sandbox.remote.url()
        ),
    )?;

    let mut config = CloneConfig::new(sandbox.tmp.path().join("gh"));
    config.extra_repositories = vec![ExtraRepository::new(sandbox.remote.url(), "widgets")];
    let cloner = BranchWorktreeCloner::new(config);

    let linked = sync_project(&project, &cloner, Some("17.0"), &ProgressBar::hidden())?;
    assert_eq!(linked.len(), 1);
    assert_eq!(linked[0].name, "widgets");
    assert_eq!(linked[0].link, project.join(".local").join("addons").join("widgets"));
    assert_eq!(linked[0].checkout.branch, "main");
    assert!(!project.join(".local").join("widgets").exists());
    assert!(!sandbox.repository_root().join("17.0").exists());

    Ok(())
}
