// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Project synchronization through `.gitmodules`.
//!
//! A project lists the repositories it depends on as Git submodules, but never
//! initializes them. Instead, each submodule is materialized through the
//! cloner at `<root>/<owner>/<name>/<branch>`, and linked into the project's
//! git-ignored `.local` directory under the submodule's own path. Many
//! projects depending on the same repository and branch thus share a single
//! checkout.
//!
//! Repositories listed as `extra_repositories` in the configuration are linked
//! into every project as well, at a branch chosen per synchronization run,
//! unless the project already lists them as submodules.

use crate::{
    cloner::{BranchCheckout, BranchWorktreeCloner, CloneError},
    config::ExtraRepository,
    git::GitClient,
    identity::parse_repository_identity,
    layout::symlink_dir,
};

use git2::Config;
use indicatif::ProgressBar;
use std::{
    collections::BTreeMap,
    fs::{create_dir_all, read_to_string, symlink_metadata, OpenOptions},
    io::{ErrorKind, Write},
    path::{Component, Path, PathBuf},
};
use tracing::{debug, info, instrument, warn};

/// Name of the git-ignored helper directory inside a project.
pub const LOCAL_DIR: &str = ".local";

/// Submodule entry of a `.gitmodules` file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submodule {
    /// Name of the submodule section.
    pub name: String,

    /// Path of the submodule relative to the project.
    pub path: PathBuf,

    /// Remote URL of the submodule.
    pub url: String,

    /// Branch to check out, remote's default branch if absent.
    pub branch: Option<String>,
}

/// Repository checkout linked into a project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkedCheckout {
    /// Submodule name, or link path of an extra repository.
    pub name: String,

    /// Remote URL of the repository.
    pub url: String,

    /// Checkout backing the submodule.
    pub checkout: BranchCheckout,

    /// Link inside the project's `.local` directory.
    pub link: PathBuf,

    /// Whether this invocation created the link.
    pub linked: bool,
}

#[derive(Default)]
struct PartialSubmodule {
    path: Option<String>,
    url: Option<String>,
    branch: Option<String>,
}

/// Read submodule listing of project.
///
/// Entries lacking a `url` or `path` are skipped. The result is sorted by
/// submodule path. A project without a `.gitmodules` file has no submodules.
///
/// # Errors
///
/// - Return [`SubmoduleError::Read`] if `.gitmodules` cannot be parsed.
#[instrument(skip(project_dir), level = "debug")]
pub fn read_submodules(project_dir: impl AsRef<Path>) -> Result<Vec<Submodule>> {
    let gitmodules = project_dir.as_ref().join(".gitmodules");
    if !gitmodules.exists() {
        debug!("no submodules listed at {:?}", gitmodules.display());
        return Ok(Vec::new());
    }

    let read_error = |source: git2::Error| SubmoduleError::Read {
        source,
        path: gitmodules.clone(),
    };
    let config = Config::open(&gitmodules).map_err(read_error)?;
    let entries = config.entries(Some(r"^submodule\.")).map_err(read_error)?;

    let mut sections: BTreeMap<String, PartialSubmodule> = BTreeMap::new();
    entries
        .for_each(|entry| {
            let (Some(key), Some(value)) = (entry.name(), entry.value()) else {
                return;
            };

            // INVARIANT: Subsection names may contain dots, variable names never do.
            let Some((name, variable)) = key
                .strip_prefix("submodule.")
                .and_then(|rest| rest.rsplit_once('.'))
            else {
                return;
            };

            let section = sections.entry(name.to_string()).or_default();
            match variable {
                "path" => section.path = Some(value.to_string()),
                "url" => section.url = Some(value.to_string()),
                "branch" => section.branch = Some(value.to_string()),
                _ => {}
            }
        })
        .map_err(read_error)?;

    let mut submodules = Vec::new();
    for (name, section) in sections {
        match (section.path, section.url) {
            (Some(path), Some(url)) => submodules.push(Submodule {
                name,
                path: PathBuf::from(path),
                url,
                branch: section.branch.filter(|branch| !branch.is_empty()),
            }),
            _ => warn!("submodule {name:?} lacks a path or url, skipping it"),
        }
    }

    submodules.sort_by(|lhs, rhs| lhs.path.cmp(&rhs.path));
    Ok(submodules)
}

/// Materialize every submodule and extra repository of project, and link
/// them into `.local`.
///
/// Submodules are processed in path order, followed by the extra
/// repositories of the cloner's configuration in listed order. Extra
/// repositories are checked out at `branch`, or their default branch if none
/// is given. An extra repository whose owner and name match a submodule is
/// skipped. The first failure stops the run. Everything completed so far
/// stays on disk, so running again picks up where the failed run stopped.
/// Finally makes sure Git ignores `.local`.
///
/// # Errors
///
/// - Return [`SubmoduleError::Read`] if `.gitmodules` cannot be parsed.
/// - Return [`SubmoduleError::InvalidLink`] if a link path would leave
///   `.local`.
/// - Return [`SubmoduleError::Clone`] if a checkout cannot be materialized.
/// - Return [`SubmoduleError::Link`] if a link cannot be created.
/// - Return [`SubmoduleError::Gitignore`] if `.gitignore` cannot be updated.
#[instrument(skip(project_dir, cloner, bar), level = "debug")]
pub fn sync_project<G>(
    project_dir: impl AsRef<Path>,
    cloner: &BranchWorktreeCloner<G>,
    branch: Option<&str>,
    bar: &ProgressBar,
) -> Result<Vec<LinkedCheckout>>
where
    G: GitClient,
{
    let project_dir = project_dir.as_ref();
    let submodules = read_submodules(project_dir)?;
    let extras = uncovered_extras(&cloner.config().extra_repositories, &submodules);

    let mut targets: Vec<SyncTarget> = submodules
        .into_iter()
        .map(|submodule| SyncTarget {
            name: submodule.name,
            url: submodule.url,
            branch: submodule.branch,
            link: submodule.path,
        })
        .collect();
    targets.extend(extras.into_iter().map(|extra| SyncTarget {
        name: extra.link.display().to_string(),
        url: extra.url.clone(),
        branch: branch.map(ToString::to_string),
        link: extra.link.clone(),
    }));

    // INVARIANT: Every link stays inside `.local`, checked before any work starts.
    if let Some(target) = targets.iter().find(|target| !is_contained(&target.link)) {
        return Err(SubmoduleError::InvalidLink {
            link: target.link.clone(),
        });
    }

    bar.set_length(targets.len() as u64);
    let mut linked = Vec::new();
    for target in targets {
        bar.set_message(target.link.display().to_string());
        let checkout = cloner
            .ensure_branch_checkout(&target.url, target.branch.as_deref())
            .map_err(|source| SubmoduleError::Clone {
                source,
                name: target.name.clone(),
            })?;

        let link = project_dir.join(LOCAL_DIR).join(&target.link);
        let created = ensure_link(&link, &checkout.path)?;
        linked.push(LinkedCheckout {
            name: target.name,
            url: target.url,
            checkout,
            link,
            linked: created,
        });
        bar.inc(1);
    }

    ensure_gitignore_entry(project_dir)?;
    Ok(linked)
}

struct SyncTarget {
    name: String,
    url: String,
    branch: Option<String>,
    link: PathBuf,
}

/// Extra repositories not already listed as submodules.
fn uncovered_extras<'cfg>(
    extras: &'cfg [ExtraRepository],
    submodules: &[Submodule],
) -> Vec<&'cfg ExtraRepository> {
    let listed: Vec<PathBuf> = submodules
        .iter()
        .filter_map(|submodule| parse_repository_identity(&submodule.url).ok())
        .map(|identity| identity.relative_root())
        .collect();

    extras
        .iter()
        .filter(|extra| {
            let covered = parse_repository_identity(&extra.url)
                .map(|identity| listed.contains(&identity.relative_root()))
                .unwrap_or(false);
            if covered {
                debug!("{:?} already listed as submodule, skipping it", extra.url);
            }
            !covered
        })
        .collect()
}

fn is_contained(link: &Path) -> bool {
    link.components().next().is_some()
        && link
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}

/// Link target checkout at link path unless something already sits there.
fn ensure_link(link: &Path, target: &Path) -> Result<bool> {
    let link_error = |source: std::io::Error| SubmoduleError::Link {
        source,
        link: link.to_path_buf(),
    };

    match symlink_metadata(link) {
        Ok(_) => {
            debug!("link {:?} already exists", link.display());
            return Ok(false);
        }
        Err(error) if error.kind() == ErrorKind::NotFound => {}
        Err(error) => return Err(link_error(error)),
    }

    if let Some(parent) = link.parent() {
        create_dir_all(parent).map_err(link_error)?;
    }

    info!("link {:?} to {:?}", link.display(), target.display());
    symlink_dir(target, link).map_err(link_error)?;
    Ok(true)
}

/// Make sure project's `.gitignore` lists the `.local` directory.
///
/// # Errors
///
/// - Return [`SubmoduleError::Gitignore`] if `.gitignore` cannot be read or
///   written.
pub fn ensure_gitignore_entry(project_dir: impl AsRef<Path>) -> Result<()> {
    let path = project_dir.as_ref().join(".gitignore");
    let gitignore_error = |source: std::io::Error| SubmoduleError::Gitignore {
        source,
        path: path.clone(),
    };

    let contents = match read_to_string(&path) {
        Ok(contents) => contents,
        Err(error) if error.kind() == ErrorKind::NotFound => String::new(),
        Err(error) => return Err(gitignore_error(error)),
    };

    let entry = format!("/{LOCAL_DIR}");
    let listed = contents.lines().map(str::trim).any(|line| {
        line == entry || line == LOCAL_DIR || line.trim_end_matches('/') == entry
    });
    if listed {
        debug!("{:?} already ignores {LOCAL_DIR}", path.display());
        return Ok(());
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(gitignore_error)?;

    let separator = if contents.is_empty() || contents.ends_with('\n') {
        ""
    } else {
        "\n"
    };
    writeln!(file, "{separator}{entry}").map_err(gitignore_error)?;
    info!("add {entry} to {:?}", path.display());

    Ok(())
}

/// Submodule synchronization error types.
#[derive(Debug, thiserror::Error)]
pub enum SubmoduleError {
    /// `.gitmodules` cannot be parsed.
    #[error("failed to read submodules from {path:?}")]
    Read {
        #[source]
        source: git2::Error,
        path: PathBuf,
    },

    /// Link path points outside of `.local`.
    #[error("link path {link:?} must be relative and stay inside .local")]
    InvalidLink { link: PathBuf },

    /// Repository checkout cannot be materialized.
    #[error("failed to materialize {name:?}")]
    Clone {
        #[source]
        source: CloneError,
        name: String,
    },

    /// Link into `.local` cannot be created.
    #[error("failed to link {link:?}")]
    Link {
        #[source]
        source: std::io::Error,
        link: PathBuf,
    },

    /// `.gitignore` cannot be updated.
    #[error("failed to update {path:?}")]
    Gitignore {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = SubmoduleError> = std::result::Result<T, E>;
