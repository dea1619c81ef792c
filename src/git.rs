// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Git tooling seam.
//!
//! The cloner never talks to Git directly. Everything it needs from Git goes
//! through the narrow [`GitClient`] trait, which keeps the cloning algorithm
//! testable without a network, and keeps the text scraping of Git's output in
//! one place.
//!
//! [`GitCli`] is the real implementation. Network bound work (ref queries,
//! shallow clones, fetches) and worktree creation go through the Git binary,
//! while purely local inspection goes through libgit2.

use git2::{BranchType, ErrorCode, Reference, Repository};
use std::{
    ffi::{OsStr, OsString},
    path::{Path, PathBuf},
    process::Command,
};
use tracing::{debug, instrument};

/// Remote name every shallow clone is created with.
pub const ORIGIN: &str = "origin";

/// Layer of indirection for Git access.
pub trait GitClient {
    /// Ask remote for the branch its symbolic HEAD points at.
    ///
    /// Must not download any objects.
    fn default_branch(&self, url: &str) -> Result<String>;

    /// Shallow clone target branch of remote into target path.
    fn shallow_clone(&self, url: &str, branch: &str, path: &Path) -> Result<()>;

    /// Drop worktree registrations whose directories no longer exist.
    fn prune_worktrees(&self, repo: &Path) -> Result<()>;

    /// Shallow fetch target branch into `refs/remotes/origin/<branch>`, and
    /// make `origin` track it from then on.
    fn fetch_branch(&self, repo: &Path, branch: &str) -> Result<()>;

    /// Check if repository has a local branch of the given name.
    fn has_local_branch(&self, repo: &Path, branch: &str) -> Result<bool>;

    /// Attach new worktree for target branch to repository.
    fn add_worktree(&self, repo: &Path, branch: &str, path: &Path, mode: WorktreeMode)
        -> Result<()>;
}

/// How a worktree obtains its branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorktreeMode {
    /// Check out a local branch that already exists.
    Existing,

    /// Create a local branch tracking `origin/<branch>`.
    Track,
}

/// Git access through the Git binary and libgit2.
#[derive(Debug, Clone)]
pub struct GitCli {
    program: OsString,
}

impl GitCli {
    /// Construct new Git client driving target binary.
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn syscall(&self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> Result<GitOutput> {
        syscall_non_interactive(&self.program, args)
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new("git")
    }
}

impl GitClient for GitCli {
    #[instrument(skip(self), level = "debug")]
    fn default_branch(&self, url: &str) -> Result<String> {
        let output = self.syscall(["ls-remote", "--symref", "--", url, "HEAD"])?;
        parse_symref_head(&output.stdout).ok_or_else(|| GitError::NoSymbolicHead {
            url: url.to_string(),
        })
    }

    #[instrument(skip(self), level = "debug")]
    fn shallow_clone(&self, url: &str, branch: &str, path: &Path) -> Result<()> {
        self.syscall([
            OsStr::new("clone"),
            OsStr::new("--branch"),
            OsStr::new(branch),
            OsStr::new("--depth"),
            OsStr::new("1"),
            OsStr::new("--"),
            OsStr::new(url),
            path.as_os_str(),
        ])?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn prune_worktrees(&self, repo: &Path) -> Result<()> {
        self.syscall([
            OsStr::new("-C"),
            repo.as_os_str(),
            OsStr::new("worktree"),
            OsStr::new("prune"),
        ])?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    fn fetch_branch(&self, repo: &Path, branch: &str) -> Result<()> {
        let refspec = tracking_refspec(branch);
        self.syscall([
            OsStr::new("-C"),
            repo.as_os_str(),
            OsStr::new("fetch"),
            OsStr::new("--depth"),
            OsStr::new("1"),
            OsStr::new("--"),
            OsStr::new(ORIGIN),
            OsStr::new(&refspec),
        ])?;

        // INVARIANT: `worktree add --track` only accepts start points covered by a fetch refspec.
        register_fetch_refspec(repo, &refspec)?;
        Ok(())
    }

    fn has_local_branch(&self, repo: &Path, branch: &str) -> Result<bool> {
        local_branch_exists(repo, branch)
    }

    #[instrument(skip(self), level = "debug")]
    fn add_worktree(
        &self,
        repo: &Path,
        branch: &str,
        path: &Path,
        mode: WorktreeMode,
    ) -> Result<()> {
        let mut args: Vec<OsString> = vec![
            "-C".into(),
            repo.as_os_str().into(),
            "worktree".into(),
            "add".into(),
        ];

        match mode {
            WorktreeMode::Existing => {
                args.extend([path.as_os_str().into(), branch.into()]);
            }
            WorktreeMode::Track => {
                args.extend([
                    "--track".into(),
                    "-b".into(),
                    branch.into(),
                    path.as_os_str().into(),
                    format!("{ORIGIN}/{branch}").into(),
                ]);
            }
        }

        self.syscall(args)?;
        Ok(())
    }
}

/// Extract default branch from `git ls-remote --symref <url> HEAD` output.
///
/// Looks for the first line of the form `ref: refs/heads/<branch>\tHEAD`.
/// Returns [`None`] if no symbolic reference line is present, e.g., the
/// remote is empty.
pub fn parse_symref_head(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.strip_prefix("ref:"))
        .filter_map(|rest| rest.split_whitespace().next())
        .map(|reference| reference.strip_prefix("refs/heads/").unwrap_or(reference))
        .find(|branch| is_valid_branch_name(branch))
        .map(ToString::to_string)
}

/// Check if name is usable as a local branch name.
///
/// Follows the rules of `git check-ref-format --branch`, so names that are
/// empty, start with a dash or a dot, contain `..`, or name `HEAD` are all
/// rejected.
pub fn is_valid_branch_name(name: &str) -> bool {
    !name.starts_with('-')
        && name != "HEAD"
        && Reference::is_valid_name(format!("refs/heads/{name}").as_str())
}

/// Refspec mapping remote branch onto its remote tracking reference.
pub fn tracking_refspec(branch: &str) -> String {
    format!("+refs/heads/{branch}:refs/remotes/{ORIGIN}/{branch}")
}

/// Add fetch refspec to `origin` of repository unless already configured.
///
/// Shallow clones only track the branch they were cloned from, so every other
/// branch must be registered before Git treats `origin/<branch>` as a remote
/// tracking branch. Returns `true` if the refspec was added.
///
/// # Errors
///
/// - Return [`GitError::Git2`] if repository or its remote configuration
///   cannot be read or written.
pub fn register_fetch_refspec(repo: impl AsRef<Path>, refspec: &str) -> Result<bool> {
    let repository = Repository::open(repo.as_ref())?;
    let remote = repository.find_remote(ORIGIN)?;
    let registered = remote
        .fetch_refspecs()?
        .iter()
        .flatten()
        .any(|spec| spec == refspec);
    if registered {
        debug!("{ORIGIN} already fetches {refspec:?}");
        return Ok(false);
    }

    debug!("register {refspec:?} with {ORIGIN}");
    repository.remote_add_fetch(ORIGIN, refspec)?;
    Ok(true)
}

/// Check if repository at target path has a local branch of the given name.
///
/// # Errors
///
/// - Return [`GitError::Git2`] if repository cannot be opened, or branch
///   lookup fails for any reason other than the branch being absent.
pub fn local_branch_exists(repo: impl AsRef<Path>, branch: &str) -> Result<bool> {
    let repository = Repository::open(repo.as_ref())?;
    let found = repository
        .find_branch(branch, BranchType::Local)
        .map(|_| true);
    match found {
        Ok(found) => Ok(found),
        Err(error) if error.code() == ErrorCode::NotFound => Ok(false),
        Err(error) => Err(error.into()),
    }
}

/// Worktree registered with a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredWorktree {
    /// Administrative name of the worktree.
    pub name: String,

    /// Working directory of the worktree.
    pub path: PathBuf,

    /// Branch currently checked out, if the worktree can be opened.
    pub branch: Option<String>,

    /// Whether the working directory still exists.
    pub present: bool,
}

/// List worktrees registered with repository at target path.
///
/// The main working directory of the repository is not included.
///
/// # Errors
///
/// - Return [`GitError::Git2`] if repository or its worktree listing cannot
///   be read.
pub fn registered_worktrees(repo: impl AsRef<Path>) -> Result<Vec<RegisteredWorktree>> {
    let repository = Repository::open(repo.as_ref())?;
    let mut entries = Vec::new();

    for name in repository.worktrees()?.iter().flatten() {
        let worktree = repository.find_worktree(name)?;
        let path = worktree.path().to_path_buf();
        let branch = Repository::open_from_worktree(&worktree)
            .ok()
            .and_then(|repo| head_branch(&repo));

        entries.push(RegisteredWorktree {
            name: name.to_string(),
            present: path.exists(),
            path,
            branch,
        });
    }

    entries.sort_by(|lhs, rhs| lhs.path.cmp(&rhs.path));
    Ok(entries)
}

/// Short name of branch HEAD points at.
pub fn head_branch(repository: &Repository) -> Option<String> {
    repository
        .head()
        .ok()
        .filter(|head| head.is_branch())
        .and_then(|head| head.shorthand().map(ToString::to_string))
}

/// Captured output of Git invocation.
#[derive(Debug, Clone, Default)]
pub struct GitOutput {
    pub stdout: String,
    pub stderr: String,
}

fn syscall_non_interactive(
    cmd: impl AsRef<OsStr>,
    args: impl IntoIterator<Item = impl AsRef<OsStr>>,
) -> Result<GitOutput> {
    let args: Vec<OsString> = args.into_iter().map(|arg| arg.as_ref().to_owned()).collect();
    debug!("run {:?} {:?}", cmd.as_ref(), args);

    let output = Command::new(cmd.as_ref())
        .args(&args)
        .output()
        .map_err(|error| GitError::Spawn {
            source: error,
            program: cmd.as_ref().to_string_lossy().into_owned(),
        })?;
    let stdout = String::from_utf8_lossy(output.stdout.as_slice()).into_owned();
    let stderr = String::from_utf8_lossy(output.stderr.as_slice()).into_owned();

    if !output.status.success() {
        let mut message = String::new();
        if !stdout.trim().is_empty() {
            message.push_str(format!("stdout: {}\n", stdout.trim_end()).as_str());
        }
        if !stderr.trim().is_empty() {
            message.push_str(format!("stderr: {}\n", stderr.trim_end()).as_str());
        }

        // INVARIANT: Chomp trailing newlines.
        let message = message.trim_end().to_string();

        return Err(GitError::Syscall {
            command: render_command(cmd.as_ref(), &args),
            status: output.status.code(),
            message,
        });
    }

    Ok(GitOutput { stdout, stderr })
}

fn render_command(cmd: &OsStr, args: &[OsString]) -> String {
    std::iter::once(cmd)
        .chain(args.iter().map(OsString::as_os_str))
        .map(|part| part.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Git access error types.
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    /// Git binary cannot be started.
    #[error("failed to run {program:?}")]
    Spawn {
        #[source]
        source: std::io::Error,
        program: String,
    },

    /// Git binary exited unsuccessfully.
    #[error("command `{command}` failed with {}:\n{message}", render_status(.status))]
    Syscall {
        command: String,
        status: Option<i32>,
        message: String,
    },

    /// Remote did not report a symbolic HEAD.
    #[error("remote {url:?} did not report a symbolic HEAD reference")]
    NoSymbolicHead { url: String },

    /// Operations from libgit2 fail.
    #[error(transparent)]
    Git2(#[from] git2::Error),
}

fn render_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {code}"),
        None => "no exit status".into(),
    }
}

/// Friendly result alias :3
pub type Result<T, E = GitError> = std::result::Result<T, E>;
