// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Repository identity parsing.
//!
//! Every remote URL branchtree accepts must end with `<sep><owner>/<name>.git`
//! where `<sep>` is either `:` or `/`. This covers both SCP-like SSH URLs such
//! as `git@example.com:acme/widgets.git`, and regular URLs such as
//! `https://example.com/acme/widgets.git`. The owner and name determine where
//! the repository lives locally, the host is informational only.

use regex::Regex;
use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Path, PathBuf},
    sync::LazyLock,
};
use url::Url;

static REPOSITORY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[:/](?P<owner>[^/]+)/(?P<name>[^/]+)\.git$").expect("pattern is valid")
});

/// Identity of remote repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepositoryIdentity {
    /// Host serving the repository, if one could be determined.
    pub host: Option<String>,

    /// Owner or organization of the repository.
    pub owner: String,

    /// Name of the repository without the ".git" extension.
    pub name: String,
}

impl RepositoryIdentity {
    /// Relative path of repository root under the checkout root directory.
    pub fn relative_root(&self) -> PathBuf {
        Path::new(&self.owner).join(&self.name)
    }
}

impl Display for RepositoryIdentity {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match &self.host {
            Some(host) => write!(fmt, "{host}/{}/{}", self.owner, self.name),
            None => write!(fmt, "{}/{}", self.owner, self.name),
        }
    }
}

/// Parse repository identity out of remote URL.
///
/// No I/O of any kind is performed.
///
/// # Errors
///
/// - Return [`IdentityError::InvalidRepositoryUrl`] if the URL does not end
///   with a recognized `<owner>/<name>.git` component, starts with a dash, or
///   the owner or name is `.` or `..`.
pub fn parse_repository_identity(url: impl AsRef<str>) -> Result<RepositoryIdentity> {
    let url = url.as_ref().trim();
    let invalid = || IdentityError::InvalidRepositoryUrl(url.to_string());

    // INVARIANT: Git would read a leading dash as an option.
    if url.starts_with('-') {
        return Err(invalid());
    }

    let captures = REPOSITORY_PATTERN.captures(url).ok_or_else(invalid)?;
    let (owner, name) = (&captures["owner"], &captures["name"]);

    // INVARIANT: Owner and name must stay single components below the root directory.
    if [owner, name].iter().any(|part| matches!(*part, "." | "..")) {
        return Err(invalid());
    }

    Ok(RepositoryIdentity {
        host: parse_host(url),
        owner: owner.to_string(),
        name: name.to_string(),
    })
}

fn parse_host(url: &str) -> Option<String> {
    if url.contains("://") {
        return Url::parse(url)
            .ok()
            .and_then(|url| url.host_str().map(ToString::to_string))
            .filter(|host| !host.is_empty());
    }

    // SCP-like syntax: [user@]host:owner/name.git
    let (prefix, _) = url.split_once(':')?;
    let host = prefix.rsplit_once('@').map_or(prefix, |(_, host)| host);
    (!host.is_empty() && !host.contains('/')).then(|| host.to_string())
}

/// Repository identity error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdentityError {
    /// URL does not name an owner and repository.
    #[error("cannot parse owner and repository name from URL {0:?}")]
    InvalidRepositoryUrl(String),
}

/// Friendly result alias :3
type Result<T, E = IdentityError> = std::result::Result<T, E>;
