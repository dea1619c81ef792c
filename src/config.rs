// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the configuration file that branchtree reads to
//! figure out where checkouts live, and which Git binary to drive. The
//! configuration is always handed to the cloner explicitly, so nothing in the
//! cloning logic reaches for global state.

use crate::path::{default_config_path, default_root_dir, NoWayHome};

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
};
use tracing::{debug, instrument};

/// Cloner configuration.
///
/// # General Layout
///
/// Every key is optional in the configuration file:
///
/// ```toml
/// root_dir = "$HOME/src/gh"
/// git_program = "git"
///
/// [[extra_repositories]]
/// url = "https://github.com/odoo/odoo.git"
/// link = "odoo"
/// ```
///
/// The `root_dir` setting goes through full shell expansion when parsed.
#[derive(Debug, PartialEq, Eq, Clone, Serialize)]
pub struct CloneConfig {
    /// Directory holding every `<owner>/<name>` repository root.
    pub root_dir: PathBuf,

    /// Git binary to invoke for network operations.
    pub git_program: String,

    /// Repositories every synchronized project gets besides its submodules.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub extra_repositories: Vec<ExtraRepository>,
}

/// Repository linked into every synchronized project.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ExtraRepository {
    /// Remote URL of the repository.
    pub url: String,

    /// Link path relative to the project's `.local` directory.
    pub link: PathBuf,
}

impl ExtraRepository {
    /// Construct new extra repository linked at target path.
    pub fn new(url: impl Into<String>, link: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            link: link.into(),
        }
    }
}

impl CloneConfig {
    /// Construct new configuration rooted at target directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            git_program: default_git_program(),
            extra_repositories: Vec::new(),
        }
    }

    /// Construct default configuration rooted at `$HOME/gh`.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::NoWayHome`] if home directory cannot be found.
    pub fn try_default() -> Result<Self> {
        Ok(Self::new(default_root_dir()?))
    }

    /// Load configuration file at target path.
    ///
    /// A missing file is not an error, defaults are used instead.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file is not valid TOML.
    /// - Return [`ConfigError::ShellExpansion`] if `root_dir` cannot be
    ///   expanded.
    /// - Return [`ConfigError::NoWayHome`] if defaults are needed but the
    ///   home directory cannot be found.
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match read_to_string(path) {
            Ok(data) => {
                debug!("load configuration from {:?}", path.display());
                data.parse()
            }
            Err(error) if error.kind() == ErrorKind::NotFound => {
                debug!("no configuration at {:?}, using defaults", path.display());
                Self::try_default()
            }
            Err(error) => Err(ConfigError::Read {
                source: error,
                path: path.to_path_buf(),
            }),
        }
    }

    /// Load configuration file from its default location.
    ///
    /// # Errors
    ///
    /// - Same as [`CloneConfig::load`].
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path()?)
    }
}

/// Raw file layout, where every key may be omitted.
#[derive(Default, Debug, Deserialize)]
struct ConfigFile {
    root_dir: Option<String>,
    git_program: Option<String>,
    #[serde(default)]
    extra_repositories: Vec<ExtraRepository>,
}

impl FromStr for CloneConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let file: ConfigFile = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on root directory field.
        let root_dir = match file.root_dir {
            Some(root_dir) => PathBuf::from(
                shellexpand::full(root_dir.as_str())
                    .map_err(ConfigError::ShellExpansion)?
                    .into_owned(),
            ),
            None => default_root_dir()?,
        };

        Ok(Self {
            root_dir,
            git_program: file.git_program.unwrap_or_else(default_git_program),
            extra_repositories: file.extra_repositories,
        })
    }
}

impl Display for CloneConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

fn default_git_program() -> String {
    "git".into()
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read configuration file {path:?}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Default paths cannot be determined.
    #[error(transparent)]
    NoWayHome(#[from] NoWayHome),
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
