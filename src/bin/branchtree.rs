// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use branchtree::{
    submodule::sync_project, BranchWorktreeCloner, CheckoutKind, CloneConfig, CloneError,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::PathBuf, process::exit};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "branchtree [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Directory holding all repository checkouts.
    #[arg(long, global = true, env = "BRANCHTREE_ROOT", value_name = "dir")]
    pub root: Option<PathBuf>,

    /// Path to configuration file.
    #[arg(long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Only report warnings and errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        let cloner = BranchWorktreeCloner::new(self.load_config()?);
        match self.command {
            Command::Clone(opts) => run_clone(&cloner, opts),
            Command::Path(opts) => run_path(&cloner, opts),
            Command::List(opts) => run_list(&cloner, opts),
            Command::Sync(opts) => run_sync(&cloner, opts, self.quiet),
        }
    }

    fn load_config(&self) -> Result<CloneConfig> {
        let mut config = match &self.config {
            Some(path) => CloneConfig::load(path)?,
            None => CloneConfig::load_default()?,
        };

        if let Some(root) = &self.root {
            config.root_dir = root.clone();
        }

        Ok(config)
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Ensure checkout of branch exists, and print its path.
    #[command(override_usage = "branchtree clone [options] <url>")]
    Clone(CloneOptions),

    /// Print where checkout of branch lives without touching anything.
    #[command(override_usage = "branchtree path [options] <url> <branch>")]
    Path(PathOptions),

    /// List default checkout and worktrees of a repository.
    #[command(override_usage = "branchtree list [options] <url>")]
    List(ListOptions),

    /// Materialize submodules and extra repositories of a project, and link
    /// them into its .local.
    #[command(override_usage = "branchtree sync [options] [project_dir]")]
    Sync(SyncOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CloneOptions {
    /// URL of remote to clone from.
    #[arg(required = true, value_name = "url")]
    pub url: String,

    /// Branch to checkout instead of the default branch.
    #[arg(short, long, value_name = "branch")]
    pub branch: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct PathOptions {
    /// URL of remote.
    #[arg(required = true, value_name = "url")]
    pub url: String,

    /// Branch whose checkout path to print.
    #[arg(required = true, value_name = "branch")]
    pub branch: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct ListOptions {
    /// URL of remote.
    #[arg(required = true, value_name = "url")]
    pub url: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Project directory containing .gitmodules.
    #[arg(value_name = "project_dir", default_value = ".")]
    pub project_dir: PathBuf,

    /// Branch to checkout for extra repositories instead of their default.
    #[arg(short, long, value_name = "branch")]
    pub branch: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .without_time();
    let default_level = if cli.quiet { "warn" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = cli.run() {
        match error.chain().find_map(|cause| cause.downcast_ref::<CloneError>()) {
            Some(kind) => error!("{}: {error:?}", kind.kind()),
            None => error!("{error:?}"),
        }
        exit(1);
    }

    exit(0)
}

fn run_clone(cloner: &BranchWorktreeCloner, opts: CloneOptions) -> Result<()> {
    let checkout = cloner.ensure_branch_checkout(&opts.url, opts.branch.as_deref())?;
    println!("{}", checkout.path.display());

    Ok(())
}

fn run_path(cloner: &BranchWorktreeCloner, opts: PathOptions) -> Result<()> {
    println!("{}", cloner.checkout_path(&opts.url, &opts.branch)?.display());

    Ok(())
}

fn run_list(cloner: &BranchWorktreeCloner, opts: ListOptions) -> Result<()> {
    for entry in cloner.list_checkouts(&opts.url)? {
        let kind = match entry.kind {
            CheckoutKind::Default => "default",
            CheckoutKind::Worktree => "worktree",
        };
        let missing = if entry.present { "" } else { " (missing)" };
        println!(
            "{:<24} {:<8} {}{missing}",
            entry.branch.as_deref().unwrap_or("<detached>"),
            kind,
            entry.path.display()
        );
    }

    Ok(())
}

fn run_sync(cloner: &BranchWorktreeCloner, opts: SyncOptions, quiet: bool) -> Result<()> {
    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        let bar = ProgressBar::new(0);
        let style =
            ProgressStyle::with_template("{pos:>3}/{len:3}  {msg:<40}  [{wide_bar:.yellow/blue}]")?
                .progress_chars("-Cco.");
        bar.set_style(style);
        bar
    };

    let linked = sync_project(&opts.project_dir, cloner, opts.branch.as_deref(), &bar)
        .with_context(|| format!("failed to sync project {:?}", opts.project_dir.display()))?;
    bar.finish_and_clear();

    for entry in linked {
        println!("{} -> {}", entry.link.display(), entry.checkout.path.display());
    }

    Ok(())
}
