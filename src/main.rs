// SPDX-FileCopyrightText: 2026 Zgit Contributors
// SPDX-License-Identifier: MIT

use zgit::{clone, workflow, CloneError, Settings, SystemZfs};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::{path::PathBuf, process::exit};
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  zgit clone <from> <dest>\n  zgit pull\n  zgit sync",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run(self) -> Result<()> {
        match self.command {
            Command::Clone(opts) => run_clone(opts),
            Command::Pull => Ok(workflow::pull()?),
            Command::Sync => Ok(workflow::sync()?),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Clone a dataset-backed repository or a remote URL onto a fresh
    /// dataset.
    #[command(override_usage = "zgit clone <from> <dest>")]
    Clone(CloneOptions),

    /// Fast-forward pull the current branch from all remotes.
    Pull,

    /// Push the current branch to all remotes, then pull.
    Sync,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CloneOptions {
    /// Source: a dataset-backed local path, or a remote URL.
    #[arg(value_name = "from")]
    pub from: String,

    /// Destination path for the new working copy.
    #[arg(value_name = "dest")]
    pub dest: PathBuf,
}

fn main() {
    let layer = fmt::layer().compact();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry().with(layer).with(filter).init();

    if let Err(error) = run() {
        error!("{error:?}");
        exit(exit_code(&error));
    }

    exit(0)
}

fn run() -> Result<()> {
    Cli::parse().run()
}

fn run_clone(opts: CloneOptions) -> Result<()> {
    let settings = Settings::load()?;
    let zfs = SystemZfs::new(&settings.zfs_path);
    clone::run(&opts.from, &opts.dest, &settings, &zfs)?;

    Ok(())
}

fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<CloneError>()
        .map(CloneError::exit_code)
        .unwrap_or(1)
}
