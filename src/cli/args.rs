//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

/// Kiln - resolve and fetch the BOSH releases a tile is built from
///
/// Reads the pinned releases in Kilnfile.lock and makes the releases
/// directory match them, downloading from the sources listed in the Kilnfile.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Download every release pinned in Kilnfile.lock
    Fetch(FetchArgs),

    /// Bump one pinned release to a new version
    UpdateRelease(UpdateReleaseArgs),
}

/// Paths shared by every command
#[derive(Args, Debug, Clone)]
pub struct PathArgs {
    /// Path to the Kilnfile; the lock is read from <kilnfile>.lock
    #[arg(long, env = "KILN_KILNFILE", default_value = "Kilnfile")]
    pub kilnfile: PathBuf,

    /// Directory releases are downloaded into
    #[arg(long = "releases-directory", default_value = "releases")]
    pub releases_directory: PathBuf,
}

#[derive(Args, Debug)]
pub struct FetchArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Concurrent downloads per release source (0 or 1 downloads one at a time)
    #[arg(long = "download-threads", default_value_t = 0)]
    pub download_threads: usize,

    /// Delete releases not listed in Kilnfile.lock without asking
    #[arg(long)]
    pub no_confirm: bool,

    /// Only use release sources marked publishable in the Kilnfile
    #[arg(long)]
    pub allow_only_publishable_releases: bool,
}

#[derive(Args, Debug)]
pub struct UpdateReleaseArgs {
    #[command(flatten)]
    pub paths: PathArgs,

    /// Name of the release to update
    #[arg(short, long)]
    pub name: String,

    /// Version to pin the release to
    #[arg(long)]
    pub version: String,

    /// Only use release sources marked publishable in the Kilnfile
    #[arg(long)]
    pub allow_only_publishable_releases: bool,
}
