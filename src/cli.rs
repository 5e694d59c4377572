//! CLI definitions for ghprune.
//!
//! Uses clap for argument parsing with derive macros.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// ghprune - prune GitHub accounts that don't follow you back
#[derive(Parser, Debug)]
#[command(name = "ghprune")]
#[command(version)]
#[command(about = "Unfollow GitHub accounts that don't follow you back")]
#[command(long_about = r#"
ghprune - a command-line tool that unfollows GitHub accounts that do not
reciprocate, driven by locally stored snapshots of your social graph.

How it works:
  - 'sync' pulls your follower and following lists into a local SQLite store
  - 'unfollow' selects accounts you follow that don't follow back (and were
    never unfollowed before), re-verifies each one against the live API, and
    unfollows a bounded batch with a polite delay between requests
  - accounts that start following you back are skipped and never touched

Quick start:
  1. export GITHUB_TOKEN=...   (needs the user:follow scope)
  2. ghprune sync
  3. ghprune unfollow --dry-run
  4. ghprune unfollow
"#)]
pub struct Cli {
    /// Path to the local state database
    #[arg(long, env = "GHPRUNE_DB", global = true)]
    pub db: Option<PathBuf>,

    /// Output format
    #[arg(long, short = 'f', global = true)]
    pub format: Option<OutputFormat>,

    /// Be verbose (show debug info)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Be quiet (suppress non-error output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Refresh the stored follower/following snapshots from GitHub
    Sync,

    /// Unfollow a batch of accounts that don't follow back
    Unfollow(UnfollowArgs),

    /// Show stored graph statistics and recent runs
    Stats(StatsArgs),

    /// Show or scaffold the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
pub struct UnfollowArgs {
    /// Show what would be unfollowed without touching anything
    #[arg(long)]
    pub dry_run: bool,

    /// Cap this run at N unfollows (overrides config)
    #[arg(long, short = 'n')]
    pub limit: Option<usize>,

    /// Run a sync before selecting the batch
    #[arg(long)]
    pub sync_first: bool,

    /// Delay between requests in milliseconds (overrides config)
    #[arg(long)]
    pub delay_ms: Option<u64>,

    /// Skip the live re-verification before each unfollow
    #[arg(long)]
    pub no_verify: bool,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Also list the most recent runs
    #[arg(long, short = 'd')]
    pub detailed: bool,

    /// Number of recent runs to show with --detailed
    #[arg(long, default_value = "5")]
    pub runs: usize,
}

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Show the effective configuration (token redacted)
    #[arg(long)]
    pub show: bool,

    /// Write a default config file to the standard location
    #[arg(long)]
    pub init: bool,
}

#[derive(Args, Debug, Clone)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    JsonPretty,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "json-pretty" => Ok(Self::JsonPretty),
            _ => Err(format!("unknown output format: {s}")),
        }
    }
}
