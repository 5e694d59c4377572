//! ghprune - GitHub unfollow CLI
//!
//! Main entry point for the ghprune command-line tool.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use ghprune::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with_target(false)
        .without_time()
        .init();

    // Layered config; CLI flags are the final layer
    let mut config = Config::load();
    if let Some(db) = &cli.db {
        config.paths.db = Some(db.clone());
    }
    if cli.quiet {
        config.output.quiet = true;
    }
    if !config.output.colors {
        colored::control::set_override(false);
    }

    match &cli.command {
        Commands::Sync => cmd_sync(&config).await,
        Commands::Unfollow(args) => cmd_unfollow(&cli, &config, args).await,
        Commands::Stats(args) => cmd_stats(&cli, &config, args),
        Commands::Config(args) => cmd_config(&config, args),
        Commands::Completions(args) => cmd_completions(args.clone()),
    }
}

fn output_format(cli: &Cli, config: &Config) -> OutputFormat {
    cli.format
        .unwrap_or_else(|| config.output.format.parse().unwrap_or_default())
}

/// Attach the error's remediation hint, when it has one.
fn with_hint(err: PruneError) -> anyhow::Error {
    match err.suggestion() {
        Some(hint) => anyhow::anyhow!("{err}\n  {} {hint}", "Hint:".cyan()),
        None => err.into(),
    }
}

/// Stand-in graph for dry runs, which make no API calls.
struct OfflineGraph;

#[async_trait]
impl SocialGraph for OfflineGraph {
    async fn list_following(&self) -> ghprune::error::Result<Vec<Account>> {
        Err(PruneError::api("offline", 0, "dry runs make no API calls"))
    }

    async fn list_followers(&self) -> ghprune::error::Result<Vec<Account>> {
        Err(PruneError::api("offline", 0, "dry runs make no API calls"))
    }

    async fn unfollow(&self, _login: &str) -> ghprune::error::Result<()> {
        Err(PruneError::api("offline", 0, "dry runs make no API calls"))
    }

    async fn is_following_me(&self, _login: &str) -> ghprune::error::Result<bool> {
        Err(PruneError::api("offline", 0, "dry runs make no API calls"))
    }

    async fn is_followed_by_me(&self, _login: &str) -> ghprune::error::Result<bool> {
        Err(PruneError::api("offline", 0, "dry runs make no API calls"))
    }

    fn rate_limit(&self) -> Option<RateLimit> {
        None
    }
}

/// Sync both snapshots, record the run, and return the summary.
async fn run_sync(config: &Config, storage: &mut Storage) -> Result<sync::SyncSummary> {
    let client = GithubClient::new(config).map_err(with_hint)?;
    let started = Utc::now();

    let spinner = (!config.output.quiet).then(|| {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap(),
        );
        pb.set_message("Syncing follower and following lists...");
        pb.enable_steady_tick(Duration::from_millis(120));
        pb
    });

    let result = sync::sync_graph(&client, storage).await;
    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }

    match result {
        Ok(summary) => {
            storage
                .record_run(&RunRecord {
                    started_at: started,
                    mode: RunMode::Sync,
                    attempted: 0,
                    succeeded: 0,
                    failed: 0,
                    skipped: 0,
                    status: RunStatus::Completed,
                    details: Some(format!(
                        "following: {}, followers: {}",
                        summary.following, summary.followers
                    )),
                })
                .map_err(with_hint)?;
            Ok(summary)
        }
        Err(e) => {
            storage
                .record_run(&RunRecord {
                    started_at: started,
                    mode: RunMode::Sync,
                    attempted: 0,
                    succeeded: 0,
                    failed: 0,
                    skipped: 0,
                    status: RunStatus::Failed,
                    details: Some(e.to_string()),
                })
                .map_err(with_hint)?;
            Err(with_hint(e))
        }
    }
}

async fn cmd_sync(config: &Config) -> Result<()> {
    let mut storage = Storage::open(config.db_path()).map_err(with_hint)?;
    let summary = run_sync(config, &mut storage).await?;

    println!("{} Sync complete.", "✓".green());
    println!(
        "  {:<12} {:>8}",
        "Following:",
        format_number(summary.following as i64).cyan()
    );
    println!(
        "  {:<12} {:>8}",
        "Followers:",
        format_number(summary.followers as i64).cyan()
    );
    Ok(())
}

async fn cmd_unfollow(cli: &Cli, config: &Config, args: &cli::UnfollowArgs) -> Result<()> {
    let mut config = config.clone();
    if let Some(limit) = args.limit {
        config.batch.max_unfollows_per_run = limit;
    }
    if let Some(delay) = args.delay_ms {
        config.batch.request_delay_ms = delay;
    }
    if args.no_verify {
        config.batch.verify_before_unfollow = false;
    }

    let mut storage = Storage::open(config.db_path()).map_err(with_hint)?;

    if args.sync_first {
        let summary = run_sync(&config, &mut storage).await?;
        println!(
            "{} Synced {} following / {} followers.",
            "✓".green(),
            summary.following,
            summary.followers
        );
    }

    let format = output_format(cli, &config);
    let started = Utc::now();
    let mode = if args.dry_run {
        RunMode::DryRun
    } else {
        RunMode::Unfollow
    };

    let candidates = engine::eligible_candidates(&storage).map_err(with_hint)?;
    if candidates.is_empty() {
        let synced = storage.last_synced_at().map_err(with_hint)?;
        storage
            .record_run(&RunRecord {
                started_at: started,
                mode,
                attempted: 0,
                succeeded: 0,
                failed: 0,
                skipped: 0,
                status: RunStatus::Completed,
                details: Some("no candidates".to_string()),
            })
            .map_err(with_hint)?;

        if synced.is_none() {
            println!(
                "{}",
                "No snapshots yet. Run 'ghprune sync' first.".yellow()
            );
        } else {
            println!(
                "{}",
                "Nothing to unfollow; every account you follow either follows back or was already handled.".green()
            );
        }
        return Ok(());
    }

    let policy = ActionPolicy::from_config(&config, args.dry_run);
    let report = if args.dry_run {
        BatchExecutor::new(&OfflineGraph, policy)
            .run(&mut storage, &candidates)
            .await
            .map_err(with_hint)?
    } else {
        let client = GithubClient::new(&config).map_err(with_hint)?;
        BatchExecutor::new(&client, policy)
            .run(&mut storage, &candidates)
            .await
            .map_err(with_hint)?
    };

    storage
        .record_run(&report.clone().into_run_record(started, mode, None))
        .map_err(with_hint)?;

    if args.dry_run {
        print_dry_run(&report, candidates.len(), format)?;
    } else {
        print_batch_summary(&report, format)?;
    }
    Ok(())
}

fn print_dry_run(report: &BatchReport, total_candidates: usize, format: OutputFormat) -> Result<()> {
    let logins: Vec<&str> = report.would_unfollow().collect();

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&logins)?),
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(&logins)?),
        OutputFormat::Text => {
            println!(
                "{} Would unfollow {} of {} candidate(s):",
                "DRY RUN:".bold().yellow(),
                logins.len(),
                total_candidates
            );
            for login in logins.iter().take(10) {
                println!("  - {login}");
            }
            if logins.len() > 10 {
                println!("  ... and {} more", logins.len() - 10);
            }
        }
    }
    Ok(())
}

fn print_batch_summary(report: &BatchReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(report)?),
        OutputFormat::JsonPretty => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            if report.halted {
                println!(
                    "{}",
                    "Rate limit reached; the remaining candidates stay queued for the next run."
                        .yellow()
                );
            }

            let badge = if report.halted {
                "!".yellow()
            } else {
                "✓".green()
            };
            println!("{} Batch {}.", badge, report.status());
            println!("  {:<12} {:>6}", "Attempted:", report.attempted());
            println!(
                "  {:<12} {:>6}",
                "Unfollowed:",
                report.succeeded().to_string().green()
            );
            println!(
                "  {:<12} {:>6}",
                "Skipped:",
                report.skipped().to_string().cyan()
            );
            println!(
                "  {:<12} {:>6}",
                "Failed:",
                report.failed().to_string().red()
            );
        }
    }
    Ok(())
}

fn cmd_stats(cli: &Cli, config: &Config, args: &cli::StatsArgs) -> Result<()> {
    let storage = Storage::open(config.db_path()).map_err(with_hint)?;
    let stats = storage.stats().map_err(with_hint)?;
    let (runs, history) = if args.detailed {
        (
            storage.recent_runs(args.runs).map_err(with_hint)?,
            storage.recent_unfollows(args.runs).map_err(with_hint)?,
        )
    } else {
        (Vec::new(), Vec::new())
    };

    match output_format(cli, config) {
        OutputFormat::Json | OutputFormat::JsonPretty => {
            let payload = serde_json::json!({
                "stats": stats,
                "recent_runs": runs,
                "recent_unfollows": history,
            });
            let json = if matches!(output_format(cli, config), OutputFormat::JsonPretty) {
                serde_json::to_string_pretty(&payload)?
            } else {
                serde_json::to_string(&payload)?
            };
            println!("{json}");
        }
        OutputFormat::Text => {
            println!("{}", "Graph Statistics".bold().cyan());
            println!("{}", "─".repeat(40));
            println!("  {:<14} {:>10}", "Following:", format_number(stats.following));
            println!("  {:<14} {:>10}", "Followers:", format_number(stats.followers));
            println!(
                "  {:<14} {:>10}",
                "Candidates:",
                format_number(stats.candidates)
            );
            println!(
                "  {:<14} {:>10}",
                "Unfollowed:",
                format_number(stats.unfollowed)
            );
            println!("{}", "─".repeat(40));
            println!(
                "  Follow ratio: {}/{} = {:.1}%",
                format_number(stats.followers),
                format_number(stats.following),
                stats.follow_ratio() * 100.0
            );
            println!(
                "  Last synced:  {}",
                format_optional_date(stats.last_synced_at).green()
            );

            if args.detailed && !runs.is_empty() {
                println!();
                println!("{}", "Recent runs".bold().cyan());
                for run in &runs {
                    println!(
                        "  {} {:<9} {:<13} {} attempted, {} ok, {} failed, {} skipped",
                        run.started_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                        run.mode.to_string(),
                        run.status.to_string(),
                        run.attempted,
                        run.succeeded,
                        run.failed,
                        run.skipped
                    );
                }
            }

            if args.detailed && !history.is_empty() {
                println!();
                println!("{}", "Recent unfollows".bold().cyan());
                for entry in &history {
                    println!(
                        "  {} {:<20} {}",
                        entry
                            .unfollowed_at
                            .format("%Y-%m-%d %H:%M")
                            .to_string()
                            .dimmed(),
                        entry.login,
                        entry.reason.to_string().dimmed()
                    );
                }
            }
        }
    }

    Ok(())
}

fn cmd_config(config: &Config, args: &cli::ConfigArgs) -> Result<()> {
    if args.init {
        let path = Config::default().save().map_err(with_hint)?;
        println!("{} Wrote default config to {}", "✓".green(), path.display());
        return Ok(());
    }

    // Default to --show
    println!("{}", "Current Configuration".bold().cyan());
    if let Some(path) = Config::user_config_path() {
        let note = if path.exists() { "" } else { " (not present)" };
        println!("  File: {}{}", path.display(), note.dimmed());
    }
    println!("  Database: {}", config.db_path().display());
    println!();
    print!("{}", toml::to_string_pretty(&config.redacted())?);
    Ok(())
}

fn cmd_completions(args: cli::CompletionsArgs) -> Result<()> {
    let mut cmd = Cli::command();
    generate(args.shell, &mut cmd, "ghprune", &mut io::stdout());
    Ok(())
}
