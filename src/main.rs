use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use gerrit_dispatch::config::Config;
use gerrit_dispatch::gerrit::{
    parse_target, DispatchOutcome, Dispatcher, OpenSshConnector, ReviewBatch, TargetResult,
    TomlPreferences,
};
use gerrit_dispatch::init;

#[derive(Parser, Debug)]
#[command(name = "gerrit-dispatch")]
#[command(about = "Send Gerrit review verdicts over SSH")]
#[command(version)]
struct Args {
    /// Config file (default: ~/.config/gerrit-dispatch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter, e.g. "info" or "gerrit_dispatch=trace"
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run `gerrit review` for each target, one SSH session per host run
    Review {
        /// HOST:CHANGE,PATCHSET or CHANGE,PATCHSET (repeatable)
        #[arg(short, long = "target", required = true)]
        targets: Vec<String>,

        /// Host for targets given without one
        #[arg(long)]
        host: Option<String>,

        /// Appended verbatim to every command (e.g. "--verified +1")
        #[arg(short, long, allow_hyphen_values = true)]
        args: String,

        /// Per-user preferences (default: ~/.config/gerrit-dispatch/preferences.toml)
        #[arg(long)]
        preferences: Option<PathBuf>,

        /// Print per-target results as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Write default config.toml and preferences.toml
    Init {
        /// Overwrite existing files
        #[arg(long, default_value = "false")]
        force: bool,
    },
}

#[derive(Serialize)]
struct Summary<'a> {
    success: bool,
    results: &'a [TargetResult],
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();

    // stderr keeps stdout clean for --json
    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    match args.command {
        Commands::Init { force } => {
            init::run_init(force)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Review {
            targets,
            host,
            args: review_args,
            preferences,
            json,
        } => {
            let config = match &args.config {
                Some(path) => Config::load_from(path)?,
                None => Config::load()?,
            };
            let targets = targets
                .iter()
                .map(|t| parse_target(t, host.as_deref()))
                .collect::<Result<Vec<_>, _>>()?;
            let batch = ReviewBatch::new(targets, review_args);
            let preferences = preferences.or_else(Config::default_preferences_path);

            // The dispatcher blocks on ssh; keep it off the async workers
            let outcome = tokio::task::spawn_blocking(move || {
                run_review(config, &batch, preferences.as_deref())
            })
            .await
            .context("spawn_blocking task panicked")??;

            report(&outcome, json)?;
            Ok(if outcome.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(1)
            })
        }
    }
}

fn run_review(
    config: Config,
    batch: &ReviewBatch,
    preferences: Option<&Path>,
) -> Result<DispatchOutcome> {
    // An unreadable preferences file only means there is no per-user credential
    let store = preferences
        .filter(|path| path.exists())
        .and_then(|path| match TomlPreferences::load(path) {
            Ok(store) => Some(store),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring preferences file");
                None
            }
        });

    let connector = OpenSshConnector::new(&config.ssh);
    let mut dispatcher = Dispatcher::new(connector, config.ssh);
    if let Some(store) = &store {
        dispatcher = dispatcher.with_preferences(store);
    }
    Ok(dispatcher.dispatch(batch)?)
}

fn report(outcome: &DispatchOutcome, json: bool) -> Result<()> {
    if json {
        let summary = Summary {
            success: outcome.success(),
            results: &outcome.results,
        };
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    for result in &outcome.results {
        println!(
            "{} {}:{},{} (exit {})",
            if result.success() { "ok  " } else { "FAIL" },
            result.target.host,
            result.target.change,
            result.target.patch_set,
            result.exit_status
        );
    }
    let failed = outcome.failures().count();
    println!(
        "{} of {} reviews succeeded",
        outcome.results.len() - failed,
        outcome.results.len()
    );
    Ok(())
}
