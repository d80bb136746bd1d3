//! `dirmerge` binary: merge source trees into a target tree and print the outcomes.

mod args;
mod config;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use dirmerge_fs::{DirectoryMergeEngine, MergeOutcome, ReportMerge};
use tracing::error;
use tracing_subscriber::EnvFilter;

use crate::args::Cli;
use crate::config::{FileConfig, resolve};

const EXIT_ENTRY_FAILED: u8 = 1;
const EXIT_FATAL: u8 = 2;

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(&cli) {
        Ok(report) if report.error_count() > 0 => ExitCode::from(EXIT_ENTRY_FAILED),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("dirmerge: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

/// `DIRMERGE_LOG` wins; otherwise `warn`, or `debug` with `--verbose`.
fn init_logging(if_verbose: bool) {
    let env_filter = EnvFilter::try_from_env("DIRMERGE_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if if_verbose { "debug" } else { "warn" })
    });
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<ReportMerge> {
    let file_config = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let spec_run = resolve(cli, file_config)?;

    let report = DirectoryMergeEngine::new(spec_run.rule_strategy, spec_run.filter)
        .with_options(spec_run.spec_merge_options)
        .merge(&cli.target, &cli.sources)
        .with_context(|| format!("cannot merge into {}", cli.target.display()))?;

    let mut stdout = io::stdout().lock();
    for outcome in &report.outcomes {
        if cli.json {
            serde_json::to_writer(&mut stdout, outcome)?;
            writeln!(stdout)?;
        } else {
            writeln!(stdout, "{}", format_outcome_row(outcome))?;
        }
    }
    writeln!(stdout, "{report}")?;
    Ok(report)
}

fn format_outcome_row(outcome: &MergeOutcome) -> String {
    let mut txt = format!(
        "{:<14} {:<9} {}",
        outcome.action.as_str(),
        outcome.kind.to_string(),
        outcome.path_target.display()
    );
    if let Some(cause) = &outcome.cause {
        txt.push_str(&format!("  ({cause})"));
    }
    txt
}
