//! Optional TOML defaults and their resolution against command-line flags.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use dirmerge_fs::{EnumMergeStrategy, SpecAttributeFilter, SpecCompareOptions, SpecMergeOptions};
use serde::Deserialize;

use crate::args::{Cli, parse_ignore_list, parse_rule_pattern, parse_rule_strategy};

/// Contents of a `--config` file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub strategy: Option<String>,
    pub ignore: Option<Vec<String>>,
    pub pattern_mode: Option<String>,
    pub include_files: Option<Vec<String>>,
    pub exclude_files: Option<Vec<String>>,
    pub include_dirs: Option<Vec<String>>,
    pub exclude_dirs: Option<Vec<String>>,
    pub mtime_granularity_ms: Option<u64>,
    pub byte_compare_threshold: Option<u64>,
    pub workers: Option<usize>,
    pub dry_run: Option<bool>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let txt = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        toml::from_str(&txt).with_context(|| format!("invalid config {}", path.display()))
    }
}

/// Everything the engine needs for one run.
#[derive(Debug)]
pub struct SpecRun {
    pub rule_strategy: EnumMergeStrategy,
    pub filter: SpecAttributeFilter,
    pub spec_merge_options: SpecMergeOptions,
}

fn non_empty_or(l_cli: &[String], l_file: Option<Vec<String>>) -> Option<Vec<String>> {
    if l_cli.is_empty() {
        l_file
    } else {
        Some(l_cli.to_vec())
    }
}

/// Merge flag values over file values over engine defaults.
pub fn resolve(cli: &Cli, file_config: FileConfig) -> Result<SpecRun> {
    let rule_strategy = match (cli.strategy, file_config.strategy.as_deref()) {
        (Some(v), _) => v,
        (None, Some(value)) => parse_rule_strategy(value).map_err(|e| anyhow!(e))?,
        (None, None) => EnumMergeStrategy::TargetAsMaster,
    };
    let filter = match (cli.ignore, file_config.ignore) {
        (Some(v), _) => v,
        (None, Some(l_attrs)) => parse_ignore_list(&l_attrs.join(",")).map_err(|e| anyhow!(e))?,
        (None, None) => SpecAttributeFilter::compare_all(),
    };

    let defaults = SpecMergeOptions::default();
    let rule_pattern = match (cli.pattern_mode, file_config.pattern_mode.as_deref()) {
        (Some(v), _) => v,
        (None, Some(value)) => parse_rule_pattern(value).map_err(|e| anyhow!(e))?,
        (None, None) => defaults.rule_pattern,
    };

    let mut spec_compare = SpecCompareOptions::default();
    if let Some(n_ms) = cli.mtime_granularity_ms.or(file_config.mtime_granularity_ms) {
        spec_compare.mtime_granularity = Duration::from_millis(n_ms);
    }
    spec_compare.byte_compare_threshold = cli
        .byte_compare_threshold
        .or(file_config.byte_compare_threshold);

    let num_workers_max = match cli.workers.or(file_config.workers) {
        Some(0) => None,
        Some(n) => Some(n),
        None => defaults.num_workers_max,
    };

    let spec_merge_options = SpecMergeOptions {
        patterns_include_files: non_empty_or(&cli.patterns_include_files, file_config.include_files),
        patterns_exclude_files: non_empty_or(&cli.patterns_exclude_files, file_config.exclude_files),
        patterns_include_dirs: non_empty_or(&cli.patterns_include_dirs, file_config.include_dirs),
        patterns_exclude_dirs: non_empty_or(&cli.patterns_exclude_dirs, file_config.exclude_dirs),
        rule_pattern,
        spec_compare,
        num_workers_max,
        if_dry_run: cli.dry_run || file_config.dry_run.unwrap_or(false),
    };

    Ok(SpecRun {
        rule_strategy,
        filter,
        spec_merge_options,
    })
}
