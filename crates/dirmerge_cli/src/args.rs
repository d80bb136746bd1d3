//! Command-line flags and their string parsers.

use std::path::PathBuf;

use clap::Parser;
use dirmerge_fs::{EnumMergePatternMode, EnumMergeStrategy, SpecAttributeFilter};

#[derive(Debug, Parser)]
#[command(
    name = "dirmerge",
    version,
    about = "Merge one or more source directory trees into a target tree"
)]
pub struct Cli {
    /// Target directory; must already exist.
    pub target: PathBuf,

    /// Source directories, merged in the order given.
    #[arg(required = true, num_args = 1..)]
    pub sources: Vec<PathBuf>,

    /// Merge strategy: `target-as-master` or `source-to-target`.
    #[arg(long, value_parser = parse_rule_strategy)]
    pub strategy: Option<EnumMergeStrategy>,

    /// Comma-separated attributes to ignore:
    /// content, extension, last_modified, length, name.
    #[arg(long, value_parser = parse_ignore_list)]
    pub ignore: Option<SpecAttributeFilter>,

    /// Only merge files whose name matches (repeatable).
    #[arg(long = "include-file", value_name = "PATTERN")]
    pub patterns_include_files: Vec<String>,

    /// Skip files whose name matches (repeatable).
    #[arg(long = "exclude-file", value_name = "PATTERN")]
    pub patterns_exclude_files: Vec<String>,

    /// Only descend into directories whose name matches (repeatable).
    #[arg(long = "include-dir", value_name = "PATTERN")]
    pub patterns_include_dirs: Vec<String>,

    /// Skip directories whose name matches (repeatable).
    #[arg(long = "exclude-dir", value_name = "PATTERN")]
    pub patterns_exclude_dirs: Vec<String>,

    /// How patterns are interpreted: `glob`, `regex` or `literal`.
    #[arg(long, value_parser = parse_rule_pattern)]
    pub pattern_mode: Option<EnumMergePatternMode>,

    /// Modification times within the same bucket of this many milliseconds compare equal.
    #[arg(long, value_name = "MS")]
    pub mtime_granularity_ms: Option<u64>,

    /// Compare files up to this size byte-by-byte instead of hashing.
    #[arg(long, value_name = "BYTES")]
    pub byte_compare_threshold: Option<u64>,

    /// Maximum worker threads; 0 picks from the CPU count.
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Record every decision without touching the filesystem.
    #[arg(long)]
    pub dry_run: bool,

    /// Print outcomes as JSON lines.
    #[arg(long)]
    pub json: bool,

    /// TOML file with default options; flags take precedence.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log at debug level (overridden by `DIRMERGE_LOG`).
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn parse_rule_strategy(value: &str) -> Result<EnumMergeStrategy, String> {
    match value {
        "target-as-master" => Ok(EnumMergeStrategy::TargetAsMaster),
        "source-to-target" => Ok(EnumMergeStrategy::SourceToTarget),
        _ => Err(format!(
            "Invalid merge strategy: `{value}`. Expected one of: ['target-as-master', 'source-to-target']"
        )),
    }
}

pub fn parse_rule_pattern(value: &str) -> Result<EnumMergePatternMode, String> {
    match value {
        "glob" => Ok(EnumMergePatternMode::Glob),
        "regex" => Ok(EnumMergePatternMode::Regex),
        "literal" => Ok(EnumMergePatternMode::Literal),
        _ => Err(format!(
            "Invalid pattern strategy: `{value}`. Expected one of: ['glob', 'regex', 'literal']"
        )),
    }
}

pub fn parse_ignore_list(value: &str) -> Result<SpecAttributeFilter, String> {
    let mut builder_filter = SpecAttributeFilter::builder();
    for c_attr in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        builder_filter = match c_attr {
            "content" => builder_filter.ignore_content(true),
            "extension" => builder_filter.ignore_extension(true),
            "last_modified" => builder_filter.ignore_last_modified(true),
            "length" => builder_filter.ignore_length(true),
            "name" => builder_filter.ignore_name(true),
            _ => {
                return Err(format!(
                    "Invalid attribute: `{c_attr}`. Expected one of: ['content', 'extension', 'last_modified', 'length', 'name']"
                ));
            }
        };
    }
    Ok(builder_filter.build())
}
