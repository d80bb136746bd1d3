//! Merge specification models and error types.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

////////////////////////////////////////////////////////////////////////////////
// #region EnumsInit

/// Kind of one filesystem entry as seen by the merge walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnumEntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symbolic link (never followed by the merge walk).
    Symlink,
    /// Socket, FIFO, device node.
    Other,
}

impl fmt::Display for EnumEntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c_name = match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Symlink => "symlink",
            Self::Other => "special file",
        };
        f.write_str(c_name)
    }
}

/// Action recorded for one visited entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EnumMergeAction {
    /// Entry was absent in the target and has been copied in.
    Created,
    /// Target entry was overwritten with the source content.
    Replaced,
    /// Nothing changed for this entry.
    Skipped,
    /// Source entry became redundant and was removed.
    DeletedSource,
    /// Entry could not be processed; see the outcome cause.
    Failed,
}

impl EnumMergeAction {
    /// All actions in reporting order.
    pub const ALL: [EnumMergeAction; 5] = [
        Self::Created,
        Self::Replaced,
        Self::Skipped,
        Self::DeletedSource,
        Self::Failed,
    ];

    /// Stable upper-case label used in reports.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Replaced => "REPLACED",
            Self::Skipped => "SKIPPED",
            Self::DeletedSource => "DELETED_SOURCE",
            Self::Failed => "FAILED",
        }
    }
}

impl fmt::Display for EnumMergeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pattern matching mode for include/exclude lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumMergePatternMode {
    /// Shell-like wildcards (`*`, `?`, character classes).
    Glob,
    /// Regular expression pattern.
    Regex,
    /// Substring match.
    Literal,
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region AttributeFilter

/// Attributes to leave out of the equality verdict.
///
/// Ignored attributes count as equal when deciding whether two entries conflict.
/// Built once through [`SpecAttributeFilterBuilder`] and never mutated afterwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SpecAttributeFilter {
    ignore_content: bool,
    ignore_extension: bool,
    ignore_last_modified: bool,
    ignore_length: bool,
    ignore_name: bool,
}

impl SpecAttributeFilter {
    /// Start a builder with nothing ignored.
    pub fn builder() -> SpecAttributeFilterBuilder {
        SpecAttributeFilterBuilder::default()
    }

    /// Filter that compares every attribute.
    pub fn compare_all() -> Self {
        Self::default()
    }

    pub fn ignores_content(&self) -> bool {
        self.ignore_content
    }

    pub fn ignores_extension(&self) -> bool {
        self.ignore_extension
    }

    pub fn ignores_last_modified(&self) -> bool {
        self.ignore_last_modified
    }

    pub fn ignores_length(&self) -> bool {
        self.ignore_length
    }

    pub fn ignores_name(&self) -> bool {
        self.ignore_name
    }
}

/// Builder for [`SpecAttributeFilter`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SpecAttributeFilterBuilder {
    inner: SpecAttributeFilter,
}

impl SpecAttributeFilterBuilder {
    pub fn ignore_content(mut self, value: bool) -> Self {
        self.inner.ignore_content = value;
        self
    }

    pub fn ignore_extension(mut self, value: bool) -> Self {
        self.inner.ignore_extension = value;
        self
    }

    pub fn ignore_last_modified(mut self, value: bool) -> Self {
        self.inner.ignore_last_modified = value;
        self
    }

    pub fn ignore_length(mut self, value: bool) -> Self {
        self.inner.ignore_length = value;
        self
    }

    pub fn ignore_name(mut self, value: bool) -> Self {
        self.inner.ignore_name = value;
        self
    }

    pub fn build(self) -> SpecAttributeFilter {
        self.inner
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Options

/// Comparator tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecCompareOptions {
    /// Timestamps falling into the same bucket of this width compare equal.
    ///
    /// Use e.g. 2 seconds for FAT volumes. Zero is treated as one nanosecond.
    pub mtime_granularity: Duration,
    /// Files at or below this size are compared byte-for-byte instead of by digest.
    pub byte_compare_threshold: Option<u64>,
}

impl Default for SpecCompareOptions {
    fn default() -> Self {
        Self {
            mtime_granularity: Duration::from_nanos(1),
            byte_compare_threshold: None,
        }
    }
}

/// Input options for a merge run.
#[derive(Debug, Clone)]
pub struct SpecMergeOptions {
    /// Include patterns applied to file basename.
    pub patterns_include_files: Option<Vec<String>>,
    /// Exclude patterns applied to file basename.
    pub patterns_exclude_files: Option<Vec<String>>,
    /// Include patterns applied to directory basename.
    pub patterns_include_dirs: Option<Vec<String>>,
    /// Exclude patterns applied to directory basename.
    pub patterns_exclude_dirs: Option<Vec<String>>,
    /// Pattern interpretation mode.
    pub rule_pattern: EnumMergePatternMode,
    /// Comparator tuning.
    pub spec_compare: SpecCompareOptions,
    /// Maximum worker threads for top-level subtrees. `None` picks from CPU count.
    pub num_workers_max: Option<usize>,
    /// Do not mutate filesystem; record what would happen.
    pub if_dry_run: bool,
}

impl Default for SpecMergeOptions {
    fn default() -> Self {
        Self {
            patterns_include_files: None,
            patterns_exclude_files: None,
            patterns_include_dirs: None,
            patterns_exclude_dirs: None,
            rule_pattern: EnumMergePatternMode::Glob,
            spec_compare: SpecCompareOptions::default(),
            num_workers_max: Some(1),
            if_dry_run: false,
        }
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Errors

/// Per-entry failure. Recorded in the outcome, never aborts the walk.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MergeEntryError {
    /// Two entries of different kinds were handed to the comparator.
    #[error("Cannot compare {kind_left} with {kind_right}: {}", .path.display())]
    KindMismatch {
        path: PathBuf,
        kind_left: EnumEntryKind,
        kind_right: EnumEntryKind,
    },
    /// Source and target hold different entry kinds at the same relative path.
    #[error(
        "Kind conflict at {}: source is a {kind_source}, target is a {kind_target}",
        .path.display()
    )]
    KindConflict {
        path: PathBuf,
        kind_source: EnumEntryKind,
        kind_target: EnumEntryKind,
    },
    /// Entry disappeared between listing and processing.
    #[error("Entry vanished: {}", .path.display())]
    NotFound { path: PathBuf },
    /// Read, write or permission error.
    #[error("I/O failure at {}: {message}", .path.display())]
    IoFailure { path: PathBuf, message: String },
    /// Content digest could not be computed.
    #[error("Checksum failed for {}: {message}", .path.display())]
    ChecksumFailure { path: PathBuf, message: String },
    /// Target path escapes the target root or traverses a symlink.
    #[error("Unsafe destination {}: {message}", .path.display())]
    UnsafeDestination { path: PathBuf, message: String },
}

impl MergeEntryError {
    pub(crate) fn from_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            return Self::NotFound { path };
        }
        Self::IoFailure {
            path,
            message: err.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// "Top-level call failed" errors (input validation / setup stage).
#[derive(Debug, Error)]
pub enum MergeTreeError {
    /// Merge called with an empty source list.
    #[error("At least one source directory is required.")]
    NoSources,
    /// Target root does not exist.
    #[error("Target directory does not exist: {}", .0.display())]
    TargetNotFound(PathBuf),
    /// Target root exists but is not a directory.
    #[error("Target is not a directory: {}", .0.display())]
    TargetNotDirectory(PathBuf),
    /// Source root does not exist.
    #[error("Source directory does not exist: {}", .0.display())]
    SourceNotFound(PathBuf),
    /// Source root exists but is not a directory.
    #[error("Source is not a directory: {}", .0.display())]
    SourceNotDirectory(PathBuf),
    /// A source contains the target or vice versa.
    #[error(
        "Source and target directories overlap: {} <-> {}",
        .source_dir.display(),
        .target_dir.display()
    )]
    SourceTargetOverlap {
        source_dir: PathBuf,
        target_dir: PathBuf,
    },
    /// Invalid include/exclude pattern.
    #[error("{0}")]
    InvalidPattern(String),
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
