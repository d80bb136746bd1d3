//! `dirmerge_fs` v1:
//! Rust-side directory merge engine.
//!
//! Modules:
//! - `merge`    : traversal and merge orchestration
//! - `compare`  : attribute-wise entry comparison
//! - `checksum` : content digests
//! - `strategy` : merge strategies and policy tables
//! - `spec`     : enums/options/errors
//! - `report`   : per-entry outcomes and run report
//! - `cancel`   : cooperative cancellation token
//! - `util`     : shared helper functions

pub mod cancel;
pub mod checksum;
pub mod compare;
pub mod merge;
pub mod report;
pub mod spec;
pub mod strategy;
mod util;

pub use cancel::MergeCancelToken;
pub use checksum::{Blake3ChecksumProvider, ChecksumProvider, ContentHash};
pub use compare::{ComparisonResult, FileComparator, FileEntryRef};
pub use merge::{DirectoryMergeEngine, merge_tree};
pub use report::{MergeOutcome, ReportMerge, ReportMergeBuilder};
pub use spec::{
    EnumEntryKind, EnumMergeAction, EnumMergePatternMode, MergeEntryError, MergeTreeError,
    SpecAttributeFilter, SpecAttributeFilterBuilder, SpecCompareOptions, SpecMergeOptions,
};
pub use strategy::{
    ContentMerger, EnumMergeAttempt, EnumMergeStrategy, EnumTargetEffect, OpaqueContentMerger,
    SpecMergePolicy, SpecPolicyRule,
};
