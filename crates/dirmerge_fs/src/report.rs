//! Merge outcome models and mutable report builder.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::spec::{EnumEntryKind, EnumMergeAction, MergeEntryError};

/// Recorded effect of processing one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeOutcome {
    pub path_source: PathBuf,
    pub path_target: PathBuf,
    pub kind: EnumEntryKind,
    pub action: EnumMergeAction,
    /// Failure cause, or the reason an entry was skipped without comparison.
    pub cause: Option<MergeEntryError>,
}

impl MergeOutcome {
    pub fn is_failed(&self) -> bool {
        self.action == EnumMergeAction::Failed
    }
}

/// Result of one merge run: outcomes in traversal order plus diagnostics.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ReportMerge {
    /// One entry per visited path, depth-first, directories before their files.
    pub outcomes: Vec<MergeOutcome>,
    /// Non-fatal warnings collected during traversal.
    pub warnings: Vec<String>,
    /// Set when the run stopped on a cancellation request.
    pub if_cancelled: bool,
}

impl ReportMerge {
    /// Number of outcomes carrying `action`.
    pub fn count(&self, action: EnumMergeAction) -> usize {
        self.outcomes.iter().filter(|o| o.action == action).count()
    }

    /// Number of failed entries.
    pub fn error_count(&self) -> usize {
        self.count(EnumMergeAction::Failed)
    }

    /// Number of collected warnings.
    pub fn warning_count(&self) -> usize {
        self.warnings.len()
    }

    /// Failed outcomes only.
    pub fn failures(&self) -> impl Iterator<Item = &MergeOutcome> {
        self.outcomes.iter().filter(|o| o.is_failed())
    }

    /// Machine-readable counters.
    pub fn to_dict(&self) -> BTreeMap<String, u64> {
        let mut dict_counts = BTreeMap::new();
        dict_counts.insert("cnt_visited".to_string(), self.outcomes.len() as u64);
        for action in EnumMergeAction::ALL {
            if action == EnumMergeAction::Failed {
                continue;
            }
            dict_counts.insert(
                format!("cnt_{}", action.as_str().to_ascii_lowercase()),
                self.count(action) as u64,
            );
        }
        dict_counts.insert("cnt_errors".to_string(), self.error_count() as u64);
        dict_counts.insert("cnt_warnings".to_string(), self.warning_count() as u64);
        dict_counts
    }

    /// Human-readable one-line summary.
    pub fn format(&self, prefix: &str) -> String {
        let dict_counts = self.to_dict();
        let mut txt = format!(
            "{prefix} visited={} created={} replaced={} skipped={} deleted_source={} errors={} warnings={}",
            dict_counts["cnt_visited"],
            dict_counts["cnt_created"],
            dict_counts["cnt_replaced"],
            dict_counts["cnt_skipped"],
            dict_counts["cnt_deleted_source"],
            dict_counts["cnt_errors"],
            dict_counts["cnt_warnings"]
        );
        if self.if_cancelled {
            txt.push_str(" cancelled");
        }
        txt
    }
}

impl fmt::Display for ReportMerge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format("[MERGE]"))
    }
}

/// Append-only accumulator used while walking.
#[derive(Debug, Default)]
pub struct ReportMergeBuilder {
    outcomes: Vec<MergeOutcome>,
    warnings: Vec<String>,
    if_cancelled: bool,
}

impl ReportMergeBuilder {
    /// Record one outcome.
    pub fn add_outcome(&mut self, outcome: MergeOutcome) {
        tracing::debug!(
            action = %outcome.action,
            kind = %outcome.kind,
            source = %outcome.path_source.display(),
            target = %outcome.path_target.display(),
            "entry processed"
        );
        if let Some(cause) = &outcome.cause
            && outcome.is_failed()
        {
            tracing::warn!(%cause, "entry failed");
        }
        self.outcomes.push(outcome);
    }

    /// Add warning message.
    pub fn add_warning(&mut self, warning: String) {
        tracing::warn!("{warning}");
        self.warnings.push(warning);
    }

    pub fn mark_cancelled(&mut self) {
        self.if_cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.if_cancelled
    }

    /// Append another builder's records after this one's, keeping order.
    pub fn extend(&mut self, other: ReportMergeBuilder) {
        self.outcomes.extend(other.outcomes);
        self.warnings.extend(other.warnings);
        self.if_cancelled |= other.if_cancelled;
    }

    /// Finalize builder into immutable report.
    pub fn build(self) -> ReportMerge {
        ReportMerge {
            outcomes: self.outcomes,
            warnings: self.warnings,
            if_cancelled: self.if_cancelled,
        }
    }
}
