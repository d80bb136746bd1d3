//! Merge strategies and their policy tables.
//!
//! A strategy is a pure lookup: the walk asks the table what to do for each of the
//! four situations an entry can be in and never branches on the strategy itself.

use std::fmt;
use std::path::Path;

use crate::spec::{EnumMergeAction, MergeEntryError};

/// Conflict-resolution strategy for a merge run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnumMergeStrategy {
    /// Target is authoritative; reconciled source entries are consumed.
    TargetAsMaster,
    /// Target accumulates from sources; sources are never touched.
    SourceToTarget,
}

impl EnumMergeStrategy {
    /// Policy table for this strategy.
    pub fn policy(self) -> &'static SpecMergePolicy {
        match self {
            Self::TargetAsMaster => &POLICY_TARGET_AS_MASTER,
            Self::SourceToTarget => &POLICY_SOURCE_TO_TARGET,
        }
    }
}

impl fmt::Display for EnumMergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TargetAsMaster => f.write_str("target-as-master"),
            Self::SourceToTarget => f.write_str("source-to-target"),
        }
    }
}

/// What to do with the target entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumTargetEffect {
    /// Leave the target as it is.
    Keep,
    /// Copy the source entry to the (absent) target path.
    CopyIn,
    /// Try the content merger, fall back to whole-file replacement.
    MergeOrReplace,
    /// Record a failure without touching anything.
    Fail,
}

/// Resolution for one situation: effect on the target, fate of the source, recorded action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecPolicyRule {
    pub effect_target: EnumTargetEffect,
    pub if_delete_source: bool,
    pub action: EnumMergeAction,
}

/// Four situations a source entry can be in relative to the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecMergePolicy {
    /// Target path does not exist.
    pub on_missing: SpecPolicyRule,
    /// Both exist and every compared attribute is equal.
    pub on_identical: SpecPolicyRule,
    /// Both exist and at least one compared attribute differs.
    pub on_conflict: SpecPolicyRule,
    /// One side is a file, the other a directory.
    pub on_kind_conflict: SpecPolicyRule,
}

const RULE_COPY_IN: SpecPolicyRule = SpecPolicyRule {
    effect_target: EnumTargetEffect::CopyIn,
    if_delete_source: false,
    action: EnumMergeAction::Created,
};

const RULE_KIND_CONFLICT: SpecPolicyRule = SpecPolicyRule {
    effect_target: EnumTargetEffect::Fail,
    if_delete_source: false,
    action: EnumMergeAction::Failed,
};

pub const POLICY_TARGET_AS_MASTER: SpecMergePolicy = SpecMergePolicy {
    on_missing: RULE_COPY_IN,
    on_identical: SpecPolicyRule {
        effect_target: EnumTargetEffect::Keep,
        if_delete_source: true,
        action: EnumMergeAction::DeletedSource,
    },
    on_conflict: SpecPolicyRule {
        effect_target: EnumTargetEffect::MergeOrReplace,
        if_delete_source: true,
        action: EnumMergeAction::DeletedSource,
    },
    on_kind_conflict: RULE_KIND_CONFLICT,
};

pub const POLICY_SOURCE_TO_TARGET: SpecMergePolicy = SpecMergePolicy {
    on_missing: RULE_COPY_IN,
    on_identical: SpecPolicyRule {
        effect_target: EnumTargetEffect::Keep,
        if_delete_source: false,
        action: EnumMergeAction::Skipped,
    },
    on_conflict: SpecPolicyRule {
        effect_target: EnumTargetEffect::MergeOrReplace,
        if_delete_source: false,
        action: EnumMergeAction::Replaced,
    },
    on_kind_conflict: RULE_KIND_CONFLICT,
};

/// Result of asking a [`ContentMerger`] to reconcile two conflicting files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumMergeAttempt {
    /// Target now holds the merged content.
    Merged,
    /// No merge possible; the caller replaces the target.
    NotMergeable,
}

/// Hook consulted before a conflicting target file is replaced.
pub trait ContentMerger: Send + Sync {
    fn try_merge(
        &self,
        path_source: &Path,
        path_target: &Path,
    ) -> Result<EnumMergeAttempt, MergeEntryError>;
}

/// Opaque content: never mergeable, conflicts always degrade to replacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpaqueContentMerger;

impl ContentMerger for OpaqueContentMerger {
    fn try_merge(
        &self,
        _path_source: &Path,
        _path_target: &Path,
    ) -> Result<EnumMergeAttempt, MergeEntryError> {
        Ok(EnumMergeAttempt::NotMergeable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_as_master_consumes_reconciled_sources() {
        let policy = EnumMergeStrategy::TargetAsMaster.policy();
        assert!(policy.on_identical.if_delete_source);
        assert!(policy.on_conflict.if_delete_source);
        assert!(!policy.on_missing.if_delete_source);
        assert_eq!(policy.on_identical.action, EnumMergeAction::DeletedSource);
        assert_eq!(policy.on_conflict.action, EnumMergeAction::DeletedSource);
    }

    #[test]
    fn source_to_target_never_deletes_sources() {
        let policy = EnumMergeStrategy::SourceToTarget.policy();
        for rule in [
            policy.on_missing,
            policy.on_identical,
            policy.on_conflict,
            policy.on_kind_conflict,
        ] {
            assert!(!rule.if_delete_source);
        }
        assert_eq!(policy.on_identical.action, EnumMergeAction::Skipped);
        assert_eq!(policy.on_conflict.action, EnumMergeAction::Replaced);
    }

    #[test]
    fn both_strategies_share_missing_and_kind_conflict_rules() {
        for strategy in [
            EnumMergeStrategy::TargetAsMaster,
            EnumMergeStrategy::SourceToTarget,
        ] {
            let policy = strategy.policy();
            assert_eq!(policy.on_missing.effect_target, EnumTargetEffect::CopyIn);
            assert_eq!(policy.on_missing.action, EnumMergeAction::Created);
            assert_eq!(policy.on_kind_conflict.effect_target, EnumTargetEffect::Fail);
            assert_eq!(policy.on_conflict.effect_target, EnumTargetEffect::MergeOrReplace);
        }
    }

    #[test]
    fn opaque_merger_never_merges() {
        let attempt = OpaqueContentMerger
            .try_merge(Path::new("a.bin"), Path::new("b.bin"))
            .expect("opaque merger");
        assert_eq!(attempt, EnumMergeAttempt::NotMergeable);
    }
}
