//! Directory merge traversal and orchestration.

use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::ThreadPoolBuilder;
use rayon::prelude::*;
use tracing::{info, instrument};

use crate::cancel::MergeCancelToken;
use crate::checksum::{Blake3ChecksumProvider, ChecksumProvider};
use crate::compare::{FileComparator, FileEntryRef};
use crate::report::{MergeOutcome, ReportMerge, ReportMergeBuilder};
use crate::spec::{
    EnumEntryKind, EnumMergeAction, MergeEntryError, MergeTreeError, SpecAttributeFilter,
    SpecMergeOptions,
};
use crate::strategy::{
    ContentMerger, EnumMergeAttempt, EnumMergeStrategy, EnumTargetEffect, OpaqueContentMerger,
    SpecMergePolicy, SpecPolicyRule,
};
use crate::util::{
    SpecMergePatterns, absolutize_path, calculate_worker_limit, copy_file_with_metadata,
    is_empty_dir, is_overlap, remove_path, validate_destination_path_safety,
};

/// Pending unit of work, keyed by path relative to the source root.
#[derive(Debug, Clone)]
enum TypeWorkItem {
    /// Resolve a source directory against the target, then queue its children.
    Dir(PathBuf),
    /// Resolve a non-directory source entry.
    File(PathBuf),
    /// Post-order step for a directory that already existed in the target.
    LeaveDir(PathBuf),
}

/// Immutable per-source state shared by every worker.
struct SpecMergeContext<'a> {
    path_dir_src: PathBuf,
    path_dir_dst: PathBuf,
    policy: &'static SpecMergePolicy,
    filter: SpecAttributeFilter,
    spec_merge_pats: &'a SpecMergePatterns,
    comparator: FileComparator<'a>,
    content_merger: &'a dyn ContentMerger,
    cancel_token: &'a MergeCancelToken,
    if_dry_run: bool,
}

impl SpecMergeContext<'_> {
    fn outcome(
        &self,
        path_rel: &Path,
        kind: EnumEntryKind,
        action: EnumMergeAction,
        cause: Option<MergeEntryError>,
    ) -> MergeOutcome {
        MergeOutcome {
            path_source: join_rel(&self.path_dir_src, path_rel),
            path_target: join_rel(&self.path_dir_dst, path_rel),
            kind,
            action,
            cause,
        }
    }

    fn failed(
        &self,
        path_rel: &Path,
        kind: EnumEntryKind,
        cause: MergeEntryError,
    ) -> MergeOutcome {
        // A vanished entry is not a failure: nothing was there to merge.
        let action = if cause.is_not_found() {
            EnumMergeAction::Skipped
        } else {
            EnumMergeAction::Failed
        };
        self.outcome(path_rel, kind, action, Some(cause))
    }
}

fn join_rel(path_root: &Path, path_rel: &Path) -> PathBuf {
    if path_rel.as_os_str().is_empty() {
        return path_root.to_path_buf();
    }
    path_root.join(path_rel)
}

////////////////////////////////////////////////////////////////////////////////
// #region Engine

/// Merges source trees into a target tree under one strategy and attribute filter.
///
/// Sources are processed in the order given, so a later source wins over an earlier one
/// on the same relative path. Per-entry problems end up as outcomes in the returned
/// [`ReportMerge`]; only invalid roots and patterns fail the whole call.
pub struct DirectoryMergeEngine {
    rule_strategy: EnumMergeStrategy,
    filter: SpecAttributeFilter,
    spec_merge_options: SpecMergeOptions,
    checksum: Arc<dyn ChecksumProvider>,
    content_merger: Arc<dyn ContentMerger>,
    cancel_token: MergeCancelToken,
}

impl DirectoryMergeEngine {
    pub fn new(rule_strategy: EnumMergeStrategy, filter: SpecAttributeFilter) -> Self {
        Self {
            rule_strategy,
            filter,
            spec_merge_options: SpecMergeOptions::default(),
            checksum: Arc::new(Blake3ChecksumProvider),
            content_merger: Arc::new(OpaqueContentMerger),
            cancel_token: MergeCancelToken::new(),
        }
    }

    pub fn with_options(mut self, spec_merge_options: SpecMergeOptions) -> Self {
        self.spec_merge_options = spec_merge_options;
        self
    }

    pub fn with_checksum_provider(mut self, checksum: Arc<dyn ChecksumProvider>) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_content_merger(mut self, content_merger: Arc<dyn ContentMerger>) -> Self {
        self.content_merger = content_merger;
        self
    }

    pub fn with_cancel_token(mut self, cancel_token: MergeCancelToken) -> Self {
        self.cancel_token = cancel_token;
        self
    }

    /// Token that stops this engine's runs when cancelled.
    pub fn cancel_token(&self) -> &MergeCancelToken {
        &self.cancel_token
    }

    /// Merge `dir_sources` into `dir_target`.
    #[instrument(
        skip_all,
        fields(
            dir_target = %dir_target.as_ref().display(),
            n_sources = dir_sources.len(),
            strategy = %self.rule_strategy
        )
    )]
    pub fn merge<P, Q>(
        &self,
        dir_target: P,
        dir_sources: &[Q],
    ) -> Result<ReportMerge, MergeTreeError>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        if dir_sources.is_empty() {
            return Err(MergeTreeError::NoSources);
        }
        let path_dir_dst = absolutize_path(dir_target.as_ref());
        match fs::metadata(&path_dir_dst) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(MergeTreeError::TargetNotDirectory(path_dir_dst)),
            Err(_) => return Err(MergeTreeError::TargetNotFound(path_dir_dst)),
        }

        let mut l_paths_dir_src = Vec::with_capacity(dir_sources.len());
        for dir_source in dir_sources {
            let path_dir_src = absolutize_path(dir_source.as_ref());
            match fs::metadata(&path_dir_src) {
                Ok(meta) if meta.is_dir() => {}
                Ok(_) => return Err(MergeTreeError::SourceNotDirectory(path_dir_src)),
                Err(_) => return Err(MergeTreeError::SourceNotFound(path_dir_src)),
            }
            if is_overlap(&path_dir_src, &path_dir_dst) {
                return Err(MergeTreeError::SourceTargetOverlap {
                    source_dir: path_dir_src,
                    target_dir: path_dir_dst,
                });
            }
            l_paths_dir_src.push(path_dir_src);
        }

        let spec_merge_pats = SpecMergePatterns::from_raw(
            self.spec_merge_options.patterns_include_files.as_deref(),
            self.spec_merge_options.patterns_exclude_files.as_deref(),
            self.spec_merge_options.patterns_include_dirs.as_deref(),
            self.spec_merge_options.patterns_exclude_dirs.as_deref(),
            self.spec_merge_options.rule_pattern,
        )?;
        let n_workers_max = calculate_worker_limit(self.spec_merge_options.num_workers_max);
        info!(n_workers_max, if_dry_run = self.spec_merge_options.if_dry_run, "merge started");

        let mut builder_merge_report = ReportMergeBuilder::default();
        for path_dir_src in l_paths_dir_src {
            if self.cancel_token.is_cancelled() {
                builder_merge_report.mark_cancelled();
                break;
            }
            let spec_merge_ctx = SpecMergeContext {
                path_dir_src,
                path_dir_dst: path_dir_dst.clone(),
                policy: self.rule_strategy.policy(),
                filter: self.filter,
                spec_merge_pats: &spec_merge_pats,
                comparator: FileComparator::new(
                    self.checksum.as_ref(),
                    self.spec_merge_options.spec_compare,
                ),
                content_merger: self.content_merger.as_ref(),
                cancel_token: &self.cancel_token,
                if_dry_run: self.spec_merge_options.if_dry_run,
            };
            merge_source(&spec_merge_ctx, n_workers_max, &mut builder_merge_report);
            if builder_merge_report.is_cancelled() {
                break;
            }
        }

        let report = builder_merge_report.build();
        info!(summary = %report, "merge finished");
        Ok(report)
    }
}

/// Merge `dir_sources` into `dir_target` with default options.
pub fn merge_tree<P, Q>(
    dir_target: P,
    dir_sources: &[Q],
    rule_strategy: EnumMergeStrategy,
    filter: SpecAttributeFilter,
) -> Result<ReportMerge, MergeTreeError>
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    DirectoryMergeEngine::new(rule_strategy, filter).merge(dir_target, dir_sources)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Traversal

fn merge_source(
    spec_merge_ctx: &SpecMergeContext<'_>,
    n_workers_max: usize,
    builder_merge_report: &mut ReportMergeBuilder,
) {
    let path_rel_root = PathBuf::new();
    let (l_dirs, l_files) = match list_children(spec_merge_ctx, &path_rel_root) {
        Ok(v) => v,
        Err(cause) => {
            builder_merge_report.add_outcome(spec_merge_ctx.failed(
                &path_rel_root,
                EnumEntryKind::Directory,
                cause,
            ));
            return;
        }
    };

    if n_workers_max <= 1 || l_dirs.len() <= 1 {
        let mut l_stack = Vec::new();
        push_children(&mut l_stack, l_dirs, l_files);
        walk_worklist(spec_merge_ctx, l_stack, builder_merge_report);
        return;
    }

    let thread_pool = ThreadPoolBuilder::new().num_threads(n_workers_max).build();
    let Ok(thread_pool) = thread_pool else {
        builder_merge_report.add_warning(format!(
            "Failed to initialize thread pool (workers={n_workers_max}); fallback to serial merge."
        ));
        let mut l_stack = Vec::new();
        push_children(&mut l_stack, l_dirs, l_files);
        walk_worklist(spec_merge_ctx, l_stack, builder_merge_report);
        return;
    };

    // Sibling subtrees share no mutable state; per-subtree reports are joined in name order.
    let l_subtree_reports = thread_pool.install(|| {
        l_dirs
            .into_par_iter()
            .map(|path_rel_dir| {
                let mut builder_subtree = ReportMergeBuilder::default();
                walk_worklist(
                    spec_merge_ctx,
                    vec![TypeWorkItem::Dir(path_rel_dir)],
                    &mut builder_subtree,
                );
                builder_subtree
            })
            .collect::<Vec<_>>()
    });
    for builder_subtree in l_subtree_reports {
        builder_merge_report.extend(builder_subtree);
    }
    if builder_merge_report.is_cancelled() {
        return;
    }

    let mut l_stack = Vec::new();
    push_children(&mut l_stack, Vec::new(), l_files);
    walk_worklist(spec_merge_ctx, l_stack, builder_merge_report);
}

fn walk_worklist(
    spec_merge_ctx: &SpecMergeContext<'_>,
    mut l_stack: Vec<TypeWorkItem>,
    builder_merge_report: &mut ReportMergeBuilder,
) {
    while let Some(work_item) = l_stack.pop() {
        if spec_merge_ctx.cancel_token.is_cancelled() {
            builder_merge_report.mark_cancelled();
            return;
        }
        match work_item {
            TypeWorkItem::Dir(path_rel) => {
                handle_dir_entry(spec_merge_ctx, path_rel, &mut l_stack, builder_merge_report)
            }
            TypeWorkItem::File(path_rel) => {
                handle_file_entry(spec_merge_ctx, &path_rel, builder_merge_report)
            }
            TypeWorkItem::LeaveDir(path_rel) => {
                finalize_dir_entry(spec_merge_ctx, &path_rel, builder_merge_report)
            }
        }
    }
}

/// Queue children so that directories pop first, each in name order.
fn push_children(
    l_stack: &mut Vec<TypeWorkItem>,
    l_dirs: Vec<PathBuf>,
    l_files: Vec<PathBuf>,
) {
    l_stack.extend(l_files.into_iter().rev().map(TypeWorkItem::File));
    l_stack.extend(l_dirs.into_iter().rev().map(TypeWorkItem::Dir));
}

/// Read one source directory. Returns relative paths of subdirectories and of every
/// other entry, both sorted by name and filtered by the include/exclude rules.
fn list_children(
    spec_merge_ctx: &SpecMergeContext<'_>,
    path_rel: &Path,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>), MergeEntryError> {
    let path_dir_src = join_rel(&spec_merge_ctx.path_dir_src, path_rel);
    let iter_entries =
        fs::read_dir(&path_dir_src).map_err(|e| MergeEntryError::from_io(&path_dir_src, e))?;

    let mut l_dirs: Vec<OsString> = Vec::new();
    let mut l_files: Vec<OsString> = Vec::new();
    for entry_res in iter_entries {
        let entry = entry_res.map_err(|e| MergeEntryError::from_io(&path_dir_src, e))?;
        let name_entry = entry.file_name();
        let c_name = name_entry.to_string_lossy();
        let b_is_dir = match entry.file_type() {
            Ok(v) => v.is_dir(),
            Err(e) => return Err(MergeEntryError::from_io(entry.path(), e)),
        };
        if b_is_dir {
            if !spec_merge_ctx.spec_merge_pats.should_exclude_dir(&c_name) {
                l_dirs.push(name_entry);
            }
        } else if !spec_merge_ctx.spec_merge_pats.should_exclude_file(&c_name) {
            l_files.push(name_entry);
        }
    }

    l_dirs.sort();
    l_files.sort();
    let to_rel = |name: OsString| path_rel.join(name);
    Ok((
        l_dirs.into_iter().map(to_rel).collect(),
        l_files.into_iter().map(to_rel).collect(),
    ))
}

fn handle_dir_entry(
    spec_merge_ctx: &SpecMergeContext<'_>,
    path_rel: PathBuf,
    l_stack: &mut Vec<TypeWorkItem>,
    builder_merge_report: &mut ReportMergeBuilder,
) {
    let path_dir_dst = spec_merge_ctx.path_dir_dst.join(&path_rel);
    if let Err(message) =
        validate_destination_path_safety(&path_dir_dst, &spec_merge_ctx.path_dir_dst)
    {
        builder_merge_report.add_outcome(spec_merge_ctx.failed(
            &path_rel,
            EnumEntryKind::Directory,
            MergeEntryError::UnsafeDestination {
                path: path_dir_dst,
                message,
            },
        ));
        return;
    }

    let entry_dst = match FileEntryRef::try_fetch(&path_dir_dst) {
        Ok(v) => v,
        Err(cause) => {
            builder_merge_report.add_outcome(spec_merge_ctx.failed(
                &path_rel,
                EnumEntryKind::Directory,
                cause,
            ));
            return;
        }
    };

    let b_target_existed = match entry_dst {
        None => {
            let rule = spec_merge_ctx.policy.on_missing;
            if !spec_merge_ctx.if_dry_run
                && let Err(e) = fs::create_dir_all(&path_dir_dst)
            {
                builder_merge_report.add_outcome(spec_merge_ctx.failed(
                    &path_rel,
                    EnumEntryKind::Directory,
                    MergeEntryError::from_io(&path_dir_dst, e),
                ));
                return;
            }
            builder_merge_report.add_outcome(spec_merge_ctx.outcome(
                &path_rel,
                EnumEntryKind::Directory,
                rule.action,
                None,
            ));
            false
        }
        Some(entry_dst) if entry_dst.kind == EnumEntryKind::Directory => true,
        Some(entry_dst) => {
            let rule = spec_merge_ctx.policy.on_kind_conflict;
            builder_merge_report.add_outcome(spec_merge_ctx.outcome(
                &path_rel,
                EnumEntryKind::Directory,
                rule.action,
                Some(MergeEntryError::KindConflict {
                    path: path_dir_dst,
                    kind_source: EnumEntryKind::Directory,
                    kind_target: entry_dst.kind,
                }),
            ));
            return;
        }
    };

    let (l_dirs, l_files) = match list_children(spec_merge_ctx, &path_rel) {
        Ok(v) => v,
        Err(cause) => {
            builder_merge_report.add_outcome(spec_merge_ctx.failed(
                &path_rel,
                EnumEntryKind::Directory,
                cause,
            ));
            return;
        }
    };
    if b_target_existed {
        l_stack.push(TypeWorkItem::LeaveDir(path_rel));
    }
    push_children(l_stack, l_dirs, l_files);
}

/// Consume a reconciled source directory once its subtree is done, when the policy
/// consumes identical entries and nothing is left inside.
fn finalize_dir_entry(
    spec_merge_ctx: &SpecMergeContext<'_>,
    path_rel: &Path,
    builder_merge_report: &mut ReportMergeBuilder,
) {
    let rule = spec_merge_ctx.policy.on_identical;
    if !rule.if_delete_source || spec_merge_ctx.if_dry_run {
        return;
    }
    let path_dir_src = spec_merge_ctx.path_dir_src.join(path_rel);
    match is_empty_dir(&path_dir_src) {
        Ok(true) => {}
        Ok(false) => return,
        Err(e) => {
            builder_merge_report.add_outcome(spec_merge_ctx.failed(
                path_rel,
                EnumEntryKind::Directory,
                MergeEntryError::from_io(&path_dir_src, e),
            ));
            return;
        }
    }
    let outcome = match fs::remove_dir(&path_dir_src) {
        Ok(_) => spec_merge_ctx.outcome(path_rel, EnumEntryKind::Directory, rule.action, None),
        Err(e) => spec_merge_ctx.failed(
            path_rel,
            EnumEntryKind::Directory,
            MergeEntryError::from_io(&path_dir_src, e),
        ),
    };
    builder_merge_report.add_outcome(outcome);
}

fn handle_file_entry(
    spec_merge_ctx: &SpecMergeContext<'_>,
    path_rel: &Path,
    builder_merge_report: &mut ReportMergeBuilder,
) {
    let path_file_src = spec_merge_ctx.path_dir_src.join(path_rel);
    let path_file_dst = spec_merge_ctx.path_dir_dst.join(path_rel);

    let entry_src = match FileEntryRef::fetch(&path_file_src) {
        Ok(v) => v,
        Err(cause) => {
            builder_merge_report.add_outcome(spec_merge_ctx.failed(
                path_rel,
                EnumEntryKind::File,
                cause,
            ));
            return;
        }
    };
    if entry_src.kind != EnumEntryKind::File {
        builder_merge_report.add_warning(format!(
            "{} skipped: {}",
            capitalize(&entry_src.kind.to_string()),
            path_file_src.display()
        ));
        builder_merge_report.add_outcome(spec_merge_ctx.outcome(
            path_rel,
            entry_src.kind,
            EnumMergeAction::Skipped,
            None,
        ));
        return;
    }

    if let Err(message) =
        validate_destination_path_safety(&path_file_dst, &spec_merge_ctx.path_dir_dst)
    {
        builder_merge_report.add_outcome(spec_merge_ctx.failed(
            path_rel,
            EnumEntryKind::File,
            MergeEntryError::UnsafeDestination {
                path: path_file_dst,
                message,
            },
        ));
        return;
    }

    let entry_dst = match FileEntryRef::try_fetch(&path_file_dst) {
        Ok(v) => v,
        Err(cause) => {
            builder_merge_report.add_outcome(spec_merge_ctx.failed(
                path_rel,
                EnumEntryKind::File,
                cause,
            ));
            return;
        }
    };

    let mut outcome =
        resolve_file_entry(spec_merge_ctx, path_rel, &entry_src, &path_file_dst, entry_dst);
    if is_vanished(&outcome)
        && let Some(outcome_retry) =
            retry_file_entry(spec_merge_ctx, path_rel, &path_file_src, &path_file_dst)
    {
        outcome = outcome_retry;
    }
    builder_merge_report.add_outcome(outcome);
}

fn is_vanished(outcome: &MergeOutcome) -> bool {
    outcome.action == EnumMergeAction::Skipped
        && outcome.cause.as_ref().is_some_and(|c| c.is_not_found())
}

/// Decide and apply the policy rule for a regular source file against its target snapshot.
fn resolve_file_entry(
    spec_merge_ctx: &SpecMergeContext<'_>,
    path_rel: &Path,
    entry_src: &FileEntryRef,
    path_file_dst: &Path,
    entry_dst: Option<FileEntryRef>,
) -> MergeOutcome {
    let policy = spec_merge_ctx.policy;
    let Some(entry_dst) = entry_dst else {
        return apply_rule(spec_merge_ctx, policy.on_missing, path_rel, entry_src, path_file_dst);
    };
    if entry_dst.kind != EnumEntryKind::File {
        return spec_merge_ctx.outcome(
            path_rel,
            EnumEntryKind::File,
            policy.on_kind_conflict.action,
            Some(MergeEntryError::KindConflict {
                path: path_file_dst.to_path_buf(),
                kind_source: EnumEntryKind::File,
                kind_target: entry_dst.kind,
            }),
        );
    }

    match spec_merge_ctx
        .comparator
        .compare(entry_src, &entry_dst, &spec_merge_ctx.filter)
    {
        Ok(comparison) if comparison.is_equal() => apply_rule(
            spec_merge_ctx,
            policy.on_identical,
            path_rel,
            entry_src,
            path_file_dst,
        ),
        Ok(comparison) => {
            tracing::debug!(
                path = %path_rel.display(),
                differing = ?comparison.differing_attributes(),
                "conflict"
            );
            apply_rule(spec_merge_ctx, policy.on_conflict, path_rel, entry_src, path_file_dst)
        }
        Err(cause) => spec_merge_ctx.failed(path_rel, EnumEntryKind::File, cause),
    }
}

/// Re-stat both sides once after an entry vanished mid-resolution and resolve again.
///
/// Returns `None` when the source itself is gone (or no longer a regular file); the first
/// outcome then stands.
fn retry_file_entry(
    spec_merge_ctx: &SpecMergeContext<'_>,
    path_rel: &Path,
    path_file_src: &Path,
    path_file_dst: &Path,
) -> Option<MergeOutcome> {
    let entry_src = FileEntryRef::try_fetch(path_file_src).ok().flatten()?;
    if entry_src.kind != EnumEntryKind::File {
        return None;
    }
    let entry_dst = match FileEntryRef::try_fetch(path_file_dst) {
        Ok(v) => v,
        Err(cause) => return Some(spec_merge_ctx.failed(path_rel, EnumEntryKind::File, cause)),
    };
    tracing::debug!(path = %path_rel.display(), "entry vanished; resolving again");
    Some(resolve_file_entry(
        spec_merge_ctx,
        path_rel,
        &entry_src,
        path_file_dst,
        entry_dst,
    ))
}

/// Carry out one policy rule for a regular source file and describe what happened.
fn apply_rule(
    spec_merge_ctx: &SpecMergeContext<'_>,
    rule: SpecPolicyRule,
    path_rel: &Path,
    entry_src: &FileEntryRef,
    path_file_dst: &Path,
) -> MergeOutcome {
    let res_apply = if spec_merge_ctx.if_dry_run {
        Ok(())
    } else {
        apply_target_effect(spec_merge_ctx, rule.effect_target, &entry_src.path, path_file_dst)
            .and_then(|_| {
                if rule.if_delete_source {
                    remove_path(&entry_src.path)
                        .map_err(|e| MergeEntryError::from_io(&entry_src.path, e))
                } else {
                    Ok(())
                }
            })
    };

    match res_apply {
        Ok(_) => spec_merge_ctx.outcome(path_rel, EnumEntryKind::File, rule.action, None),
        Err(cause) => spec_merge_ctx.failed(path_rel, EnumEntryKind::File, cause),
    }
}

fn apply_target_effect(
    spec_merge_ctx: &SpecMergeContext<'_>,
    effect_target: EnumTargetEffect,
    path_file_src: &Path,
    path_file_dst: &Path,
) -> Result<(), MergeEntryError> {
    let copy_in = || {
        copy_file_with_metadata(path_file_src, path_file_dst)
            .map_err(|e| MergeEntryError::from_io(path_file_dst, e))
    };
    match effect_target {
        EnumTargetEffect::Keep | EnumTargetEffect::Fail => Ok(()),
        EnumTargetEffect::CopyIn => copy_in(),
        EnumTargetEffect::MergeOrReplace => {
            match spec_merge_ctx
                .content_merger
                .try_merge(path_file_src, path_file_dst)?
            {
                EnumMergeAttempt::Merged => Ok(()),
                EnumMergeAttempt::NotMergeable => copy_in(),
            }
        }
    }
}

fn capitalize(txt: &str) -> String {
    let mut chars = txt.chars();
    match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use std::io;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use filetime::{FileTime, set_file_mtime};
    use tempfile::TempDir;

    use super::{DirectoryMergeEngine, merge_tree};
    use crate::cancel::MergeCancelToken;
    use crate::checksum::{Blake3ChecksumProvider, ChecksumProvider, ContentHash};
    use crate::spec::{
        EnumEntryKind, EnumMergeAction, EnumMergePatternMode, MergeEntryError, MergeTreeError,
        SpecAttributeFilter, SpecMergeOptions,
    };
    use crate::strategy::{ContentMerger, EnumMergeAttempt, EnumMergeStrategy};

    fn write_text(path: &Path, txt: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, txt).expect("write text");
    }

    fn write_text_at(path: &Path, txt: &str, n_secs: i64) {
        write_text(path, txt);
        set_file_mtime(path, FileTime::from_unix_time(n_secs, 0)).expect("set mtime");
    }

    fn read_text(path: &Path) -> String {
        std::fs::read_to_string(path).expect("read text")
    }

    fn setup_roots(tmp: &TempDir) -> (PathBuf, PathBuf) {
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        std::fs::create_dir_all(&src).expect("mkdir src");
        std::fs::create_dir_all(&dst).expect("mkdir dst");
        (src, dst)
    }

    fn actions_of(report: &crate::report::ReportMerge) -> Vec<(EnumMergeAction, PathBuf)> {
        report
            .outcomes
            .iter()
            .map(|o| (o.action, o.path_target.clone()))
            .collect()
    }

    #[test]
    fn merge_into_empty_target_creates_every_entry() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text(&src.join("dir/sub/file.txt"), "payload");

        let report = merge_tree(
            &dst,
            &[&src],
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .expect("merge");

        assert_eq!(report.error_count(), 0);
        assert_eq!(read_text(&dst.join("dir/sub/file.txt")), "payload");
        assert!(
            report
                .outcomes
                .iter()
                .all(|o| o.action == EnumMergeAction::Created)
        );
        assert_eq!(report.outcomes.len(), 3);
        assert!(src.join("dir/sub/file.txt").exists());
    }

    #[test]
    fn directories_are_visited_before_sibling_files() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text(&src.join("a.txt"), "a");
        write_text(&src.join("z/inner.txt"), "i");
        write_text(&src.join("b/deep/leaf.txt"), "l");

        let report = merge_tree(
            &dst,
            &[&src],
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .expect("merge");

        let l_targets: Vec<PathBuf> = report
            .outcomes
            .iter()
            .map(|o| o.path_target.strip_prefix(&dst).expect("under dst").to_path_buf())
            .collect();
        assert_eq!(
            l_targets,
            vec![
                PathBuf::from("b"),
                PathBuf::from("b/deep"),
                PathBuf::from("b/deep/leaf.txt"),
                PathBuf::from("z"),
                PathBuf::from("z/inner.txt"),
                PathBuf::from("a.txt"),
            ]
        );
    }

    #[test]
    fn target_as_master_replaces_conflict_and_consumes_source() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text_at(&dst.join("a.txt"), "v1", 1_700_000_000);
        write_text_at(&src.join("a.txt"), "v2", 1_700_000_500);

        let report = merge_tree(
            &dst,
            &[&src],
            EnumMergeStrategy::TargetAsMaster,
            SpecAttributeFilter::compare_all(),
        )
        .expect("merge");

        assert_eq!(read_text(&dst.join("a.txt")), "v2");
        assert!(!src.join("a.txt").exists());
        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].action, EnumMergeAction::DeletedSource);
        assert_eq!(report.outcomes[0].cause, None);
    }

    #[test]
    fn source_to_target_replaces_conflict_and_keeps_source() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text_at(&dst.join("a.txt"), "v1", 1_700_000_000);
        write_text_at(&src.join("a.txt"), "v2", 1_700_000_500);

        let report = merge_tree(
            &dst,
            &[&src],
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .expect("merge");

        assert_eq!(read_text(&dst.join("a.txt")), "v2");
        assert_eq!(read_text(&src.join("a.txt")), "v2");
        assert_eq!(report.outcomes[0].action, EnumMergeAction::Replaced);
        let stat_dst = std::fs::metadata(dst.join("a.txt")).expect("dst meta");
        assert_eq!(
            FileTime::from_last_modification_time(&stat_dst),
            FileTime::from_unix_time(1_700_000_500, 0)
        );
    }

    #[test]
    fn identical_files_are_skipped_or_consumed() {
        for (rule_strategy, action_expected, b_source_kept) in [
            (
                EnumMergeStrategy::SourceToTarget,
                EnumMergeAction::Skipped,
                true,
            ),
            (
                EnumMergeStrategy::TargetAsMaster,
                EnumMergeAction::DeletedSource,
                false,
            ),
        ] {
            let tmp = TempDir::new().expect("tempdir");
            let (src, dst) = setup_roots(&tmp);
            write_text_at(&dst.join("same.txt"), "same", 1_700_000_000);
            write_text_at(&src.join("same.txt"), "same", 1_700_000_000);

            let report = merge_tree(
                &dst,
                &[&src],
                rule_strategy,
                SpecAttributeFilter::compare_all(),
            )
            .expect("merge");

            assert_eq!(report.outcomes.len(), 1);
            assert_eq!(report.outcomes[0].action, action_expected);
            assert_eq!(src.join("same.txt").exists(), b_source_kept);
            assert_eq!(read_text(&dst.join("same.txt")), "same");
        }
    }

    #[test]
    fn ignoring_last_modified_treats_same_content_as_identical() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text_at(&dst.join("a.txt"), "same", 1_700_000_000);
        write_text_at(&src.join("a.txt"), "same", 1_700_000_900);

        let filter = SpecAttributeFilter::builder()
            .ignore_last_modified(true)
            .build();
        let report = merge_tree(&dst, &[&src], EnumMergeStrategy::SourceToTarget, filter)
            .expect("merge");
        assert_eq!(report.outcomes[0].action, EnumMergeAction::Skipped);
    }

    #[test]
    fn later_source_wins_on_same_path() {
        let tmp = TempDir::new().expect("tempdir");
        let dst = tmp.path().join("dst");
        let src_a = tmp.path().join("src_a");
        let src_b = tmp.path().join("src_b");
        std::fs::create_dir_all(&dst).expect("mkdir dst");
        write_text_at(&src_a.join("note.txt"), "first", 1_700_000_000);
        write_text_at(&src_b.join("note.txt"), "second", 1_700_000_100);

        let report = merge_tree(
            &dst,
            &[&src_a, &src_b],
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .expect("merge");

        assert_eq!(read_text(&dst.join("note.txt")), "second");
        assert_eq!(
            actions_of(&report),
            vec![
                (EnumMergeAction::Created, dst.join("note.txt")),
                (EnumMergeAction::Replaced, dst.join("note.txt")),
            ]
        );
        assert_eq!(report.outcomes[0].path_source, src_a.join("note.txt"));
        assert_eq!(report.outcomes[1].path_source, src_b.join("note.txt"));
    }

    #[test]
    fn file_directory_collision_fails_only_that_path() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text(&src.join("clash"), "file in source");
        write_text(&dst.join("clash/keep.txt"), "dir in target");
        write_text(&src.join("other.txt"), "other");

        let report = merge_tree(
            &dst,
            &[&src],
            EnumMergeStrategy::TargetAsMaster,
            SpecAttributeFilter::compare_all(),
        )
        .expect("merge");

        assert_eq!(report.error_count(), 1);
        let outcome_failed = report.failures().next().expect("one failure");
        assert!(matches!(
            &outcome_failed.cause,
            Some(MergeEntryError::KindConflict {
                path,
                kind_source: EnumEntryKind::File,
                kind_target: EnumEntryKind::Directory,
            }) if *path == dst.join("clash")
        ));
        assert!(src.join("clash").exists());
        assert_eq!(read_text(&dst.join("other.txt")), "other");
    }

    #[test]
    fn directory_against_target_file_is_kind_conflict() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text(&src.join("clash/inner.txt"), "x");
        write_text(&dst.join("clash"), "file in target");

        let report = merge_tree(
            &dst,
            &[&src],
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .expect("merge");

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.outcomes[0].action, EnumMergeAction::Failed);
        assert_eq!(report.outcomes[0].kind, EnumEntryKind::Directory);
        assert_eq!(
            report.outcomes[0].cause,
            Some(MergeEntryError::KindConflict {
                path: dst.join("clash"),
                kind_source: EnumEntryKind::Directory,
                kind_target: EnumEntryKind::File,
            })
        );
        assert_eq!(read_text(&dst.join("clash")), "file in target");
    }

    #[test]
    fn target_as_master_removes_emptied_source_directories() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text_at(&src.join("d/a.txt"), "a", 1_700_000_000);
        write_text_at(&dst.join("d/a.txt"), "a", 1_700_000_000);

        let report = merge_tree(
            &dst,
            &[&src],
            EnumMergeStrategy::TargetAsMaster,
            SpecAttributeFilter::compare_all(),
        )
        .expect("merge");

        assert_eq!(
            actions_of(&report),
            vec![
                (EnumMergeAction::DeletedSource, dst.join("d/a.txt")),
                (EnumMergeAction::DeletedSource, dst.join("d")),
            ]
        );
        assert!(!src.join("d").exists());
        assert!(src.exists());
    }

    #[test]
    fn dry_run_records_without_mutation() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text(&src.join("new/file.txt"), "n");
        write_text_at(&src.join("a.txt"), "v2", 1_700_000_500);
        write_text_at(&dst.join("a.txt"), "v1", 1_700_000_000);

        let spec_merge_options = SpecMergeOptions {
            if_dry_run: true,
            ..SpecMergeOptions::default()
        };
        let report = DirectoryMergeEngine::new(
            EnumMergeStrategy::TargetAsMaster,
            SpecAttributeFilter::compare_all(),
        )
        .with_options(spec_merge_options)
        .merge(&dst, &[&src])
        .expect("merge");

        assert_eq!(report.count(EnumMergeAction::Created), 2);
        assert_eq!(report.count(EnumMergeAction::DeletedSource), 1);
        assert!(!dst.join("new").exists());
        assert_eq!(read_text(&dst.join("a.txt")), "v1");
        assert!(src.join("a.txt").exists());
    }

    #[test]
    fn excluded_entries_are_not_visited() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text(&src.join("keep.txt"), "k");
        write_text(&src.join("drop.log"), "d");
        write_text(&src.join("cache/blob.txt"), "c");

        let spec_merge_options = SpecMergeOptions {
            patterns_exclude_files: Some(vec!["*.log".to_string()]),
            patterns_exclude_dirs: Some(vec!["cache".to_string()]),
            rule_pattern: EnumMergePatternMode::Glob,
            ..SpecMergeOptions::default()
        };
        let report = DirectoryMergeEngine::new(
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .with_options(spec_merge_options)
        .merge(&dst, &[&src])
        .expect("merge");

        assert_eq!(
            actions_of(&report),
            vec![(EnumMergeAction::Created, dst.join("keep.txt"))]
        );
        assert!(!dst.join("drop.log").exists());
        assert!(!dst.join("cache").exists());
    }

    #[test]
    fn cancellation_stops_walk_and_keeps_recorded_outcomes() {
        struct CancellingChecksum {
            cancel_token: MergeCancelToken,
        }

        impl ChecksumProvider for CancellingChecksum {
            fn digest(&self, path: &Path) -> io::Result<ContentHash> {
                self.cancel_token.cancel();
                Blake3ChecksumProvider.digest(path)
            }
        }

        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        for name in ["a.txt", "b.txt", "c.txt"] {
            write_text_at(&src.join(name), "new", 1_700_000_000);
            write_text_at(&dst.join(name), "old", 1_700_000_000);
        }

        let engine = DirectoryMergeEngine::new(
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        );
        let cancel_token = engine.cancel_token().clone();
        let report = engine
            .with_checksum_provider(Arc::new(CancellingChecksum { cancel_token }))
            .merge(&dst, &[&src])
            .expect("merge");

        assert!(report.if_cancelled);
        assert_eq!(
            actions_of(&report),
            vec![(EnumMergeAction::Replaced, dst.join("a.txt"))]
        );
        assert_eq!(read_text(&dst.join("a.txt")), "new");
        assert_eq!(read_text(&dst.join("b.txt")), "old");
    }

    #[test]
    fn pre_cancelled_token_records_nothing() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text(&src.join("a.txt"), "a");

        let cancel_token = MergeCancelToken::new();
        cancel_token.cancel();
        let report = DirectoryMergeEngine::new(
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .with_cancel_token(cancel_token)
        .merge(&dst, &[&src])
        .expect("merge");

        assert!(report.if_cancelled);
        assert!(report.outcomes.is_empty());
        assert!(!dst.join("a.txt").exists());
    }

    /// Removes `path_victim` on the first digest request, then hashes as usual.
    struct VanishingChecksum {
        path_victim: PathBuf,
    }

    impl ChecksumProvider for VanishingChecksum {
        fn digest(&self, path: &Path) -> io::Result<ContentHash> {
            let _ = std::fs::remove_file(&self.path_victim);
            Blake3ChecksumProvider.digest(path)
        }
    }

    #[test]
    fn target_vanishing_during_compare_is_refetched_and_created() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text_at(&src.join("a.txt"), "v2", 1_700_000_500);
        write_text_at(&dst.join("a.txt"), "v1", 1_700_000_000);

        let report = DirectoryMergeEngine::new(
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .with_checksum_provider(Arc::new(VanishingChecksum {
            path_victim: dst.join("a.txt"),
        }))
        .merge(&dst, &[&src])
        .expect("merge");

        assert_eq!(
            actions_of(&report),
            vec![(EnumMergeAction::Created, dst.join("a.txt"))]
        );
        assert_eq!(report.outcomes[0].cause, None);
        assert_eq!(read_text(&dst.join("a.txt")), "v2");
        assert!(src.join("a.txt").exists());
    }

    #[test]
    fn source_vanishing_during_compare_is_skipped_and_walk_continues() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text_at(&src.join("a.txt"), "v2", 1_700_000_500);
        write_text_at(&dst.join("a.txt"), "v1", 1_700_000_000);
        write_text(&src.join("b.txt"), "b");

        let report = DirectoryMergeEngine::new(
            EnumMergeStrategy::TargetAsMaster,
            SpecAttributeFilter::compare_all(),
        )
        .with_checksum_provider(Arc::new(VanishingChecksum {
            path_victim: src.join("a.txt"),
        }))
        .merge(&dst, &[&src])
        .expect("merge");

        assert_eq!(
            actions_of(&report),
            vec![
                (EnumMergeAction::Skipped, dst.join("a.txt")),
                (EnumMergeAction::Created, dst.join("b.txt")),
            ]
        );
        assert!(matches!(
            &report.outcomes[0].cause,
            Some(MergeEntryError::NotFound { path }) if *path == src.join("a.txt")
        ));
        assert_eq!(report.error_count(), 0);
        assert_eq!(read_text(&dst.join("a.txt")), "v1");
        assert_eq!(read_text(&dst.join("b.txt")), "b");
    }

    #[test]
    fn checksum_failure_fails_only_that_entry() {
        struct BrokenChecksum;

        impl ChecksumProvider for BrokenChecksum {
            fn digest(&self, path: &Path) -> io::Result<ContentHash> {
                if path.ends_with("bad.txt") {
                    return Err(io::Error::other("read error"));
                }
                Blake3ChecksumProvider.digest(path)
            }
        }

        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        for name in ["bad.txt", "good.txt"] {
            write_text_at(&src.join(name), "new", 1_700_000_500);
            write_text_at(&dst.join(name), "old", 1_700_000_000);
        }

        let report = DirectoryMergeEngine::new(
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .with_checksum_provider(Arc::new(BrokenChecksum))
        .merge(&dst, &[&src])
        .expect("merge");

        assert_eq!(
            actions_of(&report),
            vec![
                (EnumMergeAction::Failed, dst.join("bad.txt")),
                (EnumMergeAction::Replaced, dst.join("good.txt")),
            ]
        );
        assert!(matches!(
            report.outcomes[0].cause,
            Some(MergeEntryError::ChecksumFailure { .. })
        ));
        assert_eq!(read_text(&dst.join("bad.txt")), "old");
        assert_eq!(read_text(&dst.join("good.txt")), "new");
    }

    #[test]
    fn content_merger_can_take_over_conflicts() {
        struct ConcatMerger;

        impl ContentMerger for ConcatMerger {
            fn try_merge(
                &self,
                path_source: &Path,
                path_target: &Path,
            ) -> Result<EnumMergeAttempt, MergeEntryError> {
                let txt = format!(
                    "{}+{}",
                    std::fs::read_to_string(path_target).expect("target"),
                    std::fs::read_to_string(path_source).expect("source")
                );
                std::fs::write(path_target, txt).expect("write merged");
                Ok(EnumMergeAttempt::Merged)
            }
        }

        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text_at(&dst.join("a.txt"), "t", 1_700_000_000);
        write_text_at(&src.join("a.txt"), "s", 1_700_000_500);

        let report = DirectoryMergeEngine::new(
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .with_content_merger(Arc::new(ConcatMerger))
        .merge(&dst, &[&src])
        .expect("merge");

        assert_eq!(report.outcomes[0].action, EnumMergeAction::Replaced);
        assert_eq!(read_text(&dst.join("a.txt")), "t+s");
    }

    #[test]
    fn parallel_subtrees_match_serial_order() {
        fn build_tree(root: &Path) {
            for dir in ["a", "b", "c", "d"] {
                for n_idx in 0..3 {
                    write_text(&root.join(dir).join(format!("f{n_idx}.txt")), dir);
                }
                write_text(&root.join(dir).join("nested/leaf.txt"), "leaf");
            }
            write_text(&root.join("top.txt"), "top");
        }

        let mut l_sequences = Vec::new();
        for num_workers_max in [Some(1), Some(4)] {
            let tmp = TempDir::new().expect("tempdir");
            let (src, dst) = setup_roots(&tmp);
            build_tree(&src);

            let spec_merge_options = SpecMergeOptions {
                num_workers_max,
                ..SpecMergeOptions::default()
            };
            let report = DirectoryMergeEngine::new(
                EnumMergeStrategy::SourceToTarget,
                SpecAttributeFilter::compare_all(),
            )
            .with_options(spec_merge_options)
            .merge(&dst, &[&src])
            .expect("merge");
            assert_eq!(report.error_count(), 0);

            let l_rel: Vec<(EnumMergeAction, PathBuf)> = report
                .outcomes
                .iter()
                .map(|o| {
                    (
                        o.action,
                        o.path_target.strip_prefix(&dst).expect("under dst").to_path_buf(),
                    )
                })
                .collect();
            l_sequences.push(l_rel);
        }
        assert_eq!(l_sequences[0], l_sequences[1]);
        assert_eq!(l_sequences[0].len(), 4 * 6 + 1);
    }

    #[cfg(unix)]
    #[test]
    fn source_symlinks_are_skipped_with_warning() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        write_text(&src.join("real.txt"), "r");
        symlink(src.join("real.txt"), src.join("link.txt")).expect("symlink");

        let report = merge_tree(
            &dst,
            &[&src],
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .expect("merge");

        assert_eq!(
            actions_of(&report),
            vec![
                (EnumMergeAction::Skipped, dst.join("link.txt")),
                (EnumMergeAction::Created, dst.join("real.txt")),
            ]
        );
        assert_eq!(report.outcomes[0].kind, EnumEntryKind::Symlink);
        assert!(report.warnings.iter().any(|w| w.starts_with("Symlink skipped")));
        assert!(!dst.join("link.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn target_symlink_component_is_refused() {
        use std::os::unix::fs::symlink;

        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        let outside = tmp.path().join("outside");
        std::fs::create_dir_all(&outside).expect("mkdir outside");
        symlink(&outside, dst.join("escape")).expect("symlink");
        write_text(&src.join("escape/file.txt"), "x");

        let report = merge_tree(
            &dst,
            &[&src],
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .expect("merge");

        assert_eq!(report.error_count(), 1);
        assert!(matches!(
            report.outcomes[0].cause,
            Some(MergeEntryError::UnsafeDestination { .. })
        ));
        assert!(!outside.join("file.txt").exists());
    }

    #[test]
    fn invalid_roots_are_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        let filter = SpecAttributeFilter::compare_all();
        let rule_strategy = EnumMergeStrategy::SourceToTarget;

        let err = merge_tree(&dst, &Vec::<PathBuf>::new(), rule_strategy, filter)
            .expect_err("no sources");
        assert!(matches!(err, MergeTreeError::NoSources));

        let err = merge_tree(tmp.path().join("missing"), &[&src], rule_strategy, filter)
            .expect_err("missing target");
        assert!(matches!(err, MergeTreeError::TargetNotFound(_)));

        write_text(&tmp.path().join("plain.txt"), "x");
        let err = merge_tree(&dst, &[tmp.path().join("plain.txt")], rule_strategy, filter)
            .expect_err("file source");
        assert!(matches!(err, MergeTreeError::SourceNotDirectory(_)));

        let err = merge_tree(&dst, &[dst.join("nested")], rule_strategy, filter)
            .expect_err("missing source");
        assert!(matches!(err, MergeTreeError::SourceNotFound(_)));

        std::fs::create_dir_all(dst.join("nested")).expect("mkdir nested");
        let err = merge_tree(&dst, &[dst.join("nested")], rule_strategy, filter)
            .expect_err("overlap");
        assert!(matches!(err, MergeTreeError::SourceTargetOverlap { .. }));
    }

    #[test]
    fn invalid_pattern_is_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        let (src, dst) = setup_roots(&tmp);
        let spec_merge_options = SpecMergeOptions {
            patterns_include_files: Some(vec!["[".to_string()]),
            ..SpecMergeOptions::default()
        };
        let err = DirectoryMergeEngine::new(
            EnumMergeStrategy::SourceToTarget,
            SpecAttributeFilter::compare_all(),
        )
        .with_options(spec_merge_options)
        .merge(&dst, &[&src])
        .expect_err("invalid glob");
        assert!(matches!(err, MergeTreeError::InvalidPattern(_)));
    }
}
