use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use regex::Regex;

use crate::spec::{EnumMergePatternMode, MergeTreeError};

////////////////////////////////////////////////////////////////////////////////
// #region PatternMatching

#[derive(Debug, Clone)]
pub(crate) enum TypeMergePatternSeq {
    Literal(Vec<String>),
    Glob(Vec<GlobMatcher>),
    Regex(Vec<Regex>),
}

impl TypeMergePatternSeq {
    fn is_matching(&self, value: &str) -> bool {
        match self {
            Self::Literal(v) => v.iter().any(|p| value.contains(p.as_str())),
            Self::Glob(v) => v.iter().any(|p| p.is_match(value)),
            Self::Regex(v) => v.iter().any(|p| p.is_match(value)),
        }
    }
}

/// Compiled include/exclude rules for file and directory basenames.
#[derive(Debug, Clone, Default)]
pub(crate) struct SpecMergePatterns {
    pub(crate) patterns_include_files: Option<TypeMergePatternSeq>,
    pub(crate) patterns_exclude_files: Option<TypeMergePatternSeq>,
    pub(crate) patterns_include_dirs: Option<TypeMergePatternSeq>,
    pub(crate) patterns_exclude_dirs: Option<TypeMergePatternSeq>,
}

impl SpecMergePatterns {
    pub(crate) fn from_raw(
        patterns_include_files: Option<&[String]>,
        patterns_exclude_files: Option<&[String]>,
        patterns_include_dirs: Option<&[String]>,
        patterns_exclude_dirs: Option<&[String]>,
        rule_pattern: EnumMergePatternMode,
    ) -> Result<Self, MergeTreeError> {
        Ok(Self {
            patterns_include_files: _compile(patterns_include_files, rule_pattern)?,
            patterns_exclude_files: _compile(patterns_exclude_files, rule_pattern)?,
            patterns_include_dirs: _compile(patterns_include_dirs, rule_pattern)?,
            patterns_exclude_dirs: _compile(patterns_exclude_dirs, rule_pattern)?,
        })
    }

    pub(crate) fn should_exclude_file(&self, name: &str) -> bool {
        should_exclude_by_patterns(
            name,
            self.patterns_include_files.as_ref(),
            self.patterns_exclude_files.as_ref(),
        )
    }

    pub(crate) fn should_exclude_dir(&self, name: &str) -> bool {
        should_exclude_by_patterns(
            name,
            self.patterns_include_dirs.as_ref(),
            self.patterns_exclude_dirs.as_ref(),
        )
    }
}

fn _compile(
    patterns: Option<&[String]>,
    rule_pattern: EnumMergePatternMode,
) -> Result<Option<TypeMergePatternSeq>, MergeTreeError> {
    let Some(patterns) = patterns else {
        return Ok(None);
    };
    if patterns.is_empty() {
        return Ok(None);
    }

    match rule_pattern {
        EnumMergePatternMode::Literal => {
            Ok(Some(TypeMergePatternSeq::Literal(patterns.to_vec())))
        }
        EnumMergePatternMode::Glob => {
            let mut l_glob = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let matcher = Glob::new(pattern)
                    .map_err(|e| {
                        MergeTreeError::InvalidPattern(format!(
                            "Invalid pattern in include/exclude: {e}"
                        ))
                    })?
                    .compile_matcher();
                l_glob.push(matcher);
            }
            Ok(Some(TypeMergePatternSeq::Glob(l_glob)))
        }
        EnumMergePatternMode::Regex => {
            let mut l_regex = Vec::with_capacity(patterns.len());
            for pattern in patterns {
                let regex = Regex::new(pattern).map_err(|e| {
                    MergeTreeError::InvalidPattern(format!(
                        "Invalid pattern in include/exclude: {e}"
                    ))
                })?;
                l_regex.push(regex);
            }
            Ok(Some(TypeMergePatternSeq::Regex(l_regex)))
        }
    }
}

fn should_exclude_by_patterns(
    value: &str,
    patterns_include: Option<&TypeMergePatternSeq>,
    patterns_exclude: Option<&TypeMergePatternSeq>,
) -> bool {
    let b_included = patterns_include.is_none_or(|p| p.is_matching(value));
    let b_excluded = patterns_exclude.is_some_and(|p| p.is_matching(value));
    !b_included || b_excluded
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region PathUtilities

fn _normalize_path(path: &Path) -> PathBuf {
    if let Ok(resolved) = fs::canonicalize(path) {
        return resolved;
    }
    absolutize_path(path)
}

pub(crate) fn absolutize_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(path)
}

pub(crate) fn is_overlap(src: &Path, dst: &Path) -> bool {
    let src_resolved = _normalize_path(src);
    let dst_resolved = _normalize_path(dst);
    dst_resolved.starts_with(&src_resolved) || src_resolved.starts_with(&dst_resolved)
}

/// Reject target paths that leave the target root or pass through a symlink.
pub(crate) fn validate_destination_path_safety(
    path_dst_item: &Path,
    path_dir_dst_root: &Path,
) -> Result<(), String> {
    let path_dir_dst_root_abs = absolutize_path(path_dir_dst_root);
    let path_dst_item_abs = absolutize_path(path_dst_item);

    let path_rel = path_dst_item_abs
        .strip_prefix(&path_dir_dst_root_abs)
        .map_err(|_| {
            format!(
                "Unsafe destination path escapes destination root: {} (root={})",
                path_dst_item.display(),
                path_dir_dst_root.display()
            )
        })?;

    let mut path_cursor = path_dir_dst_root_abs.clone();
    for part_rel in path_rel.components() {
        path_cursor.push(part_rel.as_os_str());
        match fs::symlink_metadata(&path_cursor) {
            Ok(meta_cursor) => {
                if meta_cursor.file_type().is_symlink() {
                    return Err(format!(
                        "Unsafe destination path traverses symlink component: {}",
                        path_cursor.display()
                    ));
                }
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => break,
            Err(e) => {
                return Err(format!(
                    "Failed to inspect destination path component {} ({e})",
                    path_cursor.display()
                ));
            }
        }
    }

    Ok(())
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region FilesystemPrimitives

/// Copy one file, creating parents and overwriting `path_file_dst`.
///
/// Permissions and modification time always follow the source so the next merge sees
/// consistent timestamps.
pub(crate) fn copy_file_with_metadata(
    path_file_src: &Path,
    path_file_dst: &Path,
) -> Result<(), io::Error> {
    if let Some(path_parent_dst) = path_file_dst.parent() {
        fs::create_dir_all(path_parent_dst)?;
    }
    fs::copy(path_file_src, path_file_dst)?;
    apply_file_times(path_file_src, path_file_dst)?;
    #[cfg(target_os = "linux")]
    {
        copy_xattrs_linux(path_file_src, path_file_dst);
    }
    Ok(())
}

fn apply_file_times(path_file_src: &Path, path_file_dst: &Path) -> Result<(), io::Error> {
    use filetime::{FileTime, set_file_times};

    let stat_src = fs::metadata(path_file_src)?;
    let file_time_access = FileTime::from_last_access_time(&stat_src);
    let file_time_modify = FileTime::from_last_modification_time(&stat_src);
    set_file_times(path_file_dst, file_time_access, file_time_modify)
}

#[cfg(target_os = "linux")]
fn copy_xattrs_linux(path_file_src: &Path, path_file_dst: &Path) {
    let iter_xattr_names = match xattr::list(path_file_src) {
        Ok(v) => v,
        Err(_) => return,
    };

    for name in iter_xattr_names {
        let Some(raw_value) = xattr::get(path_file_src, &name).ok().flatten() else {
            continue;
        };
        let _ = xattr::set(path_file_dst, &name, &raw_value);
    }
}

/// Remove a file or a directory tree. An already missing path counts as removed.
pub(crate) fn remove_path(path: &Path) -> Result<(), io::Error> {
    let meta = match fs::symlink_metadata(path) {
        Ok(v) => v,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    let res = if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    match res {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// True when `path` is a directory without any entries.
pub(crate) fn is_empty_dir(path: &Path) -> Result<bool, io::Error> {
    Ok(fs::read_dir(path)?.next().is_none())
}

pub(crate) fn calculate_worker_limit(num_workers_max: Option<usize>) -> usize {
    let n_cpu = std::thread::available_parallelism()
        .map(|v| v.get())
        .unwrap_or(1);

    match num_workers_max {
        Some(n) => n.clamp(1, n_cpu),
        None => n_cpu.clamp(1, 8),
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
