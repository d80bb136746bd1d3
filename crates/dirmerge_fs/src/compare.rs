//! Attribute-wise equality between two filesystem entries.

use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use filetime::FileTime;

use crate::checksum::{ChecksumProvider, ContentHash};
use crate::spec::{EnumEntryKind, MergeEntryError, SpecAttributeFilter, SpecCompareOptions};
use crate::util::absolutize_path;

////////////////////////////////////////////////////////////////////////////////
// #region EntrySnapshot

/// Metadata snapshot of one entry, taken without following symlinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntryRef {
    /// Absolute path of the entry.
    pub path: PathBuf,
    pub kind: EnumEntryKind,
    /// Byte length as reported by the filesystem.
    pub size: u64,
    pub modified: FileTime,
}

impl FileEntryRef {
    /// Stat `path`. A vanished entry maps to [`MergeEntryError::NotFound`].
    pub fn fetch(path: &Path) -> Result<Self, MergeEntryError> {
        let meta = fs::symlink_metadata(path).map_err(|e| MergeEntryError::from_io(path, e))?;
        let file_type = meta.file_type();
        let kind = if file_type.is_symlink() {
            EnumEntryKind::Symlink
        } else if file_type.is_dir() {
            EnumEntryKind::Directory
        } else if file_type.is_file() {
            EnumEntryKind::File
        } else {
            EnumEntryKind::Other
        };
        Ok(Self {
            path: absolutize_path(path),
            kind,
            size: meta.len(),
            modified: FileTime::from_last_modification_time(&meta),
        })
    }

    /// Like [`FileEntryRef::fetch`] but maps "not found" to `None`.
    pub fn try_fetch(path: &Path) -> Result<Option<Self>, MergeEntryError> {
        match Self::fetch(path) {
            Ok(v) => Ok(Some(v)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn name(&self) -> Option<&std::ffi::OsStr> {
        self.path.file_name()
    }

    /// Lower-cased suffix after the last `.`; empty when there is none.
    pub fn extension(&self) -> String {
        derive_extension(&self.path)
    }
}

pub(crate) fn derive_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn derive_mtime_bucket(file_time: FileTime, granularity: Duration) -> i128 {
    let n_nanos_total =
        i128::from(file_time.unix_seconds()) * 1_000_000_000 + i128::from(file_time.nanoseconds());
    let n_granularity = granularity.as_nanos().max(1) as i128;
    n_nanos_total.div_euclid(n_granularity)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region ComparisonResult

/// Per-attribute verdicts. `None` means the attribute was ignored (or, for content,
/// not applicable) and must not be read as a verdict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComparisonResult {
    pub name_equal: Option<bool>,
    pub extension_equal: Option<bool>,
    /// Always computed; there is no ignore flag for the absolute path.
    pub absolute_path_equal: bool,
    pub length_equal: Option<bool>,
    pub last_modified_equal: Option<bool>,
    pub content_equal: Option<bool>,
}

impl ComparisonResult {
    /// True when no compared attribute differs.
    ///
    /// The absolute path is left out: entries under different roots never share it, so
    /// including it would turn every pair into a conflict.
    pub fn is_equal(&self) -> bool {
        [
            self.name_equal,
            self.extension_equal,
            self.length_equal,
            self.last_modified_equal,
            self.content_equal,
        ]
        .iter()
        .all(|v| *v != Some(false))
    }

    /// Names of compared attributes that differ, for diagnostics.
    pub fn differing_attributes(&self) -> Vec<&'static str> {
        let mut l_names = Vec::new();
        for (name, verdict) in [
            ("name", self.name_equal),
            ("extension", self.extension_equal),
            ("length", self.length_equal),
            ("last_modified", self.last_modified_equal),
            ("content", self.content_equal),
        ] {
            if verdict == Some(false) {
                l_names.push(name);
            }
        }
        l_names
    }
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
// #region Comparator

/// Computes [`ComparisonResult`] values using a pluggable checksum provider.
pub struct FileComparator<'a> {
    checksum: &'a dyn ChecksumProvider,
    spec_compare: SpecCompareOptions,
}

impl<'a> FileComparator<'a> {
    pub fn new(checksum: &'a dyn ChecksumProvider, spec_compare: SpecCompareOptions) -> Self {
        Self {
            checksum,
            spec_compare,
        }
    }

    /// Stat both paths, then [`FileComparator::compare`].
    pub fn compare_paths(
        &self,
        path_a: &Path,
        path_b: &Path,
        filter: &SpecAttributeFilter,
    ) -> Result<ComparisonResult, MergeEntryError> {
        let entry_a = FileEntryRef::fetch(path_a)?;
        let entry_b = FileEntryRef::fetch(path_b)?;
        self.compare(&entry_a, &entry_b, filter)
    }

    /// Compare two entries of the same kind under `filter`.
    pub fn compare(
        &self,
        entry_a: &FileEntryRef,
        entry_b: &FileEntryRef,
        filter: &SpecAttributeFilter,
    ) -> Result<ComparisonResult, MergeEntryError> {
        if entry_a.kind != entry_b.kind {
            return Err(MergeEntryError::KindMismatch {
                path: entry_a.path.clone(),
                kind_left: entry_a.kind,
                kind_right: entry_b.kind,
            });
        }

        let mut result = ComparisonResult {
            absolute_path_equal: entry_a.path == entry_b.path,
            ..ComparisonResult::default()
        };
        if !filter.ignores_name() {
            result.name_equal = Some(entry_a.name() == entry_b.name());
        }
        if !filter.ignores_extension() {
            result.extension_equal = Some(entry_a.extension() == entry_b.extension());
        }
        if !filter.ignores_length() {
            result.length_equal = Some(entry_a.size == entry_b.size);
        }
        if !filter.ignores_last_modified() {
            let granularity = self.spec_compare.mtime_granularity;
            result.last_modified_equal = Some(
                derive_mtime_bucket(entry_a.modified, granularity)
                    == derive_mtime_bucket(entry_b.modified, granularity),
            );
        }
        if !filter.ignores_content() && entry_a.kind == EnumEntryKind::File {
            result.content_equal = Some(self.is_content_equal(entry_a, entry_b)?);
        }
        Ok(result)
    }

    fn is_content_equal(
        &self,
        entry_a: &FileEntryRef,
        entry_b: &FileEntryRef,
    ) -> Result<bool, MergeEntryError> {
        // Sizes differ even when length is ignored: content cannot match.
        if entry_a.size != entry_b.size {
            return Ok(false);
        }
        if self
            .spec_compare
            .byte_compare_threshold
            .is_some_and(|n| entry_a.size <= n)
        {
            return is_bytes_equal(&entry_a.path, &entry_b.path);
        }
        let hash_a = self.digest(&entry_a.path)?;
        let hash_b = self.digest(&entry_b.path)?;
        Ok(hash_a == hash_b)
    }

    fn digest(&self, path: &Path) -> Result<ContentHash, MergeEntryError> {
        self.checksum.digest(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                MergeEntryError::NotFound {
                    path: path.to_path_buf(),
                }
            } else {
                MergeEntryError::ChecksumFailure {
                    path: path.to_path_buf(),
                    message: e.to_string(),
                }
            }
        })
    }
}

fn is_bytes_equal(path_a: &Path, path_b: &Path) -> Result<bool, MergeEntryError> {
    let open = |path: &Path| {
        File::open(path)
            .map(BufReader::new)
            .map_err(|e| MergeEntryError::from_io(path, e))
    };
    let mut reader_a = open(path_a)?;
    let mut reader_b = open(path_b)?;
    let mut buf_a = [0_u8; 8192];
    let mut buf_b = [0_u8; 8192];
    loop {
        let n_read_a =
            read_full(&mut reader_a, &mut buf_a).map_err(|e| MergeEntryError::from_io(path_a, e))?;
        let n_read_b =
            read_full(&mut reader_b, &mut buf_b).map_err(|e| MergeEntryError::from_io(path_b, e))?;
        if n_read_a != n_read_b || buf_a[..n_read_a] != buf_b[..n_read_b] {
            return Ok(false);
        }
        if n_read_a == 0 {
            return Ok(true);
        }
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut n_filled = 0;
    while n_filled < buf.len() {
        match reader.read(&mut buf[n_filled..]) {
            Ok(0) => break,
            Ok(n) => n_filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(n_filled)
}

// #endregion
////////////////////////////////////////////////////////////////////////////////
