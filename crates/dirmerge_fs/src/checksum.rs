//! Content digests used as the equality oracle for file content.

use std::fmt;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

/// 256-bit content digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(pub [u8; 32]);

impl ContentHash {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Deterministic digest of a file's bytes.
///
/// Implementations must be pure functions of the content: two files with the same bytes
/// always produce the same hash.
pub trait ChecksumProvider: Send + Sync {
    fn digest(&self, path: &Path) -> io::Result<ContentHash>;
}

/// Streams the file through BLAKE3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3ChecksumProvider;

impl ChecksumProvider for Blake3ChecksumProvider {
    fn digest(&self, path: &Path) -> io::Result<ContentHash> {
        let mut reader = BufReader::with_capacity(64 * 1024, File::open(path)?);
        let mut hasher = blake3::Hasher::new();
        io::copy(&mut reader, &mut hasher)?;
        Ok(ContentHash(*hasher.finalize().as_bytes()))
    }
}
