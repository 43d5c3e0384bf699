//! Per-file copy with optional checksum verification.
//!
//! Each file is copied independently: one failure is recorded and the
//! remaining files are still attempted. With verification on, a mismatch
//! is retried once before the file is reported as failed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{CopyFailure, CopyFailures};

/// One completed copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CopiedFile {
    /// Source path.
    pub source: PathBuf,
    /// Destination path.
    pub destination: PathBuf,
    /// SHA-256 of the destination bytes, when verification ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Outcome of copying a pending set.
#[derive(Debug, Clone, Default)]
pub struct CopyReport {
    /// Files copied (and verified, if requested).
    pub copied: Vec<CopiedFile>,
    /// Files that could not be copied.
    pub failures: CopyFailures,
}

impl CopyReport {
    /// True if every attempted file was copied.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// SHA-256 of a file's contents, hex encoded.
pub fn file_digest(path: &Path) -> io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Computes the digest a copy is verified with.
pub(crate) type Verifier<'a> = &'a dyn Fn(&Path) -> io::Result<String>;

/// Copy `source` to `destination`, creating parent directories.
///
/// Returns the destination digest when `verify` is set.
pub(crate) fn copy_file(
    source: &Path,
    destination: &Path,
    verify: bool,
) -> Result<Option<String>, CopyFailure> {
    copy_file_with(source, destination, verify.then_some(&file_digest as Verifier<'static>))
}

fn copy_file_with(
    source: &Path,
    destination: &Path,
    verifier: Option<Verifier<'_>>,
) -> Result<Option<String>, CopyFailure> {
    let fail = |reason: String, integrity: bool| CopyFailure {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        reason,
        integrity,
    };

    // Copying a file onto itself truncates it on some platforms.
    if source == destination {
        return match verifier {
            Some(digest) => digest(source).map(Some).map_err(|e| fail(e.to_string(), false)),
            None => Ok(None),
        };
    }

    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| fail(e.to_string(), false))?;
    }
    fs::copy(source, destination).map_err(|e| fail(e.to_string(), false))?;

    let Some(digest) = verifier else {
        return Ok(None);
    };

    let expected = digest(source).map_err(|e| fail(e.to_string(), false))?;
    for attempt in 1..=2 {
        let actual = digest(destination).map_err(|e| fail(e.to_string(), false))?;
        if actual == expected {
            return Ok(Some(actual));
        }
        tracing::warn!(
            source = %source.display(),
            destination = %destination.display(),
            attempt,
            "copy verification mismatch"
        );
        if attempt == 1 {
            fs::copy(source, destination).map_err(|e| fail(e.to_string(), false))?;
        }
    }

    Err(fail("checksum mismatch after retry".to_string(), true))
}

/// Copy every `(source, destination)` pair, isolating failures per file.
pub(crate) fn copy_all<'a>(
    pairs: impl IntoIterator<Item = (&'a Path, &'a Path)>,
    verify: bool,
) -> CopyReport {
    copy_all_with(pairs, verify.then_some(&file_digest as Verifier<'static>))
}

fn copy_all_with<'a>(
    pairs: impl IntoIterator<Item = (&'a Path, &'a Path)>,
    verifier: Option<Verifier<'_>>,
) -> CopyReport {
    let mut report = CopyReport::default();
    for (source, destination) in pairs {
        match copy_file_with(source, destination, verifier) {
            Ok(sha256) => {
                tracing::debug!(
                    source = %source.display(),
                    destination = %destination.display(),
                    verified = verifier.is_some(),
                    "copied"
                );
                report.copied.push(CopiedFile {
                    source: source.to_path_buf(),
                    destination: destination.to_path_buf(),
                    sha256,
                });
            }
            Err(failure) => {
                tracing::warn!(
                    source = %failure.source.display(),
                    reason = %failure.reason,
                    integrity = failure.integrity,
                    "copy failed"
                );
                report.failures.0.push(failure);
            }
        }
    }
    report
}
