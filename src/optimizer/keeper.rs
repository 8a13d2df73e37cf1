//! # File Keeper
//!
//! Size-comparing file keeper and final result publication.

use crate::error::OptimizeError;
use std::io;
use std::path::Path;
use tracing::{debug, error};

/// Which content a candidate path holds after `keep_smallest`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kept {
    /// The candidate was strictly smaller and is kept
    Candidate,
    /// The reference was copied over the candidate
    Original,
}

/// Outcome of comparing a candidate against its reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepResult {
    pub kept: Kept,
    /// Size of the file now at the candidate path
    pub size: u64,
}

/// Compares two files and leaves the smaller content at `candidate`.
///
/// When `candidate` is not strictly smaller, `original` is copied over it.
/// A failed copy is logged and leaves the candidate's prior content in place,
/// reported as `Kept::Candidate` with its (larger) size. Fails only if either
/// file cannot be measured.
pub async fn keep_smallest(original: &Path, candidate: &Path) -> Result<KeepResult, OptimizeError> {
    let original_size = tokio::fs::metadata(original).await?.len();
    let candidate_size = tokio::fs::metadata(candidate).await?.len();

    if candidate_size < original_size {
        debug!(
            "Keeping {} ({} < {} bytes)",
            candidate.display(),
            candidate_size,
            original_size
        );
        return Ok(KeepResult {
            kept: Kept::Candidate,
            size: candidate_size,
        });
    }

    match tokio::fs::copy(original, candidate).await {
        Ok(_) => {
            debug!(
                "Candidate {} not smaller ({} >= {} bytes), restored {}",
                candidate.display(),
                candidate_size,
                original_size,
                original.display()
            );
            Ok(KeepResult {
                kept: Kept::Original,
                size: original_size,
            })
        }
        Err(e) => {
            error!(
                "Unable to copy {} to {}: {}",
                original.display(),
                candidate.display(),
                e
            );
            Ok(KeepResult {
                kept: Kept::Candidate,
                size: candidate_size,
            })
        }
    }
}

/// Removes a scratch file; an already-absent file is not an error
pub async fn remove_scratch(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Writes `source` to `output` atomically.
///
/// The content is staged in a temporary file next to `output` and renamed
/// into place, so `output` either keeps its previous content or holds the
/// complete new file.
pub async fn publish(source: &Path, output: &Path) -> Result<u64, OptimizeError> {
    let unavailable = |reason: String| OptimizeError::OutputUnavailable {
        path: output.to_path_buf(),
        reason,
    };

    let parent = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().map_err(|e| unavailable(e.to_string()))?,
    };
    tokio::fs::create_dir_all(&parent)
        .await
        .map_err(|e| unavailable(format!("cannot create {}: {}", parent.display(), e)))?;

    let staged = tempfile::Builder::new()
        .prefix(".smush-")
        .tempfile_in(&parent)
        .map_err(|e| unavailable(format!("cannot stage output: {}", e)))?;

    let size = tokio::fs::copy(source, staged.path())
        .await
        .map_err(|e| unavailable(format!("cannot copy {}: {}", source.display(), e)))?;

    staged
        .persist(output)
        .map_err(|e| unavailable(format!("cannot persist: {}", e.error)))?;

    debug!("Published {} ({} bytes) to {}", source.display(), size, output.display());
    Ok(size)
}
