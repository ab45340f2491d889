//! Course archive download and extraction.

use std::fs::File;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use zip::ZipArchive;

use ocwharvest_shared::{HarvestError, Result};

/// A downloaded archive on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArchive {
    pub path: PathBuf,
    pub bytes: u64,
    /// Lower-case hex SHA-256 of the archive bytes.
    pub sha256: String,
}

/// Incremental writer that hashes what it writes.
pub(crate) struct HashingSink {
    hasher: Sha256,
    bytes: u64,
}

impl HashingSink {
    pub(crate) fn new() -> Self {
        Self {
            hasher: Sha256::new(),
            bytes: 0,
        }
    }

    pub(crate) fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.bytes += chunk.len() as u64;
    }

    pub(crate) fn finish(self, path: PathBuf) -> DownloadedArchive {
        DownloadedArchive {
            path,
            bytes: self.bytes,
            sha256: format!("{:x}", self.hasher.finalize()),
        }
    }
}

/// Extract every entry of the zip at `zip_path` into `dest`.
///
/// Entries whose path would land outside `dest` are skipped. Returns the
/// number of files written.
pub fn extract_archive(zip_path: &Path, dest: &Path) -> Result<usize> {
    let file = File::open(zip_path).map_err(|e| HarvestError::io(zip_path, e))?;
    let mut archive = ZipArchive::new(file)
        .map_err(|e| HarvestError::Archive(format!("{}: {e}", zip_path.display())))?;

    std::fs::create_dir_all(dest).map_err(|e| HarvestError::io(dest, e))?;

    let mut written = 0;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| HarvestError::Archive(format!("{}: entry {i}: {e}", zip_path.display())))?;

        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "skipping archive entry outside extraction dir");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| HarvestError::io(&target, e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| HarvestError::io(parent, e))?;
        }
        let mut out = File::create(&target).map_err(|e| HarvestError::io(&target, e))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| HarvestError::io(&target, e))?;
        written += 1;
    }

    debug!(archive = %zip_path.display(), files = written, "archive extracted");
    Ok(written)
}
