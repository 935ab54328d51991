//! Archive extraction and per-run scratch space

use crate::errors::IngestionError;
use crate::locator::sorted_entries;
use std::fs::{self, File};
use std::io::{self, Cursor};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, warn};
use zip::ZipArchive;

/// Metadata directory written by macOS archivers; never part of the payload
const MACOS_METADATA_DIR: &str = "__MACOSX";

/// Decompress every entry of a ZIP archive into `dest`, keeping relative folders.
///
/// Returns the number of files written. Entries whose names would land outside
/// `dest` are skipped.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<usize, IngestionError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut written = 0;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;

        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "Skipping archive entry with unsafe path");
            continue;
        };

        if relative.starts_with(MACOS_METADATA_DIR) {
            continue;
        }

        let out_path = dest.join(&relative);

        if entry.is_dir() {
            fs::create_dir_all(&out_path)?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = File::create(&out_path)?;
        io::copy(&mut entry, &mut out)?;
        written += 1;
    }

    debug!(files = written, dest = %dest.display(), "Archive extracted");
    Ok(written)
}

/// Locate the metadata file: the first `.csv` in `dir` itself, otherwise the
/// first one found in its sub-directories, depth-first. Entries are visited in
/// name order.
pub fn find_metadata_file(dir: &Path) -> io::Result<Option<PathBuf>> {
    let entries = sorted_entries(dir)?;

    for entry in &entries {
        if entry.file_type()?.is_file() && has_extension(&entry.file_name().to_string_lossy(), "csv") {
            return Ok(Some(entry.path()));
        }
    }

    for entry in &entries {
        if entry.file_type()?.is_dir() {
            if let Some(found) = find_metadata_file(&entry.path())? {
                return Ok(Some(found));
            }
        }
    }

    Ok(None)
}

/// Case-insensitive extension check on a file name
pub(crate) fn has_extension(file_name: &str, extension: &str) -> bool {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) => !stem.is_empty() && ext.eq_ignore_ascii_case(extension),
        None => false,
    }
}

/// Scratch directory for one import run.
///
/// Named `upload-<millis>-<random>` under the configured scratch root and
/// removed when the run ends; dropping it also removes it.
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    pub fn create(parent: &Path) -> io::Result<Self> {
        let parent = std::path::absolute(parent)?;
        fs::create_dir_all(&parent)?;

        let prefix = format!("upload-{}-", chrono::Utc::now().timestamp_millis());
        let dir = tempfile::Builder::new().prefix(&prefix).tempdir_in(&parent)?;

        debug!(path = %dir.path().display(), "Scratch directory created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the directory off the async runtime
    pub async fn cleanup(self) {
        let path = self.dir.path().to_path_buf();

        match tokio::task::spawn_blocking(move || self.dir.close()).await {
            Ok(Ok(())) => debug!(path = %path.display(), "Scratch directory removed"),
            Ok(Err(e)) => warn!(path = %path.display(), error = %e, "Failed to remove scratch directory"),
            Err(e) => warn!(path = %path.display(), error = %e, "Scratch cleanup task failed"),
        }
    }
}
