//! Permanent document storage on local disk

use papervault_common::config::StorageConfig;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::warn;

/// A document copied into permanent storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub path: PathBuf,
    /// Public URL recorded on the paper
    pub url: String,
    /// Base name of the source file
    pub original_filename: String,
}

/// Deletes a freshly stored file when dropped, unless `keep` was called.
///
/// Covers every exit path of the code holding it, including a future that is
/// dropped while suspended.
#[derive(Debug)]
pub struct CopyGuard {
    path: Option<PathBuf>,
}

impl CopyGuard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    /// The file stays in storage
    pub fn keep(mut self) {
        self.path = None;
    }
}

impl Drop for CopyGuard {
    fn drop(&mut self) {
        let Some(path) = self.path.take() else {
            return;
        };

        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove stored copy"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentStorage {
    root: PathBuf,
    public_prefix: String,
}

impl DocumentStorage {
    pub fn new(root: impl Into<PathBuf>, public_prefix: impl Into<String>) -> Self {
        let public_prefix: String = public_prefix.into();
        Self {
            root: root.into(),
            public_prefix: public_prefix.trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.papers_dir.clone(), config.public_prefix.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    /// Copy `src` into storage as `<millis>-<basename>`.
    ///
    /// The source is left in place. If the name is taken, a counter is
    /// inserted after the timestamp until a free name is found.
    pub async fn store_copy(&self, src: &Path) -> io::Result<StoredDocument> {
        let original_filename = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source has no file name"))?;

        let mut reader = File::open(src).await?;
        let millis = chrono::Utc::now().timestamp_millis();
        let (path, file_name, mut writer) = self.reserve(millis, &original_filename).await?;
        let partial = CopyGuard::new(path.clone());

        tokio::io::copy(&mut reader, &mut writer).await?;
        writer.flush().await?;
        partial.keep();

        Ok(StoredDocument {
            url: format!("{}/{}", self.public_prefix, file_name),
            path,
            original_filename,
        })
    }

    async fn reserve(&self, millis: i64, basename: &str) -> io::Result<(PathBuf, String, File)> {
        let mut attempt = 0u32;

        loop {
            let file_name = match attempt {
                0 => format!("{}-{}", millis, basename),
                n => format!("{}-{}-{}", millis, n, basename),
            };
            let path = self.root.join(&file_name);

            match OpenOptions::new().write(true).create_new(true).open(&path).await {
                Ok(file) => return Ok((path, file_name, file)),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e),
            }
        }
    }

    /// Delete the file behind a recorded URL. Returns `false` if it was already gone.
    pub async fn delete_url(&self, url: &str) -> io::Result<bool> {
        let Some(path) = self.resolve_url(url) else {
            return Ok(false);
        };

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Map a recorded URL back to a file inside the storage root.
    ///
    /// Only the final path segment is used, so URLs cannot point outside the root.
    pub fn resolve_url(&self, url: &str) -> Option<PathBuf> {
        let name = Path::new(url).file_name()?;
        Some(self.root.join(name))
    }
}
