//! Import pipeline error types
//!
//! These are the run-fatal conditions. Per-row problems never surface here;
//! they are recorded in the run's summary instead.

use papervault_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("Failed to extract archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("No CSV file found in ZIP archive")]
    MetadataMissing,

    #[error("Failed to parse CSV file: {0}")]
    Metadata(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Store(#[from] AppError),

    #[error("Import cancelled: progress receiver went away")]
    Cancelled,

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl From<IngestionError> for AppError {
    fn from(e: IngestionError) -> Self {
        match e {
            IngestionError::Store(inner) => inner,
            IngestionError::Io(inner) => AppError::Storage {
                message: inner.to_string(),
            },
            IngestionError::Task(inner) => AppError::Internal {
                message: inner.to_string(),
            },
            other => AppError::Import {
                message: other.to_string(),
            },
        }
    }
}
