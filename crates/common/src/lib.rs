//! PaperVault Common Library
//!
//! Shared code for the PaperVault services including:
//! - Database entities, migrations and the repository
//! - Error types and handling
//! - Configuration management
//! - Authentication utilities
//! - Metrics and observability

pub mod auth;
pub mod config;
pub mod db;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{DbPool, Repository};
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// MIME type recorded for imported question papers
pub const PDF_MIME_TYPE: &str = "application/pdf";
