//! PaperVault bulk import pipeline
//!
//! Imports an archive holding one exam-metadata CSV and a tree of
//! question-paper PDFs:
//! 1. Extracts the archive into a scratch directory
//! 2. Parses the metadata rows
//! 3. Indexes the documents by the item code in their file names
//! 4. Infers paper fields from the naming conventions
//! 5. Imports each row, reporting progress as it goes

pub mod archive;
pub mod errors;
pub mod importer;
pub mod inference;
pub mod locator;
pub mod metadata;
pub mod progress;
pub mod storage;
pub mod store;

pub use errors::IngestionError;
pub use importer::{BulkImporter, ImportRequest, ImportSettings, RowOutcome, SkipReason};
pub use inference::{Conventions, ParsedPaper};
pub use progress::{
    ChannelReporter, CollectingReporter, Counts, ImportEvent, ImportSummary, ProgressReporter,
    TracingReporter,
};
pub use storage::{DocumentStorage, StoredDocument};
pub use store::{MemoryStore, PaperStore};
