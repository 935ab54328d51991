//! Bulk importer
//!
//! Runs one archive through the pipeline: extract, find and parse the
//! metadata file, index the documents, then import each metadata row in
//! order. Every row ends in exactly one outcome:
//!
//! - skipped: no document, document missing on disk, oversize, or duplicate
//! - imported: lookups resolved, document copied, paper inserted
//! - failed: any other error; the batch carries on
//!
//! Rows commit independently. A copy made for a row that then turns out to
//! be a duplicate or fails is removed again.

use crate::archive::{extract_archive, find_metadata_file, ScratchDir};
use crate::errors::IngestionError;
use crate::inference::{infer, Conventions, ParsedPaper};
use crate::locator::locate_documents;
use crate::metadata::parse_metadata;
use crate::progress::{ImportEvent, ImportSummary, ProgressReporter, STATUS_PROCESSING};
use crate::storage::{CopyGuard, DocumentStorage};
use crate::store::PaperStore;
use papervault_common::config::AppConfig;
use papervault_common::db::NewPaper;
use papervault_common::errors::AppError;
use papervault_common::{metrics, PDF_MIME_TYPE};
use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

const MIB: f64 = 1024.0 * 1024.0;

/// Per-run knobs taken from configuration
#[derive(Debug, Clone)]
pub struct ImportSettings {
    pub header_lines: usize,
    pub document_extension: String,
    pub max_document_bytes: u64,
    pub scratch_root: PathBuf,
}

impl ImportSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            header_lines: config.import.header_lines,
            document_extension: config.import.document_extension.clone(),
            max_document_bytes: config.import.max_document_bytes,
            scratch_root: config.storage.scratch_dir.clone(),
        }
    }
}

/// Who is importing, and into which program type
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportRequest {
    pub program_type_id: Option<i32>,
    pub created_by: Option<i32>,
}

/// Why a row was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NoDocument,
    MissingFile,
    Oversize { size: u64, limit: u64 },
    Duplicate,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoDocument => f.write_str("Document not found"),
            SkipReason::MissingFile => f.write_str("Document file does not exist"),
            SkipReason::Oversize { size, limit } => write!(
                f,
                "File too large: {:.2}MB (max {}MB)",
                *size as f64 / MIB,
                (*limit as f64 / MIB).round()
            ),
            SkipReason::Duplicate => f.write_str("Paper already exists in database"),
        }
    }
}

/// Terminal state of one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowOutcome {
    Imported { id: i32 },
    Skipped(SkipReason),
    Failed(String),
}

impl RowOutcome {
    fn metric_label(&self) -> &'static str {
        match self {
            RowOutcome::Imported { .. } => "success",
            RowOutcome::Skipped(_) => "skipped",
            RowOutcome::Failed(_) => "failed",
        }
    }
}

/// Imports question-paper archives
#[derive(Clone)]
pub struct BulkImporter {
    store: Arc<dyn PaperStore>,
    storage: DocumentStorage,
    conventions: Conventions,
    settings: ImportSettings,
}

impl BulkImporter {
    pub fn new(
        store: Arc<dyn PaperStore>,
        storage: DocumentStorage,
        conventions: Conventions,
        settings: ImportSettings,
    ) -> Self {
        Self {
            store,
            storage,
            conventions,
            settings,
        }
    }

    pub fn from_config(store: Arc<dyn PaperStore>, config: &AppConfig) -> Self {
        Self::new(
            store,
            DocumentStorage::from_config(&config.storage),
            Conventions::from_config(&config.import),
            ImportSettings::from_config(config),
        )
    }

    /// Replace the document storage
    pub fn with_storage(mut self, storage: DocumentStorage) -> Self {
        self.storage = storage;
        self
    }

    pub fn storage(&self) -> &DocumentStorage {
        &self.storage
    }

    /// Import one archive.
    ///
    /// Fatal errors are also reported as a final `error` event; on success
    /// the last event is `complete`. The scratch directory is gone when this
    /// returns.
    #[instrument(skip_all, fields(bytes = archive.as_ref().len()))]
    pub async fn run<A>(
        &self,
        archive: A,
        request: ImportRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<ImportSummary, IngestionError>
    where
        A: AsRef<[u8]> + Send + 'static,
    {
        let started = Instant::now();
        info!("Starting bulk import");

        let result = self.run_in_scratch(archive, request, reporter).await;
        metrics::record_import_run(started.elapsed().as_secs_f64(), result.is_ok());

        match &result {
            Ok(summary) => info!(
                success = summary.success,
                failed = summary.failed,
                skipped = summary.skipped,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Bulk import finished"
            ),
            Err(e) => {
                warn!(error = %e, "Bulk import aborted");
                reporter.report(ImportEvent::fatal(e.to_string())).await;
            }
        }

        result
    }

    async fn run_in_scratch<A>(
        &self,
        archive: A,
        request: ImportRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<ImportSummary, IngestionError>
    where
        A: AsRef<[u8]> + Send + 'static,
    {
        reporter.report(ImportEvent::status("Creating temporary directory...")).await;
        let scratch = ScratchDir::create(&self.settings.scratch_root)?;

        let result = self.run_pipeline(archive, scratch.path(), request, reporter).await;
        scratch.cleanup().await;

        let summary = result?;
        reporter.report(ImportEvent::complete(&summary)).await;
        Ok(summary)
    }

    async fn run_pipeline<A>(
        &self,
        archive: A,
        scratch: &Path,
        request: ImportRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<ImportSummary, IngestionError>
    where
        A: AsRef<[u8]> + Send + 'static,
    {
        let root = scratch.to_path_buf();
        let extension = self.settings.document_extension.clone();
        let kind = extension.to_uppercase();

        reporter.report(ImportEvent::status("Extracting ZIP file...")).await;
        let dest = root.clone();
        let files = tokio::task::spawn_blocking(move || extract_archive(archive.as_ref(), &dest)).await??;
        debug!(files, "Archive extracted");

        reporter.report(ImportEvent::status("Looking for CSV file...")).await;
        let search_root = root.clone();
        let metadata_path = tokio::task::spawn_blocking(move || find_metadata_file(&search_root))
            .await??
            .ok_or(IngestionError::MetadataMissing)?;

        reporter.report(ImportEvent::status("Parsing CSV file...")).await;
        let raw = tokio::fs::read(&metadata_path).await?;
        let rows = parse_metadata(&String::from_utf8_lossy(&raw), self.settings.header_lines)?;
        reporter
            .report(ImportEvent::status(format!("Found {} entries in CSV", rows.len())))
            .await;

        reporter
            .report(ImportEvent::status(format!("Scanning for {} files...", kind)))
            .await;
        let documents = tokio::task::spawn_blocking(move || locate_documents(&root, &extension)).await??;
        reporter
            .report(ImportEvent::status(format!("Found {} {} files", documents.len(), kind)))
            .await;

        let papers: Vec<ParsedPaper> = rows
            .iter()
            .map(|row| infer(row, &documents, &self.conventions))
            .collect();

        self.storage.ensure_root().await?;
        self.import_papers(&papers, request, reporter).await
    }

    /// Import parsed papers in order, reporting after every row
    pub async fn import_papers(
        &self,
        papers: &[ParsedPaper],
        request: ImportRequest,
        reporter: &dyn ProgressReporter,
    ) -> Result<ImportSummary, IngestionError> {
        let total = papers.len();
        let mut summary = ImportSummary::default();

        for (index, paper) in papers.iter().enumerate() {
            if reporter.is_closed() {
                warn!(processed = summary.processed(), total, "Progress listener gone, stopping import");
                return Err(IngestionError::Cancelled);
            }

            let current = index + 1;
            let file = paper.label();

            reporter
                .report(ImportEvent::Progress {
                    current,
                    total,
                    file: file.clone(),
                    status: STATUS_PROCESSING.to_string(),
                    counts: summary.counts(),
                })
                .await;

            let outcome = self.import_row(paper, request).await;
            metrics::record_import_row(outcome.metric_label());

            let event = match outcome {
                RowOutcome::Imported { id } => {
                    debug!(id, code = %paper.code, "Paper stored");
                    summary.record_success(&paper.code, &paper.subject_name);
                    ImportEvent::Success {
                        current,
                        total,
                        file,
                        counts: summary.counts(),
                    }
                }
                RowOutcome::Skipped(reason) => {
                    let reason = reason.to_string();
                    summary.record_skip(&file, &reason);
                    ImportEvent::Skip {
                        current,
                        total,
                        file,
                        error: reason,
                        counts: summary.counts(),
                    }
                }
                RowOutcome::Failed(message) => {
                    summary.record_failure(&file, &message);
                    ImportEvent::Error {
                        error: message,
                        current: Some(current),
                        total: Some(total),
                        file: Some(file),
                        counts: Some(summary.counts()),
                    }
                }
            };

            reporter.report(event).await;
        }

        Ok(summary)
    }

    /// Drive one row to its terminal state
    pub async fn import_row(&self, paper: &ParsedPaper, request: ImportRequest) -> RowOutcome {
        let Some(path) = paper.document_path.as_deref() else {
            return RowOutcome::Skipped(SkipReason::NoDocument);
        };

        let size = match tokio::fs::metadata(path).await {
            Ok(meta) if meta.is_file() => meta.len(),
            Ok(_) => return RowOutcome::Skipped(SkipReason::MissingFile),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return RowOutcome::Skipped(SkipReason::MissingFile)
            }
            Err(e) => {
                return RowOutcome::Failed(
                    AppError::Storage {
                        message: format!("failed to read {}: {}", path.display(), e),
                    }
                    .to_string(),
                )
            }
        };

        let limit = self.settings.max_document_bytes;
        if size > limit {
            return RowOutcome::Skipped(SkipReason::Oversize { size, limit });
        }

        match self.store.paper_exists(&paper.code, paper.year).await {
            Ok(true) => return RowOutcome::Skipped(SkipReason::Duplicate),
            Ok(false) => {}
            Err(e) => return RowOutcome::Failed(e.to_string()),
        }

        let (department_id, subject_type_id) = match self.resolve_lookups(paper).await {
            Ok(ids) => ids,
            Err(e) => return RowOutcome::Failed(e.to_string()),
        };

        let stored = match self.storage.store_copy(path).await {
            Ok(stored) => stored,
            Err(e) => {
                return RowOutcome::Failed(
                    AppError::Storage {
                        message: format!("failed to copy {}: {}", path.display(), e),
                    }
                    .to_string(),
                )
            }
        };
        // Removes the copy unless the insert is confirmed, also when this future is dropped
        let copy = CopyGuard::new(stored.path.clone());

        let new_paper = NewPaper {
            subject_name: paper.subject_name.clone(),
            subject_code: paper.subject_code.clone(),
            paper_code: Some(paper.code.clone()),
            year_of_examination: paper.year,
            semester: paper.semester,
            subject_type_id,
            program_type_id: request.program_type_id,
            department_id,
            description: None,
            file_url: stored.url.clone(),
            file_type: PDF_MIME_TYPE.to_string(),
            original_filename: Some(stored.original_filename.clone()),
            created_by: request.created_by,
        };

        match self.store.insert_paper(new_paper).await {
            Ok(id) => {
                copy.keep();
                RowOutcome::Imported { id }
            }
            Err(e) if e.is_duplicate() => RowOutcome::Skipped(SkipReason::Duplicate),
            Err(e) => RowOutcome::Failed(e.to_string()),
        }
    }

    async fn resolve_lookups(&self, paper: &ParsedPaper) -> papervault_common::Result<(Option<i32>, Option<i32>)> {
        let prefix = paper.department_prefix.as_str();

        let department_id = match self.conventions.department_name(prefix) {
            Some(name) => Some(self.store.department_by_name(name).await?),
            None if prefix.is_empty() => None,
            None => self.store.department_matching(prefix).await?,
        };

        let type_name = self.conventions.subject_type_name(&paper.subject_type_code);
        let subject_type_id = self.store.subject_type_by_name(type_name).await?;

        Ok((department_id, Some(subject_type_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::CollectingReporter;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use tempfile::TempDir;

    const PDF: &[u8] = b"%PDF";

    struct Fixture {
        scratch: TempDir,
        storage_root: TempDir,
        store: Arc<MemoryStore>,
        importer: BulkImporter,
    }

    fn fixture_with(store: Arc<dyn PaperStore>, memory: Arc<MemoryStore>) -> Fixture {
        let scratch = tempfile::tempdir().unwrap();
        let storage_root = tempfile::tempdir().unwrap();
        let settings = ImportSettings {
            header_lines: 3,
            document_extension: "pdf".into(),
            max_document_bytes: 16,
            scratch_root: scratch.path().join("runs"),
        };
        let importer = BulkImporter::new(
            store,
            DocumentStorage::new(storage_root.path(), "/uploads/papers"),
            Conventions::default(),
            settings,
        );
        Fixture { scratch, storage_root, store: memory, importer }
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::with_departments(["Computer Science", "Physical Education"]));
        fixture_with(store.clone(), store)
    }

    fn paper(fx: &Fixture, code: &str, subject_code: &str, contents: Option<&[u8]>) -> ParsedPaper {
        let document_path = contents.map(|bytes| {
            let path = fx.scratch.path().join(format!("{}_doc.pdf", code));
            std::fs::write(&path, bytes).unwrap();
            path
        });

        ParsedPaper {
            code: code.into(),
            exam_date: "03-11-2025".into(),
            subject_code: subject_code.into(),
            subject_name: format!("Subject {}", code),
            semester: 3,
            year: 2025,
            subject_type_code: "CJ".into(),
            department_prefix: crate::inference::department_prefix(subject_code).into(),
            document_path,
        }
    }

    fn stored_files(fx: &Fixture) -> usize {
        std::fs::read_dir(fx.storage_root.path()).unwrap().count()
    }

    #[tokio::test]
    async fn test_no_document_never_touches_store() {
        let fx = fixture();
        let p = paper(&fx, "133750", "BBA3CJ201", None);

        let outcome = fx.importer.import_row(&p, ImportRequest::default()).await;

        assert_eq!(outcome, RowOutcome::Skipped(SkipReason::NoDocument));
        assert_eq!(fx.store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_and_oversize_documents() {
        let fx = fixture();

        let mut missing = paper(&fx, "133750", "BBA3CJ201", Some(PDF));
        missing.document_path = Some(fx.scratch.path().join("gone.pdf"));
        assert_eq!(
            fx.importer.import_row(&missing, ImportRequest::default()).await,
            RowOutcome::Skipped(SkipReason::MissingFile)
        );

        let big = paper(&fx, "133751", "BBA3CJ201", Some(&[0u8; 17][..]));
        assert!(matches!(
            fx.importer.import_row(&big, ImportRequest::default()).await,
            RowOutcome::Skipped(SkipReason::Oversize { size: 17, limit: 16 })
        ));

        assert_eq!(fx.store.call_count(), 0);
        assert_eq!(stored_files(&fx), 0);
    }

    #[tokio::test]
    async fn test_imported_row_fields() {
        let fx = fixture();
        let p = paper(&fx, "133750", "BBA3CJ201", Some(PDF));
        let request = ImportRequest { program_type_id: Some(2), created_by: Some(9) };

        let outcome = fx.importer.import_row(&p, request).await;
        assert!(matches!(outcome, RowOutcome::Imported { .. }));

        let papers = fx.store.papers().await;
        assert_eq!(papers.len(), 1);
        let stored = &papers[0];
        assert_eq!(stored.paper_code.as_deref(), Some("133750"));
        assert_eq!(stored.program_type_id, Some(2));
        assert_eq!(stored.created_by, Some(9));
        assert_eq!(stored.file_type, PDF_MIME_TYPE);
        assert_eq!(stored.original_filename.as_deref(), Some("133750_doc.pdf"));
        assert!(stored.file_url.starts_with("/uploads/papers/"));
        assert!(stored.department_id.is_some());
        assert!(stored.subject_type_id.is_some());

        assert!(fx.store.department_names().await.contains(&"Business Administration".to_string()));
        assert_eq!(fx.store.subject_type_names().await, vec!["Major".to_string()]);
        assert_eq!(stored_files(&fx), 1);
    }

    #[tokio::test]
    async fn test_duplicate_is_skipped_without_copy() {
        let fx = fixture();
        let first = paper(&fx, "133750", "BBA3CJ201", Some(PDF));

        fx.importer.import_row(&first, ImportRequest::default()).await;
        let again = fx.importer.import_row(&first, ImportRequest::default()).await;

        assert_eq!(again, RowOutcome::Skipped(SkipReason::Duplicate));
        assert_eq!(fx.store.papers().await.len(), 1);
        assert_eq!(stored_files(&fx), 1);
    }

    #[tokio::test]
    async fn test_unmapped_prefix_matches_existing_department_only() {
        let fx = fixture();

        let matched = paper(&fx, "1", "PHYS1CJ101", Some(PDF));
        fx.importer.import_row(&matched, ImportRequest::default()).await;

        let unknown = paper(&fx, "2", "ZZZ1CJ101", Some(PDF));
        fx.importer.import_row(&unknown, ImportRequest::default()).await;

        let papers = fx.store.papers().await;
        assert_eq!(papers[0].department_id, Some(2));
        assert_eq!(papers[1].department_id, None);
        assert_eq!(fx.store.department_names().await.len(), 2);
    }

    /// Store whose duplicate check misses a concurrent insert, or whose insert fails
    struct RacingStore {
        inner: Arc<MemoryStore>,
        fail_with: Option<String>,
    }

    #[async_trait]
    impl PaperStore for RacingStore {
        async fn department_by_name(&self, name: &str) -> papervault_common::Result<i32> {
            self.inner.department_by_name(name).await
        }
        async fn department_matching(&self, fragment: &str) -> papervault_common::Result<Option<i32>> {
            self.inner.department_matching(fragment).await
        }
        async fn subject_type_by_name(&self, name: &str) -> papervault_common::Result<i32> {
            self.inner.subject_type_by_name(name).await
        }
        async fn paper_exists(&self, _code: &str, _year: i32) -> papervault_common::Result<bool> {
            Ok(false)
        }
        async fn insert_paper(&self, paper: NewPaper) -> papervault_common::Result<i32> {
            match &self.fail_with {
                Some(message) => Err(AppError::Internal { message: message.clone() }),
                None => self.inner.insert_paper(paper).await,
            }
        }
    }

    #[tokio::test]
    async fn test_insert_race_removes_copy() {
        let memory = Arc::new(MemoryStore::new());
        let racing = Arc::new(RacingStore { inner: memory.clone(), fail_with: None });
        let fx = fixture_with(racing, memory);
        let p = paper(&fx, "133750", "BBA3CJ201", Some(PDF));

        fx.importer.import_row(&p, ImportRequest::default()).await;
        let second = fx.importer.import_row(&p, ImportRequest::default()).await;

        assert_eq!(second, RowOutcome::Skipped(SkipReason::Duplicate));
        assert_eq!(stored_files(&fx), 1);
    }

    #[tokio::test]
    async fn test_failed_insert_removes_copy_and_batch_continues() {
        let memory = Arc::new(MemoryStore::new());
        let failing = Arc::new(RacingStore { inner: memory.clone(), fail_with: Some("connection reset".into()) });
        let fx = fixture_with(failing, memory);

        let papers = vec![
            paper(&fx, "133750", "BBA3CJ201", Some(PDF)),
            paper(&fx, "133751", "BBA3CJ202", None),
        ];
        let reporter = CollectingReporter::new();
        let summary = fx
            .importer
            .import_papers(&papers, ImportRequest::default(), &reporter)
            .await
            .unwrap();

        assert_eq!((summary.success, summary.failed, summary.skipped), (0, 1, 1));
        assert!(summary.errors[0].error.contains("connection reset"));
        assert_eq!(summary.errors[1].error, "Document not found");
        assert_eq!(stored_files(&fx), 0);

        let events = reporter.events();
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[1], ImportEvent::Error { current: Some(1), .. }));
        assert!(matches!(&events[3], ImportEvent::Skip { current: 2, total: 2, .. }));
    }

    #[tokio::test]
    async fn test_unreadable_document_fails_row() {
        let fx = fixture();
        let mut p = paper(&fx, "133750", "BBA3CJ201", Some(PDF));
        let file = p.document_path.clone().unwrap();
        p.document_path = Some(file.join("inner.pdf"));

        let outcome = fx.importer.import_row(&p, ImportRequest::default()).await;

        match outcome {
            RowOutcome::Failed(message) => assert!(message.contains("inner.pdf")),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(fx.store.call_count(), 0);
    }

    /// Store whose insert never completes
    struct StalledStore {
        inner: Arc<MemoryStore>,
        inserting: tokio::sync::Notify,
    }

    #[async_trait]
    impl PaperStore for StalledStore {
        async fn department_by_name(&self, name: &str) -> papervault_common::Result<i32> {
            self.inner.department_by_name(name).await
        }
        async fn department_matching(&self, fragment: &str) -> papervault_common::Result<Option<i32>> {
            self.inner.department_matching(fragment).await
        }
        async fn subject_type_by_name(&self, name: &str) -> papervault_common::Result<i32> {
            self.inner.subject_type_by_name(name).await
        }
        async fn paper_exists(&self, code: &str, year: i32) -> papervault_common::Result<bool> {
            self.inner.paper_exists(code, year).await
        }
        async fn insert_paper(&self, _paper: NewPaper) -> papervault_common::Result<i32> {
            self.inserting.notify_one();
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_dropped_row_leaves_no_stored_copy() {
        let memory = Arc::new(MemoryStore::new());
        let stalled = Arc::new(StalledStore {
            inner: memory.clone(),
            inserting: tokio::sync::Notify::new(),
        });
        let fx = fixture_with(stalled.clone(), memory);
        let p = paper(&fx, "133750", "BBA3CJ201", Some(PDF));

        tokio::select! {
            outcome = fx.importer.import_row(&p, ImportRequest::default()) => {
                panic!("insert should not complete, got {:?}", outcome)
            }
            _ = stalled.inserting.notified() => {}
        }

        assert!(fx.store.papers().await.is_empty());
        assert_eq!(stored_files(&fx), 0);
    }

    #[test]
    fn test_skip_messages() {
        assert_eq!(SkipReason::NoDocument.to_string(), "Document not found");
        assert_eq!(
            SkipReason::Oversize { size: 60 * 1024 * 1024, limit: 50 * 1024 * 1024 }.to_string(),
            "File too large: 60.00MB (max 50MB)"
        );
    }
}
