//! End-to-end runs of the import pipeline against real ZIP archives

use papervault_ingestion::{
    BulkImporter, ChannelReporter, CollectingReporter, Conventions, DocumentStorage, ImportEvent,
    ImportRequest, ImportSettings, IngestionError, MemoryStore, PaperStore,
};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const HEADER: &str = "UNIVERSITY OF CALICUT\nQuestion Paper Dispatch Register\nDate of Exam,QP Code,Paper,Total Scripts\n";

struct Harness {
    workdir: TempDir,
    store: Arc<MemoryStore>,
    importer: BulkImporter,
}

impl Harness {
    fn new() -> Self {
        let workdir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryStore::new());
        let settings = ImportSettings {
            header_lines: 3,
            document_extension: "pdf".into(),
            max_document_bytes: 50 * 1024 * 1024,
            scratch_root: workdir.path().join("temp"),
        };
        let importer = BulkImporter::new(
            store.clone() as Arc<dyn PaperStore>,
            DocumentStorage::new(workdir.path().join("papers"), "/uploads/papers"),
            Conventions::default(),
            settings,
        );
        Self { workdir, store, importer }
    }

    fn stored_files(&self) -> usize {
        count_entries(&self.workdir.path().join("papers"))
    }

    fn scratch_entries(&self) -> usize {
        count_entries(&self.workdir.path().join("temp"))
    }
}

fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
}

fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, SimpleFileOptions::default()).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Three listed papers, two of which have documents
fn three_row_archive() -> Vec<u8> {
    let csv = format!(
        "{}03-11-2025,,,\n\
         ,133750,BBA3CJ201 - Domestic Logistic Management,40\n\
         ,133751,BCA1MN101 - Programming in C,12\n\
         ,133752,COM5CJ301 - Income Tax,8\n",
        HEADER
    );

    build_zip(&[
        ("exam/register.csv", csv.as_bytes()),
        ("exam/pdfs/133750_1762152327189.pdf", b"%PDF-1.4 a"),
        ("exam/pdfs/sem5/133752_1762152327190.PDF", b"%PDF-1.4 b"),
    ])
}

/// Two listed papers, both with documents
fn two_row_archive() -> Vec<u8> {
    let csv = format!(
        "{}\"03-11-2025:\n2.00 PM\",,,\n\
         ,133750,BBA3CJ201 - Domestic Logistic Management,40\n\
         ,133751,BCA1MN101 - Programming in C,12\n",
        HEADER
    );

    build_zip(&[
        ("register.csv", csv.as_bytes()),
        ("133750_a.pdf", b"%PDF-1.4 a"),
        ("133751_b.pdf", b"%PDF-1.4 b"),
    ])
}

#[tokio::test]
async fn imports_matched_rows_and_skips_the_rest() {
    let h = Harness::new();
    let reporter = CollectingReporter::new();

    let summary = h
        .importer
        .run(three_row_archive(), ImportRequest { program_type_id: Some(1), created_by: Some(1) }, &reporter)
        .await
        .unwrap();

    assert_eq!((summary.success, summary.skipped, summary.failed), (2, 1, 0));
    assert_eq!(summary.successful_papers.len(), 2);
    assert_eq!(summary.successful_papers[0].code, "133750");
    assert_eq!(summary.successful_papers[0].title, "Domestic Logistic Management");
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].file, "133751 - Programming in C");
    assert_eq!(summary.errors[0].error, "Document not found");

    let papers = h.store.papers().await;
    assert_eq!(papers.len(), 2);
    assert!(papers.iter().all(|p| p.year_of_examination == 2025));
    assert_eq!(papers[1].semester, 5);
    assert_eq!(h.stored_files(), 2);
    assert_eq!(h.scratch_entries(), 0);

    let events = reporter.events();
    assert!(matches!(events.first(), Some(ImportEvent::Status { .. })));
    assert!(events.iter().any(|e| matches!(e, ImportEvent::Status { message } if message == "Found 3 entries in CSV")));
    assert!(events.iter().any(|e| matches!(e, ImportEvent::Status { message } if message == "Found 2 PDF files")));
    match events.last() {
        Some(ImportEvent::Complete { counts, successful_papers, .. }) => {
            assert_eq!((counts.success, counts.skipped, counts.failed), (2, 1, 0));
            assert_eq!(successful_papers.len(), 2);
        }
        other => panic!("expected complete event, got {:?}", other),
    }
}

#[tokio::test]
async fn second_run_of_same_archive_is_all_duplicates() {
    let h = Harness::new();

    let first = h
        .importer
        .run(two_row_archive(), ImportRequest::default(), &CollectingReporter::new())
        .await
        .unwrap();
    assert_eq!((first.success, first.skipped, first.failed), (2, 0, 0));

    let second = h
        .importer
        .run(two_row_archive(), ImportRequest::default(), &CollectingReporter::new())
        .await
        .unwrap();
    assert_eq!((second.success, second.skipped, second.failed), (0, 2, 0));
    assert!(second.errors.iter().all(|e| e.error == "Paper already exists in database"));

    assert_eq!(h.store.papers().await.len(), 2);
    assert_eq!(h.stored_files(), 2);
}

#[tokio::test]
async fn archive_without_metadata_is_fatal() {
    let h = Harness::new();
    let reporter = CollectingReporter::new();
    let archive = build_zip(&[("133750_a.pdf", b"%PDF")]);

    let err = h
        .importer
        .run(archive, ImportRequest::default(), &reporter)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestionError::MetadataMissing));
    assert_eq!(h.scratch_entries(), 0);
    assert_eq!(h.store.call_count(), 0);

    let last = reporter.events().pop().unwrap();
    assert!(last.is_terminal());
    assert_eq!(last, ImportEvent::fatal("No CSV file found in ZIP archive"));
}

#[tokio::test]
async fn corrupt_archive_is_fatal() {
    let h = Harness::new();

    let err = h
        .importer
        .run(b"PK\x03\x04 truncated".to_vec(), ImportRequest::default(), &CollectingReporter::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestionError::Archive(_)));
    assert_eq!(h.scratch_entries(), 0);
}

#[tokio::test]
async fn streams_events_through_a_channel() {
    let h = Harness::new();
    let (reporter, mut rx) = ChannelReporter::channel(8);
    let importer = h.importer.clone();

    let task = tokio::spawn(async move {
        importer
            .run(three_row_archive(), ImportRequest::default(), &reporter)
            .await
    });

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    let summary = task.await.unwrap().unwrap();
    assert_eq!(summary.success, 2);

    let rows: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, ImportEvent::Success { .. } | ImportEvent::Skip { .. }))
        .collect();
    assert_eq!(rows.len(), 3);
    assert!(events.last().unwrap().is_terminal());
}

#[tokio::test]
async fn stops_when_the_listener_goes_away() {
    let h = Harness::new();
    let (reporter, rx) = ChannelReporter::channel(8);
    drop(rx);

    let err = h
        .importer
        .run(two_row_archive(), ImportRequest::default(), &reporter)
        .await
        .unwrap_err();

    assert!(matches!(err, IngestionError::Cancelled));
    assert!(h.store.papers().await.is_empty());
    assert_eq!(h.scratch_entries(), 0);
}
