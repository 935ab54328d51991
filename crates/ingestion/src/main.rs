//! PaperVault Ingestion CLI
//!
//! Imports a question-paper archive from disk without going through the API:
//! 1. Loads configuration and applies migrations
//! 2. Runs the bulk import pipeline with log-based progress
//! 3. Prints the import summary as JSON

use anyhow::Context;
use clap::Parser;
use papervault_common::{config::AppConfig, db::DbPool, Repository, VERSION};
use papervault_ingestion::{
    BulkImporter, DocumentStorage, ImportRequest, MemoryStore, PaperStore, TracingReporter,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ingestion", version, about = "Import a question-paper archive")]
struct Cli {
    /// ZIP archive holding the metadata CSV and the PDFs
    archive: PathBuf,

    /// Program type assigned to every imported paper
    #[arg(long)]
    program_type_id: Option<i32>,

    /// User recorded as the creator of the imported papers
    #[arg(long)]
    created_by: Option<i32>,

    /// Run against an in-memory store and a throwaway storage directory
    #[arg(long)]
    dry_run: bool,

    /// Configuration file to load instead of the config/ directory
    #[arg(long, env = "APP_CONFIG")]
    config: Option<String>,
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("failed to load configuration")?;

    init_tracing(&config);
    info!("Starting PaperVault Ingestion v{}", VERSION);

    let archive = tokio::fs::read(&cli.archive)
        .await
        .with_context(|| format!("failed to read {}", cli.archive.display()))?;

    let limit = config.import.max_archive_bytes;
    if archive.len() as u64 > limit {
        anyhow::bail!("archive is {} bytes, limit is {} bytes", archive.len(), limit);
    }

    let request = ImportRequest {
        program_type_id: cli.program_type_id,
        created_by: cli.created_by,
    };

    let summary = if cli.dry_run {
        info!("Dry run: nothing will be written to the database or to paper storage");
        let storage_dir = tempfile::tempdir().context("failed to create dry-run storage")?;
        let store: Arc<dyn PaperStore> = Arc::new(MemoryStore::new());
        let importer = BulkImporter::from_config(store, &config).with_storage(DocumentStorage::new(
            storage_dir.path(),
            config.storage.public_prefix.clone(),
        ));
        importer.run(archive, request, &TracingReporter).await?
    } else {
        let db = DbPool::new(&config.database).await?;
        db.migrate().await?;
        let store: Arc<dyn PaperStore> = Arc::new(Repository::new(db));
        let importer = BulkImporter::from_config(store, &config);
        importer.run(archive, request, &TracingReporter).await?
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
