//! Bulk archive upload
//!
//! Accepts a multipart form with:
//! - `file`: the ZIP archive
//! - `program_type_id` (optional): program type applied to every paper
//! - `stream_progress` (optional): `"true"` for a server-sent event stream
//!
//! Without streaming the handler answers once with the import summary. With
//! streaming every progress event becomes one `data:` frame and the stream
//! closes after the `complete` or fatal `error` event.

use axum::{
    body::Bytes,
    extract::{Multipart, State},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    Json,
};
use papervault_common::{
    auth::AuthContext,
    db::LookupKind,
    errors::{AppError, Result},
};
use papervault_ingestion::{
    BulkImporter, ChannelReporter, ImportRequest, ImportSummary, IngestionError, TracingReporter,
};
use tokio::task::JoinHandle;
use tokio_stream::{wrappers::ReceiverStream, Stream, StreamExt};
use tracing::{info, Instrument};

use crate::AppState;

/// Events buffered between the import task and a slow client
const EVENT_BUFFER: usize = 64;

/// Parsed upload form
#[derive(Debug, Default)]
struct UploadForm {
    file_name: Option<String>,
    archive: Option<Bytes>,
    program_type_id: Option<i32>,
    stream_progress: bool,
}

async fn read_form(mut multipart: Multipart) -> Result<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        match field.name() {
            Some("file") => {
                form.file_name = field.file_name().map(str::to_string);
                form.archive = Some(field.bytes().await.map_err(multipart_error)?);
            }
            Some("program_type_id") => {
                let text = field.text().await.map_err(multipart_error)?;
                form.program_type_id = parse_program_type(&text)?;
            }
            Some("stream_progress") => {
                let text = field.text().await.map_err(multipart_error)?;
                form.stream_progress = text.trim() == "true";
            }
            _ => {}
        }
    }

    Ok(form)
}

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    AppError::InvalidFormat {
        message: err.body_text(),
    }
}

fn parse_program_type(text: &str) -> Result<Option<i32>> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }

    text.parse().map(Some).map_err(|_| AppError::Validation {
        message: format!("Invalid program type id: {}", text),
        field: Some("program_type_id".to_string()),
    })
}

/// Check name and size of the uploaded archive
fn validate_archive(file_name: Option<&str>, size: usize, limit: u64) -> Result<()> {
    let is_zip = file_name
        .map(|name| name.to_ascii_lowercase().ends_with(".zip"))
        .unwrap_or(false);
    if !is_zip {
        return Err(AppError::Validation {
            message: "File must be a ZIP archive".to_string(),
            field: Some("file".to_string()),
        });
    }

    if size as u64 > limit {
        return Err(AppError::PayloadTooLarge {
            size: size as u64,
            limit,
        });
    }

    Ok(())
}

/// Import an uploaded archive of question papers
pub async fn bulk_upload(
    State(state): State<AppState>,
    auth: AuthContext,
    multipart: Multipart,
) -> Result<Response> {
    auth.require_admin()?;

    let form = read_form(multipart).await?;
    let archive = form.archive.ok_or_else(|| AppError::MissingField {
        field: "file".to_string(),
    })?;
    validate_archive(
        form.file_name.as_deref(),
        archive.len(),
        state.config.import.max_archive_bytes,
    )?;

    if let Some(id) = form.program_type_id {
        state
            .repo
            .find_lookup_by_id(LookupKind::ProgramType, id)
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: LookupKind::ProgramType.label().to_string(),
                id: id.to_string(),
            })?;
    }

    let request = ImportRequest {
        program_type_id: form.program_type_id,
        created_by: Some(auth.user_id),
    };

    info!(
        user_id = auth.user_id,
        file = form.file_name.as_deref().unwrap_or_default(),
        bytes = archive.len(),
        stream = form.stream_progress,
        "Bulk upload received"
    );

    if form.stream_progress {
        return Ok(stream_import(state.importer.clone(), archive, request).into_response());
    }

    let summary = spawn_import(state.importer.clone(), archive, request)
        .await
        .map_err(|e| AppError::Internal {
            message: format!("import task failed: {}", e),
        })?
        .map_err(AppError::from)?;

    Ok(Json(summary).into_response())
}

/// Run the import on its own task; it finishes even if the client goes away
fn spawn_import(
    importer: BulkImporter,
    archive: Bytes,
    request: ImportRequest,
) -> JoinHandle<std::result::Result<ImportSummary, IngestionError>> {
    tokio::spawn(
        async move { importer.run(archive, request, &TracingReporter).await }.in_current_span(),
    )
}

/// Run the import in the background and stream its events
fn stream_import(
    importer: BulkImporter,
    archive: Bytes,
    request: ImportRequest,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    let (reporter, rx) = ChannelReporter::channel(EVENT_BUFFER);

    // Failures are already delivered as the final event
    tokio::spawn(
        async move {
            let _ = importer.run(archive, request, &reporter).await;
        }
        .in_current_span(),
    );

    let events = ReceiverStream::new(rx).map(|event| Event::default().json_data(&event));
    Sse::new(events).keep_alive(KeepAlive::default())
}
