//! Question paper handlers

use axum::{
    body::Body,
    extract::{Path, Query, Request, State},
    http::{header, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use papervault_common::{
    auth::AuthContext,
    db::{PaperFilter, PaperListing},
    errors::{AppError, Result},
    PDF_MIME_TYPE,
};
use std::io::ErrorKind;
use std::path::Path as FsPath;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{info, warn};

use crate::AppState;

/// Listings returned when the caller sets no limit
const DEFAULT_LIST_LIMIT: u64 = 500;

/// Search papers
pub async fn list_papers(
    State(state): State<AppState>,
    Query(mut filter): Query<PaperFilter>,
) -> Result<Json<Vec<PaperListing>>> {
    filter.limit = Some(filter.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(DEFAULT_LIST_LIMIT));
    let papers = state.repo.list_papers(&filter).await?;
    Ok(Json(papers))
}

/// Get paper by ID
pub async fn get_paper(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<PaperListing>> {
    let paper = state
        .repo
        .find_listing_by_id(id)
        .await?
        .ok_or(AppError::PaperNotFound { id })?;

    Ok(Json(paper))
}

/// Delete a paper and its stored document
pub async fn delete_paper(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i32>,
) -> Result<StatusCode> {
    auth.require_admin()?;

    let paper = state
        .repo
        .find_paper_by_id(id)
        .await?
        .ok_or(AppError::PaperNotFound { id })?;

    if !state.repo.delete_paper(id).await? {
        return Err(AppError::PaperNotFound { id });
    }

    if let Err(e) = state.importer.storage().delete_url(&paper.file_url).await {
        warn!(paper_id = id, url = %paper.file_url, error = %e, "Failed to remove paper file");
    }

    info!(paper_id = id, user_id = auth.user_id, "Paper deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Download the stored document as an attachment
pub async fn download_paper(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    request: Request,
) -> Result<Response> {
    let paper = state
        .repo
        .find_paper_by_id(id)
        .await?
        .ok_or(AppError::PaperNotFound { id })?;

    let file_missing = || AppError::NotFound {
        resource_type: "paper file".to_string(),
        id: id.to_string(),
    };

    let path = state
        .importer
        .storage()
        .resolve_url(&paper.file_url)
        .ok_or_else(file_missing)?;

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => return Err(file_missing()),
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(file_missing()),
        Err(e) => {
            return Err(AppError::Storage {
                message: format!("failed to read {}: {}", path.display(), e),
            })
        }
    }

    let filename = paper
        .original_filename
        .as_deref()
        .or_else(|| FsPath::new(&paper.file_url).file_name().and_then(|n| n.to_str()))
        .unwrap_or("paper.pdf");

    Ok(serve_attachment(&path, &paper.file_type, filename, request).await)
}

/// Stream a file from disk with download headers; range and conditional
/// requests are answered by `ServeFile`
async fn serve_attachment(
    path: &FsPath,
    content_type: &str,
    filename: &str,
    request: Request,
) -> Response {
    let response = ServeFile::new(path)
        .oneshot(request)
        .await
        .unwrap_or_else(|never| match never {});

    let (mut parts, body) = response.into_parts();
    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or_else(|_| HeaderValue::from_static(PDF_MIME_TYPE));
    parts.headers.insert(header::CONTENT_TYPE, content_type);
    parts
        .headers
        .insert(header::CONTENT_DISPOSITION, attachment_header(filename));

    Response::from_parts(parts, Body::new(body))
}

/// `Content-Disposition` value for `filename`, restricted to visible ASCII
fn attachment_header(filename: &str) -> HeaderValue {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();

    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", safe))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attachment_header_escapes_filename() {
        assert_eq!(
            attachment_header("133750_1762152327189.pdf"),
            "attachment; filename=\"133750_1762152327189.pdf\""
        );
        assert_eq!(
            attachment_header("bad\"name\u{e9}.pdf"),
            "attachment; filename=\"bad_name_.pdf\""
        );
    }

    #[tokio::test]
    async fn test_serve_attachment_streams_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1762152327189-133750_a.pdf");
        std::fs::write(&path, b"%PDF-1.4 body").unwrap();

        let request = Request::builder().uri("/api/download/1").body(Body::empty()).unwrap();
        let response = serve_attachment(&path, PDF_MIME_TYPE, "133750_a.pdf", request).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], PDF_MIME_TYPE);
        assert_eq!(
            response.headers()[header::CONTENT_DISPOSITION],
            "attachment; filename=\"133750_a.pdf\""
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"%PDF-1.4 body");
    }

    #[test]
    fn test_filter_from_query() {
        let filter: PaperFilter =
            serde_json::from_value(serde_json::json!({ "subject": "tax", "year": 2025 })).unwrap();
        assert_eq!(filter.subject.as_deref(), Some("tax"));
        assert_eq!(filter.year, Some(2025));
        assert!(filter.limit.is_none());
    }
}
