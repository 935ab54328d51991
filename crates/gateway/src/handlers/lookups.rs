//! Department, subject type and program type handlers
//!
//! Creation is idempotent by name: posting an existing name returns the
//! existing row with `200 OK` instead of `201 Created`.

use axum::{extract::State, http::StatusCode, Json};
use papervault_common::{
    auth::AuthContext,
    db::{Lookup, LookupKind},
    errors::{AppError, Result},
};
use serde::Deserialize;
use tracing::info;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateLookupRequest {
    pub name: String,
}

fn required_name(request: &CreateLookupRequest, kind: LookupKind) -> Result<&str> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation {
            message: format!("{} name is required", kind.label()),
            field: Some("name".to_string()),
        });
    }
    Ok(name)
}

async fn list(state: &AppState, kind: LookupKind) -> Result<Json<Vec<Lookup>>> {
    Ok(Json(state.repo.list_lookups(kind).await?))
}

async fn create(
    state: &AppState,
    kind: LookupKind,
    request: &CreateLookupRequest,
) -> Result<(StatusCode, Json<Lookup>)> {
    let name = required_name(request, kind)?;
    let (row, created) = state.repo.get_or_create_lookup(kind, name).await?;

    if created {
        info!(kind = kind.label(), id = row.id, name = %row.name, "Lookup created");
        Ok((StatusCode::CREATED, Json(row)))
    } else {
        Ok((StatusCode::OK, Json(row)))
    }
}

pub async fn list_departments(State(state): State<AppState>) -> Result<Json<Vec<Lookup>>> {
    list(&state, LookupKind::Department).await
}

pub async fn create_department(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(request): Json<CreateLookupRequest>,
) -> Result<(StatusCode, Json<Lookup>)> {
    create(&state, LookupKind::Department, &request).await
}

pub async fn list_subject_types(State(state): State<AppState>) -> Result<Json<Vec<Lookup>>> {
    list(&state, LookupKind::SubjectType).await
}

pub async fn create_subject_type(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(request): Json<CreateLookupRequest>,
) -> Result<(StatusCode, Json<Lookup>)> {
    create(&state, LookupKind::SubjectType, &request).await
}

pub async fn list_program_types(State(state): State<AppState>) -> Result<Json<Vec<Lookup>>> {
    list(&state, LookupKind::ProgramType).await
}

pub async fn create_program_type(
    State(state): State<AppState>,
    _auth: AuthContext,
    Json(request): Json<CreateLookupRequest>,
) -> Result<(StatusCode, Json<Lookup>)> {
    create(&state, LookupKind::ProgramType, &request).await
}
