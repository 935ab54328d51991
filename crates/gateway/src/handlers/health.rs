//! Health check handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: CheckResult,
    pub storage: CheckResult,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    fn up(latency_ms: u64) -> Self {
        Self {
            status: "up".to_string(),
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    fn down(error: impl ToString) -> Self {
        Self {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(error.to_string()),
        }
    }

    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

/// Liveness check, healthy whenever the server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: papervault_common::VERSION,
    })
}

/// Readiness check over the database and the paper storage directory
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    let start = std::time::Instant::now();

    let db_check = match state.repo.ping().await {
        Ok(_) => CheckResult::up(start.elapsed().as_millis() as u64),
        Err(e) => CheckResult::down(e),
    };

    let start = std::time::Instant::now();
    let root = state.importer.storage().root();
    let storage_check = match tokio::fs::metadata(root).await {
        Ok(meta) if meta.is_dir() => CheckResult::up(start.elapsed().as_millis() as u64),
        Ok(_) => CheckResult::down(format!("{} is not a directory", root.display())),
        Err(e) => CheckResult::down(e),
    };

    let all_healthy = db_check.is_up() && storage_check.is_up();
    let status = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ReadyResponse {
            status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
            checks: HealthChecks {
                database: db_check,
                storage: storage_check,
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_version() {
        let Json(body) = health().await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.version, papervault_common::VERSION);
    }

    #[test]
    fn test_check_result_serialization() {
        let value = serde_json::to_value(CheckResult::down("connection refused")).unwrap();
        assert_eq!(value, serde_json::json!({ "status": "down", "error": "connection refused" }));
        assert!(CheckResult::up(3).is_up());
    }
}
