//! Health & readiness handlers.
//!
//! - GET /healthz  -> simple liveness ("ok")
//! - GET /readyz   -> readiness that checks the registry and the blob backend

use crate::services::entity_service::EntityService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::collections::HashMap;

/// `GET /healthz`
///
/// Liveness check. Always 200 and never touches I/O.
pub async fn healthz() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /readyz`
///
/// Readiness check that concurrently:
/// 1. Runs `SELECT 1` against the SQLite registry.
/// 2. Asks the configured blob backend for a cheap round trip.
///
/// HTTP 200 when all checks pass, HTTP 503 otherwise.
pub async fn readyz(State(service): State<EntityService>) -> impl IntoResponse {
    let (sqlite, storage) = futures::join!(service.registry().ping(), service.blobs().check_ready());

    let sqlite_check = match sqlite {
        Ok(()) => CheckStatus::ok(),
        Err(e) => CheckStatus::failed(format!("error: {}", e)),
    };

    let storage_check = match storage {
        Ok(()) => CheckStatus::ok(),
        Err(e) => CheckStatus::failed(format!(
            "{:?} backend: {}",
            service.blobs().backend_kind(),
            e
        )),
    };

    let overall_ok = sqlite_check.ok && storage_check.ok;
    if !overall_ok {
        tracing::warn!(
            sqlite = ?sqlite_check.error,
            storage = ?storage_check.error,
            "readiness check failed"
        );
    }

    let mut checks = HashMap::new();
    checks.insert("sqlite", sqlite_check);
    checks.insert("storage", storage_check);

    let body = ReadyResponse {
        status: if overall_ok {
            "ok".into()
        } else {
            "error".into()
        },
        checks,
    };

    let status = if overall_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: String,
    checks: HashMap<&'static str, CheckStatus>,
}

#[derive(Serialize)]
struct CheckStatus {
    ok: bool,
    error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    fn failed(error: String) -> Self {
        Self {
            ok: false,
            error: Some(error),
        }
    }
}
