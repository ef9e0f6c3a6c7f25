//! Health & readiness handlers.
//!
//! - GET /health  -> simple liveness (`{"status":"healthy"}`)
//! - GET /readyz  -> readiness that checks the metadata and blob stores

use crate::{
    state::AppState,
    stores::{BlobStore, StoreResult},
};
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use std::{collections::HashMap, time::Duration};

const READY_CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// `GET /health`
///
/// Liveness probe. Cheap and never performs I/O.
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy".into(),
        }),
    )
}

async fn check<F>(probe: F) -> CheckStatus
where
    F: std::future::Future<Output = StoreResult<()>>,
{
    match tokio::time::timeout(READY_CHECK_TIMEOUT, probe).await {
        Ok(Ok(())) => CheckStatus {
            ok: true,
            error: None,
        },
        Ok(Err(e)) => CheckStatus {
            ok: false,
            error: Some(format!("error: {}", e)),
        },
        Err(_) => CheckStatus {
            ok: false,
            error: Some("timed out".into()),
        },
    }
}

/// `GET /readyz`
///
/// Pings the metadata store and performs a write/read/delete against the
/// blob directory. HTTP 200 when all checks pass, HTTP 503 otherwise.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let (metadata, blobs) = tokio::join!(
        check(state.metadata.ping()),
        check(state.blobs.ping()),
    );
    let overall_ok = metadata.ok && blobs.ok;

    let mut checks = HashMap::new();
    checks.insert("metadata", metadata);
    checks.insert("blobs", blobs);

    let body = ReadyResponse {
        status: if overall_ok { "ok".into() } else { "error".into() },
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
