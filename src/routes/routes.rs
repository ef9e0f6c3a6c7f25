//! Defines routes for the gateway.
//!
//! ## Structure
//! - **Unauthenticated**
//!   - `GET    /health`      — liveness
//!   - `GET    /readyz`      — readiness (metadata + blob store checks)
//!   - `POST   /save`        — save a text note
//!   - `GET    /items`       — list text notes
//!
//! - **Authenticated** (identity token header required)
//!   - `POST   /upload`              — upload a file (multipart, field `file`)
//!   - `GET    /files`               — list the caller's files
//!   - `GET    /download/{file_id}`  — issue a presigned download link
//!   - `DELETE /files/{file_id}`     — delete a file
//!   - `GET    /me`                  — the verified identity
//!
//! - **Presigned**
//!   - `GET    /blobs/{*key}`  — stream a blob for a signed, unexpired link

use crate::{
    handlers::{
        blob_handlers::get_blob,
        file_handlers::{delete_file, issue_download, list_files, upload_file, whoami},
        health_handlers::{health, readyz},
        text_handlers::{list_texts, save_text},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

/// Build and return the router for all gateway routes.
///
/// The router carries shared state (`AppState`) to all handlers.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        // text notes
        .route("/save", post(save_text))
        .route("/items", get(list_texts))
        // owner-scoped files
        .route("/upload", post(upload_file))
        .route("/files", get(list_files))
        .route("/files/{file_id}", delete(delete_file))
        .route("/download/{file_id}", get(issue_download))
        .route("/me", get(whoami))
        // presigned blob downloads
        .route("/blobs/{*key}", get(get_blob))
}

/// The full application: routes, state, and middleware.
pub fn app(state: AppState) -> Router {
    let body_limit = state
        .files
        .limits()
        .max_upload_bytes
        .saturating_add(MULTIPART_OVERHEAD_BYTES);

    routes()
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
