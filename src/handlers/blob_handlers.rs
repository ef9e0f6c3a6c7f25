//! Serves presigned blob downloads.
//!
//! The link itself is the capability: no identity token is checked here, only
//! the link's signature and expiry.

use crate::{
    errors::GatewayError,
    state::AppState,
    stores::{StoreError, presign::LinkError},
};
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use chrono::Utc;
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct LinkQuery {
    pub expires: Option<i64>,
    pub signature: Option<String>,
}

/// `GET /blobs/{*key}?expires=..&signature=..` — stream the blob.
pub async fn get_blob(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(q): Query<LinkQuery>,
) -> Result<Response, GatewayError> {
    let (Some(expires), Some(signature)) = (q.expires, q.signature.as_deref()) else {
        return Err(GatewayError::LinkInvalid);
    };
    state
        .blobs
        .signer()
        .verify(&key, expires, signature, Utc::now().timestamp())
        .map_err(|err| match err {
            LinkError::Expired => GatewayError::LinkExpired,
            LinkError::Invalid => GatewayError::LinkInvalid,
        })?;

    let blob = match state.blobs.open(&key).await {
        Ok(Some(blob)) => blob,
        Ok(None) => return Err(GatewayError::NotFound),
        Err(StoreError::InvalidKey(_)) => return Err(GatewayError::NotFound),
        Err(err) => {
            warn!(key, error = %err, "failed to open blob");
            return Err(GatewayError::StoreUnavailable);
        }
    };

    let filename = key.rsplit('/').next().unwrap_or(&key);
    let mut response = Response::new(Body::from_stream(ReaderStream::new(blob.file)));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&blob.content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream")),
    );
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(blob.size_bytes));
    if let Ok(value) = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename)) {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("private, no-store"),
    );
    Ok(response)
}
