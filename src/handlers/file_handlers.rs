//! HTTP handlers for owner-scoped file operations.
//!
//! Every handler takes an [`AuthenticatedUser`], so a request without a valid
//! identity token is rejected before it reaches a store.

use crate::{
    auth::extractor::AuthenticatedUser,
    errors::GatewayError,
    models::identity::Identity,
    services::file_service::{DownloadLink, FileSummary, NewUpload},
    state::AppState,
};
use axum::{
    Json,
    extract::{
        Multipart, Path, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use bytes::BytesMut;
use serde::Serialize;
use uuid::Uuid;

/// Multipart field carrying the file.
const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct UploadResp {
    pub file_id: Uuid,
    pub filename: String,
    pub size: i64,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FileList {
    pub files: Vec<FileSummary>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResp {
    pub message: &'static str,
    pub file_id: Uuid,
}

fn multipart_error(err: MultipartError, limit: usize) -> GatewayError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        GatewayError::PayloadTooLarge { limit }
    } else {
        GatewayError::bad_request(err.body_text())
    }
}

/// Read a field into memory, giving up as soon as it exceeds `limit`.
async fn read_capped(mut field: Field<'_>, limit: usize) -> Result<bytes::Bytes, GatewayError> {
    let mut buf = BytesMut::new();
    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if buf.len() + chunk.len() > limit {
            return Err(GatewayError::PayloadTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Unknown or malformed ids are indistinguishable from deleted ones.
fn parse_file_id(raw: &str) -> Result<Uuid, GatewayError> {
    Uuid::parse_str(raw).map_err(|_| GatewayError::NotFound)
}

/// `POST /upload` — multipart form with a `file` field.
pub async fn upload_file(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<UploadResp>, GatewayError> {
    let mut multipart = multipart.map_err(|e| GatewayError::bad_request(e.body_text()))?;
    let limit = state.files.limits().max_upload_bytes;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, limit))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = read_capped(field, limit).await?;
        upload = Some(NewUpload {
            filename,
            content_type,
            bytes,
        });
        break;
    }

    let upload =
        upload.ok_or_else(|| GatewayError::bad_request("missing multipart field `file`"))?;
    let record = state.files.upload(&identity, upload).await?;

    Ok(Json(UploadResp {
        file_id: record.id,
        filename: record.filename,
        size: record.size_bytes,
        message: "File uploaded successfully",
    }))
}

/// `GET /files` — the caller's files.
pub async fn list_files(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
) -> Result<Json<FileList>, GatewayError> {
    let files = state.files.list(&identity).await?;
    Ok(Json(FileList { files }))
}

/// `GET /download/{file_id}` — a time-bounded download link.
pub async fn issue_download(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(file_id): Path<String>,
) -> Result<Json<DownloadLink>, GatewayError> {
    let file_id = parse_file_id(&file_id)?;
    let link = state.files.issue_download(&identity, file_id).await?;
    Ok(Json(link))
}

/// `DELETE /files/{file_id}`
pub async fn delete_file(
    State(state): State<AppState>,
    AuthenticatedUser(identity): AuthenticatedUser,
    Path(file_id): Path<String>,
) -> Result<Json<DeleteResp>, GatewayError> {
    let file_id = parse_file_id(&file_id)?;
    state.files.delete(&identity, file_id).await?;
    Ok(Json(DeleteResp {
        message: "File deleted successfully",
        file_id,
    }))
}

/// `GET /me` — who the token says the caller is.
pub async fn whoami(AuthenticatedUser(identity): AuthenticatedUser) -> Json<Identity> {
    Json(identity)
}
