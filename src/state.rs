//! Shared handler state.

use crate::{
    auth::verifier::TokenVerifier,
    services::{file_service::FileService, text_service::TextService},
    stores::{MetadataStore, local::LocalBlobStore},
};
use axum::http::HeaderName;
use std::sync::Arc;

/// Everything a handler can reach. Cheap to clone; all members are shared.
#[derive(Clone)]
pub struct AppState {
    pub verifier: Arc<TokenVerifier>,
    pub files: FileService,
    pub texts: TextService,
    /// Held directly for readiness checks.
    pub metadata: Arc<dyn MetadataStore>,
    /// Concrete blob store, used to serve presigned downloads.
    pub blobs: Arc<LocalBlobStore>,
    /// Header carrying the identity token.
    pub token_header: HeaderName,
}
