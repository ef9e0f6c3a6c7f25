//! Owner-scoped file and text gateway.
//!
//! Requests carry an identity token signed by the fronting load balancer.
//! [`auth`] verifies it into an [`models::identity::Identity`];
//! [`services::file_service`] then runs the two-store upload / download /
//! list / delete lifecycle with every file scoped to its owner.

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
pub mod stores;

use anyhow::{Context, Result};
use auth::{
    key_cache::{HttpKeyFetcher, KeyCache},
    verifier::{TokenVerifier, VerifierConfig},
};
use axum::http::HeaderName;
use config::AppConfig;
use services::{
    file_service::{DOWNLOAD_LINK_TTL, FileLimits, FileService},
    text_service::TextService,
};
use sqlx::SqlitePool;
use state::AppState;
use std::sync::Arc;
use stores::{MetadataStore, local::LocalBlobStore, presign::UrlSigner, sqlite::SqliteMetadataStore};
use uuid::Uuid;

/// Presign secret from config, or a random per-process one.
fn presign_secret(cfg: &AppConfig) -> Vec<u8> {
    match &cfg.presign_secret {
        Some(secret) => secret.as_bytes().to_vec(),
        None => {
            tracing::warn!(
                "GATEWAY_PRESIGN_SECRET not set; download links will not survive a restart \
                 or work across replicas"
            );
            [Uuid::new_v4().into_bytes(), Uuid::new_v4().into_bytes()].concat()
        }
    }
}

/// Wire the stores, key cache, verifier and services together.
pub fn build_state(cfg: &AppConfig, db: Arc<SqlitePool>) -> Result<AppState> {
    let timeout = cfg.upstream_timeout();

    let fetcher = HttpKeyFetcher::new(cfg.key_endpoint.clone(), timeout)
        .context("building key fetch client")?;
    let keys = Arc::new(KeyCache::new(
        Arc::new(fetcher),
        cfg.key_cache_capacity,
        timeout,
    ));
    let verifier = Arc::new(TokenVerifier::new(
        keys,
        VerifierConfig {
            region: cfg.region.clone(),
            expected_signer: cfg.expected_signer.clone(),
            leeway_secs: cfg.token_leeway_secs,
        },
    ));

    let metadata: Arc<dyn MetadataStore> = Arc::new(SqliteMetadataStore::new(db));
    let signer = UrlSigner::new(presign_secret(cfg), cfg.public_url.clone());
    let blobs = Arc::new(LocalBlobStore::new(&cfg.storage_dir, signer));

    let files = FileService::new(
        metadata.clone(),
        blobs.clone(),
        FileLimits {
            max_upload_bytes: cfg.max_upload_bytes,
            store_timeout: timeout,
            download_ttl: DOWNLOAD_LINK_TTL,
        },
    );
    let texts = TextService::new(metadata.clone(), timeout);
    let token_header = HeaderName::from_bytes(cfg.token_header.as_bytes())
        .with_context(|| format!("invalid token header name `{}`", cfg.token_header))?;

    Ok(AppState {
        verifier,
        files,
        texts,
        metadata,
        blobs,
        token_header,
    })
}
