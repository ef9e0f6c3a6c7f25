//! Collaborator contracts for the two stores a file lives in.
//!
//! A file is a [`MetadataStore`] record plus a [`BlobStore`] payload. The
//! stores are independent and share no transaction; ordering between them is
//! the file service's job.

use crate::models::record::{MetadataRecord, RecordFilter};
use async_trait::async_trait;
use bytes::Bytes;
use std::{io, time::Duration};
use thiserror::Error;
use uuid::Uuid;

pub mod local;
pub mod memory;
pub mod presign;
pub mod sqlite;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid storage key `{0}`")]
    InvalidKey(String),
    #[error("record `{id}` is malformed: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Record persistence with read-your-writes visibility inside one process.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a record. Ids and storage keys are unique; a clash is an error.
    async fn put(&self, record: &MetadataRecord) -> StoreResult<()>;

    /// Fetch a record by id. `Ok(None)` when absent.
    async fn get(&self, id: Uuid) -> StoreResult<Option<MetadataRecord>>;

    /// Remove a record. Removing an absent id is not an error.
    async fn delete(&self, id: Uuid) -> StoreResult<()>;

    /// Every record matching `filter`, newest first.
    async fn scan(&self, filter: &RecordFilter) -> StoreResult<Vec<MetadataRecord>>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> StoreResult<()>;
}

/// Opaque payload storage addressed by storage key.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key`, replacing anything already there.
    async fn put(&self, key: &str, bytes: Bytes, content_type: &str) -> StoreResult<()>;

    /// Remove the payload under `key`.
    ///
    /// Returns `Ok(())` even if nothing was stored there (idempotent).
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Issue a capability URL granting read access to `key` for `ttl`.
    async fn presign_get(&self, key: &str, ttl: Duration) -> StoreResult<String>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> StoreResult<()>;
}

const MAX_STORAGE_KEY_LEN: usize = 1024;

/// Basic key validation to avoid trivial path traversal vectors.
///
/// Rejects empty or oversized keys, absolute keys, `..` and control bytes.
pub fn ensure_key_safe(key: &str) -> StoreResult<()> {
    let invalid = key.is_empty()
        || key.len() > MAX_STORAGE_KEY_LEN
        || key.starts_with('/')
        || key.contains("..")
        || key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0');
    if invalid {
        return Err(StoreError::InvalidKey(key.to_string()));
    }
    Ok(())
}
