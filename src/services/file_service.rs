//! FileService — the upload / download / list / delete lifecycle.
//!
//! A file is a metadata record plus a blob in two independent stores. Both
//! create and delete touch the blob first:
//! - upload writes the blob, then the record. A failed record write leaves an
//!   orphaned blob, which is inert: nothing lists or resolves it.
//! - delete removes the blob, then the record. A failed blob delete leaves
//!   everything intact so the caller can retry; a failed record delete leaves
//!   an orphaned record for reconciliation.
//! Orphans are logged at `warn` with the storage key so they can be swept.

use super::{bounded, ownership::authorize};
use crate::{
    errors::{GatewayError, GatewayResult},
    models::{
        identity::Identity,
        record::{FileRecord, MetadataRecord, RecordFilter},
    },
    stores::{BlobStore, MetadataStore},
};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use uuid::Uuid;

/// 40 MiB.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 40 * 1024 * 1024;

/// Validity window of issued download links.
pub const DOWNLOAD_LINK_TTL: Duration = Duration::from_secs(3600);

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";
const DEFAULT_FILENAME: &str = "upload";
const MAX_KEY_SEGMENT_LEN: usize = 200;

#[derive(Debug, Clone)]
pub struct FileLimits {
    pub max_upload_bytes: usize,
    /// Upper bound on every individual store call.
    pub store_timeout: Duration,
    pub download_ttl: Duration,
}

impl Default for FileLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            store_timeout: Duration::from_secs(5),
            download_ttl: DOWNLOAD_LINK_TTL,
        }
    }
}

/// A file as submitted by a client.
#[derive(Debug, Clone)]
pub struct NewUpload {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DownloadLink {
    pub download_url: String,
    pub filename: String,
    pub expires_in: u64,
}

/// Listing projection of a [`FileRecord`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FileSummary {
    pub file_id: Uuid,
    pub filename: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
}

impl From<FileRecord> for FileSummary {
    fn from(record: FileRecord) -> Self {
        Self {
            file_id: record.id,
            filename: record.filename,
            size: record.size_bytes,
            uploaded_at: record.created_at,
        }
    }
}

/// Reduce `raw` to a key segment of `[A-Za-z0-9._@-]`.
fn key_segment(raw: &str) -> String {
    let mut segment: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '@' | '-') {
                c
            } else {
                '_'
            }
        })
        .take(MAX_KEY_SEGMENT_LEN)
        .collect();
    if segment.is_empty() || segment.chars().all(|c| c == '.') || segment.contains("..") {
        segment = segment.replace('.', "_");
        if segment.is_empty() {
            segment.push('_');
        }
    }
    segment
}

/// `uploads/{owner}/{file id}/{filename}` with both free-form parts sanitized.
///
/// The file id alone makes the key unique; the owner prefix keeps each
/// user's blobs together.
pub fn storage_key(owner: &str, file_id: Uuid, filename: &str) -> String {
    format!(
        "uploads/{}/{}/{}",
        key_segment(owner),
        file_id,
        key_segment(filename)
    )
}

#[derive(Clone)]
pub struct FileService {
    metadata: Arc<dyn MetadataStore>,
    blobs: Arc<dyn BlobStore>,
    limits: FileLimits,
}

impl FileService {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        blobs: Arc<dyn BlobStore>,
        limits: FileLimits,
    ) -> Self {
        Self {
            metadata,
            blobs,
            limits,
        }
    }

    pub fn limits(&self) -> &FileLimits {
        &self.limits
    }

    /// Load a file record; records of other kinds count as absent.
    async fn load(&self, file_id: Uuid) -> GatewayResult<Option<FileRecord>> {
        let record = bounded(
            self.limits.store_timeout,
            "metadata.get",
            self.metadata.get(file_id),
        )
        .await?;
        Ok(record.and_then(MetadataRecord::into_file))
    }

    /// Store a new file owned by `identity`.
    pub async fn upload(&self, identity: &Identity, upload: NewUpload) -> GatewayResult<FileRecord> {
        if upload.bytes.len() > self.limits.max_upload_bytes {
            return Err(GatewayError::PayloadTooLarge {
                limit: self.limits.max_upload_bytes,
            });
        }

        let filename = match upload.filename.trim() {
            "" => DEFAULT_FILENAME.to_string(),
            name => name.to_string(),
        };
        let content_type = upload
            .content_type
            .filter(|ct| !ct.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());
        let file_id = Uuid::new_v4();
        let key = storage_key(identity.as_str(), file_id, &filename);
        let size_bytes = upload.bytes.len();

        bounded(
            self.limits.store_timeout,
            "blob.put",
            self.blobs.put(&key, upload.bytes, &content_type),
        )
        .await?;

        let record = FileRecord {
            id: file_id,
            owner_id: identity.sub.clone(),
            filename,
            size_bytes: i64::try_from(size_bytes).unwrap_or(i64::MAX),
            storage_key: key,
            content_type,
            created_at: Utc::now(),
        };

        let stored = bounded(
            self.limits.store_timeout,
            "metadata.put",
            self.metadata.put(&MetadataRecord::File(record.clone())),
        )
        .await;
        if let Err(err) = stored {
            warn!(
                orphan = "blob",
                storage_key = %record.storage_key,
                file_id = %record.id,
                owner = %identity,
                "OrphanedBlob: blob written but its record was not"
            );
            return Err(err);
        }

        info!(file_id = %record.id, owner = %identity, size = record.size_bytes, "file uploaded");
        Ok(record)
    }

    /// Issue a time-bounded download link for a file the caller owns.
    pub async fn issue_download(
        &self,
        identity: &Identity,
        file_id: Uuid,
    ) -> GatewayResult<DownloadLink> {
        let record = self.load(file_id).await?;
        authorize(identity, record.as_ref())?;
        let Some(record) = record else {
            return Err(GatewayError::NotFound);
        };

        let ttl = self.limits.download_ttl;
        let download_url = bounded(
            self.limits.store_timeout,
            "blob.presign",
            self.blobs.presign_get(&record.storage_key, ttl),
        )
        .await?;

        Ok(DownloadLink {
            download_url,
            filename: record.filename,
            expires_in: ttl.as_secs(),
        })
    }

    /// Every file owned by `identity`, newest first.
    pub async fn list(&self, identity: &Identity) -> GatewayResult<Vec<FileSummary>> {
        let records = bounded(
            self.limits.store_timeout,
            "metadata.scan",
            self.metadata
                .scan(&RecordFilter::files_owned_by(identity.sub.clone())),
        )
        .await?;

        Ok(records
            .into_iter()
            .filter_map(MetadataRecord::into_file)
            .filter(|record| record.owner_id == identity.sub)
            .map(FileSummary::from)
            .collect())
    }

    /// Delete a file the caller owns: blob first, then record.
    pub async fn delete(&self, identity: &Identity, file_id: Uuid) -> GatewayResult<()> {
        let record = self.load(file_id).await?;
        authorize(identity, record.as_ref())?;
        let Some(record) = record else {
            return Err(GatewayError::NotFound);
        };

        bounded(
            self.limits.store_timeout,
            "blob.delete",
            self.blobs.delete(&record.storage_key),
        )
        .await?;

        let removed = bounded(
            self.limits.store_timeout,
            "metadata.delete",
            self.metadata.delete(record.id),
        )
        .await;
        if let Err(err) = removed {
            warn!(
                orphan = "record",
                storage_key = %record.storage_key,
                file_id = %record.id,
                owner = %identity,
                "OrphanedRecord: blob deleted but its record remains"
            );
            return Err(err);
        }

        info!(file_id = %record.id, owner = %identity, "file deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::memory::{MemoryBlobStore, MemoryMetadataStore};

    struct Harness {
        metadata: Arc<MemoryMetadataStore>,
        blobs: Arc<MemoryBlobStore>,
        service: FileService,
    }

    fn harness_with_limit(max_upload_bytes: usize) -> Harness {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let service = FileService::new(
            metadata.clone(),
            blobs.clone(),
            FileLimits {
                max_upload_bytes,
                ..FileLimits::default()
            },
        );
        Harness {
            metadata,
            blobs,
            service,
        }
    }

    fn harness() -> Harness {
        harness_with_limit(DEFAULT_MAX_UPLOAD_BYTES)
    }

    fn upload(name: &str, body: &'static [u8]) -> NewUpload {
        NewUpload {
            filename: name.into(),
            content_type: Some("text/plain".into()),
            bytes: Bytes::from_static(body),
        }
    }

    fn alice() -> Identity {
        Identity::new("alice")
    }

    fn bob() -> Identity {
        Identity::new("bob")
    }

    #[tokio::test]
    async fn upload_download_delete_round_trip() {
        let h = harness();
        let record = h.service.upload(&alice(), upload("notes.txt", b"hello")).await.unwrap();

        assert_eq!(record.owner_id, "alice");
        assert_eq!(record.size_bytes, 5);
        assert!(h.blobs.contains(&record.storage_key));

        let link = h.service.issue_download(&alice(), record.id).await.unwrap();
        assert_eq!(link.filename, "notes.txt");
        assert_eq!(link.expires_in, 3600);
        assert!(link.download_url.contains(&record.storage_key));

        h.service.delete(&alice(), record.id).await.unwrap();
        assert!(!h.blobs.contains(&record.storage_key));
        assert!(h.metadata.is_empty());

        assert_eq!(
            h.service.issue_download(&alice(), record.id).await,
            Err(GatewayError::NotFound)
        );
    }

    #[tokio::test]
    async fn second_delete_reports_already_absent() {
        let h = harness();
        let record = h.service.upload(&alice(), upload("a.txt", b"a")).await.unwrap();

        assert_eq!(h.service.delete(&alice(), record.id).await, Ok(()));
        assert_eq!(
            h.service.delete(&alice(), record.id).await,
            Err(GatewayError::NotFound)
        );
        assert!(h.blobs.is_empty());
        assert!(h.metadata.is_empty());
    }

    #[tokio::test]
    async fn other_users_cannot_download_or_delete() {
        let h = harness();
        let record = h.service.upload(&alice(), upload("a.txt", b"a")).await.unwrap();

        assert_eq!(
            h.service.issue_download(&bob(), record.id).await,
            Err(GatewayError::AccessDenied)
        );
        assert_eq!(
            h.service.delete(&bob(), record.id).await,
            Err(GatewayError::AccessDenied)
        );
        assert!(h.blobs.contains(&record.storage_key));
        assert_eq!(h.blobs.calls.deletes(), 0);
    }

    #[tokio::test]
    async fn oversized_upload_touches_no_store() {
        let h = harness_with_limit(4);
        let result = h.service.upload(&alice(), upload("big.bin", b"12345")).await;

        assert_eq!(result, Err(GatewayError::PayloadTooLarge { limit: 4 }));
        assert_eq!(h.blobs.calls.total(), 0);
        assert_eq!(h.metadata.calls.total(), 0);

        h.service.upload(&alice(), upload("fits.bin", b"1234")).await.unwrap();
    }

    #[tokio::test]
    async fn failed_blob_write_leaves_no_record() {
        let h = harness();
        h.blobs.calls.fail_puts(true);

        let result = h.service.upload(&alice(), upload("a.txt", b"a")).await;
        assert_eq!(result, Err(GatewayError::StoreUnavailable));
        assert_eq!(h.metadata.calls.total(), 0);
        assert!(h.metadata.is_empty());
    }

    #[tokio::test]
    async fn failed_record_write_orphans_the_blob_only() {
        let h = harness();
        h.metadata.calls.fail_puts(true);

        let result = h.service.upload(&alice(), upload("a.txt", b"a")).await;
        assert_eq!(result, Err(GatewayError::StoreUnavailable));
        assert_eq!(h.blobs.len(), 1);
        assert!(h.service.list(&alice()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_blob_delete_keeps_the_record_for_retry() {
        let h = harness();
        let record = h.service.upload(&alice(), upload("a.txt", b"a")).await.unwrap();

        h.blobs.calls.fail_deletes(true);
        assert_eq!(
            h.service.delete(&alice(), record.id).await,
            Err(GatewayError::StoreUnavailable)
        );
        assert_eq!(h.metadata.calls.deletes(), 0);
        assert!(h.service.issue_download(&alice(), record.id).await.is_ok());

        h.blobs.calls.fail_deletes(false);
        assert_eq!(h.service.delete(&alice(), record.id).await, Ok(()));
    }

    #[tokio::test]
    async fn failed_record_delete_is_retryable() {
        let h = harness();
        let record = h.service.upload(&alice(), upload("a.txt", b"a")).await.unwrap();

        h.metadata.calls.fail_deletes(true);
        assert_eq!(
            h.service.delete(&alice(), record.id).await,
            Err(GatewayError::StoreUnavailable)
        );
        assert!(!h.blobs.contains(&record.storage_key));

        // The blob is already gone; deleting it again counts as success.
        h.metadata.calls.fail_deletes(false);
        assert_eq!(h.service.delete(&alice(), record.id).await, Ok(()));
        assert!(h.metadata.is_empty());
    }

    #[tokio::test]
    async fn list_only_shows_own_files() {
        let h = harness();
        let mine = h.service.upload(&alice(), upload("mine.txt", b"1")).await.unwrap();
        h.service.upload(&bob(), upload("theirs.txt", b"22")).await.unwrap();

        let listed = h.service.list(&alice()).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].file_id, mine.id);
        assert_eq!(listed[0].filename, "mine.txt");
        assert_eq!(listed[0].size, 1);
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let h = harness();
        assert_eq!(
            h.service.issue_download(&alice(), Uuid::new_v4()).await,
            Err(GatewayError::NotFound)
        );
        assert_eq!(
            h.service.delete(&alice(), Uuid::new_v4()).await,
            Err(GatewayError::NotFound)
        );
    }

    #[tokio::test]
    async fn same_filename_twice_gets_distinct_keys() {
        let h = harness();
        let first = h.service.upload(&alice(), upload("same.txt", b"1")).await.unwrap();
        let second = h.service.upload(&alice(), upload("same.txt", b"2")).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_ne!(first.storage_key, second.storage_key);
        assert_eq!(h.blobs.len(), 2);
    }

    #[tokio::test]
    async fn blank_metadata_gets_defaults() {
        let h = harness();
        let record = h
            .service
            .upload(
                &alice(),
                NewUpload {
                    filename: "  ".into(),
                    content_type: Some(String::new()),
                    bytes: Bytes::from_static(b"x"),
                },
            )
            .await
            .unwrap();
        assert_eq!(record.filename, "upload");
        assert_eq!(record.content_type, "application/octet-stream");
    }

    #[test]
    fn storage_keys_are_path_safe() {
        let id = Uuid::nil();
        assert_eq!(
            storage_key("alice@example.com", id, "report 2024.pdf"),
            format!("uploads/alice@example.com/{id}/report_2024.pdf")
        );
        assert_eq!(
            storage_key("a/b", id, "../../etc/passwd"),
            format!("uploads/a_b/{id}/______etc_passwd")
        );
        assert_eq!(storage_key("x", id, ".."), format!("uploads/x/{id}/__"));
        assert!(crate::stores::ensure_key_safe(&storage_key("x", id, "..")).is_ok());
    }
}
