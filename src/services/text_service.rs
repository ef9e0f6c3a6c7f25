//! TextService — short text notes kept alongside file records.

use super::bounded;
use crate::{
    errors::{GatewayError, GatewayResult},
    models::record::{MetadataRecord, RecordFilter, TextRecord},
    stores::MetadataStore,
};
use chrono::Utc;
use std::{sync::Arc, time::Duration};
use tracing::info;
use uuid::Uuid;

#[derive(Clone)]
pub struct TextService {
    metadata: Arc<dyn MetadataStore>,
    store_timeout: Duration,
}

impl TextService {
    pub fn new(metadata: Arc<dyn MetadataStore>, store_timeout: Duration) -> Self {
        Self {
            metadata,
            store_timeout,
        }
    }

    pub async fn save(&self, text: String) -> GatewayResult<TextRecord> {
        if text.trim().is_empty() {
            return Err(GatewayError::bad_request("text must not be empty"));
        }
        let record = TextRecord {
            id: Uuid::new_v4(),
            text,
            created_at: Utc::now(),
        };
        bounded(
            self.store_timeout,
            "metadata.put",
            self.metadata.put(&MetadataRecord::Text(record.clone())),
        )
        .await?;
        info!(id = %record.id, "text saved");
        Ok(record)
    }

    /// All saved notes, newest first.
    pub async fn list(&self) -> GatewayResult<Vec<TextRecord>> {
        let records = bounded(
            self.store_timeout,
            "metadata.scan",
            self.metadata.scan(&RecordFilter::texts()),
        )
        .await?;
        Ok(records
            .into_iter()
            .filter_map(MetadataRecord::into_text)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::identity::Identity,
        services::file_service::{FileLimits, FileService, NewUpload},
        stores::memory::{MemoryBlobStore, MemoryMetadataStore},
    };
    use bytes::Bytes;

    #[tokio::test]
    async fn saved_texts_are_listed() {
        let service = TextService::new(Arc::new(MemoryMetadataStore::new()), Duration::from_secs(1));
        let saved = service.save("hello".into()).await.unwrap();

        let listed = service.list().await.unwrap();
        assert_eq!(listed, vec![saved]);
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_storing() {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let service = TextService::new(metadata.clone(), Duration::from_secs(1));

        assert!(matches!(
            service.save("   ".into()).await,
            Err(GatewayError::BadRequest(_))
        ));
        assert_eq!(metadata.calls.total(), 0);
    }

    #[tokio::test]
    async fn texts_and_files_do_not_leak_into_each_other() {
        let metadata = Arc::new(MemoryMetadataStore::new());
        let texts = TextService::new(metadata.clone(), Duration::from_secs(1));
        let files = FileService::new(
            metadata.clone(),
            Arc::new(MemoryBlobStore::new()),
            FileLimits::default(),
        );
        let alice = Identity::new("alice");

        let note = texts.save("note".into()).await.unwrap();
        files
            .upload(
                &alice,
                NewUpload {
                    filename: "a.txt".into(),
                    content_type: None,
                    bytes: Bytes::from_static(b"a"),
                },
            )
            .await
            .unwrap();

        assert_eq!(texts.list().await.unwrap().len(), 1);
        assert_eq!(files.list(&alice).await.unwrap().len(), 1);
        assert_eq!(
            files.issue_download(&alice, note.id).await,
            Err(GatewayError::NotFound)
        );
    }
}
