//! SqliteMetadataStore — durable metadata records in SQLite.

use super::{MetadataStore, StoreError, StoreResult};
use crate::models::record::{FileRecord, MetadataRecord, RecordFilter, RecordKind, TextRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Schema, embedded at compile time.
const INIT_SQL: &str = include_str!("../../migrations/0001_init.sql");

const SELECT_COLUMNS: &str = "SELECT id, kind, owner_id, filename, size_bytes, storage_key, \
     content_type, body, created_at FROM records";

/// Flat row shape shared by every record kind.
#[derive(FromRow, Debug)]
struct RecordRow {
    id: Uuid,
    kind: String,
    owner_id: Option<String>,
    filename: Option<String>,
    size_bytes: Option<i64>,
    storage_key: Option<String>,
    content_type: Option<String>,
    body: Option<String>,
    created_at: DateTime<Utc>,
}

fn missing(id: Uuid, column: &str) -> StoreError {
    StoreError::Corrupt {
        id: id.to_string(),
        reason: format!("missing `{column}`"),
    }
}

impl TryFrom<RecordRow> for MetadataRecord {
    type Error = StoreError;

    fn try_from(row: RecordRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let kind: RecordKind = row.kind.parse().map_err(|reason| StoreError::Corrupt {
            id: id.to_string(),
            reason,
        })?;
        match kind {
            RecordKind::File => Ok(MetadataRecord::File(FileRecord {
                id,
                owner_id: row.owner_id.ok_or_else(|| missing(id, "owner_id"))?,
                filename: row.filename.ok_or_else(|| missing(id, "filename"))?,
                size_bytes: row.size_bytes.ok_or_else(|| missing(id, "size_bytes"))?,
                storage_key: row.storage_key.ok_or_else(|| missing(id, "storage_key"))?,
                content_type: row
                    .content_type
                    .unwrap_or_else(|| "application/octet-stream".into()),
                created_at: row.created_at,
            })),
            RecordKind::Text => Ok(MetadataRecord::Text(TextRecord {
                id,
                text: row.body.ok_or_else(|| missing(id, "body"))?,
                created_at: row.created_at,
            })),
        }
    }
}

#[derive(Clone)]
pub struct SqliteMetadataStore {
    /// Shared SQLite connection pool.
    pub db: Arc<SqlitePool>,
}

impl SqliteMetadataStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Run the embedded schema statements. Safe to run repeatedly.
    pub async fn migrate(&self) -> StoreResult<()> {
        let statements = INIT_SQL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();

        info!("Running {} migration statements...", statements.len());

        for stmt in statements {
            debug!("Executing migration SQL: {}", stmt);
            sqlx::query(stmt).execute(&*self.db).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn put(&self, record: &MetadataRecord) -> StoreResult<()> {
        let query = sqlx::query(
            "INSERT INTO records (
                id, kind, owner_id, filename, size_bytes, storage_key,
                content_type, body, created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(record.id())
        .bind(record.kind().as_str());

        let query = match record {
            MetadataRecord::File(file) => query
                .bind(&file.owner_id)
                .bind(&file.filename)
                .bind(file.size_bytes)
                .bind(&file.storage_key)
                .bind(&file.content_type)
                .bind::<Option<String>>(None)
                .bind(file.created_at),
            MetadataRecord::Text(text) => query
                .bind::<Option<String>>(None)
                .bind::<Option<String>>(None)
                .bind::<Option<i64>>(None)
                .bind::<Option<String>>(None)
                .bind::<Option<String>>(None)
                .bind(&text.text)
                .bind(text.created_at),
        };

        query.execute(&*self.db).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<MetadataRecord>> {
        let row = sqlx::query_as::<_, RecordRow>(&format!("{SELECT_COLUMNS} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&*self.db)
            .await?;
        row.map(MetadataRecord::try_from).transpose()
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        if result.rows_affected() == 0 {
            debug!(%id, "record already absent");
        }
        Ok(())
    }

    async fn scan(&self, filter: &RecordFilter) -> StoreResult<Vec<MetadataRecord>> {
        let mut builder = QueryBuilder::<Sqlite>::new(SELECT_COLUMNS);
        builder.push(" WHERE 1 = 1");

        if let Some(kind) = filter.kind {
            builder.push(" AND kind = ");
            builder.push_bind(kind.as_str());
        }
        if let Some(owner) = &filter.owner_id {
            builder.push(" AND owner_id = ");
            builder.push_bind(owner.clone());
        }
        builder.push(" ORDER BY created_at DESC");

        let rows: Vec<RecordRow> = builder.build_query_as().fetch_all(&*self.db).await?;
        // One unreadable row must not hide every other record from the listing.
        Ok(rows
            .into_iter()
            .filter_map(|row| match MetadataRecord::try_from(row) {
                Ok(record) => Some(record),
                Err(err) => {
                    warn!(error = %err, "skipping unreadable record");
                    None
                }
            })
            .collect())
    }

    async fn ping(&self) -> StoreResult<()> {
        let value = sqlx::query_scalar::<_, i64>("SELECT 1")
            .fetch_one(&*self.db)
            .await?;
        if value != 1 {
            return Err(StoreError::Unavailable(format!(
                "unexpected result: {value}"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteMetadataStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteMetadataStore::new(Arc::new(pool));
        store.migrate().await.unwrap();
        store
    }

    fn file(owner: &str, key: &str) -> FileRecord {
        FileRecord {
            id: Uuid::new_v4(),
            owner_id: owner.into(),
            filename: "report.pdf".into(),
            size_bytes: 42,
            storage_key: key.into(),
            content_type: "application/pdf".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_is_visible_to_get_and_scan() {
        let store = store().await;
        let record = MetadataRecord::File(file("alice", "uploads/alice/1/report.pdf"));
        store.put(&record).await.unwrap();

        assert_eq!(store.get(record.id()).await.unwrap(), Some(record.clone()));
        let listed = store
            .scan(&RecordFilter::files_owned_by("alice"))
            .await
            .unwrap();
        assert_eq!(listed, vec![record]);
    }

    #[tokio::test]
    async fn scan_filters_by_owner_and_kind() {
        let store = store().await;
        store
            .put(&MetadataRecord::File(file("alice", "k/1")))
            .await
            .unwrap();
        store
            .put(&MetadataRecord::File(file("bob", "k/2")))
            .await
            .unwrap();
        store
            .put(&MetadataRecord::Text(TextRecord {
                id: Uuid::new_v4(),
                text: "note".into(),
                created_at: Utc::now(),
            }))
            .await
            .unwrap();

        let alice = store.scan(&RecordFilter::files_owned_by("alice")).await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].owner_id(), Some("alice"));

        let texts = store.scan(&RecordFilter::texts()).await.unwrap();
        assert_eq!(texts.len(), 1);
        assert_eq!(texts[0].kind(), RecordKind::Text);

        assert_eq!(store.scan(&RecordFilter::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn scan_skips_unreadable_rows() {
        let store = store().await;
        let good = MetadataRecord::File(file("alice", "k/good"));
        store.put(&good).await.unwrap();
        let broken = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO records (id, kind, owner_id, created_at) VALUES (?, 'file', 'alice', ?)",
        )
        .bind(broken)
        .bind(Utc::now())
        .execute(&*store.db)
        .await
        .unwrap();

        let listed = store
            .scan(&RecordFilter::files_owned_by("alice"))
            .await
            .unwrap();
        assert_eq!(listed, vec![good]);
        assert!(matches!(
            store.get(broken).await,
            Err(StoreError::Corrupt { .. })
        ));
    }

    #[tokio::test]
    async fn storage_keys_are_unique() {
        let store = store().await;
        store
            .put(&MetadataRecord::File(file("alice", "k/same")))
            .await
            .unwrap();
        let clash = store
            .put(&MetadataRecord::File(file("alice", "k/same")))
            .await;
        assert!(matches!(clash, Err(StoreError::Sqlx(_))));
    }

    #[tokio::test]
    async fn delete_removes_and_tolerates_absent_ids() {
        let store = store().await;
        let record = MetadataRecord::File(file("alice", "k/1"));
        store.put(&record).await.unwrap();

        store.delete(record.id()).await.unwrap();
        assert_eq!(store.get(record.id()).await.unwrap(), None);
        store.delete(record.id()).await.unwrap();
    }

    #[tokio::test]
    async fn migrate_is_repeatable_and_ping_works() {
        let store = store().await;
        store.migrate().await.unwrap();
        store.ping().await.unwrap();
    }
}
