//! Records kept in the metadata store.
//!
//! Files and saved text notes share one store; the [`RecordKind`]
//! discriminator keeps them apart so listing files never surfaces notes and
//! the other way around.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Discriminator column shared by every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    File,
    Text,
}

impl RecordKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordKind::File => "file",
            RecordKind::Text => "text",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(RecordKind::File),
            "text" => Ok(RecordKind::Text),
            other => Err(format!("unknown record kind `{other}`")),
        }
    }
}

/// Metadata for one uploaded file.
///
/// The payload itself lives in the blob store under `storage_key`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    /// Unique file id handed out to the owner.
    pub id: Uuid,

    /// Subject of the uploader. Never changes after creation.
    pub owner_id: String,

    /// Original filename as supplied by the client.
    pub filename: String,

    /// Size in bytes.
    pub size_bytes: i64,

    /// Opaque key into the blob store, unique per record.
    pub storage_key: String,

    /// Content type (MIME type).
    pub content_type: String,

    /// When the upload completed.
    pub created_at: DateTime<Utc>,
}

/// A saved text note.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TextRecord {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Any record the metadata store can hold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MetadataRecord {
    File(FileRecord),
    Text(TextRecord),
}

impl MetadataRecord {
    pub fn id(&self) -> Uuid {
        match self {
            MetadataRecord::File(file) => file.id,
            MetadataRecord::Text(text) => text.id,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            MetadataRecord::File(_) => RecordKind::File,
            MetadataRecord::Text(_) => RecordKind::Text,
        }
    }

    pub fn owner_id(&self) -> Option<&str> {
        match self {
            MetadataRecord::File(file) => Some(&file.owner_id),
            MetadataRecord::Text(_) => None,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            MetadataRecord::File(file) => file.created_at,
            MetadataRecord::Text(text) => text.created_at,
        }
    }

    pub fn into_file(self) -> Option<FileRecord> {
        match self {
            MetadataRecord::File(file) => Some(file),
            MetadataRecord::Text(_) => None,
        }
    }

    pub fn into_text(self) -> Option<TextRecord> {
        match self {
            MetadataRecord::Text(text) => Some(text),
            MetadataRecord::File(_) => None,
        }
    }
}

/// Predicate for [`crate::stores::MetadataStore::scan`].
///
/// Expressed as data rather than a closure so SQL-backed stores can push it
/// down into the query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub kind: Option<RecordKind>,
    pub owner_id: Option<String>,
}

impl RecordFilter {
    /// Every file owned by `owner`.
    pub fn files_owned_by(owner: impl Into<String>) -> Self {
        Self {
            kind: Some(RecordKind::File),
            owner_id: Some(owner.into()),
        }
    }

    /// Every text note.
    pub fn texts() -> Self {
        Self {
            kind: Some(RecordKind::Text),
            owner_id: None,
        }
    }

    pub fn matches(&self, record: &MetadataRecord) -> bool {
        if let Some(kind) = self.kind {
            if record.kind() != kind {
                return false;
            }
        }
        if let Some(owner) = &self.owner_id {
            if record.owner_id() != Some(owner.as_str()) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(owner: &str) -> MetadataRecord {
        MetadataRecord::File(FileRecord {
            id: Uuid::new_v4(),
            owner_id: owner.into(),
            filename: "a.txt".into(),
            size_bytes: 1,
            storage_key: format!("uploads/{owner}/a.txt"),
            content_type: "text/plain".into(),
            created_at: Utc::now(),
        })
    }

    #[test]
    fn filter_scopes_by_kind_and_owner() {
        let note = MetadataRecord::Text(TextRecord {
            id: Uuid::new_v4(),
            text: "hello".into(),
            created_at: Utc::now(),
        });
        let filter = RecordFilter::files_owned_by("alice");

        assert!(filter.matches(&file("alice")));
        assert!(!filter.matches(&file("bob")));
        assert!(!filter.matches(&note));
        assert!(RecordFilter::texts().matches(&note));
        assert!(RecordFilter::default().matches(&file("bob")));
    }

    #[test]
    fn kind_round_trips_through_its_column_value() {
        for kind in [RecordKind::File, RecordKind::Text] {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
        assert!("folder".parse::<RecordKind>().is_err());
    }
}
