use chrono::{DateTime, Utc};
use content_store_core::document::DocumentVersion;
use content_store_core::storage::{CollectionRecord, StatusCount, StorageError};
use content_store_core::transform::FieldValueRow;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

/// A row of the `collections` table.
#[derive(FromRow, Debug, Clone)]
pub struct CollectionRow {
    pub id: Uuid,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

impl From<CollectionRow> for CollectionRecord {
    fn from(row: CollectionRow) -> Self {
        CollectionRecord {
            id: row.id,
            path: row.path,
            created_at: row.created_at,
        }
    }
}

/// Version metadata as stored in `document_versions`.
#[derive(FromRow, Debug, Clone)]
pub struct VersionRow {
    pub version_id: Uuid,
    pub document_id: Uuid,
    pub collection_id: Uuid,
    pub status: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete flag. Deleted versions are skipped by every "current" query.
    pub is_deleted: bool,
}

impl From<VersionRow> for DocumentVersion {
    fn from(row: VersionRow) -> Self {
        DocumentVersion {
            version_id: row.version_id,
            document_id: row.document_id,
            collection_id: row.collection_id,
            status: row.status,
            path: row.path,
            created_at: row.created_at,
            updated_at: row.updated_at,
            is_deleted: row.is_deleted,
        }
    }
}

/// One flattened value from `field_values`.
#[derive(FromRow, Debug, Clone)]
pub struct FieldValueRecord {
    pub version_id: Uuid,
    /// Textual field address, e.g. `content[2].caption`.
    pub field_address: String,
    pub locale: String,
    pub value: Value,
}

impl TryFrom<FieldValueRecord> for FieldValueRow {
    type Error = StorageError;

    fn try_from(record: FieldValueRecord) -> Result<Self, Self::Error> {
        let address = record
            .field_address
            .parse()
            .map_err(StorageError::backend)?;
        let mut row = FieldValueRow::new(address, record.locale, record.value);
        row.version_id = Some(record.version_id);
        Ok(row)
    }
}

#[derive(FromRow, Debug, Clone)]
pub struct StatusCountRow {
    pub status: String,
    pub count: i64,
}

impl From<StatusCountRow> for StatusCount {
    fn from(row: StatusCountRow) -> Self {
        StatusCount {
            status: row.status,
            count: u64::try_from(row.count).unwrap_or(0),
        }
    }
}
