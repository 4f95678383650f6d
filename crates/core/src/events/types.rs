use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What happened to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentChange {
    Created,
    Updated,
    Patched,
    StatusChanged,
    Unpublished,
    Deleted,
}

/// Emitted after a lifecycle write has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentEvent {
    pub change: DocumentChange,
    pub collection: String,
    pub document_id: Uuid,
    /// Version written or touched; absent for whole-document operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_version_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Versions affected by unpublish and delete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected: Option<u64>,
    pub timestamp: DateTime<Utc>,
}

impl DocumentEvent {
    pub fn new(
        change: DocumentChange,
        collection: impl Into<String>,
        document_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            change,
            collection: collection.into(),
            document_id,
            version_id: None,
            previous_version_id: None,
            status: None,
            affected: None,
            timestamp,
        }
    }

    pub fn version(mut self, version_id: Uuid) -> Self {
        self.version_id = Some(version_id);
        self
    }

    pub fn previous(mut self, version_id: Option<Uuid>) -> Self {
        self.previous_version_id = version_id;
        self
    }

    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn affected(mut self, count: u64) -> Self {
        self.affected = Some(count);
        self
    }
}
