use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::transform::{reconstruct, FieldValueRow};

/// Immutable snapshot of a document. Only `status` and `is_deleted` are
/// ever changed after the version is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentVersion {
    pub version_id: Uuid,
    pub document_id: Uuid,
    pub collection_id: Uuid,
    pub status: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub is_deleted: bool,
}

/// Why a version was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VersionAction {
    Create,
    Update,
    Patch,
}

impl VersionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            VersionAction::Create => "create",
            VersionAction::Update => "update",
            VersionAction::Patch => "patch",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "create" => Some(VersionAction::Create),
            "update" => Some(VersionAction::Update),
            "patch" => Some(VersionAction::Patch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DocumentContent {
    /// Reconstructed tree in the requested locale.
    Fields(Value),
    /// Raw flattened rows.
    Rows(Vec<FieldValueRow>),
}

/// A version together with its content, as returned by document queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    #[serde(flatten)]
    pub version: DocumentVersion,
    pub content: DocumentContent,
}

impl DocumentRecord {
    /// Package stored rows, rebuilding the tree when asked to.
    pub fn from_rows(
        version: DocumentVersion,
        rows: Vec<FieldValueRow>,
        locale: &str,
        rebuild: bool,
    ) -> Self {
        let content = if rebuild {
            DocumentContent::Fields(reconstruct(&rows, locale))
        } else {
            DocumentContent::Rows(rows)
        };
        Self { version, content }
    }

    pub fn fields(&self) -> Option<&Value> {
        match &self.content {
            DocumentContent::Fields(v) => Some(v),
            DocumentContent::Rows(_) => None,
        }
    }

    pub fn rows(&self) -> Option<&[FieldValueRow]> {
        match &self.content {
            DocumentContent::Rows(rows) => Some(rows),
            DocumentContent::Fields(_) => None,
        }
    }
}
