//! Storage adapter contract.
//!
//! The lifecycle service talks to persistence only through these four
//! traits. Implementations must make the optimistic-concurrency check in
//! [`DocumentCommands::create_document_version`] and the insert that follows
//! it one atomic unit.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::document::{DocumentRecord, DocumentVersion, VersionAction};
use crate::schema::CollectionSchema;
use crate::transform::FieldValueRow;

pub use memory::InMemoryStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("stale version: current is {current}, supplied {supplied}")]
    VersionConflict { current: Uuid, supplied: Uuid },
    #[error("collection `{0}` already exists")]
    CollectionExists(String),
    #[error("collection {0} not found")]
    CollectionNotFound(Uuid),
    #[error("document {0} not found")]
    DocumentNotFound(Uuid),
    #[error("version {0} not found")]
    VersionNotFound(Uuid),
    #[error("storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StorageError {
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        StorageError::Backend(Box::new(err))
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionRecord {
    pub id: Uuid,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to append one version.
#[derive(Debug, Clone)]
pub struct NewDocumentVersion {
    /// `None` starts a new document.
    pub document_id: Option<Uuid>,
    pub collection_id: Uuid,
    pub action: VersionAction,
    /// `None` lets the adapter use the document id.
    pub path: Option<String>,
    pub status: String,
    pub rows: Vec<FieldValueRow>,
    /// When set, the insert only happens if this is still the current version.
    pub expected_version_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedVersion {
    pub version: DocumentVersion,
    pub field_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadOptions {
    pub locale: String,
    /// Rebuild the tree instead of returning raw rows.
    pub reconstruct: bool,
}

impl ReadOptions {
    pub fn tree(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
            reconstruct: true,
        }
    }

    pub fn rows() -> Self {
        Self {
            locale: crate::locale::ALL_LOCALES.to_string(),
            reconstruct: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    CreatedAt,
    #[default]
    UpdatedAt,
    Path,
    Status,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub locale: String,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
    pub order: SortField,
    pub desc: bool,
    /// Case-insensitive substring match on the document path.
    pub query: Option<String>,
    pub status: Option<String>,
    pub reconstruct: bool,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            locale: crate::locale::ALL_LOCALES.to_string(),
            page: 1,
            page_size: 20,
            order: SortField::default(),
            desc: true,
            query: None,
            status: None,
            reconstruct: true,
        }
    }
}

impl PageRequest {
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    pub fn page_size(&self) -> u32 {
        self.page_size.clamp(1, 500)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.page_size())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
}

impl PageMeta {
    pub fn new(total: u64, request: &PageRequest) -> Self {
        let page_size = request.page_size();
        let total_pages = total.div_ceil(u64::from(page_size));
        Self {
            total,
            page: request.page(),
            page_size,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub meta: PageMeta,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: String,
    pub count: u64,
}

#[async_trait]
pub trait CollectionCommands: Send + Sync {
    async fn create_collection(
        &self,
        path: &str,
        schema: &CollectionSchema,
    ) -> StorageResult<CollectionRecord>;

    /// Removes the collection and every version stored under it.
    async fn delete_collection(&self, id: Uuid) -> StorageResult<()>;
}

#[async_trait]
pub trait DocumentCommands: Send + Sync {
    /// Append a version. Fails with [`StorageError::VersionConflict`] when
    /// `expected_version_id` no longer names the current version, and with
    /// [`StorageError::DocumentNotFound`] when `document_id` has no live
    /// versions.
    async fn create_document_version(
        &self,
        new: NewDocumentVersion,
    ) -> StorageResult<CreatedVersion>;

    /// Set the status of one version in place.
    async fn set_document_status(&self, version_id: Uuid, status: &str) -> StorageResult<()>;

    /// Move every live version of the document that is in `published_status`
    /// to `archived_status`, except `exclude_version_id`. Returns the count.
    async fn archive_published_versions(
        &self,
        document_id: Uuid,
        published_status: &str,
        archived_status: &str,
        exclude_version_id: Option<Uuid>,
    ) -> StorageResult<u64>;

    /// Flag every version of the document as deleted. Returns the count.
    async fn soft_delete_document(&self, document_id: Uuid) -> StorageResult<u64>;
}

#[async_trait]
pub trait CollectionQueries: Send + Sync {
    async fn all_collections(&self) -> StorageResult<Vec<CollectionRecord>>;

    async fn collection_by_path(&self, path: &str) -> StorageResult<Option<CollectionRecord>>;

    async fn collection_by_id(&self, id: Uuid) -> StorageResult<Option<CollectionRecord>>;
}

/// Reads. "Current" means the latest non-deleted version of a document.
#[async_trait]
pub trait DocumentQueries: Send + Sync {
    async fn document_by_id(
        &self,
        collection_id: Uuid,
        document_id: Uuid,
        options: &ReadOptions,
    ) -> StorageResult<Option<DocumentRecord>>;

    async fn document_by_path(
        &self,
        collection_id: Uuid,
        path: &str,
        options: &ReadOptions,
    ) -> StorageResult<Option<DocumentRecord>>;

    /// Any version, deleted or not.
    async fn document_by_version(
        &self,
        version_id: Uuid,
        options: &ReadOptions,
    ) -> StorageResult<Option<DocumentRecord>>;

    /// Current versions of a collection.
    async fn documents_by_page(
        &self,
        collection_id: Uuid,
        request: &PageRequest,
    ) -> StorageResult<Page<DocumentRecord>>;

    /// Every non-deleted version of one document.
    async fn document_history(
        &self,
        collection_id: Uuid,
        document_id: Uuid,
        request: &PageRequest,
    ) -> StorageResult<Page<DocumentRecord>>;

    /// Latest non-deleted version in `status`.
    async fn published_version(
        &self,
        collection_id: Uuid,
        document_id: Uuid,
        status: &str,
    ) -> StorageResult<Option<DocumentVersion>>;

    /// Current versions per status.
    async fn document_counts_by_status(
        &self,
        collection_id: Uuid,
    ) -> StorageResult<Vec<StatusCount>>;
}

/// The full adapter surface the lifecycle service needs.
pub trait StorageAdapter:
    CollectionCommands + DocumentCommands + CollectionQueries + DocumentQueries
{
}

impl<T> StorageAdapter for T where
    T: CollectionCommands + DocumentCommands + CollectionQueries + DocumentQueries
{
}
