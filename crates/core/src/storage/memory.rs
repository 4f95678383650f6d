use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{
    CollectionCommands, CollectionQueries, CollectionRecord, CreatedVersion, DocumentCommands,
    DocumentQueries, NewDocumentVersion, Page, PageMeta, PageRequest, ReadOptions, SortField,
    StatusCount, StorageError, StorageResult,
};
use crate::document::{DocumentRecord, DocumentVersion, VersionAction};
use crate::schema::CollectionSchema;
use crate::transform::FieldValueRow;

/// Process-local adapter. Versions are kept append-only in write order, so
/// the last live entry for a document is its current version.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    collections: BTreeMap<Uuid, StoredCollection>,
    versions: Vec<StoredVersion>,
}

#[derive(Debug, Clone)]
struct StoredCollection {
    record: CollectionRecord,
    schema: CollectionSchema,
}

#[derive(Debug, Clone)]
struct StoredVersion {
    seq: u64,
    version: DocumentVersion,
    action: VersionAction,
    rows: Vec<FieldValueRow>,
}

impl StoredVersion {
    fn to_record(&self, locale: &str, reconstruct: bool) -> DocumentRecord {
        DocumentRecord::from_rows(self.version.clone(), self.rows.clone(), locale, reconstruct)
    }
}

impl State {
    fn current(&self, document_id: Uuid) -> Option<&StoredVersion> {
        self.versions
            .iter()
            .rev()
            .find(|v| v.version.document_id == document_id && !v.version.is_deleted)
    }

    /// Current version of every live document in the collection.
    fn current_versions(&self, collection_id: Uuid) -> Vec<&StoredVersion> {
        let mut seen = HashSet::new();
        let mut out: Vec<&StoredVersion> = self
            .versions
            .iter()
            .rev()
            .filter(|v| v.version.collection_id == collection_id && !v.version.is_deleted)
            .filter(|v| seen.insert(v.version.document_id))
            .collect();
        out.reverse();
        out
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of versions ever written, deleted ones included.
    pub async fn version_count(&self) -> usize {
        self.state.read().await.versions.len()
    }

    /// Schema snapshot taken when the collection was created.
    pub async fn stored_schema(&self, collection_id: Uuid) -> Option<CollectionSchema> {
        let state = self.state.read().await;
        state.collections.get(&collection_id).map(|c| c.schema.clone())
    }

    /// Action recorded for a version.
    pub async fn version_action(&self, version_id: Uuid) -> Option<VersionAction> {
        let state = self.state.read().await;
        state
            .versions
            .iter()
            .find(|v| v.version.version_id == version_id)
            .map(|v| v.action)
    }
}

fn compare(a: &StoredVersion, b: &StoredVersion, order: SortField) -> Ordering {
    let primary = match order {
        SortField::CreatedAt => a.version.created_at.cmp(&b.version.created_at),
        SortField::UpdatedAt => a.version.updated_at.cmp(&b.version.updated_at),
        SortField::Path => a.version.path.cmp(&b.version.path),
        SortField::Status => a.version.status.cmp(&b.version.status),
    };
    primary.then(a.seq.cmp(&b.seq))
}

fn paginate(mut matches: Vec<&StoredVersion>, request: &PageRequest) -> Page<DocumentRecord> {
    matches.sort_by(|a, b| {
        let ord = compare(a, b, request.order);
        if request.desc {
            ord.reverse()
        } else {
            ord
        }
    });
    let meta = PageMeta::new(matches.len() as u64, request);
    let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
    let items = matches
        .into_iter()
        .skip(offset)
        .take(request.page_size() as usize)
        .map(|v| v.to_record(&request.locale, request.reconstruct))
        .collect();
    Page { items, meta }
}

#[async_trait]
impl CollectionCommands for InMemoryStore {
    async fn create_collection(
        &self,
        path: &str,
        schema: &CollectionSchema,
    ) -> StorageResult<CollectionRecord> {
        let mut state = self.state.write().await;
        if state.collections.values().any(|c| c.record.path == path) {
            return Err(StorageError::CollectionExists(path.to_string()));
        }
        let record = CollectionRecord {
            id: Uuid::now_v7(),
            path: path.to_string(),
            created_at: Utc::now(),
        };
        state.collections.insert(
            record.id,
            StoredCollection {
                record: record.clone(),
                schema: schema.clone(),
            },
        );
        debug!(collection = %record.path, id = %record.id, "collection created");
        Ok(record)
    }

    async fn delete_collection(&self, id: Uuid) -> StorageResult<()> {
        let mut state = self.state.write().await;
        if state.collections.remove(&id).is_none() {
            return Err(StorageError::CollectionNotFound(id));
        }
        state.versions.retain(|v| v.version.collection_id != id);
        Ok(())
    }
}

#[async_trait]
impl DocumentCommands for InMemoryStore {
    async fn create_document_version(
        &self,
        new: NewDocumentVersion,
    ) -> StorageResult<CreatedVersion> {
        // One write guard covers the staleness check and the append.
        let mut state = self.state.write().await;
        if !state.collections.contains_key(&new.collection_id) {
            return Err(StorageError::CollectionNotFound(new.collection_id));
        }

        let document_id = match new.document_id {
            Some(document_id) => {
                let current = state
                    .current(document_id)
                    .filter(|v| v.version.collection_id == new.collection_id)
                    .ok_or(StorageError::DocumentNotFound(document_id))?;
                if let Some(supplied) = new.expected_version_id {
                    if supplied != current.version.version_id {
                        return Err(StorageError::VersionConflict {
                            current: current.version.version_id,
                            supplied,
                        });
                    }
                }
                document_id
            }
            None => Uuid::now_v7(),
        };

        let version_id = Uuid::now_v7();
        let rows: Vec<FieldValueRow> = new
            .rows
            .into_iter()
            .map(|mut row| {
                row.version_id = Some(version_id);
                row
            })
            .collect();
        let version = DocumentVersion {
            version_id,
            document_id,
            collection_id: new.collection_id,
            status: new.status,
            path: new.path.unwrap_or_else(|| document_id.to_string()),
            created_at: new.created_at,
            updated_at: new.created_at,
            is_deleted: false,
        };
        let field_count = rows.len();
        let seq = state.versions.len() as u64;
        state.versions.push(StoredVersion {
            seq,
            version: version.clone(),
            action: new.action,
            rows,
        });

        Ok(CreatedVersion {
            version,
            field_count,
        })
    }

    async fn set_document_status(&self, version_id: Uuid, status: &str) -> StorageResult<()> {
        let mut state = self.state.write().await;
        let stored = state
            .versions
            .iter_mut()
            .find(|v| v.version.version_id == version_id)
            .ok_or(StorageError::VersionNotFound(version_id))?;
        stored.version.status = status.to_string();
        stored.version.updated_at = Utc::now();
        Ok(())
    }

    async fn archive_published_versions(
        &self,
        document_id: Uuid,
        published_status: &str,
        archived_status: &str,
        exclude_version_id: Option<Uuid>,
    ) -> StorageResult<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut count = 0;
        for stored in state.versions.iter_mut().filter(|v| {
            v.version.document_id == document_id
                && !v.version.is_deleted
                && v.version.status == published_status
                && Some(v.version.version_id) != exclude_version_id
        }) {
            stored.version.status = archived_status.to_string();
            stored.version.updated_at = now;
            count += 1;
        }
        Ok(count)
    }

    async fn soft_delete_document(&self, document_id: Uuid) -> StorageResult<u64> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut count = 0;
        for stored in state
            .versions
            .iter_mut()
            .filter(|v| v.version.document_id == document_id && !v.version.is_deleted)
        {
            stored.version.is_deleted = true;
            stored.version.updated_at = now;
            count += 1;
        }
        Ok(count)
    }
}

#[async_trait]
impl CollectionQueries for InMemoryStore {
    async fn all_collections(&self) -> StorageResult<Vec<CollectionRecord>> {
        let state = self.state.read().await;
        let mut out: Vec<CollectionRecord> =
            state.collections.values().map(|c| c.record.clone()).collect();
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    async fn collection_by_path(&self, path: &str) -> StorageResult<Option<CollectionRecord>> {
        let state = self.state.read().await;
        Ok(state
            .collections
            .values()
            .find(|c| c.record.path == path)
            .map(|c| c.record.clone()))
    }

    async fn collection_by_id(&self, id: Uuid) -> StorageResult<Option<CollectionRecord>> {
        let state = self.state.read().await;
        Ok(state.collections.get(&id).map(|c| c.record.clone()))
    }
}

#[async_trait]
impl DocumentQueries for InMemoryStore {
    async fn document_by_id(
        &self,
        collection_id: Uuid,
        document_id: Uuid,
        options: &ReadOptions,
    ) -> StorageResult<Option<DocumentRecord>> {
        let state = self.state.read().await;
        Ok(state
            .current(document_id)
            .filter(|v| v.version.collection_id == collection_id)
            .map(|v| v.to_record(&options.locale, options.reconstruct)))
    }

    async fn document_by_path(
        &self,
        collection_id: Uuid,
        path: &str,
        options: &ReadOptions,
    ) -> StorageResult<Option<DocumentRecord>> {
        let state = self.state.read().await;
        Ok(state
            .current_versions(collection_id)
            .into_iter()
            .rev()
            .find(|v| v.version.path == path)
            .map(|v| v.to_record(&options.locale, options.reconstruct)))
    }

    async fn document_by_version(
        &self,
        version_id: Uuid,
        options: &ReadOptions,
    ) -> StorageResult<Option<DocumentRecord>> {
        let state = self.state.read().await;
        Ok(state
            .versions
            .iter()
            .find(|v| v.version.version_id == version_id)
            .map(|v| v.to_record(&options.locale, options.reconstruct)))
    }

    async fn documents_by_page(
        &self,
        collection_id: Uuid,
        request: &PageRequest,
    ) -> StorageResult<Page<DocumentRecord>> {
        let state = self.state.read().await;
        let needle = request.query.as_deref().map(str::to_lowercase);
        let matches = state
            .current_versions(collection_id)
            .into_iter()
            .filter(|v| request.status.as_deref().map_or(true, |s| v.version.status == s))
            .filter(|v| {
                needle
                    .as_deref()
                    .map_or(true, |n| v.version.path.to_lowercase().contains(n))
            })
            .collect();
        Ok(paginate(matches, request))
    }

    async fn document_history(
        &self,
        collection_id: Uuid,
        document_id: Uuid,
        request: &PageRequest,
    ) -> StorageResult<Page<DocumentRecord>> {
        let state = self.state.read().await;
        let matches = state
            .versions
            .iter()
            .filter(|v| {
                v.version.collection_id == collection_id
                    && v.version.document_id == document_id
                    && !v.version.is_deleted
            })
            .filter(|v| request.status.as_deref().map_or(true, |s| v.version.status == s))
            .collect();
        Ok(paginate(matches, request))
    }

    async fn published_version(
        &self,
        collection_id: Uuid,
        document_id: Uuid,
        status: &str,
    ) -> StorageResult<Option<DocumentVersion>> {
        let state = self.state.read().await;
        Ok(state
            .versions
            .iter()
            .rev()
            .find(|v| {
                v.version.collection_id == collection_id
                    && v.version.document_id == document_id
                    && !v.version.is_deleted
                    && v.version.status == status
            })
            .map(|v| v.version.clone()))
    }

    async fn document_counts_by_status(
        &self,
        collection_id: Uuid,
    ) -> StorageResult<Vec<StatusCount>> {
        let state = self.state.read().await;
        let mut counts: BTreeMap<String, u64> = BTreeMap::new();
        for v in state.current_versions(collection_id) {
            *counts.entry(v.version.status.clone()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(status, count)| StatusCount { status, count })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldNode, ScalarField};
    use serde_json::json;

    fn schema() -> CollectionSchema {
        CollectionSchema::new(vec![FieldNode::from(ScalarField::text("title"))]).unwrap()
    }

    fn rows(title: &str) -> Vec<FieldValueRow> {
        vec![FieldValueRow::new("title".parse().unwrap(), "all", json!(title))]
    }

    fn new_version(collection_id: Uuid, document_id: Option<Uuid>, title: &str) -> NewDocumentVersion {
        NewDocumentVersion {
            document_id,
            collection_id,
            action: if document_id.is_some() {
                VersionAction::Update
            } else {
                VersionAction::Create
            },
            path: Some(title.to_lowercase()),
            status: "draft".into(),
            rows: rows(title),
            expected_version_id: None,
            created_at: Utc::now(),
        }
    }

    async fn store_with_collection() -> (InMemoryStore, Uuid) {
        let store = InMemoryStore::new();
        let collection = store.create_collection("posts", &schema()).await.unwrap();
        (store, collection.id)
    }

    #[tokio::test]
    async fn collection_paths_are_unique() {
        let (store, _) = store_with_collection().await;
        let err = store.create_collection("posts", &schema()).await.unwrap_err();
        assert!(matches!(err, StorageError::CollectionExists(p) if p == "posts"));
        let all = store.all_collections().await.unwrap();
        assert_eq!(all.len(), 1);
        let stored = store.stored_schema(all[0].id).await.unwrap();
        assert_eq!(stored.fields().len(), 1);
    }

    #[tokio::test]
    async fn latest_version_is_current() {
        let (store, cid) = store_with_collection().await;
        let first = store
            .create_document_version(new_version(cid, None, "One"))
            .await
            .unwrap();
        let doc = first.version.document_id;
        store
            .create_document_version(new_version(cid, Some(doc), "Two"))
            .await
            .unwrap();

        let current = store
            .document_by_id(cid, doc, &ReadOptions::tree("all"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.fields(), Some(&json!({"title": "Two"})));
        assert_eq!(first.field_count, 1);
        assert_eq!(store.version_action(first.version.version_id).await, Some(VersionAction::Create));
    }

    #[tokio::test]
    async fn stale_expected_version_conflicts() {
        let (store, cid) = store_with_collection().await;
        let first = store
            .create_document_version(new_version(cid, None, "One"))
            .await
            .unwrap();
        let doc = first.version.document_id;
        let second = store
            .create_document_version(new_version(cid, Some(doc), "Two"))
            .await
            .unwrap();

        let mut stale = new_version(cid, Some(doc), "Three");
        stale.expected_version_id = Some(first.version.version_id);
        match store.create_document_version(stale).await.unwrap_err() {
            StorageError::VersionConflict { current, supplied } => {
                assert_eq!(current, second.version.version_id);
                assert_eq!(supplied, first.version.version_id);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(store.version_count().await, 2);
    }

    #[tokio::test]
    async fn soft_delete_hides_document() {
        let (store, cid) = store_with_collection().await;
        let first = store
            .create_document_version(new_version(cid, None, "One"))
            .await
            .unwrap();
        let doc = first.version.document_id;
        store
            .create_document_version(new_version(cid, Some(doc), "Two"))
            .await
            .unwrap();

        assert_eq!(store.soft_delete_document(doc).await.unwrap(), 2);
        assert!(store
            .document_by_id(cid, doc, &ReadOptions::rows())
            .await
            .unwrap()
            .is_none());
        let page = store
            .documents_by_page(cid, &PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.meta.total, 0);
        let old = store
            .document_by_version(first.version.version_id, &ReadOptions::rows())
            .await
            .unwrap()
            .unwrap();
        assert!(old.version.is_deleted);
    }

    #[tokio::test]
    async fn paging_filters_and_orders() {
        let (store, cid) = store_with_collection().await;
        for title in ["Alpha", "Beta", "Gamma"] {
            store
                .create_document_version(new_version(cid, None, title))
                .await
                .unwrap();
        }
        let request = PageRequest {
            order: SortField::Path,
            desc: false,
            page_size: 2,
            ..PageRequest::default()
        };
        let page = store.documents_by_page(cid, &request).await.unwrap();
        let paths: Vec<_> = page.items.iter().map(|d| d.version.path.as_str()).collect();
        assert_eq!(paths, vec!["alpha", "beta"]);
        assert_eq!(page.meta.total_pages, 2);

        let request = PageRequest {
            query: Some("MM".into()),
            ..PageRequest::default()
        };
        let page = store.documents_by_page(cid, &request).await.unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].version.path, "gamma");
    }

    #[tokio::test]
    async fn archive_skips_excluded_version() {
        let (store, cid) = store_with_collection().await;
        let first = store
            .create_document_version(new_version(cid, None, "One"))
            .await
            .unwrap();
        let doc = first.version.document_id;
        let second = store
            .create_document_version(new_version(cid, Some(doc), "Two"))
            .await
            .unwrap();
        store.set_document_status(first.version.version_id, "published").await.unwrap();
        store.set_document_status(second.version.version_id, "published").await.unwrap();

        let archived = store
            .archive_published_versions(doc, "published", "archived", Some(second.version.version_id))
            .await
            .unwrap();
        assert_eq!(archived, 1);
        let live = store.published_version(cid, doc, "published").await.unwrap().unwrap();
        assert_eq!(live.version_id, second.version.version_id);

        let counts = store.document_counts_by_status(cid).await.unwrap();
        assert_eq!(
            counts,
            vec![StatusCount {
                status: "published".into(),
                count: 1
            }]
        );
    }

    #[tokio::test]
    async fn unknown_document_and_version() {
        let (store, cid) = store_with_collection().await;
        let missing = Uuid::now_v7();
        let err = store
            .create_document_version(new_version(cid, Some(missing), "X"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::DocumentNotFound(id) if id == missing));
        let err = store.set_document_status(missing, "draft").await.unwrap_err();
        assert!(matches!(err, StorageError::VersionNotFound(_)));
    }

    #[tokio::test]
    async fn delete_collection_drops_versions() {
        let (store, cid) = store_with_collection().await;
        store
            .create_document_version(new_version(cid, None, "One"))
            .await
            .unwrap();
        store.delete_collection(cid).await.unwrap();
        assert_eq!(store.version_count().await, 0);
        assert!(store.collection_by_id(cid).await.unwrap().is_none());
        assert!(matches!(
            store.delete_collection(cid).await.unwrap_err(),
            StorageError::CollectionNotFound(_)
        ));
    }
}
