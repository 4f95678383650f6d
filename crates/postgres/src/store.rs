use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use content_store_core::document::{DocumentRecord, DocumentVersion};
use content_store_core::schema::CollectionSchema;
use content_store_core::storage::{
    CollectionCommands, CollectionQueries, CollectionRecord, CreatedVersion, DocumentCommands,
    DocumentQueries, NewDocumentVersion, Page, PageMeta, PageRequest, ReadOptions, SortField,
    StatusCount, StorageError, StorageResult,
};
use content_store_core::transform::FieldValueRow;
use sqlx::postgres::PgPool;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use crate::rows::{CollectionRow, FieldValueRecord, StatusCountRow, VersionRow};

const VERSION_COLUMNS: &str =
    "version_id, document_id, collection_id, status, path, created_at, updated_at, is_deleted";

/// Latest live version per document of collection `$1`.
const CURRENT_VERSIONS: &str = "SELECT DISTINCT ON (document_id) \
     version_id, document_id, collection_id, status, path, created_at, updated_at, is_deleted, seq \
     FROM document_versions \
     WHERE collection_id = $1 AND NOT is_deleted \
     ORDER BY document_id, seq DESC";

/// Rows per multi-row INSERT. Six binds each keeps us far below the
/// 65535 parameter limit.
const INSERT_CHUNK: usize = 1000;

/// PostgreSQL-backed adapter.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip a trivial query.
    pub async fn health_check(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StorageError::backend)?;
        Ok(())
    }

    /// Stored rows of the given versions, in write order.
    async fn load_rows(&self, version_ids: &[Uuid]) -> StorageResult<HashMap<Uuid, Vec<FieldValueRow>>> {
        let mut out: HashMap<Uuid, Vec<FieldValueRow>> = HashMap::new();
        if version_ids.is_empty() {
            return Ok(out);
        }
        let records = sqlx::query_as::<_, FieldValueRecord>(
            "SELECT version_id, field_address, locale, value FROM field_values \
             WHERE version_id = ANY($1) ORDER BY version_id, position",
        )
        .bind(version_ids.to_vec())
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::backend)?;

        for record in records {
            let version_id = record.version_id;
            out.entry(version_id)
                .or_default()
                .push(FieldValueRow::try_from(record)?);
        }
        Ok(out)
    }

    async fn to_records(
        &self,
        versions: Vec<VersionRow>,
        locale: &str,
        reconstruct: bool,
    ) -> StorageResult<Vec<DocumentRecord>> {
        let ids: Vec<Uuid> = versions.iter().map(|v| v.version_id).collect();
        let mut rows = self.load_rows(&ids).await?;
        Ok(versions
            .into_iter()
            .map(|v| {
                let content = rows.remove(&v.version_id).unwrap_or_default();
                DocumentRecord::from_rows(v.into(), content, locale, reconstruct)
            })
            .collect())
    }

    async fn to_record(
        &self,
        version: Option<VersionRow>,
        options: &ReadOptions,
    ) -> StorageResult<Option<DocumentRecord>> {
        let Some(version) = version else {
            return Ok(None);
        };
        let mut records = self
            .to_records(vec![version], &options.locale, options.reconstruct)
            .await?;
        Ok(records.pop())
    }
}

fn sort_column(order: SortField) -> &'static str {
    match order {
        SortField::CreatedAt => "created_at",
        SortField::UpdatedAt => "updated_at",
        SortField::Path => "path",
        SortField::Status => "status",
    }
}

/// `ORDER BY` body; `seq` breaks ties in the same direction.
fn order_clause(request: &PageRequest) -> String {
    let dir = if request.desc { "DESC" } else { "ASC" };
    format!("{} {dir}, seq {dir}", sort_column(request.order))
}

/// Substring pattern for `ILIKE` with the wildcard characters escaped.
fn like_pattern(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len() + 2);
    escaped.push('%');
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

fn limit_offset(request: &PageRequest) -> (i64, i64) {
    let limit = i64::from(request.page_size());
    let offset = i64::try_from(request.offset()).unwrap_or(i64::MAX);
    (limit, offset)
}

fn total(count: i64) -> u64 {
    u64::try_from(count).unwrap_or(0)
}

#[async_trait]
impl CollectionCommands for PgStore {
    async fn create_collection(
        &self,
        path: &str,
        schema: &CollectionSchema,
    ) -> StorageResult<CollectionRecord> {
        let row = sqlx::query_as::<_, CollectionRow>(
            "INSERT INTO collections (id, path, schema, created_at) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (path) DO NOTHING \
             RETURNING id, path, created_at",
        )
        .bind(Uuid::now_v7())
        .bind(path)
        .bind(Json(schema))
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::backend)?
        .ok_or_else(|| StorageError::CollectionExists(path.to_string()))?;

        debug!(collection = %row.path, id = %row.id, "collection created");
        Ok(row.into())
    }

    async fn delete_collection(&self, id: Uuid) -> StorageResult<()> {
        let result = sqlx::query("DELETE FROM collections WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::CollectionNotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentCommands for PgStore {
    async fn create_document_version(
        &self,
        new: NewDocumentVersion,
    ) -> StorageResult<CreatedVersion> {
        let mut tx = self.pool.begin().await.map_err(StorageError::backend)?;

        let collection_exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM collections WHERE id = $1)")
                .bind(new.collection_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(StorageError::backend)?;
        if !collection_exists {
            return Err(StorageError::CollectionNotFound(new.collection_id));
        }

        let document_id = match new.document_id {
            Some(document_id) => {
                // Holding the anchor row serializes writers of this document
                // until commit.
                let anchor: Option<Uuid> = sqlx::query_scalar(
                    "SELECT id FROM documents WHERE id = $1 AND collection_id = $2 FOR UPDATE",
                )
                .bind(document_id)
                .bind(new.collection_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(StorageError::backend)?;
                if anchor.is_none() {
                    return Err(StorageError::DocumentNotFound(document_id));
                }

                let current: Uuid = sqlx::query_scalar(
                    "SELECT version_id FROM document_versions \
                     WHERE document_id = $1 AND NOT is_deleted \
                     ORDER BY seq DESC LIMIT 1",
                )
                .bind(document_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(StorageError::backend)?
                .ok_or(StorageError::DocumentNotFound(document_id))?;

                if let Some(supplied) = new.expected_version_id {
                    if supplied != current {
                        return Err(StorageError::VersionConflict { current, supplied });
                    }
                }
                document_id
            }
            None => {
                let document_id = Uuid::now_v7();
                sqlx::query("INSERT INTO documents (id, collection_id, created_at) VALUES ($1, $2, $3)")
                    .bind(document_id)
                    .bind(new.collection_id)
                    .bind(new.created_at)
                    .execute(&mut *tx)
                    .await
                    .map_err(StorageError::backend)?;
                document_id
            }
        };

        let version = DocumentVersion {
            version_id: Uuid::now_v7(),
            document_id,
            collection_id: new.collection_id,
            status: new.status,
            path: new.path.unwrap_or_else(|| document_id.to_string()),
            created_at: new.created_at,
            updated_at: new.created_at,
            is_deleted: false,
        };

        sqlx::query(
            "INSERT INTO document_versions \
             (version_id, document_id, collection_id, action, status, path, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(version.version_id)
        .bind(version.document_id)
        .bind(version.collection_id)
        .bind(new.action.as_str())
        .bind(&version.status)
        .bind(&version.path)
        .bind(version.created_at)
        .bind(version.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(StorageError::backend)?;

        let positioned = new
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| i32::try_from(i).map(|position| (position, row)))
            .collect::<Result<Vec<_>, _>>()
            .map_err(StorageError::backend)?;

        for chunk in positioned.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO field_values \
                 (version_id, position, field_address, locale, value_kind, value) ",
            );
            builder.push_values(chunk, |mut b, (position, row)| {
                b.push_bind(version.version_id)
                    .push_bind(*position)
                    .push_bind(row.field_address.to_string())
                    .push_bind(row.locale.clone())
                    .push_bind(row.value_kind())
                    .push_bind(row.value.clone());
            });
            builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(StorageError::backend)?;
        }

        tx.commit().await.map_err(StorageError::backend)?;

        debug!(
            document_id = %version.document_id,
            version_id = %version.version_id,
            rows = positioned.len(),
            "version stored"
        );
        Ok(CreatedVersion {
            field_count: positioned.len(),
            version,
        })
    }

    async fn set_document_status(&self, version_id: Uuid, status: &str) -> StorageResult<()> {
        let result = sqlx::query(
            "UPDATE document_versions SET status = $2, updated_at = now() WHERE version_id = $1",
        )
        .bind(version_id)
        .bind(status)
        .execute(&self.pool)
        .await
        .map_err(StorageError::backend)?;
        if result.rows_affected() == 0 {
            return Err(StorageError::VersionNotFound(version_id));
        }
        Ok(())
    }

    async fn archive_published_versions(
        &self,
        document_id: Uuid,
        published_status: &str,
        archived_status: &str,
        exclude_version_id: Option<Uuid>,
    ) -> StorageResult<u64> {
        let result = sqlx::query(
            "UPDATE document_versions SET status = $3, updated_at = now() \
             WHERE document_id = $1 AND status = $2 AND NOT is_deleted \
             AND ($4::uuid IS NULL OR version_id <> $4)",
        )
        .bind(document_id)
        .bind(published_status)
        .bind(archived_status)
        .bind(exclude_version_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::backend)?;
        Ok(result.rows_affected())
    }

    async fn soft_delete_document(&self, document_id: Uuid) -> StorageResult<u64> {
        let result = sqlx::query(
            "UPDATE document_versions SET is_deleted = TRUE, updated_at = now() \
             WHERE document_id = $1 AND NOT is_deleted",
        )
        .bind(document_id)
        .execute(&self.pool)
        .await
        .map_err(StorageError::backend)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl CollectionQueries for PgStore {
    async fn all_collections(&self) -> StorageResult<Vec<CollectionRecord>> {
        let rows = sqlx::query_as::<_, CollectionRow>(
            "SELECT id, path, created_at FROM collections ORDER BY path",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StorageError::backend)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn collection_by_path(&self, path: &str) -> StorageResult<Option<CollectionRecord>> {
        let row = sqlx::query_as::<_, CollectionRow>(
            "SELECT id, path, created_at FROM collections WHERE path = $1",
        )
        .bind(path)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::backend)?;
        Ok(row.map(Into::into))
    }

    async fn collection_by_id(&self, id: Uuid) -> StorageResult<Option<CollectionRecord>> {
        let row = sqlx::query_as::<_, CollectionRow>(
            "SELECT id, path, created_at FROM collections WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(StorageError::backend)?;
        Ok(row.map(Into::into))
    }
}

#[async_trait]
impl DocumentQueries for PgStore {
    async fn document_by_id(
        &self,
        collection_id: Uuid,
        document_id: Uuid,
        options: &ReadOptions,
    ) -> StorageResult<Option<DocumentRecord>> {
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions \
             WHERE collection_id = $1 AND document_id = $2 AND NOT is_deleted \
             ORDER BY seq DESC LIMIT 1"
        );
        let version = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(collection_id)
            .bind(document_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::backend)?;
        self.to_record(version, options).await
    }

    async fn document_by_path(
        &self,
        collection_id: Uuid,
        path: &str,
        options: &ReadOptions,
    ) -> StorageResult<Option<DocumentRecord>> {
        let sql = format!(
            "WITH current AS ({CURRENT_VERSIONS}) \
             SELECT {VERSION_COLUMNS} FROM current WHERE path = $2 \
             ORDER BY seq DESC LIMIT 1"
        );
        let version = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(collection_id)
            .bind(path)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::backend)?;
        self.to_record(version, options).await
    }

    async fn document_by_version(
        &self,
        version_id: Uuid,
        options: &ReadOptions,
    ) -> StorageResult<Option<DocumentRecord>> {
        let sql = format!("SELECT {VERSION_COLUMNS} FROM document_versions WHERE version_id = $1");
        let version = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(version_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::backend)?;
        self.to_record(version, options).await
    }

    async fn documents_by_page(
        &self,
        collection_id: Uuid,
        request: &PageRequest,
    ) -> StorageResult<Page<DocumentRecord>> {
        let filter = "WHERE ($2::text IS NULL OR status = $2) \
                      AND ($3::text IS NULL OR path ILIKE $3)";
        let pattern = request.query.as_deref().map(like_pattern);

        let count_sql =
            format!("WITH current AS ({CURRENT_VERSIONS}) SELECT COUNT(*) FROM current {filter}");
        let count: i64 = sqlx::query_scalar(&count_sql)
            .bind(collection_id)
            .bind(request.status.as_deref())
            .bind(pattern.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::backend)?;

        let (limit, offset) = limit_offset(request);
        let sql = format!(
            "WITH current AS ({CURRENT_VERSIONS}) \
             SELECT {VERSION_COLUMNS} FROM current {filter} \
             ORDER BY {} LIMIT $4 OFFSET $5",
            order_clause(request)
        );
        let versions = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(collection_id)
            .bind(request.status.as_deref())
            .bind(pattern.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::backend)?;

        let items = self
            .to_records(versions, &request.locale, request.reconstruct)
            .await?;
        Ok(Page {
            items,
            meta: PageMeta::new(total(count), request),
        })
    }

    async fn document_history(
        &self,
        collection_id: Uuid,
        document_id: Uuid,
        request: &PageRequest,
    ) -> StorageResult<Page<DocumentRecord>> {
        let filter = "WHERE collection_id = $1 AND document_id = $2 AND NOT is_deleted \
                      AND ($3::text IS NULL OR status = $3)";

        let count_sql = format!("SELECT COUNT(*) FROM document_versions {filter}");
        let count: i64 = sqlx::query_scalar(&count_sql)
            .bind(collection_id)
            .bind(document_id)
            .bind(request.status.as_deref())
            .fetch_one(&self.pool)
            .await
            .map_err(StorageError::backend)?;

        let (limit, offset) = limit_offset(request);
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions {filter} \
             ORDER BY {} LIMIT $4 OFFSET $5",
            order_clause(request)
        );
        let versions = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(collection_id)
            .bind(document_id)
            .bind(request.status.as_deref())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::backend)?;

        let items = self
            .to_records(versions, &request.locale, request.reconstruct)
            .await?;
        Ok(Page {
            items,
            meta: PageMeta::new(total(count), request),
        })
    }

    async fn published_version(
        &self,
        collection_id: Uuid,
        document_id: Uuid,
        status: &str,
    ) -> StorageResult<Option<DocumentVersion>> {
        let sql = format!(
            "SELECT {VERSION_COLUMNS} FROM document_versions \
             WHERE collection_id = $1 AND document_id = $2 AND status = $3 AND NOT is_deleted \
             ORDER BY seq DESC LIMIT 1"
        );
        let version = sqlx::query_as::<_, VersionRow>(&sql)
            .bind(collection_id)
            .bind(document_id)
            .bind(status)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::backend)?;
        Ok(version.map(Into::into))
    }

    async fn document_counts_by_status(
        &self,
        collection_id: Uuid,
    ) -> StorageResult<Vec<StatusCount>> {
        let sql = format!(
            "WITH current AS ({CURRENT_VERSIONS}) \
             SELECT status, COUNT(*) AS count FROM current GROUP BY status ORDER BY status"
        );
        let rows = sqlx::query_as::<_, StatusCountRow>(&sql)
            .bind(collection_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::backend)?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_clause_breaks_ties_on_seq() {
        let request = PageRequest {
            order: SortField::Path,
            desc: false,
            ..PageRequest::default()
        };
        assert_eq!(order_clause(&request), "path ASC, seq ASC");
        assert_eq!(
            order_clause(&PageRequest::default()),
            "updated_at DESC, seq DESC"
        );
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("news"), "%news%");
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }

    #[test]
    fn limit_and_offset_follow_page_request() {
        let request = PageRequest {
            page: 3,
            page_size: 25,
            ..PageRequest::default()
        };
        assert_eq!(limit_offset(&request), (25, 50));
    }

    #[test]
    fn negative_totals_clamp() {
        assert_eq!(total(-3), 0);
        assert_eq!(total(7), 7);
    }
}
