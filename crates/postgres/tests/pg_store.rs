//! Runs against a live database when `TEST_DATABASE_URL` is set; otherwise
//! every test returns early.

use chrono::Utc;
use content_store_core::document::VersionAction;
use content_store_core::schema::{CollectionSchema, FieldNode, ScalarField};
use content_store_core::storage::{
    CollectionCommands, CollectionQueries, DocumentCommands, DocumentQueries, NewDocumentVersion,
    PageRequest, ReadOptions, SortField, StatusCount, StorageError,
};
use content_store_core::transform::FieldValueRow;
use content_store_postgres::{PgStore, MIGRATOR};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

async fn store() -> Option<PgStore> {
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("connect to TEST_DATABASE_URL");
    MIGRATOR.run(&pool).await.expect("run migrations");
    Some(PgStore::new(pool))
}

fn schema() -> CollectionSchema {
    CollectionSchema::new(vec![FieldNode::from(ScalarField::text("title").localized())]).unwrap()
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
        rows: vec![
            FieldValueRow::new("title".parse().unwrap(), "en", json!(title)),
            FieldValueRow::new("title".parse().unwrap(), "de", json!(format!("{title} (de)"))),
        ],
        expected_version_id: None,
        created_at: Utc::now(),
    }
}

/// Collection with a unique path so runs never collide.
async fn collection(store: &PgStore) -> Uuid {
    let path = format!("test-{}", Uuid::now_v7().simple());
    store.create_collection(&path, &schema()).await.unwrap().id
}

#[tokio::test]
async fn health_check_succeeds() {
    let Some(store) = store().await else { return };
    store.health_check().await.unwrap();
}

#[tokio::test]
async fn versions_round_trip_through_rows() {
    let Some(store) = store().await else { return };
    let cid = collection(&store).await;

    let created = store
        .create_document_version(new_version(cid, None, "Hello"))
        .await
        .unwrap();
    assert_eq!(created.field_count, 2);

    let doc = store
        .document_by_id(cid, created.version.document_id, &ReadOptions::tree("all"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        doc.fields(),
        Some(&json!({"title": {"en": "Hello", "de": "Hello (de)"}}))
    );

    let german = store
        .document_by_path(cid, "hello", &ReadOptions::tree("de"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(german.fields(), Some(&json!({"title": "Hello (de)"})));

    store.delete_collection(cid).await.unwrap();
}

#[tokio::test]
async fn stale_version_is_rejected() {
    let Some(store) = store().await else { return };
    let cid = collection(&store).await;

    let first = store
        .create_document_version(new_version(cid, None, "One"))
        .await
        .unwrap();
    let doc = first.version.document_id;
    let mut second = new_version(cid, Some(doc), "Two");
    second.expected_version_id = Some(first.version.version_id);
    let second = store.create_document_version(second).await.unwrap();

    let mut stale = new_version(cid, Some(doc), "Three");
    stale.expected_version_id = Some(first.version.version_id);
    match store.create_document_version(stale).await.unwrap_err() {
        StorageError::VersionConflict { current, supplied } => {
            assert_eq!(current, second.version.version_id);
            assert_eq!(supplied, first.version.version_id);
        }
        other => panic!("unexpected {other:?}"),
    }

    let history = store
        .document_history(cid, doc, &PageRequest::default())
        .await
        .unwrap();
    assert_eq!(history.meta.total, 2);

    store.delete_collection(cid).await.unwrap();
}

#[tokio::test]
async fn publishing_and_soft_delete() {
    let Some(store) = store().await else { return };
    let cid = collection(&store).await;

    let first = store
        .create_document_version(new_version(cid, None, "Alpha"))
        .await
        .unwrap();
    let doc = first.version.document_id;
    let second = store
        .create_document_version(new_version(cid, Some(doc), "Alpha"))
        .await
        .unwrap();
    store
        .set_document_status(first.version.version_id, "published")
        .await
        .unwrap();
    store
        .set_document_status(second.version.version_id, "published")
        .await
        .unwrap();

    let archived = store
        .archive_published_versions(doc, "published", "archived", Some(second.version.version_id))
        .await
        .unwrap();
    assert_eq!(archived, 1);
    let live = store
        .published_version(cid, doc, "published")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(live.version_id, second.version.version_id);
    assert_eq!(
        store.document_counts_by_status(cid).await.unwrap(),
        vec![StatusCount {
            status: "published".into(),
            count: 1
        }]
    );

    assert_eq!(store.soft_delete_document(doc).await.unwrap(), 2);
    assert!(store
        .document_by_id(cid, doc, &ReadOptions::rows())
        .await
        .unwrap()
        .is_none());
    let old = store
        .document_by_version(first.version.version_id, &ReadOptions::rows())
        .await
        .unwrap()
        .unwrap();
    assert!(old.version.is_deleted);
    assert_eq!(old.rows().map(<[FieldValueRow]>::len), Some(2));

    store.delete_collection(cid).await.unwrap();
}

#[tokio::test]
async fn paging_filters_and_orders() {
    let Some(store) = store().await else { return };
    let cid = collection(&store).await;
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
    assert_eq!(page.meta.total, 3);
    assert_eq!(page.meta.total_pages, 2);

    let request = PageRequest {
        query: Some("MM".into()),
        ..PageRequest::default()
    };
    let page = store.documents_by_page(cid, &request).await.unwrap();
    assert_eq!(page.items.len(), 1);
    assert_eq!(page.items[0].version.path, "gamma");

    let path = store.collection_by_id(cid).await.unwrap().unwrap().path;
    let dup = store.create_collection(&path, &schema()).await.unwrap_err();
    assert!(matches!(dup, StorageError::CollectionExists(p) if p == path));

    store.delete_collection(cid).await.unwrap();
    assert!(store.collection_by_id(cid).await.unwrap().is_none());
}
