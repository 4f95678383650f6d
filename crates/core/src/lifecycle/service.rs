//! Document lifecycle operations.
//!
//! Each call is one short sequence: resolve the collection, read the current
//! version, transform in memory, run before-hooks, write once, then publish
//! an event and run after-hooks. Every rejection happens before the write.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::context::LifecycleContext;
use super::error::{LifecycleError, LifecycleResult};
use super::hooks::{HookContext, HookStage};
use super::registry::CollectionDefinition;
use crate::document::{
    derive_path, DocumentContent, DocumentRecord, DocumentVersion, VersionAction,
};
use crate::events::{DocumentChange, DocumentEvent};
use crate::locale::{LocaleScope, ALL_LOCALES};
use crate::patch::apply_patches_in_scope;
use crate::schema::FieldAddress;
use crate::storage::{
    CollectionRecord, CreatedVersion, NewDocumentVersion, Page, PageRequest, ReadOptions,
    StatusCount,
};
use crate::transform::{
    flatten, flatten_checked, merge_locale, reconstruct, shape_mismatches, FieldValueRow,
};
use crate::workflow::TransitionKind;

/// Result of a content write.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentWrite {
    pub version: DocumentVersion,
    pub field_count: usize,
    /// The stored tree in the locale of the request, element ids included.
    pub data: Value,
    /// Older published versions archived because this one is published.
    pub archived: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub version: DocumentVersion,
    pub previous_status: String,
    pub archived: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpublishOutcome {
    pub archived_count: u64,
    pub version_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransition {
    pub status: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verb: Option<String>,
    pub kind: TransitionKind,
}

struct Current {
    version: DocumentVersion,
    rows: Vec<FieldValueRow>,
}

fn scope_for(ctx: &LifecycleContext, locale: &str) -> LifecycleResult<LocaleScope> {
    let scope = LocaleScope::parse(locale);
    if let LocaleScope::Locale(code) = &scope {
        if !ctx.locales.contains(code) {
            return Err(LifecycleError::UnknownLocale(code.clone()));
        }
    }
    Ok(scope)
}

async fn load_current(
    ctx: &LifecycleContext,
    definition: &CollectionDefinition,
    collection_id: Uuid,
    document_id: Uuid,
) -> LifecycleResult<Current> {
    let DocumentRecord { version, content } = ctx
        .storage
        .document_by_id(collection_id, document_id, &ReadOptions::rows())
        .await?
        .ok_or(LifecycleError::DocumentNotFound(document_id))?;
    let rows = match content {
        DocumentContent::Rows(rows) => rows,
        DocumentContent::Fields(tree) => flatten(
            &tree,
            definition.schema(),
            &LocaleScope::All,
            &ctx.locales,
            ctx.ids.as_ref(),
        ),
    };
    Ok(Current { version, rows })
}

fn invalid_shape(mismatches: Vec<FieldAddress>) -> LifecycleError {
    let fields: Vec<String> = mismatches.iter().map(ToString::to_string).collect();
    warn!(fields = ?fields, "document rejected: values do not fit the schema");
    LifecycleError::InvalidShape { fields }
}

/// Reject `data` when any of its values would be dropped on flattening.
fn check_shape(
    ctx: &LifecycleContext,
    definition: &CollectionDefinition,
    scope: &LocaleScope,
    data: &Value,
) -> LifecycleResult<()> {
    let mismatches = shape_mismatches(data, definition.schema(), scope, &ctx.locales);
    if mismatches.is_empty() {
        Ok(())
    } else {
        Err(invalid_shape(mismatches))
    }
}

/// Turn a tree written in `scope` into all-locale rows. Single-locale trees
/// are merged onto `current` so the other locales survive.
fn to_rows(
    ctx: &LifecycleContext,
    definition: &CollectionDefinition,
    scope: &LocaleScope,
    data: &Value,
    current: Option<&[FieldValueRow]>,
) -> LifecycleResult<(Vec<FieldValueRow>, Value)> {
    let all = match scope {
        LocaleScope::All => data.clone(),
        LocaleScope::Locale(code) => {
            let base = current
                .map(|rows| reconstruct(rows, ALL_LOCALES))
                .unwrap_or_else(|| Value::Object(Map::new()));
            merge_locale(definition.schema(), &base, data, code)
        }
    };
    let flattened = flatten_checked(
        &all,
        definition.schema(),
        &LocaleScope::All,
        &ctx.locales,
        ctx.ids.as_ref(),
    );
    if !flattened.is_clean() {
        return Err(invalid_shape(flattened.mismatches));
    }
    Ok((flattened.rows, all))
}

fn warn_missing(definition: &CollectionDefinition, data: &Value) {
    let missing = definition.schema().required_missing(data);
    if !missing.is_empty() {
        let fields: Vec<String> = missing.iter().map(ToString::to_string).collect();
        warn!(collection = definition.path(), missing = ?fields, "required fields missing");
    }
}

async fn before(definition: &CollectionDefinition, hook: &HookContext<'_>) -> LifecycleResult<()> {
    definition.hooks().run(hook).await.map_err(|source| {
        debug!(stage = %hook.stage, error = %source, "operation aborted by hook");
        LifecycleError::Hook {
            stage: hook.stage,
            source,
        }
    })
}

async fn after(
    definition: &CollectionDefinition,
    hook: &HookContext<'_>,
    document_id: Uuid,
) -> LifecycleResult<()> {
    definition.hooks().run(hook).await.map_err(|source| {
        error!(stage = %hook.stage, %document_id, error = %source, "hook failed after write");
        LifecycleError::AfterHook {
            stage: hook.stage,
            document_id,
            version_id: hook.version_id,
            source,
        }
    })
}

/// Persist a version and, when it lands published, retire older published
/// versions of the same document.
async fn commit(
    ctx: &LifecycleContext,
    definition: &CollectionDefinition,
    new: NewDocumentVersion,
) -> LifecycleResult<(CreatedVersion, u64)> {
    let created = ctx.storage.create_document_version(new).await?;
    let workflow = definition.workflow();
    let archived = if created.version.status == workflow.published_status() {
        ctx.storage
            .archive_published_versions(
                created.version.document_id,
                workflow.published_status(),
                workflow.archived_status(),
                Some(created.version.version_id),
            )
            .await?
    } else {
        0
    };
    Ok((created, archived))
}

/// Create a new document. `status` defaults to the workflow's default status.
#[instrument(skip_all, fields(collection = %collection, locale = %locale))]
pub async fn create_document(
    ctx: &LifecycleContext,
    collection: &str,
    mut data: Value,
    status: Option<&str>,
    locale: &str,
) -> LifecycleResult<DocumentWrite> {
    let (definition, record) = ctx.collection(collection).await?;
    let scope = scope_for(ctx, locale)?;
    let workflow = definition.workflow();
    let status = status.unwrap_or(workflow.default_status()).to_string();
    if !workflow.contains(&status) {
        return Err(LifecycleError::InvalidTransition {
            from: String::new(),
            to: status.clone(),
            reason: format!("`{status}` is not a status of this workflow"),
        });
    }

    let defaults = definition
        .schema()
        .apply_defaults(
            &mut data,
            &scope,
            &ctx.locales,
            ctx.clock.as_ref(),
            ctx.ids.as_ref(),
        )
        .await;
    warn_missing(&definition, &data);
    check_shape(ctx, &definition, &scope, &data)?;

    let mut hook = HookContext::new(HookStage::BeforeCreate, collection, locale);
    hook.data = Some(&data);
    hook.status = Some(status.as_str());
    before(&definition, &hook).await?;

    let (rows, all) = to_rows(ctx, &definition, &scope, &data, None)?;
    let written = reconstruct(&rows, scope.as_str());
    let new = NewDocumentVersion {
        document_id: None,
        collection_id: record.id,
        action: VersionAction::Create,
        path: derive_path(&all, definition.path_field(), ctx.locales.default_locale(), None),
        status: status.clone(),
        rows,
        expected_version_id: None,
        created_at: ctx.clock.now(),
    };
    let (created, archived) = commit(ctx, &definition, new).await?;
    let version = created.version;
    info!(
        document_id = %version.document_id,
        version_id = %version.version_id,
        fields = created.field_count,
        defaults,
        "document created"
    );
    ctx.emit(
        DocumentEvent::new(DocumentChange::Created, collection, version.document_id, version.created_at)
            .version(version.version_id)
            .status(version.status.as_str()),
    );

    let mut hook = hook.at(HookStage::AfterCreate);
    hook.document_id = Some(version.document_id);
    hook.version_id = Some(version.version_id);
    hook.data = Some(&written);
    after(&definition, &hook, version.document_id).await?;

    Ok(DocumentWrite {
        version,
        field_count: created.field_count,
        data: written,
        archived,
    })
}

/// Write a new version carrying `data` as the full replacement content.
/// The status is kept unless `status` names a valid transition.
#[instrument(skip_all, fields(collection = %collection, document_id = %document_id, locale = %locale))]
pub async fn update_document(
    ctx: &LifecycleContext,
    collection: &str,
    document_id: Uuid,
    data: Value,
    status: Option<&str>,
    locale: &str,
) -> LifecycleResult<DocumentWrite> {
    let (definition, record) = ctx.collection(collection).await?;
    let scope = scope_for(ctx, locale)?;
    let current = load_current(ctx, &definition, record.id, document_id).await?;
    let status = match status {
        Some(next) => {
            definition
                .workflow()
                .validate_status_transition(&current.version.status, next)?;
            next.to_string()
        }
        None => current.version.status.clone(),
    };
    warn_missing(&definition, &data);
    check_shape(ctx, &definition, &scope, &data)?;
    let original = reconstruct(&current.rows, scope.as_str());

    let mut hook = HookContext::new(HookStage::BeforeUpdate, collection, locale);
    hook.document_id = Some(document_id);
    hook.version_id = Some(current.version.version_id);
    hook.data = Some(&data);
    hook.original = Some(&original);
    hook.status = Some(status.as_str());
    hook.previous_status = Some(current.version.status.as_str());
    before(&definition, &hook).await?;

    let (rows, all) = to_rows(ctx, &definition, &scope, &data, Some(&current.rows))?;
    let written = reconstruct(&rows, scope.as_str());
    let new = NewDocumentVersion {
        document_id: Some(document_id),
        collection_id: record.id,
        action: VersionAction::Update,
        path: derive_path(
            &all,
            definition.path_field(),
            ctx.locales.default_locale(),
            Some(document_id),
        ),
        status: status.clone(),
        rows,
        // Other locales were merged from this version.
        expected_version_id: Some(current.version.version_id),
        created_at: ctx.clock.now(),
    };
    let (created, archived) = commit(ctx, &definition, new).await?;
    let version = created.version;
    info!(
        version_id = %version.version_id,
        fields = created.field_count,
        archived,
        "document updated"
    );
    ctx.emit(
        DocumentEvent::new(DocumentChange::Updated, collection, document_id, version.created_at)
            .version(version.version_id)
            .previous(Some(current.version.version_id))
            .status(version.status.as_str()),
    );

    let mut hook = hook.at(HookStage::AfterUpdate);
    hook.version_id = Some(version.version_id);
    hook.data = Some(&written);
    after(&definition, &hook, document_id).await?;

    Ok(DocumentWrite {
        version,
        field_count: created.field_count,
        data: written,
        archived,
    })
}

/// Apply a patch batch to the current version and store the result as a new
/// version at the workflow's default status. Any rejected patch aborts the
/// whole batch.
#[instrument(skip_all, fields(collection = %collection, document_id = %document_id, locale = %locale, patches = patches.len()))]
pub async fn update_document_with_patches(
    ctx: &LifecycleContext,
    collection: &str,
    document_id: Uuid,
    patches: &[Value],
    document_version_id: Option<Uuid>,
    locale: &str,
) -> LifecycleResult<DocumentWrite> {
    let (definition, record) = ctx.collection(collection).await?;
    let scope = scope_for(ctx, locale)?;
    let current = load_current(ctx, &definition, record.id, document_id).await?;
    if let Some(supplied) = document_version_id {
        if supplied != current.version.version_id {
            debug!(current = %current.version.version_id, %supplied, "stale version supplied");
            return Err(LifecycleError::Conflict {
                current: current.version.version_id,
                supplied,
            });
        }
    }

    let original = reconstruct(&current.rows, scope.as_str());
    let outcome = apply_patches_in_scope(
        definition.schema(),
        original.clone(),
        patches,
        ctx.ids.as_ref(),
        &scope,
        &ctx.locales,
    );
    if !outcome.is_clean() {
        warn!(rejected = outcome.errors.len(), "patch batch rejected");
        return Err(LifecycleError::PatchApplication {
            errors: outcome.errors,
        });
    }
    let status = definition.workflow().default_status().to_string();

    let mut hook = HookContext::new(HookStage::BeforeUpdate, collection, locale);
    hook.document_id = Some(document_id);
    hook.version_id = Some(current.version.version_id);
    hook.data = Some(&outcome.doc);
    hook.original = Some(&original);
    hook.status = Some(status.as_str());
    hook.previous_status = Some(current.version.status.as_str());
    before(&definition, &hook).await?;

    let (rows, all) = to_rows(ctx, &definition, &scope, &outcome.doc, Some(&current.rows))?;
    let written = reconstruct(&rows, scope.as_str());
    let new = NewDocumentVersion {
        document_id: Some(document_id),
        collection_id: record.id,
        action: VersionAction::Patch,
        path: derive_path(
            &all,
            definition.path_field(),
            ctx.locales.default_locale(),
            Some(document_id),
        ),
        status: status.clone(),
        rows,
        expected_version_id: Some(current.version.version_id),
        created_at: ctx.clock.now(),
    };
    let (created, archived) = commit(ctx, &definition, new).await?;
    let version = created.version;
    info!(
        version_id = %version.version_id,
        fields = created.field_count,
        "document patched"
    );
    ctx.emit(
        DocumentEvent::new(DocumentChange::Patched, collection, document_id, version.created_at)
            .version(version.version_id)
            .previous(Some(current.version.version_id))
            .status(version.status.as_str()),
    );

    let mut hook = hook.at(HookStage::AfterUpdate);
    hook.version_id = Some(version.version_id);
    hook.data = Some(&written);
    after(&definition, &hook, document_id).await?;

    Ok(DocumentWrite {
        version,
        field_count: created.field_count,
        data: written,
        archived,
    })
}

/// Move the current version to `next` in place. No new version is written.
#[instrument(skip_all, fields(collection = %collection, document_id = %document_id, next = %next))]
pub async fn change_document_status(
    ctx: &LifecycleContext,
    collection: &str,
    document_id: Uuid,
    next: &str,
    locale: &str,
) -> LifecycleResult<StatusChange> {
    let (definition, record) = ctx.collection(collection).await?;
    let scope = scope_for(ctx, locale)?;
    let current = load_current(ctx, &definition, record.id, document_id).await?;
    let workflow = definition.workflow();
    let previous = current.version.status.clone();
    workflow.validate_status_transition(&previous, next)?;
    if previous == next {
        debug!("status unchanged");
        return Ok(StatusChange {
            version: current.version,
            previous_status: previous,
            archived: 0,
        });
    }

    let data = reconstruct(&current.rows, scope.as_str());
    let version_id = current.version.version_id;
    let mut hook = HookContext::new(HookStage::BeforeStatusChange, collection, locale);
    hook.document_id = Some(document_id);
    hook.version_id = Some(version_id);
    hook.data = Some(&data);
    hook.status = Some(next);
    hook.previous_status = Some(previous.as_str());
    before(&definition, &hook).await?;

    ctx.storage.set_document_status(version_id, next).await?;
    let archived = if next == workflow.published_status() {
        ctx.storage
            .archive_published_versions(
                document_id,
                workflow.published_status(),
                workflow.archived_status(),
                Some(version_id),
            )
            .await?
    } else {
        0
    };
    let now = ctx.clock.now();
    let mut version = current.version;
    version.status = next.to_string();
    version.updated_at = now;
    info!(%version_id, from = %previous, archived, "document status changed");
    ctx.emit(
        DocumentEvent::new(DocumentChange::StatusChanged, collection, document_id, now)
            .version(version_id)
            .status(next),
    );

    after(&definition, &hook.at(HookStage::AfterStatusChange), document_id).await?;

    Ok(StatusChange {
        version,
        previous_status: previous,
        archived,
    })
}

/// Archive the document's published version, leaving the current version
/// alone. Nothing published is not an error.
#[instrument(skip_all, fields(collection = %collection, document_id = %document_id))]
pub async fn unpublish_document(
    ctx: &LifecycleContext,
    collection: &str,
    document_id: Uuid,
) -> LifecycleResult<UnpublishOutcome> {
    let (definition, record) = ctx.collection(collection).await?;
    let workflow = definition.workflow();
    let Some(published) = ctx
        .storage
        .published_version(record.id, document_id, workflow.published_status())
        .await?
    else {
        debug!("no published version");
        return Ok(UnpublishOutcome {
            archived_count: 0,
            version_id: None,
        });
    };

    let mut hook = HookContext::new(HookStage::BeforeUnpublish, collection, ALL_LOCALES);
    hook.document_id = Some(document_id);
    hook.version_id = Some(published.version_id);
    hook.status = Some(workflow.archived_status());
    hook.previous_status = Some(workflow.published_status());
    before(&definition, &hook).await?;

    let archived_count = ctx
        .storage
        .archive_published_versions(
            document_id,
            workflow.published_status(),
            workflow.archived_status(),
            None,
        )
        .await?;
    info!(version_id = %published.version_id, archived_count, "document unpublished");
    ctx.emit(
        DocumentEvent::new(DocumentChange::Unpublished, collection, document_id, ctx.clock.now())
            .version(published.version_id)
            .status(workflow.archived_status())
            .affected(archived_count),
    );

    after(&definition, &hook.at(HookStage::AfterUnpublish), document_id).await?;

    Ok(UnpublishOutcome {
        archived_count,
        version_id: Some(published.version_id),
    })
}

/// Soft-delete every version of the document. Returns how many were flagged.
#[instrument(skip_all, fields(collection = %collection, document_id = %document_id))]
pub async fn delete_document(
    ctx: &LifecycleContext,
    collection: &str,
    document_id: Uuid,
) -> LifecycleResult<u64> {
    let (definition, record) = ctx.collection(collection).await?;
    let current = load_current(ctx, &definition, record.id, document_id).await?;
    let data = reconstruct(&current.rows, ALL_LOCALES);

    let mut hook = HookContext::new(HookStage::BeforeDelete, collection, ALL_LOCALES);
    hook.document_id = Some(document_id);
    hook.version_id = Some(current.version.version_id);
    hook.original = Some(&data);
    hook.status = Some(current.version.status.as_str());
    before(&definition, &hook).await?;

    let deleted = ctx.storage.soft_delete_document(document_id).await?;
    info!(deleted, "document deleted");
    ctx.emit(
        DocumentEvent::new(DocumentChange::Deleted, collection, document_id, ctx.clock.now())
            .affected(deleted),
    );

    after(&definition, &hook.at(HookStage::AfterDelete), document_id).await?;
    Ok(deleted)
}

/// Current version of a document, rebuilt in `locale`.
#[instrument(skip_all, fields(collection = %collection, document_id = %document_id))]
pub async fn get_document(
    ctx: &LifecycleContext,
    collection: &str,
    document_id: Uuid,
    locale: &str,
) -> LifecycleResult<DocumentRecord> {
    let (_, record) = ctx.collection(collection).await?;
    scope_for(ctx, locale)?;
    ctx.storage
        .document_by_id(record.id, document_id, &ReadOptions::tree(locale))
        .await?
        .ok_or(LifecycleError::DocumentNotFound(document_id))
}

pub async fn get_document_by_path(
    ctx: &LifecycleContext,
    collection: &str,
    path: &str,
    locale: &str,
) -> LifecycleResult<Option<DocumentRecord>> {
    let (_, record) = ctx.collection(collection).await?;
    scope_for(ctx, locale)?;
    Ok(ctx
        .storage
        .document_by_path(record.id, path, &ReadOptions::tree(locale))
        .await?)
}

#[instrument(skip_all, fields(collection = %collection, page = request.page))]
pub async fn list_documents(
    ctx: &LifecycleContext,
    collection: &str,
    request: &PageRequest,
) -> LifecycleResult<Page<DocumentRecord>> {
    let (_, record) = ctx.collection(collection).await?;
    scope_for(ctx, &request.locale)?;
    Ok(ctx.storage.documents_by_page(record.id, request).await?)
}

pub async fn document_history(
    ctx: &LifecycleContext,
    collection: &str,
    document_id: Uuid,
    request: &PageRequest,
) -> LifecycleResult<Page<DocumentRecord>> {
    let (_, record) = ctx.collection(collection).await?;
    scope_for(ctx, &request.locale)?;
    Ok(ctx
        .storage
        .document_history(record.id, document_id, request)
        .await?)
}

/// Per-status counts of current documents, in workflow order. Statuses the
/// workflow does not know come last.
pub async fn status_counts(
    ctx: &LifecycleContext,
    collection: &str,
) -> LifecycleResult<Vec<StatusCount>> {
    let (definition, record) = ctx.collection(collection).await?;
    let stored = ctx.storage.document_counts_by_status(record.id).await?;
    let mut counts: Vec<StatusCount> = definition
        .workflow()
        .statuses()
        .iter()
        .map(|status| StatusCount {
            status: status.name.clone(),
            count: stored
                .iter()
                .find(|c| c.status == status.name)
                .map_or(0, |c| c.count),
        })
        .collect();
    counts.extend(
        stored
            .into_iter()
            .filter(|c| !definition.workflow().contains(&c.status)),
    );
    Ok(counts)
}

/// Moves the workflow offers from the document's current status.
pub async fn document_transitions(
    ctx: &LifecycleContext,
    collection: &str,
    document_id: Uuid,
) -> LifecycleResult<Vec<AvailableTransition>> {
    let (definition, record) = ctx.collection(collection).await?;
    let current = load_current(ctx, &definition, record.id, document_id).await?;
    Ok(definition
        .workflow()
        .available_transitions(&current.version.status)
        .into_iter()
        .map(|t| AvailableTransition {
            status: t.status.name.clone(),
            label: t.status.label.clone(),
            verb: t.status.verb.clone(),
            kind: t.kind,
        })
        .collect())
}

/// Create storage records for registered collections that have none.
#[instrument(skip_all)]
pub async fn sync_collections(ctx: &LifecycleContext) -> LifecycleResult<Vec<CollectionRecord>> {
    let mut created = Vec::new();
    for definition in ctx.registry.iter() {
        if ctx
            .storage
            .collection_by_path(definition.path())
            .await?
            .is_some()
        {
            continue;
        }
        let record = ctx
            .storage
            .create_collection(definition.path(), definition.schema())
            .await?;
        info!(collection = %record.path, id = %record.id, "collection created in storage");
        created.push(record);
    }
    Ok(created)
}
