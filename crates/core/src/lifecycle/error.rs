use thiserror::Error;
use uuid::Uuid;

use super::hooks::{HookError, HookStage};
use super::registry::RegistryError;
use crate::patch::PatchError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("document {0} not found")]
    DocumentNotFound(Uuid),

    #[error("collection `{0}` not found")]
    CollectionNotFound(String),

    #[error("locale `{0}` is not configured")]
    UnknownLocale(String),

    #[error("document changed since it was read: current version is {current}, supplied {supplied}")]
    Conflict { current: Uuid, supplied: Uuid },

    #[error("{} patch(es) could not be applied", .errors.len())]
    PatchApplication { errors: Vec<PatchError> },

    /// Values that do not fit the collection schema; nothing was written.
    #[error("document does not fit the collection schema at {}", .fields.join(", "))]
    InvalidShape { fields: Vec<String> },

    #[error("invalid status transition: {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    /// A before-hook rejected the operation; nothing was written.
    #[error("{stage} hook failed: {source}")]
    Hook {
        stage: HookStage,
        #[source]
        source: HookError,
    },

    /// An after-hook failed. The write it followed stands.
    #[error("{stage} hook failed after document {document_id} was written: {source}")]
    AfterHook {
        stage: HookStage,
        document_id: Uuid,
        version_id: Option<Uuid>,
        #[source]
        source: HookError,
    },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for LifecycleError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::VersionConflict { current, supplied } => {
                LifecycleError::Conflict { current, supplied }
            }
            StorageError::DocumentNotFound(id) => LifecycleError::DocumentNotFound(id),
            other => LifecycleError::Storage(other),
        }
    }
}

impl From<crate::workflow::InvalidTransition> for LifecycleError {
    fn from(err: crate::workflow::InvalidTransition) -> Self {
        LifecycleError::InvalidTransition {
            from: err.from,
            to: err.to,
            reason: err.reason,
        }
    }
}

impl LifecycleError {
    /// Whether the failure happened after a write was committed.
    pub fn is_committed(&self) -> bool {
        matches!(self, LifecycleError::AfterHook { .. })
    }
}

pub type LifecycleResult<T> = Result<T, LifecycleError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_lifecycle_taxonomy() {
        let (a, b) = (Uuid::now_v7(), Uuid::now_v7());
        assert!(matches!(
            LifecycleError::from(StorageError::VersionConflict { current: a, supplied: b }),
            LifecycleError::Conflict { current, supplied } if current == a && supplied == b
        ));
        assert!(matches!(
            LifecycleError::from(StorageError::DocumentNotFound(a)),
            LifecycleError::DocumentNotFound(id) if id == a
        ));
        assert!(matches!(
            LifecycleError::from(StorageError::VersionNotFound(a)),
            LifecycleError::Storage(_)
        ));
    }

    #[test]
    fn after_hook_is_committed() {
        let err = LifecycleError::AfterHook {
            stage: HookStage::AfterCreate,
            document_id: Uuid::nil(),
            version_id: None,
            source: HookError::rejected("boom"),
        };
        assert!(err.is_committed());
        assert!(err.to_string().contains("afterCreate"));
    }

    #[test]
    fn invalid_shape_names_fields() {
        let err = LifecycleError::InvalidShape {
            fields: vec!["title".into(), "reviews[1]".into()],
        };
        assert_eq!(
            err.to_string(),
            "document does not fit the collection schema at title, reviews[1]"
        );
        assert!(!err.is_committed());
    }
}
