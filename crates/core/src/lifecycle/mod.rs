//! Document lifecycle: create, update, patch, status changes, unpublish and
//! soft delete, all driven through an explicit [`LifecycleContext`].

pub mod context;
pub mod error;
pub mod hooks;
pub mod registry;
pub mod service;

pub use context::LifecycleContext;
pub use error::{LifecycleError, LifecycleResult};
pub use hooks::{CollectionHooks, FnHook, Hook, HookContext, HookError, HookStage};
pub use registry::{CollectionDefinition, RegistryError, SchemaRegistry};
pub use service::{
    change_document_status, create_document, delete_document, document_history,
    document_transitions, get_document, get_document_by_path, list_documents, status_counts,
    sync_collections, unpublish_document, update_document, update_document_with_patches,
    AvailableTransition, DocumentWrite, StatusChange, UnpublishOutcome,
};
