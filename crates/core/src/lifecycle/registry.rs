use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use super::hooks::CollectionHooks;
use crate::schema::{CollectionSchema, FieldAddress, FieldNode, ScalarKind, SchemaError, SchemaTarget};
use crate::workflow::Workflow;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("collection path `{0}` must be lowercase letters, digits, `-` or `_`")]
    InvalidPath(String),
    #[error("collection `{0}` is already registered")]
    Duplicate(String),
    #[error("path field of `{collection}`: {source}")]
    PathField {
        collection: String,
        #[source]
        source: SchemaError,
    },
    #[error("path field `{field}` of `{collection}` must be a text field")]
    PathFieldNotText { collection: String, field: String },
}

/// Everything the lifecycle service needs to know about one collection.
#[derive(Debug, Clone)]
pub struct CollectionDefinition {
    path: String,
    schema: CollectionSchema,
    workflow: Workflow,
    hooks: CollectionHooks,
    path_field: Option<String>,
}

impl CollectionDefinition {
    pub fn new(path: impl Into<String>, schema: CollectionSchema) -> Self {
        Self {
            path: path.into(),
            schema,
            workflow: Workflow::default(),
            hooks: CollectionHooks::default(),
            path_field: None,
        }
    }

    pub fn with_workflow(mut self, workflow: Workflow) -> Self {
        self.workflow = workflow;
        self
    }

    pub fn with_hooks(mut self, hooks: CollectionHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Top-level text field whose slug becomes the document path.
    pub fn with_path_field(mut self, field: impl Into<String>) -> Self {
        self.path_field = Some(field.into());
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn schema(&self) -> &CollectionSchema {
        &self.schema
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn hooks(&self) -> &CollectionHooks {
        &self.hooks
    }

    pub fn path_field(&self) -> Option<&str> {
        self.path_field.as_deref()
    }

    fn validate(&self) -> Result<(), RegistryError> {
        let valid = !self.path.is_empty()
            && self
                .path
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');
        if !valid {
            return Err(RegistryError::InvalidPath(self.path.clone()));
        }
        let Some(field) = &self.path_field else {
            return Ok(());
        };
        let address = FieldAddress::root().field(field);
        let target = self
            .schema
            .resolve(&address)
            .map_err(|source| RegistryError::PathField {
                collection: self.path.clone(),
                source,
            })?;
        match target {
            SchemaTarget::Field(FieldNode::Scalar(scalar)) if scalar.kind == ScalarKind::Text => {
                Ok(())
            }
            _ => Err(RegistryError::PathFieldNotText {
                collection: self.path.clone(),
                field: field.clone(),
            }),
        }
    }
}

/// Collection definitions keyed by path.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    collections: BTreeMap<String, Arc<CollectionDefinition>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, definition: CollectionDefinition) -> Result<(), RegistryError> {
        definition.validate()?;
        if self.collections.contains_key(definition.path()) {
            return Err(RegistryError::Duplicate(definition.path.clone()));
        }
        self.collections
            .insert(definition.path.clone(), Arc::new(definition));
        Ok(())
    }

    /// Builder-style [`register`](Self::register).
    pub fn with(mut self, definition: CollectionDefinition) -> Result<Self, RegistryError> {
        self.register(definition)?;
        Ok(self)
    }

    pub fn get(&self, path: &str) -> Option<Arc<CollectionDefinition>> {
        self.collections.get(path).cloned()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CollectionDefinition> {
        self.collections.values().map(Arc::as_ref)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}
