use std::fs;
use std::path::{Path, PathBuf};

use content_store_core::lifecycle::{CollectionDefinition, RegistryError, SchemaRegistry};
use content_store_core::schema::{CollectionSchema, FieldNode, SchemaError};
use content_store_core::workflow::Workflow;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum SchemaFileError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid collection file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid schema in {path}: {source}")]
    Schema { path: PathBuf, source: SchemaError },
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// On-disk collection definition. The collection path is the file stem.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CollectionFile {
    fields: Vec<FieldNode>,
    #[serde(default)]
    path_field: Option<String>,
    /// Adds a `needs_review` step between draft and published.
    #[serde(default)]
    review: bool,
}

fn parse_collection(
    collection: &str,
    file: &Path,
    raw: &str,
) -> Result<CollectionDefinition, SchemaFileError> {
    let parsed: CollectionFile = serde_json::from_str(raw).map_err(|source| SchemaFileError::Parse {
        path: file.to_path_buf(),
        source,
    })?;
    let schema = CollectionSchema::new(parsed.fields).map_err(|source| SchemaFileError::Schema {
        path: file.to_path_buf(),
        source,
    })?;

    let mut definition = CollectionDefinition::new(collection, schema);
    if parsed.review {
        definition = definition.with_workflow(Workflow::with_review());
    }
    if let Some(field) = parsed.path_field {
        definition = definition.with_path_field(field);
    }
    Ok(definition)
}

/// Register every `*.json` file in `dir`, in file-name order.
pub fn load_registry(dir: &Path) -> Result<SchemaRegistry, SchemaFileError> {
    let io_err = |source| SchemaFileError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_err)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?
        .into_iter()
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut registry = SchemaRegistry::new();
    for file in files {
        let Some(collection) = file.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let raw = fs::read_to_string(&file).map_err(|source| SchemaFileError::Io {
            path: file.clone(),
            source,
        })?;
        registry.register(parse_collection(collection, &file, &raw)?)?;
        debug!(collection, file = %file.display(), "collection schema loaded");
    }
    Ok(registry)
}
