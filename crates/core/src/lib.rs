//! Structured-document storage engine.
//!
//! Documents are nested JSON trees described by a [`schema::CollectionSchema`].
//! They are stored as immutable versions of flat, address-keyed rows, edited
//! through structural patches and moved through a per-collection workflow.

pub mod document;
pub mod events;
pub mod ids;
pub mod lifecycle;
pub mod locale;
pub mod patch;
pub mod schema;
pub mod storage;
pub mod transform;
pub mod workflow;

pub use locale::{ContentLocales, LocaleScope, ALL_LOCALES};
