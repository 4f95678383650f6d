//! Document path derivation.
//!
//! A collection may name a text field whose value, slugified, becomes the
//! document's path. Without one (or when the field is empty) the document id
//! is used.

use serde_json::Value;
use uuid::Uuid;

/// Lowercase ASCII slug: alphanumerics kept, runs of anything else become a
/// single `-`, no leading or trailing dashes.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

/// Pick the path for a document from its all-locales tree.
pub fn derive_path(
    fields: &Value,
    path_field: Option<&str>,
    default_locale: &str,
    document_id: Option<Uuid>,
) -> Option<String> {
    let from_field = path_field
        .and_then(|name| fields.get(name))
        .and_then(|value| match value {
            Value::String(s) => Some(s.as_str()),
            // Localized text field: prefer the default locale.
            Value::Object(by_locale) => by_locale
                .get(default_locale)
                .or_else(|| by_locale.values().next())
                .and_then(Value::as_str),
            _ => None,
        })
        .map(slugify)
        .filter(|slug| !slug.is_empty());
    from_field.or_else(|| document_id.map(|id| id.to_string()))
}
