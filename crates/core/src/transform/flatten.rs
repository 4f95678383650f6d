use std::collections::HashSet;

use serde_json::{json, Map, Value};
use tracing::warn;

use super::row::FieldValueRow;
use crate::ids::IdGenerator;
use crate::locale::{ContentLocales, LocaleScope, ALL_LOCALES};
use crate::schema::{
    CollectionSchema, FieldAddress, FieldNode, ScalarField, BLOCK_TYPE_KEY, ELEMENT_ID_KEY,
};

/// Rows produced by [`flatten_checked`] plus the addresses whose value did
/// not fit its schema node and was left out.
#[derive(Debug, Default)]
pub struct Flattened {
    pub rows: Vec<FieldValueRow>,
    pub mismatches: Vec<FieldAddress>,
}

impl Flattened {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Flatten a document tree into address-keyed rows.
///
/// Walks the schema, not the document: keys the schema does not know are
/// ignored, and values whose shape does not fit their node are skipped with
/// a warning. Absent and `null` leaves produce no rows. Elements without a
/// stable id receive a fresh one from `ids`. An empty list, or a group with
/// nothing in it, is kept as a single row holding `[]` or `{}` at the
/// container's address.
pub fn flatten(
    doc: &Value,
    schema: &CollectionSchema,
    scope: &LocaleScope,
    locales: &ContentLocales,
    ids: &dyn IdGenerator,
) -> Vec<FieldValueRow> {
    flatten_checked(doc, schema, scope, locales, ids).rows
}

/// Like [`flatten`], but also reports every address that was skipped because
/// its value had the wrong shape. Write paths refuse to persist when the
/// list is non-empty.
pub fn flatten_checked(
    doc: &Value,
    schema: &CollectionSchema,
    scope: &LocaleScope,
    locales: &ContentLocales,
    ids: &dyn IdGenerator,
) -> Flattened {
    let mut flattener = Flattener {
        scope,
        locales,
        ids,
        out: Flattened::default(),
    };
    match doc.as_object() {
        Some(map) => flattener.record(schema.fields(), map, &FieldAddress::root()),
        None => flattener.mismatch(FieldAddress::root(), "document is not an object"),
    }
    flattener.out
}

/// Addresses in `doc` whose value does not fit `schema` under `scope`.
pub fn shape_mismatches(
    doc: &Value,
    schema: &CollectionSchema,
    scope: &LocaleScope,
    locales: &ContentLocales,
) -> Vec<FieldAddress> {
    flatten_checked(doc, schema, scope, locales, &NoIds).mismatches
}

/// Shape checks never persist rows, so minted ids are never seen.
struct NoIds;

impl IdGenerator for NoIds {
    fn next_id(&self) -> String {
        String::new()
    }
}

struct Flattener<'a> {
    scope: &'a LocaleScope,
    locales: &'a ContentLocales,
    ids: &'a dyn IdGenerator,
    out: Flattened,
}

impl Flattener<'_> {
    fn record(&mut self, fields: &[FieldNode], map: &Map<String, Value>, at: &FieldAddress) {
        for field in fields {
            let Some(value) = map.get(field.name()).filter(|v| !v.is_null()) else {
                continue;
            };
            let here = at.field(field.name());
            match field {
                FieldNode::Scalar(s) => self.leaf(s, value, here),
                FieldNode::Group(g) => {
                    let Some(child) = value.as_object() else {
                        self.mismatch(here, "group value is not an object");
                        continue;
                    };
                    let before = self.out.rows.len();
                    self.record(&g.fields, child, &here);
                    if self.out.rows.len() == before {
                        self.push(here, ALL_LOCALES, json!({}));
                    }
                }
                FieldNode::Array(a) => {
                    let Some(items) = value.as_array() else {
                        self.mismatch(here, "array value is not a list");
                        continue;
                    };
                    if items.is_empty() {
                        self.push(here, ALL_LOCALES, json!([]));
                        continue;
                    }
                    let mut seen = HashSet::new();
                    let mut position = 0;
                    for (i, item) in items.iter().enumerate() {
                        let Some(element) = item.as_object() else {
                            self.mismatch(here.index(i), "array element is not an object");
                            continue;
                        };
                        let id = self.element_id(element, &mut seen, &here);
                        let occurrence = here.index(position);
                        self.push(occurrence.clone(), ALL_LOCALES, json!({ ELEMENT_ID_KEY: id }));
                        self.record(&a.fields, element, &occurrence);
                        position += 1;
                    }
                }
                FieldNode::Blocks(b) => {
                    let Some(items) = value.as_array() else {
                        self.mismatch(here, "blocks value is not a list");
                        continue;
                    };
                    if items.is_empty() {
                        self.push(here, ALL_LOCALES, json!([]));
                        continue;
                    }
                    let mut seen = HashSet::new();
                    let mut position = 0;
                    for (i, item) in items.iter().enumerate() {
                        let Some(element) = item.as_object() else {
                            self.mismatch(here.index(i), "block is not an object");
                            continue;
                        };
                        let block_type = element.get(BLOCK_TYPE_KEY).and_then(Value::as_str);
                        let Some(bt) = block_type.and_then(|t| b.block_type(t)) else {
                            self.mismatch(here.index(i), "unknown block type");
                            continue;
                        };
                        let id = self.element_id(element, &mut seen, &here);
                        let occurrence = here.index(position);
                        self.push(
                            occurrence.clone(),
                            ALL_LOCALES,
                            json!({ ELEMENT_ID_KEY: id, BLOCK_TYPE_KEY: bt.name }),
                        );
                        self.record(&bt.fields, element, &occurrence.field(&bt.name));
                        position += 1;
                    }
                }
            }
        }
    }

    fn leaf(&mut self, field: &ScalarField, value: &Value, address: FieldAddress) {
        let codes = field.locales_for(self.locales);
        let scope = self.scope;
        match scope {
            _ if !field.localized => {
                for code in codes {
                    self.push(address.clone(), code, value.clone());
                }
            }
            LocaleScope::Locale(code) => self.push(address, code.as_str(), value.clone()),
            LocaleScope::All => {
                let Some(by_locale) = value.as_object() else {
                    self.mismatch(address, "localized value is not a locale map");
                    return;
                };
                for code in by_locale.keys() {
                    if !self.locales.contains(code) {
                        warn!(%address, locale = %code, "value for unconfigured locale dropped");
                    }
                }
                for code in codes {
                    if let Some(v) = by_locale.get(&code).filter(|v| !v.is_null()) {
                        self.push(address.clone(), code, v.clone());
                    }
                }
            }
        }
    }

    fn push(&mut self, address: FieldAddress, locale: impl Into<String>, value: Value) {
        self.out.rows.push(FieldValueRow::new(address, locale, value));
    }

    fn mismatch(&mut self, address: FieldAddress, reason: &str) {
        warn!(%address, reason, "value does not fit its schema node; skipped");
        self.out.mismatches.push(address);
    }

    /// Reuse the element's id, minting one when absent or already taken
    /// within the same container.
    fn element_id(
        &self,
        element: &Map<String, Value>,
        seen: &mut HashSet<String>,
        container: &FieldAddress,
    ) -> String {
        let existing = match element.get(ELEMENT_ID_KEY) {
            Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        let id = match existing {
            Some(id) if !seen.contains(&id) => id,
            Some(id) => {
                warn!(address = %container, %id, "duplicate element id replaced");
                self.ids.next_id()
            }
            None => self.ids.next_id(),
        };
        seen.insert(id.clone());
        id
    }
}
