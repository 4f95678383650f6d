use serde_json::{Map, Value};

use crate::schema::{CollectionSchema, FieldNode, BLOCK_TYPE_KEY, ELEMENT_ID_KEY};

/// Overlay a single-locale view onto an all-locales tree.
///
/// Structure (which groups and elements exist, element order, non-localized
/// leaves) comes from `view`. Localized leaves take `locale`'s value from
/// `view` and keep every other locale from the element in `base` with the
/// same stable id.
pub fn merge_locale(schema: &CollectionSchema, base: &Value, view: &Value, locale: &str) -> Value {
    let empty = Map::new();
    let base = base.as_object().unwrap_or(&empty);
    let view = view.as_object().unwrap_or(&empty);
    Value::Object(merge_record(schema.fields(), Some(base), view, locale))
}

fn merge_record(
    fields: &[FieldNode],
    base: Option<&Map<String, Value>>,
    view: &Map<String, Value>,
    locale: &str,
) -> Map<String, Value> {
    let mut out = Map::new();
    let empty = Map::new();
    for field in fields {
        let name = field.name();
        let from_view = view.get(name).filter(|v| !v.is_null());
        let from_base = base.and_then(|b| b.get(name));

        let merged = match field {
            FieldNode::Scalar(s) if s.localized => {
                let mut by_locale = from_base
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                match from_view {
                    Some(v) => {
                        by_locale.insert(locale.to_string(), v.clone());
                    }
                    None => {
                        by_locale.remove(locale);
                    }
                }
                (!by_locale.is_empty()).then_some(Value::Object(by_locale))
            }
            FieldNode::Scalar(_) => from_view.cloned(),
            FieldNode::Group(g) => {
                let child_view = from_view.and_then(Value::as_object).unwrap_or(&empty);
                let child_base = from_base.and_then(Value::as_object);
                let record = merge_record(&g.fields, child_base, child_view, locale);
                let kept_empty = from_view.is_some_and(Value::is_object);
                (!record.is_empty() || kept_empty).then_some(Value::Object(record))
            }
            FieldNode::Array(a) => from_view.and_then(Value::as_array).map(|items| {
                let base_items = from_base.and_then(Value::as_array);
                Value::Array(
                    items
                        .iter()
                        .filter_map(Value::as_object)
                        .map(|item| {
                            let matched = find_element(base_items, item);
                            merge_element(&a.fields, matched, item, locale)
                        })
                        .collect(),
                )
            }),
            FieldNode::Blocks(b) => from_view.and_then(Value::as_array).map(|items| {
                let base_items = from_base.and_then(Value::as_array);
                Value::Array(
                    items
                        .iter()
                        .filter_map(Value::as_object)
                        .filter_map(|item| {
                            let block_type = item.get(BLOCK_TYPE_KEY)?.as_str()?;
                            let bt = b.block_type(block_type)?;
                            let matched = find_element(base_items, item).filter(|m| {
                                m.get(BLOCK_TYPE_KEY).and_then(Value::as_str) == Some(block_type)
                            });
                            Some(merge_element(&bt.fields, matched, item, locale))
                        })
                        .collect(),
                )
            }),
        };

        if let Some(value) = merged {
            out.insert(name.to_string(), value);
        }
    }
    out
}

fn find_element<'b>(
    base_items: Option<&'b Vec<Value>>,
    item: &Map<String, Value>,
) -> Option<&'b Map<String, Value>> {
    let id = item.get(ELEMENT_ID_KEY)?;
    base_items?
        .iter()
        .filter_map(Value::as_object)
        .find(|candidate| candidate.get(ELEMENT_ID_KEY) == Some(id))
}

fn merge_element(
    fields: &[FieldNode],
    base: Option<&Map<String, Value>>,
    view: &Map<String, Value>,
    locale: &str,
) -> Value {
    let mut record = merge_record(fields, base, view, locale);
    for key in [ELEMENT_ID_KEY, BLOCK_TYPE_KEY] {
        if let Some(v) = view.get(key) {
            record.insert(key.to_string(), v.clone());
        }
    }
    Value::Object(record)
}
