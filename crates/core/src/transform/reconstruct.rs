use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tracing::warn;

use super::row::FieldValueRow;
use crate::locale::ALL_LOCALES;
use crate::schema::{FieldAddress, Segment, BLOCK_TYPE_KEY, ELEMENT_ID_KEY};

/// Rebuild a document tree from flattened rows.
///
/// Needs no schema: occurrence rows say where elements are and which block
/// type they instantiate. Elements are ordered by their stored index and
/// renumbered densely, so row arrival order does not matter.
///
/// With `requested == "all"` localized leaves become `{locale: value}` maps.
/// Otherwise each localized leaf resolves to the requested locale's value and
/// is omitted when that locale has none. A row whose value is `[]` or `{}` at
/// a list or group address restores that container empty.
pub fn reconstruct(rows: &[FieldValueRow], requested: &str) -> Value {
    let mut root = Record::default();

    // Parents first, so block type segments are known before children need them.
    let mut occurrences: Vec<&FieldValueRow> =
        rows.iter().filter(|r| r.is_occurrence()).collect();
    occurrences.sort_by_key(|r| r.field_address.segments().len());

    for row in occurrences {
        let Some((container, index)) = split_occurrence(&row.field_address) else {
            continue;
        };
        let Some(list) = root.list_at(container, &row.field_address) else {
            continue;
        };
        let element = list.entry(index).or_default();
        element.id = row
            .value
            .get(ELEMENT_ID_KEY)
            .and_then(Value::as_str)
            .map(str::to_string);
        element.block_type = row
            .value
            .get(BLOCK_TYPE_KEY)
            .and_then(Value::as_str)
            .map(str::to_string);
    }

    for row in rows.iter().filter(|r| !r.is_occurrence()) {
        let localized = row.locale != ALL_LOCALES;
        let leaf = if !localized {
            Leaf::Plain(row.value.clone())
        } else if requested == ALL_LOCALES {
            Leaf::Localized(Map::from_iter([(row.locale.clone(), row.value.clone())]))
        } else if row.locale == requested {
            Leaf::Plain(row.value.clone())
        } else {
            continue;
        };
        root.set_leaf(row.field_address.segments(), leaf, &row.field_address);
    }

    root.into_value()
}

fn split_occurrence(address: &FieldAddress) -> Option<(&[Segment], usize)> {
    match address.segments().split_last() {
        Some((Segment::Index(i), container)) if !container.is_empty() => Some((container, *i)),
        _ => None,
    }
}

#[derive(Debug, Default)]
struct Record {
    fields: BTreeMap<String, Slot>,
}

#[derive(Debug)]
enum Slot {
    Leaf(Leaf),
    Record(Record),
    List(BTreeMap<usize, Element>),
}

#[derive(Debug)]
enum Leaf {
    Plain(Value),
    Localized(Map<String, Value>),
}

#[derive(Debug, Default)]
struct Element {
    id: Option<String>,
    block_type: Option<String>,
    record: Record,
}

impl Record {
    /// Find or create the element list addressed by `container`.
    fn list_at(
        &mut self,
        container: &[Segment],
        full: &FieldAddress,
    ) -> Option<&mut BTreeMap<usize, Element>> {
        let (last, parents) = container.split_last()?;
        let Segment::Field(name) = last else {
            warn!(address = %full, "nested index without field name; row skipped");
            return None;
        };
        let record = self.record_at(parents, full)?;
        let slot = record
            .fields
            .entry(name.clone())
            .or_insert_with(|| Slot::List(BTreeMap::new()));
        match slot {
            Slot::List(list) => Some(list),
            _ => {
                warn!(address = %full, "occurrence collides with a non-list field; row skipped");
                None
            }
        }
    }

    /// Walk `path` through records and elements, creating as needed.
    fn record_at(&mut self, path: &[Segment], full: &FieldAddress) -> Option<&mut Record> {
        let mut current = self;
        let mut rest = path;
        while let Some((segment, tail)) = rest.split_first() {
            let Segment::Field(name) = segment else {
                warn!(address = %full, "unexpected index; row skipped");
                return None;
            };
            match tail.first() {
                Some(Segment::Index(i)) => {
                    let slot = current
                        .fields
                        .entry(name.clone())
                        .or_insert_with(|| Slot::List(BTreeMap::new()));
                    let Slot::List(list) = slot else {
                        warn!(address = %full, "index into a non-list field; row skipped");
                        return None;
                    };
                    let element = list.entry(*i).or_default();
                    rest = &tail[1..];
                    if let Some(block_type) = &element.block_type {
                        match rest.first() {
                            Some(Segment::Field(seg)) if seg == block_type => rest = &rest[1..],
                            _ => {
                                warn!(address = %full, %block_type, "block type segment mismatch; row skipped");
                                return None;
                            }
                        }
                    }
                    current = &mut element.record;
                }
                _ => {
                    let slot = current
                        .fields
                        .entry(name.clone())
                        .or_insert_with(|| Slot::Record(Record::default()));
                    let Slot::Record(record) = slot else {
                        warn!(address = %full, "path runs through a non-record field; row skipped");
                        return None;
                    };
                    current = record;
                    rest = tail;
                }
            }
        }
        Some(current)
    }

    fn set_leaf(&mut self, segments: &[Segment], leaf: Leaf, full: &FieldAddress) {
        let Some((Segment::Field(name), parents)) = segments.split_last() else {
            return;
        };
        let Some(record) = self.record_at(parents, full) else {
            return;
        };
        let Some(existing) = record.fields.get_mut(name) else {
            record.fields.insert(name.clone(), Slot::Leaf(leaf));
            return;
        };
        match existing {
            Slot::Leaf(current) => match leaf {
                Leaf::Localized(more) => {
                    if let Leaf::Localized(map) = current {
                        map.extend(more);
                    }
                }
                plain => {
                    if matches!(current, Leaf::Localized(_)) {
                        *current = plain;
                    }
                }
            },
            _ => warn!(address = %full, "leaf collides with an existing field; row skipped"),
        }
    }

    fn into_value(self) -> Value {
        let mut map = Map::new();
        for (name, slot) in self.fields {
            let value = match slot {
                Slot::Leaf(Leaf::Plain(v)) => v,
                Slot::Leaf(Leaf::Localized(m)) => Value::Object(m),
                Slot::Record(r) => r.into_value(),
                Slot::List(list) => {
                    Value::Array(list.into_values().map(Element::into_value).collect())
                }
            };
            map.insert(name, value);
        }
        Value::Object(map)
    }
}

impl Element {
    fn into_value(self) -> Value {
        let mut value = self.record.into_value();
        if let Value::Object(map) = &mut value {
            if let Some(block_type) = self.block_type {
                map.insert(BLOCK_TYPE_KEY.to_string(), Value::String(block_type));
            }
            if let Some(id) = self.id {
                map.insert(ELEMENT_ID_KEY.to_string(), Value::String(id));
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(address: &str, locale: &str, value: Value) -> FieldValueRow {
        FieldValueRow::new(address.parse().unwrap(), locale, value)
    }

    fn rows() -> Vec<FieldValueRow> {
        vec![
            row("content[5].photoBlock.alt", "de", json!("Bild")),
            row("title", "en", json!("Hello")),
            row("reviews[3].rating", "all", json!(4)),
            row("content[5]", "all", json!({"id": "p", "blockType": "photoBlock"})),
            row("reviews[3]", "all", json!({"id": "b"})),
            row("title", "de", json!("Hallo")),
            row("reviews[1]", "all", json!({"id": "a"})),
            row("reviews[1].rating", "all", json!(3)),
            row("seo.slug", "all", json!("hello")),
            row("content[5].photoBlock.alt", "en", json!("Image")),
        ]
    }

    #[test]
    fn all_locales_produces_locale_maps_and_dense_order() {
        let doc = reconstruct(&rows(), "all");
        assert_eq!(
            doc,
            json!({
                "title": {"en": "Hello", "de": "Hallo"},
                "seo": {"slug": "hello"},
                "reviews": [{"id": "a", "rating": 3}, {"id": "b", "rating": 4}],
                "content": [{"id": "p", "blockType": "photoBlock", "alt": {"en": "Image", "de": "Bild"}}]
            })
        );
    }

    #[test]
    fn single_locale_resolves_and_omits() {
        let mut input = rows();
        input.retain(|r| !(r.field_address.to_string() == "title" && r.locale == "en"));
        let doc = reconstruct(&input, "en");
        assert!(doc.get("title").is_none());
        assert_eq!(doc["content"][0]["alt"], "Image");
        assert_eq!(doc["reviews"][1]["rating"], 4);

        let doc = reconstruct(&input, "de");
        assert_eq!(doc["title"], "Hallo");
    }

    #[test]
    fn empty_rows_give_empty_object() {
        assert_eq!(reconstruct(&[], "all"), json!({}));
    }

    #[test]
    fn element_with_only_occurrence_row_keeps_its_id() {
        let doc = reconstruct(&[row("reviews[0]", "all", json!({"id": "x"}))], "all");
        assert_eq!(doc, json!({"reviews": [{"id": "x"}]}));
    }

    #[test]
    fn mismatched_block_segment_is_skipped() {
        let doc = reconstruct(
            &[
                row("content[0]", "all", json!({"id": "p", "blockType": "photoBlock"})),
                row("content[0].videoBlock.url", "all", json!("u")),
            ],
            "all",
        );
        assert_eq!(doc, json!({"content": [{"id": "p", "blockType": "photoBlock"}]}));
    }

    #[test]
    fn empty_container_rows_restore_empty_values() {
        let input = vec![
            row("seo", "all", json!({})),
            row("reviews", "all", json!([])),
            row("content[0]", "all", json!({"id": "g", "blockType": "gridBlock"})),
            row("content[0].gridBlock.cells", "all", json!([])),
        ];
        for requested in ["all", "en"] {
            assert_eq!(
                reconstruct(&input, requested),
                json!({
                    "seo": {},
                    "reviews": [],
                    "content": [{"id": "g", "blockType": "gridBlock", "cells": []}]
                })
            );
        }
    }
}
