use serde_json::{Map, Value};
use tracing::debug;

use super::types::{Patch, PatchError, PatchErrorReason};
use crate::ids::IdGenerator;
use crate::locale::{ContentLocales, LocaleScope};
use crate::schema::{
    find_field, BlocksField, CollectionSchema, FieldAddress, FieldNode, Segment, BLOCK_TYPE_KEY,
    ELEMENT_ID_KEY,
};
use crate::transform::shape_mismatches;

#[derive(Debug, Clone, PartialEq)]
pub struct PatchOutcome {
    pub doc: Value,
    pub errors: Vec<PatchError>,
}

impl PatchOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Apply wire patches in order. Each patch sees the effects of the ones
/// before it. A patch that fails is recorded in `errors` and leaves the
/// document as it was; the remaining patches still run.
pub fn apply_patches(
    schema: &CollectionSchema,
    doc: Value,
    patches: &[Value],
    ids: &dyn IdGenerator,
) -> PatchOutcome {
    apply_checked(schema, doc, patches, ids, |_| Ok(()))
}

/// Like [`apply_patches`], but a patch is also rejected when its result no
/// longer fits `schema` for the locale `scope` it will be stored under, such
/// as a plain value set on a localized leaf of an all-locales document.
/// Mismatches already present in `doc` are not charged to any patch.
pub fn apply_patches_in_scope(
    schema: &CollectionSchema,
    doc: Value,
    patches: &[Value],
    ids: &dyn IdGenerator,
    scope: &LocaleScope,
    locales: &ContentLocales,
) -> PatchOutcome {
    let existing = shape_mismatches(&doc, schema, scope, locales);
    apply_checked(schema, doc, patches, ids, |staged| {
        let paths: Vec<String> = shape_mismatches(staged, schema, scope, locales)
            .into_iter()
            .filter(|address| !existing.contains(address))
            .map(|address| address.to_string())
            .collect();
        if paths.is_empty() {
            Ok(())
        } else {
            Err(PatchErrorReason::ShapeMismatch { paths })
        }
    })
}

fn apply_checked(
    schema: &CollectionSchema,
    doc: Value,
    patches: &[Value],
    ids: &dyn IdGenerator,
    check: impl Fn(&Value) -> Result<(), PatchErrorReason>,
) -> PatchOutcome {
    let mut doc = doc;
    let mut errors = Vec::new();

    for (index, raw) in patches.iter().enumerate() {
        let result = Patch::decode(raw).and_then(|patch| {
            // Stage against a copy: a failing patch must not leave half a write.
            let mut staged = doc.clone();
            apply_one(schema, &mut staged, &patch, ids)?;
            check(&staged)?;
            Ok(staged)
        });
        match result {
            Ok(next) => doc = next,
            Err(reason) => {
                debug!(index, %reason, "patch rejected");
                errors.push(PatchError::new(index, raw.clone(), reason));
            }
        }
    }

    debug!(
        applied = patches.len() - errors.len(),
        rejected = errors.len(),
        "patch batch processed"
    );
    PatchOutcome { doc, errors }
}

/// Apply a single typed patch in place.
pub fn apply_one(
    schema: &CollectionSchema,
    doc: &mut Value,
    patch: &Patch,
    ids: &dyn IdGenerator,
) -> Result<(), PatchErrorReason> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| PatchErrorReason::InvalidValue {
            path: String::new(),
            message: "document is not an object".into(),
        })?;

    match patch {
        Patch::FieldSet(p) => set_field(schema.fields(), root, &p.path, p.value.clone(), ids),
        Patch::ArrayInsert(p) => {
            let (items, node) = element_list(schema.fields(), root, &p.path, true)?;
            let FieldNode::Array(_) = node else {
                return Err(wrong_container(&p.path, "an array"));
            };
            let Value::Object(mut item) = p.item.clone() else {
                return Err(PatchErrorReason::InvalidValue {
                    path: p.path.to_string(),
                    message: "array items must be objects".into(),
                });
            };
            let id = match item.get(ELEMENT_ID_KEY).and_then(Value::as_str) {
                Some(id) if !id.is_empty() => id.to_string(),
                _ => ids.next_id(),
            };
            if position_of(items, &id).is_some() {
                return Err(PatchErrorReason::DuplicateId {
                    path: p.path.to_string(),
                    id,
                });
            }
            item.insert(ELEMENT_ID_KEY.to_string(), Value::String(id));
            let at = clamp(p.index, items.len());
            items.insert(at, Value::Object(item));
            Ok(())
        }
        Patch::ArrayMove(p) => {
            let (items, _) = element_list(schema.fields(), root, &p.path, false)?;
            let from = position_of(items, &p.item_id).ok_or_else(|| not_found(&p.path, &p.item_id))?;
            let item = items.remove(from);
            let to = clamp(p.to_index, items.len());
            items.insert(to, item);
            Ok(())
        }
        Patch::ArrayRemove(p) => {
            let (items, _) = element_list(schema.fields(), root, &p.path, false)?;
            let at = position_of(items, &p.item_id).ok_or_else(|| not_found(&p.path, &p.item_id))?;
            items.remove(at);
            Ok(())
        }
        Patch::BlockAdd(p) => {
            let (items, node) = element_list(schema.fields(), root, &p.path, true)?;
            let blocks = as_blocks(node, &p.path)?;
            let bt = blocks
                .block_type(&p.block_type)
                .ok_or_else(|| PatchErrorReason::UnknownBlockType {
                    path: p.path.to_string(),
                    block_type: p.block_type.clone(),
                })?;
            let mut block = match &p.initial_value {
                Value::Null => Map::new(),
                Value::Object(map) => map.clone(),
                _ => {
                    return Err(PatchErrorReason::InvalidValue {
                        path: p.path.to_string(),
                        message: "initialValue must be an object".into(),
                    })
                }
            };
            block.insert(ELEMENT_ID_KEY.to_string(), Value::String(ids.next_id()));
            block.insert(BLOCK_TYPE_KEY.to_string(), Value::String(bt.name.clone()));
            items.push(Value::Object(block));
            Ok(())
        }
        Patch::BlockRemove(p) => {
            let (items, node) = element_list(schema.fields(), root, &p.path, false)?;
            as_blocks(node, &p.path)?;
            let at = position_of(items, &p.block_id).ok_or_else(|| not_found(&p.path, &p.block_id))?;
            items.remove(at);
            Ok(())
        }
        Patch::BlockUpdateField(p) => {
            let (items, node) = element_list(schema.fields(), root, &p.path, false)?;
            let blocks = as_blocks(node, &p.path)?;
            let at = position_of(items, &p.block_id).ok_or_else(|| not_found(&p.path, &p.block_id))?;
            let block = items[at]
                .as_object_mut()
                .ok_or_else(|| not_found(&p.path, &p.block_id))?;
            let block_type = block
                .get(BLOCK_TYPE_KEY)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let bt = blocks
                .block_type(&block_type)
                .ok_or_else(|| PatchErrorReason::UnknownBlockType {
                    path: p.path.to_string(),
                    block_type,
                })?;
            set_field(&bt.fields, block, &p.field_path, p.value.clone(), ids)
        }
    }
}

/// Write `value` at `path` below `record`, creating groups on the way.
/// `null` removes the field.
fn set_field(
    fields: &[FieldNode],
    record: &mut Map<String, Value>,
    path: &FieldAddress,
    value: Value,
    ids: &dyn IdGenerator,
) -> Result<(), PatchErrorReason> {
    let Some((Segment::Field(name), parents)) = path.segments().split_last() else {
        return Err(unresolvable(path, "path must end in a field name"));
    };
    let (record, fields) = walk_to_record(fields, record, parents, path, true)?;
    let node = find_field(fields, name).ok_or_else(|| unresolvable(path, "unknown field"))?;

    if value.is_null() {
        record.remove(name);
        return Ok(());
    }
    let value = match node {
        FieldNode::Scalar(_) => value,
        FieldNode::Group(_) => {
            if !value.is_object() {
                return Err(invalid(path, "group value must be an object"));
            }
            value
        }
        FieldNode::Array(_) => Value::Array(with_element_ids(value, path, ids, |_| Ok(()))?),
        FieldNode::Blocks(b) => Value::Array(with_element_ids(value, path, ids, |item| {
            match item.get(BLOCK_TYPE_KEY).and_then(Value::as_str) {
                Some(t) if b.block_type(t).is_some() => Ok(()),
                other => Err(PatchErrorReason::UnknownBlockType {
                    path: path.to_string(),
                    block_type: other.unwrap_or_default().to_string(),
                }),
            }
        })?),
    };
    record.insert(name.clone(), value);
    Ok(())
}

/// Ensure every element of a whole-list write is an object with a unique id.
fn with_element_ids(
    value: Value,
    path: &FieldAddress,
    ids: &dyn IdGenerator,
    check: impl Fn(&Map<String, Value>) -> Result<(), PatchErrorReason>,
) -> Result<Vec<Value>, PatchErrorReason> {
    let Value::Array(items) = value else {
        return Err(invalid(path, "list value must be an array"));
    };
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let Value::Object(mut element) = item else {
            return Err(invalid(path, "list elements must be objects"));
        };
        check(&element)?;
        let id = match element.get(ELEMENT_ID_KEY).and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => ids.next_id(),
        };
        if !seen.insert(id.clone()) {
            return Err(PatchErrorReason::DuplicateId {
                path: path.to_string(),
                id,
            });
        }
        element.insert(ELEMENT_ID_KEY.to_string(), Value::String(id));
        out.push(Value::Object(element));
    }
    Ok(out)
}

/// Walk record-by-record along `segments`. Index segments step into existing
/// elements only; after a blocks index the block type segment is optional.
fn walk_to_record<'d, 's>(
    fields: &'s [FieldNode],
    record: &'d mut Map<String, Value>,
    segments: &[Segment],
    path: &FieldAddress,
    create: bool,
) -> Result<(&'d mut Map<String, Value>, &'s [FieldNode]), PatchErrorReason> {
    let mut fields = fields;
    let mut record = record;
    let mut rest = segments;

    while let Some((segment, tail)) = rest.split_first() {
        let Segment::Field(name) = segment else {
            return Err(unresolvable(path, "index must follow a list field"));
        };
        let node = find_field(fields, name).ok_or_else(|| unresolvable(path, "unknown field"))?;
        match node {
            FieldNode::Scalar(_) => return Err(unresolvable(path, "cannot descend into a leaf")),
            FieldNode::Group(g) => {
                let slot = if create {
                    let slot = record
                        .entry(name.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if slot.is_null() {
                        *slot = Value::Object(Map::new());
                    }
                    slot
                } else {
                    record
                        .get_mut(name)
                        .ok_or_else(|| unresolvable(path, "missing group"))?
                };
                record = slot
                    .as_object_mut()
                    .ok_or_else(|| unresolvable(path, "group value is not an object"))?;
                fields = &g.fields;
                rest = tail;
            }
            FieldNode::Array(_) | FieldNode::Blocks(_) => {
                let Some((Segment::Index(i), after)) = tail.split_first() else {
                    return Err(unresolvable(path, "list field needs an element index"));
                };
                let element = record
                    .get_mut(name)
                    .and_then(Value::as_array_mut)
                    .and_then(|items| items.get_mut(*i))
                    .and_then(Value::as_object_mut)
                    .ok_or_else(|| unresolvable(path, "no element at index"))?;
                rest = after;
                fields = match node {
                    FieldNode::Array(a) => &a.fields,
                    FieldNode::Blocks(b) => {
                        let block_type = element
                            .get(BLOCK_TYPE_KEY)
                            .and_then(Value::as_str)
                            .unwrap_or_default();
                        let bt = b
                            .block_type(block_type)
                            .ok_or_else(|| unresolvable(path, "element has an unknown block type"))?;
                        if let Some((Segment::Field(seg), after_type)) = rest.split_first() {
                            if *seg == bt.name {
                                rest = after_type;
                            }
                        }
                        &bt.fields
                    }
                    _ => unreachable!("matched list kinds above"),
                };
                record = element;
            }
        }
    }
    Ok((record, fields))
}

/// Resolve the element list named by `path`, creating it (and its groups)
/// when `create` is set.
fn element_list<'d, 's>(
    fields: &'s [FieldNode],
    root: &'d mut Map<String, Value>,
    path: &FieldAddress,
    create: bool,
) -> Result<(&'d mut Vec<Value>, &'s FieldNode), PatchErrorReason> {
    let Some((Segment::Field(name), parents)) = path.segments().split_last() else {
        return Err(unresolvable(path, "path must end in a field name"));
    };
    let (record, fields) = walk_to_record(fields, root, parents, path, create)?;
    let node = find_field(fields, name).ok_or_else(|| unresolvable(path, "unknown field"))?;
    if !matches!(node, FieldNode::Array(_) | FieldNode::Blocks(_)) {
        return Err(wrong_container(path, "an array or blocks field"));
    }

    let slot = if create {
        let slot = record
            .entry(name.clone())
            .or_insert_with(|| Value::Array(Vec::new()));
        if slot.is_null() {
            *slot = Value::Array(Vec::new());
        }
        slot
    } else {
        record.get_mut(name).ok_or_else(|| unresolvable(path, "list has no elements"))?
    };
    let items = slot
        .as_array_mut()
        .ok_or_else(|| unresolvable(path, "list value is not an array"))?;
    Ok((items, node))
}

fn as_blocks<'s>(node: &'s FieldNode, path: &FieldAddress) -> Result<&'s BlocksField, PatchErrorReason> {
    match node {
        FieldNode::Blocks(b) => Ok(b),
        _ => Err(wrong_container(path, "a blocks field")),
    }
}

fn position_of(items: &[Value], id: &str) -> Option<usize> {
    items
        .iter()
        .position(|item| item.get(ELEMENT_ID_KEY).and_then(Value::as_str) == Some(id))
}

fn clamp(index: i64, len: usize) -> usize {
    usize::try_from(index.max(0)).unwrap_or(usize::MAX).min(len)
}

fn unresolvable(path: &FieldAddress, message: &str) -> PatchErrorReason {
    PatchErrorReason::Unresolvable {
        path: path.to_string(),
        message: message.to_string(),
    }
}

fn invalid(path: &FieldAddress, message: &str) -> PatchErrorReason {
    PatchErrorReason::InvalidValue {
        path: path.to_string(),
        message: message.to_string(),
    }
}

fn wrong_container(path: &FieldAddress, expected: &'static str) -> PatchErrorReason {
    PatchErrorReason::WrongContainer {
        path: path.to_string(),
        expected,
    }
}

fn not_found(path: &FieldAddress, id: &str) -> PatchErrorReason {
    PatchErrorReason::ItemNotFound {
        path: path.to_string(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialIds;
    use crate::schema::{BlockType, ScalarField};
    use serde_json::json;

    fn schema() -> CollectionSchema {
        CollectionSchema::new(vec![
            ScalarField::text("title").into(),
            FieldNode::group(
                "seo",
                vec![FieldNode::group("og", vec![ScalarField::text("image").into()])],
            ),
            FieldNode::array(
                "reviews",
                vec![
                    ScalarField::integer("rating").into(),
                    FieldNode::array("replies", vec![ScalarField::text("body").into()]),
                ],
            ),
            FieldNode::blocks(
                "content",
                vec![
                    BlockType::new(
                        "richTextBlock",
                        vec![
                            ScalarField::rich_text("richText").into(),
                            ScalarField::boolean("constrainedWidth").into(),
                        ],
                    ),
                    BlockType::new("photoBlock", vec![ScalarField::text("alt").into()]),
                ],
            ),
        ])
        .unwrap()
    }

    fn order(doc: &Value, field: &str) -> Vec<String> {
        doc[field]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn empty_batch_is_identity() {
        let doc = json!({"title": "x", "reviews": [{"id": "a", "rating": 1}]});
        let out = apply_patches(&schema(), doc.clone(), &[], &SequentialIds::new("g"));
        assert_eq!(out.doc, doc);
        assert!(out.errors.is_empty());
    }

    #[test]
    fn unsupported_kind_reports_once_and_keeps_doc() {
        let doc = json!({"title": "x"});
        let out = apply_patches(
            &schema(),
            doc.clone(),
            &[json!({"kind": "field.unset", "path": "title"})],
            &SequentialIds::new("g"),
        );
        assert_eq!(out.doc, doc);
        assert_eq!(out.errors.len(), 1);
        assert_eq!(out.errors[0].index, 0);
        assert_eq!(out.errors[0].patch["kind"], "field.unset");
    }

    #[test]
    fn insert_then_move() {
        let doc = json!({"reviews": [{"id": "a", "rating": 3}, {"id": "b", "rating": 4}]});
        let ids = SequentialIds::new("g");
        let out = apply_patches(
            &schema(),
            doc,
            &[json!({"kind": "array.insert", "path": "reviews", "index": 1, "item": {"id": "c", "rating": 5}})],
            &ids,
        );
        assert!(out.is_clean());
        assert_eq!(order(&out.doc, "reviews"), vec!["a", "c", "b"]);

        let out = apply_patches(
            &schema(),
            out.doc,
            &[json!({"kind": "array.move", "path": "reviews", "itemId": "c", "toIndex": 0})],
            &ids,
        );
        assert!(out.is_clean());
        assert_eq!(order(&out.doc, "reviews"), vec!["c", "a", "b"]);
    }

    #[test]
    fn insert_clamps_and_generates_id() {
        let doc = json!({});
        let out = apply_patches(
            &schema(),
            doc,
            &[
                json!({"kind": "array.insert", "path": "reviews", "index": 99, "item": {"rating": 1}}),
                json!({"kind": "array.insert", "path": "reviews", "index": -4, "item": {"rating": 2}}),
            ],
            &SequentialIds::new("g"),
        );
        assert!(out.is_clean());
        assert_eq!(order(&out.doc, "reviews"), vec!["g-2", "g-1"]);
    }

    #[test]
    fn block_add_then_update_field() {
        let ids = SequentialIds::new("blk");
        let out = apply_patches(
            &schema(),
            json!({"content": []}),
            &[json!({
                "kind": "block.add",
                "path": "content",
                "blockType": "richTextBlock",
                "initialValue": {"richText": {"ops": [{"insert": "Hello"}]}}
            })],
            &ids,
        );
        assert!(out.is_clean());
        let blocks = out.doc["content"].as_array().unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0]["id"], "blk-1");
        assert_eq!(blocks[0]["blockType"], "richTextBlock");
        assert_eq!(blocks[0]["richText"], json!({"ops": [{"insert": "Hello"}]}));

        let out = apply_patches(
            &schema(),
            out.doc,
            &[json!({
                "kind": "block.updateField",
                "path": "content",
                "blockId": "blk-1",
                "fieldPath": "constrainedWidth",
                "value": true
            })],
            &ids,
        );
        assert!(out.is_clean());
        assert_eq!(
            out.doc["content"][0],
            json!({
                "id": "blk-1",
                "blockType": "richTextBlock",
                "richText": {"ops": [{"insert": "Hello"}]},
                "constrainedWidth": true
            })
        );
    }

    #[test]
    fn unknown_block_type_is_rejected() {
        let out = apply_patches(
            &schema(),
            json!({}),
            &[json!({"kind": "block.add", "path": "content", "blockType": "videoBlock"})],
            &SequentialIds::new("g"),
        );
        assert_eq!(out.doc, json!({}));
        assert!(matches!(
            out.errors[0].reason,
            PatchErrorReason::UnknownBlockType { ref block_type, .. } if block_type == "videoBlock"
        ));
    }

    #[test]
    fn failed_patch_does_not_block_later_ones() {
        let doc = json!({"reviews": [{"id": "a"}]});
        let out = apply_patches(
            &schema(),
            doc,
            &[
                json!({"kind": "array.remove", "path": "reviews", "itemId": "zzz"}),
                json!({"kind": "field.set", "path": "nope", "value": 1}),
                json!({"kind": "field.set", "path": "title", "value": "ok"}),
                json!({"kind": "array.remove", "path": "reviews", "itemId": "a"}),
            ],
            &SequentialIds::new("g"),
        );
        assert_eq!(out.errors.len(), 2);
        assert_eq!(out.errors[0].index, 0);
        assert_eq!(out.errors[1].index, 1);
        assert_eq!(out.doc, json!({"title": "ok", "reviews": []}));
    }

    #[test]
    fn field_set_creates_groups_and_reaches_into_elements() {
        let doc = json!({"reviews": [{"id": "a", "replies": [{"id": "r", "body": "x"}]}]});
        let out = apply_patches(
            &schema(),
            doc,
            &[
                json!({"kind": "field.set", "path": "seo.og.image", "value": "i.png"}),
                json!({"kind": "field.set", "path": "reviews[0].replies[0].body", "value": "y"}),
                json!({"kind": "array.insert", "path": "reviews[0].replies", "index": 0, "item": {"id": "s"}}),
            ],
            &SequentialIds::new("g"),
        );
        assert!(out.is_clean(), "{:?}", out.errors);
        assert_eq!(out.doc["seo"], json!({"og": {"image": "i.png"}}));
        assert_eq!(out.doc["reviews"][0]["replies"][1]["body"], "y");
        assert_eq!(out.doc["reviews"][0]["replies"][0]["id"], "s");
    }

    #[test]
    fn failed_deep_set_leaves_no_intermediate_groups() {
        let out = apply_patches(
            &schema(),
            json!({}),
            &[json!({"kind": "field.set", "path": "seo.og.missing", "value": 1})],
            &SequentialIds::new("g"),
        );
        assert_eq!(out.doc, json!({}));
        assert_eq!(out.errors.len(), 1);
    }

    #[test]
    fn block_segment_is_optional_in_paths() {
        let doc = json!({"content": [{"id": "p", "blockType": "photoBlock", "alt": "a"}]});
        let out = apply_patches(
            &schema(),
            doc,
            &[
                json!({"kind": "field.set", "path": "content[0].photoBlock.alt", "value": "b"}),
                json!({"kind": "field.set", "path": "content[0].alt", "value": "c"}),
            ],
            &SequentialIds::new("g"),
        );
        assert!(out.is_clean());
        assert_eq!(out.doc["content"][0]["alt"], "c");
    }

    #[test]
    fn block_ops_reject_array_fields() {
        let out = apply_patches(
            &schema(),
            json!({"reviews": [{"id": "a"}]}),
            &[json!({"kind": "block.remove", "path": "reviews", "blockId": "a"})],
            &SequentialIds::new("g"),
        );
        assert!(matches!(out.errors[0].reason, PatchErrorReason::WrongContainer { .. }));
    }

    #[test]
    fn whole_list_set_assigns_ids() {
        let out = apply_patches(
            &schema(),
            json!({}),
            &[json!({"kind": "field.set", "path": "reviews", "value": [{"rating": 1}, {"id": "k"}]})],
            &SequentialIds::new("g"),
        );
        assert!(out.is_clean());
        assert_eq!(order(&out.doc, "reviews"), vec!["g-1", "k"]);
    }

    #[test]
    fn scoped_apply_rejects_plain_value_on_localized_leaf() {
        let schema = CollectionSchema::new(vec![
            ScalarField::text("title").localized().into(),
            FieldNode::group("seo", vec![ScalarField::text("slug").into()]),
        ])
        .unwrap();
        let locales = ContentLocales::new("en", vec!["de".into()]);
        let doc = json!({"title": {"en": "Hello", "de": "Hallo"}});
        let out = apply_patches_in_scope(
            &schema,
            doc.clone(),
            &[
                json!({"kind": "field.set", "path": "title", "value": "New"}),
                json!({"kind": "field.set", "path": "seo", "value": "flat"}),
                json!({"kind": "field.set", "path": "title", "value": {"en": "New", "de": "Neu"}}),
            ],
            &SequentialIds::new("g"),
            &LocaleScope::All,
            &locales,
        );
        assert_eq!(out.errors.len(), 2);
        assert_eq!(out.errors[0].index, 0);
        assert_eq!(
            out.errors[0].reason,
            PatchErrorReason::ShapeMismatch { paths: vec!["title".into()] }
        );
        assert_eq!(out.errors[1].index, 1);
        assert_eq!(out.doc, json!({"title": {"en": "New", "de": "Neu"}}));

        let view = apply_patches_in_scope(
            &schema,
            json!({"title": "Hello"}),
            &[json!({"kind": "field.set", "path": "title", "value": "New"})],
            &SequentialIds::new("g"),
            &LocaleScope::Locale("en".into()),
            &locales,
        );
        assert!(view.is_clean());
        assert_eq!(view.doc, json!({"title": "New"}));
    }
}
