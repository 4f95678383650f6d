//! Structural patch operations and their wire format.
//!
//! On the wire a patch is an object discriminated by `kind`
//! (`field.set`, `array.insert`, ...). Decoding is done per patch so a bad
//! entry becomes an error for that entry only.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::schema::FieldAddress;

pub const KIND_FIELD_SET: &str = "field.set";
pub const KIND_ARRAY_INSERT: &str = "array.insert";
pub const KIND_ARRAY_MOVE: &str = "array.move";
pub const KIND_ARRAY_REMOVE: &str = "array.remove";
pub const KIND_BLOCK_ADD: &str = "block.add";
pub const KIND_BLOCK_REMOVE: &str = "block.remove";
pub const KIND_BLOCK_UPDATE_FIELD: &str = "block.updateField";

const KNOWN_KINDS: [&str; 7] = [
    KIND_FIELD_SET,
    KIND_ARRAY_INSERT,
    KIND_ARRAY_MOVE,
    KIND_ARRAY_REMOVE,
    KIND_BLOCK_ADD,
    KIND_BLOCK_REMOVE,
    KIND_BLOCK_UPDATE_FIELD,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Patch {
    #[serde(rename = "field.set")]
    FieldSet(FieldSet),
    #[serde(rename = "array.insert")]
    ArrayInsert(ArrayInsert),
    #[serde(rename = "array.move")]
    ArrayMove(ArrayMove),
    #[serde(rename = "array.remove")]
    ArrayRemove(ArrayRemove),
    #[serde(rename = "block.add")]
    BlockAdd(BlockAdd),
    #[serde(rename = "block.remove")]
    BlockRemove(BlockRemove),
    #[serde(rename = "block.updateField")]
    BlockUpdateField(BlockUpdateField),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSet {
    pub path: FieldAddress,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrayInsert {
    pub path: FieldAddress,
    /// Clamped into `0..=len`.
    pub index: i64,
    pub item: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayMove {
    pub path: FieldAddress,
    pub item_id: String,
    pub to_index: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArrayRemove {
    pub path: FieldAddress,
    pub item_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockAdd {
    pub path: FieldAddress,
    pub block_type: String,
    #[serde(default)]
    pub initial_value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockRemove {
    pub path: FieldAddress,
    pub block_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockUpdateField {
    pub path: FieldAddress,
    pub block_id: String,
    pub field_path: FieldAddress,
    pub value: Value,
}

impl Patch {
    /// Decode one wire patch.
    pub fn decode(raw: &Value) -> Result<Self, PatchErrorReason> {
        let kind = match raw.get("kind") {
            Some(Value::String(kind)) => kind,
            _ => return Err(PatchErrorReason::MissingKind),
        };
        if !KNOWN_KINDS.contains(&kind.as_str()) {
            return Err(PatchErrorReason::UnsupportedKind { kind: kind.clone() });
        }
        serde_json::from_value(raw.clone()).map_err(|e| PatchErrorReason::Malformed {
            kind: kind.clone(),
            message: e.to_string(),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Patch::FieldSet(_) => KIND_FIELD_SET,
            Patch::ArrayInsert(_) => KIND_ARRAY_INSERT,
            Patch::ArrayMove(_) => KIND_ARRAY_MOVE,
            Patch::ArrayRemove(_) => KIND_ARRAY_REMOVE,
            Patch::BlockAdd(_) => KIND_BLOCK_ADD,
            Patch::BlockRemove(_) => KIND_BLOCK_REMOVE,
            Patch::BlockUpdateField(_) => KIND_BLOCK_UPDATE_FIELD,
        }
    }

    /// Wire form of this patch.
    pub fn to_wire(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn field_set(path: FieldAddress, value: Value) -> Self {
        Patch::FieldSet(FieldSet { path, value })
    }

    pub fn array_insert(path: FieldAddress, index: i64, item: Value) -> Self {
        Patch::ArrayInsert(ArrayInsert { path, index, item })
    }

    pub fn array_move(path: FieldAddress, item_id: impl Into<String>, to_index: i64) -> Self {
        Patch::ArrayMove(ArrayMove {
            path,
            item_id: item_id.into(),
            to_index,
        })
    }

    pub fn array_remove(path: FieldAddress, item_id: impl Into<String>) -> Self {
        Patch::ArrayRemove(ArrayRemove {
            path,
            item_id: item_id.into(),
        })
    }

    pub fn block_add(
        path: FieldAddress,
        block_type: impl Into<String>,
        initial_value: Value,
    ) -> Self {
        Patch::BlockAdd(BlockAdd {
            path,
            block_type: block_type.into(),
            initial_value,
        })
    }

    pub fn block_remove(path: FieldAddress, block_id: impl Into<String>) -> Self {
        Patch::BlockRemove(BlockRemove {
            path,
            block_id: block_id.into(),
        })
    }

    pub fn block_update_field(
        path: FieldAddress,
        block_id: impl Into<String>,
        field_path: FieldAddress,
        value: Value,
    ) -> Self {
        Patch::BlockUpdateField(BlockUpdateField {
            path,
            block_id: block_id.into(),
            field_path,
            value,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "code", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PatchErrorReason {
    #[error("patch has no `kind`")]
    MissingKind,
    #[error("unsupported patch kind `{kind}`")]
    UnsupportedKind { kind: String },
    #[error("malformed `{kind}` patch: {message}")]
    Malformed { kind: String, message: String },
    #[error("cannot resolve `{path}`: {message}")]
    Unresolvable { path: String, message: String },
    #[error("`{path}` is not {expected}")]
    WrongContainer { path: String, expected: &'static str },
    #[error("no element `{id}` in `{path}`")]
    ItemNotFound { path: String, id: String },
    #[error("element id `{id}` already exists in `{path}`")]
    DuplicateId { path: String, id: String },
    #[error("unknown block type `{block_type}` for `{path}`")]
    UnknownBlockType { path: String, block_type: String },
    #[error("invalid value for `{path}`: {message}")]
    InvalidValue { path: String, message: String },
    /// The patch applied, but left values the schema cannot store.
    #[error("result does not fit the schema at {}", .paths.join(", "))]
    ShapeMismatch { paths: Vec<String> },
}

/// One rejected patch. The document is left as it was before this patch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchError {
    /// Position of the patch in the submitted batch.
    pub index: usize,
    pub patch: Value,
    pub reason: PatchErrorReason,
    pub message: String,
}

impl PatchError {
    pub fn new(index: usize, patch: Value, reason: PatchErrorReason) -> Self {
        let message = reason.to_string();
        Self {
            index,
            patch,
            reason,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_wire_shape() {
        let raw = json!({"kind": "array.move", "path": "reviews", "itemId": "c", "toIndex": 0});
        let patch = Patch::decode(&raw).unwrap();
        assert_eq!(patch, Patch::array_move("reviews".parse().unwrap(), "c", 0));
        assert_eq!(patch.to_wire(), raw);
    }

    #[test]
    fn block_add_initial_value_defaults_to_null() {
        let raw = json!({"kind": "block.add", "path": "content", "blockType": "photoBlock"});
        let Patch::BlockAdd(add) = Patch::decode(&raw).unwrap() else {
            panic!("expected block.add");
        };
        assert_eq!(add.initial_value, Value::Null);
    }

    #[test]
    fn decode_errors() {
        assert_eq!(Patch::decode(&json!({"path": "x"})), Err(PatchErrorReason::MissingKind));
        assert_eq!(
            Patch::decode(&json!({"kind": "field.unset", "path": "x"})),
            Err(PatchErrorReason::UnsupportedKind {
                kind: "field.unset".into()
            })
        );
        assert!(matches!(
            Patch::decode(&json!({"kind": "field.set", "path": "a[", "value": 1})),
            Err(PatchErrorReason::Malformed { .. })
        ));
        assert!(matches!(
            Patch::decode(&json!({"kind": "array.remove", "path": "reviews"})),
            Err(PatchErrorReason::Malformed { .. })
        ));
    }

    #[test]
    fn error_serializes_with_code_and_message() {
        let err = PatchError::new(
            2,
            json!({"kind": "nope"}),
            PatchErrorReason::UnsupportedKind {
                kind: "nope".into(),
            },
        );
        let raw = serde_json::to_value(&err).unwrap();
        assert_eq!(raw["index"], 2);
        assert_eq!(raw["message"], "unsupported patch kind `nope`");
        assert_eq!(raw["reason"]["code"], "unsupportedKind");
    }
}
