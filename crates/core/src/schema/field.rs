use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::address::{FieldAddress, Segment};
use super::defaults::DefaultResolver;
use crate::locale::{ContentLocales, ALL_LOCALES};

/// Key holding the stable element id of array and block occurrences.
pub const ELEMENT_ID_KEY: &str = "id";
/// Key holding the block type of block occurrences.
pub const BLOCK_TYPE_KEY: &str = "blockType";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("field name cannot be empty")]
    EmptyName,
    #[error("invalid field name `{0}`")]
    InvalidName(String),
    #[error("duplicate field `{0}`")]
    DuplicateField(String),
    #[error("field name `{0}` is reserved inside arrays and blocks")]
    ReservedName(String),
    #[error("blocks field `{0}` declares no block types")]
    NoBlockTypes(String),
    #[error("duplicate block type `{block_type}` in `{field}`")]
    DuplicateBlockType { field: String, block_type: String },
    #[error("no field at `{0}`")]
    UnknownField(String),
    #[error("unknown block type `{block_type}` at `{address}`")]
    UnknownBlockType { address: String, block_type: String },
    #[error("`{0}` cannot be descended into")]
    NotAContainer(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalarKind {
    Text,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    Select,
    Relation,
    File,
    RichText,
}

/// Shared handle to a computed default.
#[derive(Clone)]
pub struct ResolverHandle(pub Arc<dyn DefaultResolver>);

impl fmt::Debug for ResolverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResolverHandle(..)")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalarField {
    pub name: String,
    pub kind: ScalarKind,
    #[serde(default)]
    pub localized: bool,
    #[serde(default)]
    pub required: bool,
    /// Select options; informational only.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    #[serde(skip)]
    pub default_resolver: Option<ResolverHandle>,
}

impl ScalarField {
    pub fn new(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self {
            name: name.into(),
            kind,
            localized: false,
            required: false,
            options: Vec::new(),
            default_value: None,
            default_resolver: None,
        }
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, ScalarKind::Text)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, ScalarKind::Integer)
    }

    pub fn decimal(name: impl Into<String>) -> Self {
        Self::new(name, ScalarKind::Decimal)
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, ScalarKind::Boolean)
    }

    pub fn datetime(name: impl Into<String>) -> Self {
        Self::new(name, ScalarKind::DateTime)
    }

    pub fn select(name: impl Into<String>, options: &[&str]) -> Self {
        let mut field = Self::new(name, ScalarKind::Select);
        field.options = options.iter().map(|o| o.to_string()).collect();
        field
    }

    pub fn relation(name: impl Into<String>) -> Self {
        Self::new(name, ScalarKind::Relation)
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self::new(name, ScalarKind::File)
    }

    pub fn rich_text(name: impl Into<String>) -> Self {
        Self::new(name, ScalarKind::RichText)
    }

    pub fn localized(mut self) -> Self {
        self.localized = true;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn default_with(mut self, resolver: impl DefaultResolver + 'static) -> Self {
        self.default_resolver = Some(ResolverHandle(Arc::new(resolver)));
        self
    }

    pub fn has_default(&self) -> bool {
        self.default_value.is_some() || self.default_resolver.is_some()
    }

    /// Locales a value of this leaf is stored under.
    pub fn locales_for(&self, locales: &ContentLocales) -> Vec<String> {
        if self.localized {
            locales.locales().to_vec()
        } else {
            vec![ALL_LOCALES.to_string()]
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupField {
    pub name: String,
    pub fields: Vec<FieldNode>,
}

/// Homogeneous repeated records; `fields` is the per-element template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayField {
    pub name: String,
    pub fields: Vec<FieldNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockType {
    pub name: String,
    pub fields: Vec<FieldNode>,
}

impl BlockType {
    pub fn new(name: impl Into<String>, fields: Vec<FieldNode>) -> Self {
        Self {
            name: name.into(),
            fields,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlocksField {
    pub name: String,
    pub blocks: Vec<BlockType>,
}

impl BlocksField {
    pub fn block_type(&self, name: &str) -> Option<&BlockType> {
        self.blocks.iter().find(|b| b.name == name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FieldNode {
    Scalar(ScalarField),
    Group(GroupField),
    Array(ArrayField),
    Blocks(BlocksField),
}

impl FieldNode {
    pub fn group(name: impl Into<String>, fields: Vec<FieldNode>) -> Self {
        FieldNode::Group(GroupField {
            name: name.into(),
            fields,
        })
    }

    pub fn array(name: impl Into<String>, fields: Vec<FieldNode>) -> Self {
        FieldNode::Array(ArrayField {
            name: name.into(),
            fields,
        })
    }

    pub fn blocks(name: impl Into<String>, blocks: Vec<BlockType>) -> Self {
        FieldNode::Blocks(BlocksField {
            name: name.into(),
            blocks,
        })
    }

    pub fn name(&self) -> &str {
        match self {
            FieldNode::Scalar(f) => &f.name,
            FieldNode::Group(f) => &f.name,
            FieldNode::Array(f) => &f.name,
            FieldNode::Blocks(f) => &f.name,
        }
    }
}

impl From<ScalarField> for FieldNode {
    fn from(field: ScalarField) -> Self {
        FieldNode::Scalar(field)
    }
}

/// Find a field by name in a record template.
pub fn find_field<'a>(fields: &'a [FieldNode], name: &str) -> Option<&'a FieldNode> {
    fields.iter().find(|f| f.name() == name)
}

/// What a structural address points at.
#[derive(Debug, Clone, Copy)]
pub enum SchemaTarget<'a> {
    /// A named field of any kind.
    Field(&'a FieldNode),
    /// One element of an array field.
    ArrayElement(&'a ArrayField),
    /// One element of a blocks field whose type segment has not been named yet.
    BlockElement(&'a BlocksField),
    /// One element of a blocks field of a known type.
    Block(&'a BlockType),
}

impl<'a> SchemaTarget<'a> {
    /// Record template reachable from this target, if it holds named children.
    pub fn record_fields(&self) -> Option<&'a [FieldNode]> {
        match self {
            SchemaTarget::Field(FieldNode::Group(g)) => Some(&g.fields),
            SchemaTarget::ArrayElement(a) => Some(&a.fields),
            SchemaTarget::Block(b) => Some(&b.fields),
            _ => None,
        }
    }
}

/// Root of a collection's document shape. Deserializing runs the same
/// validation as [`CollectionSchema::new`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "SchemaDef")]
pub struct CollectionSchema {
    fields: Vec<FieldNode>,
}

#[derive(Deserialize)]
struct SchemaDef {
    fields: Vec<FieldNode>,
}

impl TryFrom<SchemaDef> for CollectionSchema {
    type Error = SchemaError;

    fn try_from(def: SchemaDef) -> Result<Self, Self::Error> {
        Self::new(def.fields)
    }
}

impl CollectionSchema {
    pub fn new(fields: Vec<FieldNode>) -> Result<Self, SchemaError> {
        validate_record(&fields, false)?;
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[FieldNode] {
        &self.fields
    }

    /// Resolve the schema node at a structural address.
    pub fn resolve(&self, address: &FieldAddress) -> Result<SchemaTarget<'_>, SchemaError> {
        resolve_in(&self.fields, address.segments(), address)
    }

    /// Required leaves that are absent from `data`. Only records that exist
    /// in `data` are inspected.
    pub fn required_missing(&self, data: &Value) -> Vec<FieldAddress> {
        let mut missing = Vec::new();
        if let Some(map) = data.as_object() {
            collect_missing(&self.fields, map, &FieldAddress::root(), &mut missing);
        }
        missing
    }
}

/// Resolve `segments` starting from a record template.
pub fn resolve_in<'a>(
    fields: &'a [FieldNode],
    segments: &[Segment],
    address: &FieldAddress,
) -> Result<SchemaTarget<'a>, SchemaError> {
    let Some((first, rest)) = segments.split_first() else {
        return Err(SchemaError::UnknownField(address.to_string()));
    };
    let Segment::Field(name) = first else {
        return Err(SchemaError::NotAContainer(address.to_string()));
    };
    let node =
        find_field(fields, name).ok_or_else(|| SchemaError::UnknownField(address.to_string()))?;

    let mut target = SchemaTarget::Field(node);
    let mut rest = rest;
    while let Some((segment, tail)) = rest.split_first() {
        target = match (target, segment) {
            (SchemaTarget::Field(FieldNode::Array(a)), Segment::Index(_)) => {
                SchemaTarget::ArrayElement(a)
            }
            (SchemaTarget::Field(FieldNode::Blocks(b)), Segment::Index(_)) => {
                SchemaTarget::BlockElement(b)
            }
            (SchemaTarget::BlockElement(b), Segment::Field(block_type)) => {
                let bt = b.block_type(block_type).ok_or_else(|| {
                    SchemaError::UnknownBlockType {
                        address: address.to_string(),
                        block_type: block_type.clone(),
                    }
                })?;
                SchemaTarget::Block(bt)
            }
            (target, Segment::Field(_)) => match target.record_fields() {
                Some(children) => return resolve_in(children, rest, address),
                None => return Err(SchemaError::NotAContainer(address.to_string())),
            },
            _ => return Err(SchemaError::NotAContainer(address.to_string())),
        };
        rest = tail;
    }
    Ok(target)
}

fn validate_name(name: &str) -> Result<(), SchemaError> {
    if name.is_empty() {
        return Err(SchemaError::EmptyName);
    }
    if name.contains(['.', '[', ']']) || name == crate::locale::ALL_LOCALES {
        return Err(SchemaError::InvalidName(name.to_string()));
    }
    Ok(())
}

fn validate_record(fields: &[FieldNode], element: bool) -> Result<(), SchemaError> {
    let mut seen = HashSet::new();
    for field in fields {
        let name = field.name();
        validate_name(name)?;
        if element && (name == ELEMENT_ID_KEY || name == BLOCK_TYPE_KEY) {
            return Err(SchemaError::ReservedName(name.to_string()));
        }
        if !seen.insert(name) {
            return Err(SchemaError::DuplicateField(name.to_string()));
        }
        match field {
            FieldNode::Scalar(_) => {}
            FieldNode::Group(g) => validate_record(&g.fields, false)?,
            FieldNode::Array(a) => validate_record(&a.fields, true)?,
            FieldNode::Blocks(b) => {
                if b.blocks.is_empty() {
                    return Err(SchemaError::NoBlockTypes(b.name.clone()));
                }
                let mut types = HashSet::new();
                for bt in &b.blocks {
                    validate_name(&bt.name)?;
                    if !types.insert(bt.name.as_str()) {
                        return Err(SchemaError::DuplicateBlockType {
                            field: b.name.clone(),
                            block_type: bt.name.clone(),
                        });
                    }
                    validate_record(&bt.fields, true)?;
                }
            }
        }
    }
    Ok(())
}

fn collect_missing(
    fields: &[FieldNode],
    data: &serde_json::Map<String, Value>,
    at: &FieldAddress,
    missing: &mut Vec<FieldAddress>,
) {
    for field in fields {
        let value = data.get(field.name()).filter(|v| !v.is_null());
        match (field, value) {
            (FieldNode::Scalar(s), None) if s.required => missing.push(at.field(&s.name)),
            (FieldNode::Group(g), Some(Value::Object(map))) => {
                collect_missing(&g.fields, map, &at.field(&g.name), missing)
            }
            (FieldNode::Array(a), Some(Value::Array(items))) => {
                for (i, item) in items.iter().enumerate() {
                    if let Some(map) = item.as_object() {
                        collect_missing(&a.fields, map, &at.field(&a.name).index(i), missing);
                    }
                }
            }
            (FieldNode::Blocks(b), Some(Value::Array(items))) => {
                for (i, item) in items.iter().enumerate() {
                    let Some(map) = item.as_object() else { continue };
                    let Some(bt) = map
                        .get(BLOCK_TYPE_KEY)
                        .and_then(Value::as_str)
                        .and_then(|t| b.block_type(t))
                    else {
                        continue;
                    };
                    let here = at.field(&b.name).index(i).field(&bt.name);
                    collect_missing(&bt.fields, map, &here, missing);
                }
            }
            _ => {}
        }
    }
}
