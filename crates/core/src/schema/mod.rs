//! Declarative document shape: scalar leaves, groups, arrays and blocks.

pub mod address;
pub mod defaults;
pub mod field;

pub use address::{AddressError, FieldAddress, Segment};
pub use defaults::{DefaultContext, DefaultResolver, FnDefault};
pub use field::{
    find_field, ArrayField, BlockType, BlocksField, CollectionSchema, FieldNode, GroupField,
    ScalarField, ScalarKind, SchemaError, SchemaTarget, BLOCK_TYPE_KEY, ELEMENT_ID_KEY,
};
