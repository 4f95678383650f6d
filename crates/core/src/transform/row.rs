use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::locale::ALL_LOCALES;
use crate::schema::FieldAddress;

/// One flattened storage unit. Element occurrences are rows whose address
/// ends in an index and whose value carries the element's stable id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldValueRow {
    /// Assigned when the row is persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_id: Option<Uuid>,
    pub field_address: FieldAddress,
    pub locale: String,
    pub value: Value,
}

impl FieldValueRow {
    pub fn new(field_address: FieldAddress, locale: impl Into<String>, value: Value) -> Self {
        Self {
            version_id: None,
            field_address,
            locale: locale.into(),
            value,
        }
    }

    pub fn is_occurrence(&self) -> bool {
        self.field_address.is_occurrence()
    }

    pub fn is_localized(&self) -> bool {
        self.locale != ALL_LOCALES
    }

    /// Column family a relational backend files this row under.
    pub fn value_kind(&self) -> &'static str {
        if self.is_occurrence() {
            return "occurrence";
        }
        match &self.value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
            Value::Number(_) => "decimal",
            Value::String(_) => "text",
            Value::Array(_) | Value::Object(_) => "json",
        }
    }
}
