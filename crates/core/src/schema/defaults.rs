//! Default-value resolution for absent leaves.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::field::{FieldNode, ScalarField, BLOCK_TYPE_KEY};
use super::CollectionSchema;
use crate::ids::{Clock, IdGenerator};
use crate::locale::{ContentLocales, LocaleScope};

/// What a resolver may consult while computing a default.
pub struct DefaultContext<'a> {
    /// The record the absent leaf belongs to, as it stands before defaults.
    pub siblings: &'a Map<String, Value>,
    pub clock: &'a dyn Clock,
    pub ids: &'a dyn IdGenerator,
    pub locale: &'a LocaleScope,
}

#[async_trait]
pub trait DefaultResolver: Send + Sync {
    /// `None` leaves the field absent.
    async fn resolve(&self, ctx: &DefaultContext<'_>) -> Option<Value>;
}

/// Adapts a plain closure into a [`DefaultResolver`].
pub struct FnDefault<F>(pub F);

#[async_trait]
impl<F> DefaultResolver for FnDefault<F>
where
    F: Fn(&DefaultContext<'_>) -> Option<Value> + Send + Sync,
{
    async fn resolve(&self, ctx: &DefaultContext<'_>) -> Option<Value> {
        (self.0)(ctx)
    }
}

#[derive(Debug, Clone)]
enum Step {
    Key(String),
    Pos(usize),
}

struct Pending<'s> {
    record: Vec<Step>,
    field: &'s ScalarField,
    siblings: Map<String, Value>,
}

impl CollectionSchema {
    /// Fill every absent leaf that declares a default. Groups are created
    /// when one of their leaves receives a default; existing array and block
    /// elements are visited, but no elements are created.
    pub async fn apply_defaults(
        &self,
        data: &mut Value,
        scope: &LocaleScope,
        locales: &ContentLocales,
        clock: &dyn Clock,
        ids: &dyn IdGenerator,
    ) -> usize {
        if !data.is_object() {
            *data = Value::Object(Map::new());
        }

        let mut pending = Vec::new();
        collect_pending(self.fields(), Some(&*data), &mut Vec::new(), &mut pending);

        let mut applied = 0;
        for item in pending {
            let value = match &item.field.default_resolver {
                Some(handle) => {
                    let ctx = DefaultContext {
                        siblings: &item.siblings,
                        clock,
                        ids,
                        locale: scope,
                    };
                    handle.0.resolve(&ctx).await
                }
                None => item.field.default_value.clone(),
            };
            let Some(value) = value.filter(|v| !v.is_null()) else {
                continue;
            };
            let value = match scope {
                LocaleScope::All if item.field.localized => {
                    let mut map = Map::new();
                    map.insert(locales.default_locale().to_string(), value);
                    Value::Object(map)
                }
                _ => value,
            };
            if let Some(record) = record_mut(data, &item.record) {
                record.insert(item.field.name.clone(), value);
                applied += 1;
            }
        }
        applied
    }
}

fn collect_pending<'s>(
    fields: &'s [FieldNode],
    record: Option<&Value>,
    at: &mut Vec<Step>,
    out: &mut Vec<Pending<'s>>,
) {
    let empty = Map::new();
    let map = record.and_then(Value::as_object).unwrap_or(&empty);
    for field in fields {
        let value = map.get(field.name()).filter(|v| !v.is_null());
        match field {
            FieldNode::Scalar(s) => {
                if value.is_none() && s.has_default() {
                    out.push(Pending {
                        record: at.clone(),
                        field: s,
                        siblings: map.clone(),
                    });
                }
            }
            FieldNode::Group(g) => {
                at.push(Step::Key(g.name.clone()));
                collect_pending(&g.fields, value, at, out);
                at.pop();
            }
            FieldNode::Array(a) => {
                let Some(Value::Array(items)) = value else { continue };
                for (i, item) in items.iter().enumerate() {
                    at.push(Step::Key(a.name.clone()));
                    at.push(Step::Pos(i));
                    collect_pending(&a.fields, Some(item), at, out);
                    at.truncate(at.len() - 2);
                }
            }
            FieldNode::Blocks(b) => {
                let Some(Value::Array(items)) = value else { continue };
                for (i, item) in items.iter().enumerate() {
                    let Some(bt) = item
                        .get(BLOCK_TYPE_KEY)
                        .and_then(Value::as_str)
                        .and_then(|t| b.block_type(t))
                    else {
                        continue;
                    };
                    at.push(Step::Key(b.name.clone()));
                    at.push(Step::Pos(i));
                    collect_pending(&bt.fields, Some(item), at, out);
                    at.truncate(at.len() - 2);
                }
            }
        }
    }
}

/// Walk to the record at `path`, creating missing group objects.
fn record_mut<'v>(root: &'v mut Value, path: &[Step]) -> Option<&'v mut Map<String, Value>> {
    let mut current = root;
    for step in path {
        current = match step {
            Step::Key(key) => {
                let map = current.as_object_mut()?;
                let slot = map
                    .entry(key.clone())
                    .or_insert_with(|| Value::Object(Map::new()));
                if slot.is_null() {
                    *slot = Value::Object(Map::new());
                }
                slot
            }
            Step::Pos(i) => current.as_array_mut()?.get_mut(*i)?,
        };
    }
    current.as_object_mut()
}
