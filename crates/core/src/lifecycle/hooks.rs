//! Collection lifecycle hooks.
//!
//! Hooks are registered per stage and always kept as an ordered list; a
//! single hook is just a list of one. They run one after another and the
//! first failure stops the rest of the stage.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HookStage {
    BeforeCreate,
    AfterCreate,
    BeforeUpdate,
    AfterUpdate,
    BeforeStatusChange,
    AfterStatusChange,
    BeforeUnpublish,
    AfterUnpublish,
    BeforeDelete,
    AfterDelete,
}

impl HookStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookStage::BeforeCreate => "beforeCreate",
            HookStage::AfterCreate => "afterCreate",
            HookStage::BeforeUpdate => "beforeUpdate",
            HookStage::AfterUpdate => "afterUpdate",
            HookStage::BeforeStatusChange => "beforeStatusChange",
            HookStage::AfterStatusChange => "afterStatusChange",
            HookStage::BeforeUnpublish => "beforeUnpublish",
            HookStage::AfterUnpublish => "afterUnpublish",
            HookStage::BeforeDelete => "beforeDelete",
            HookStage::AfterDelete => "afterDelete",
        }
    }

    pub fn is_before(&self) -> bool {
        matches!(
            self,
            HookStage::BeforeCreate
                | HookStage::BeforeUpdate
                | HookStage::BeforeStatusChange
                | HookStage::BeforeUnpublish
                | HookStage::BeforeDelete
        )
    }
}

impl fmt::Display for HookStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum HookError {
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Failed(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HookError {
    pub fn rejected(message: impl Into<String>) -> Self {
        HookError::Rejected(message.into())
    }
}

/// What a hook gets to see. `data` is the tree being written (or the current
/// tree for metadata-only operations); `original` is the tree it replaces.
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'a> {
    pub stage: HookStage,
    pub collection: &'a str,
    pub locale: &'a str,
    pub document_id: Option<Uuid>,
    pub version_id: Option<Uuid>,
    pub data: Option<&'a Value>,
    pub original: Option<&'a Value>,
    pub status: Option<&'a str>,
    pub previous_status: Option<&'a str>,
}

impl<'a> HookContext<'a> {
    pub fn new(stage: HookStage, collection: &'a str, locale: &'a str) -> Self {
        Self {
            stage,
            collection,
            locale,
            document_id: None,
            version_id: None,
            data: None,
            original: None,
            status: None,
            previous_status: None,
        }
    }

    /// Same context moved to another stage.
    pub fn at(self, stage: HookStage) -> Self {
        Self { stage, ..self }
    }
}

#[async_trait]
pub trait Hook: Send + Sync {
    async fn call(&self, ctx: &HookContext<'_>) -> Result<(), HookError>;
}

/// Adapts a synchronous closure into a [`Hook`].
pub struct FnHook<F>(pub F);

#[async_trait]
impl<F> Hook for FnHook<F>
where
    F: Fn(&HookContext<'_>) -> Result<(), HookError> + Send + Sync,
{
    async fn call(&self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        (self.0)(ctx)
    }
}

#[derive(Clone, Default)]
pub struct CollectionHooks {
    stages: BTreeMap<HookStage, Vec<Arc<dyn Hook>>>,
}

impl fmt::Debug for CollectionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<&str, usize> = self
            .stages
            .iter()
            .map(|(stage, hooks)| (stage.as_str(), hooks.len()))
            .collect();
        f.debug_struct("CollectionHooks").field("stages", &counts).finish()
    }
}

impl CollectionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one hook to a stage.
    pub fn on(mut self, stage: HookStage, hook: impl Hook + 'static) -> Self {
        self.stages.entry(stage).or_default().push(Arc::new(hook));
        self
    }

    /// Append an ordered list of hooks to a stage.
    pub fn on_all(
        mut self,
        stage: HookStage,
        hooks: impl IntoIterator<Item = Arc<dyn Hook>>,
    ) -> Self {
        self.stages.entry(stage).or_default().extend(hooks);
        self
    }

    pub fn hooks(&self, stage: HookStage) -> &[Arc<dyn Hook>] {
        self.stages.get(&stage).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.values().all(Vec::is_empty)
    }

    /// Await every hook of `ctx.stage` in registration order.
    pub async fn run(&self, ctx: &HookContext<'_>) -> Result<(), HookError> {
        for hook in self.hooks(ctx.stage) {
            hook.call(ctx).await?;
        }
        Ok(())
    }
}
