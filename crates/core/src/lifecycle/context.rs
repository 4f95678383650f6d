use std::sync::Arc;

use super::error::{LifecycleError, LifecycleResult};
use super::registry::{CollectionDefinition, SchemaRegistry};
use crate::events::{DocumentEvent, EventBus};
use crate::ids::{Clock, IdGenerator, SystemClock, UuidGenerator};
use crate::locale::ContentLocales;
use crate::storage::{CollectionRecord, StorageAdapter};

/// Everything a lifecycle call depends on, passed explicitly.
#[derive(Clone)]
pub struct LifecycleContext {
    pub registry: Arc<SchemaRegistry>,
    pub storage: Arc<dyn StorageAdapter>,
    pub locales: ContentLocales,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub events: Option<EventBus>,
}

impl LifecycleContext {
    pub fn new(registry: SchemaRegistry, storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            registry: Arc::new(registry),
            storage,
            locales: ContentLocales::default(),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidGenerator),
            events: None,
        }
    }

    pub fn with_locales(mut self, locales: ContentLocales) -> Self {
        self.locales = locales;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_ids(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Registered definition plus its storage record.
    pub(crate) async fn collection(
        &self,
        path: &str,
    ) -> LifecycleResult<(Arc<CollectionDefinition>, CollectionRecord)> {
        let definition = self
            .registry
            .get(path)
            .ok_or_else(|| LifecycleError::CollectionNotFound(path.to_string()))?;
        let record = self
            .storage
            .collection_by_path(path)
            .await?
            .ok_or_else(|| LifecycleError::CollectionNotFound(path.to_string()))?;
        Ok((definition, record))
    }

    pub(crate) fn emit(&self, event: DocumentEvent) {
        if let Some(bus) = &self.events {
            bus.publish(event);
        }
    }
}
