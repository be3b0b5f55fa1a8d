use super::SharedBuffer;
use crate::{entity_type::EntityType, error::BufferError, types::Entity};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Process-local buffer.
#[derive(Debug, Default)]
pub struct InMemoryBuffer {
    entities: RwLock<HashMap<EntityType, Vec<Entity>>>,
}

impl InMemoryBuffer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SharedBuffer for InMemoryBuffer {
    async fn clear(&self) -> Result<(), BufferError> {
        self.entities.write().clear();
        Ok(())
    }

    async fn get(&self, entity_type: &EntityType) -> Result<Vec<Entity>, BufferError> {
        Ok(self
            .entities
            .read()
            .get(entity_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_many(
        &self,
        entity_type: &EntityType,
        items: Vec<Entity>,
    ) -> Result<(), BufferError> {
        if items.is_empty() {
            return Ok(());
        }
        self.entities
            .write()
            .entry(entity_type.clone())
            .or_default()
            .extend(items);
        Ok(())
    }

    async fn entity_types(&self) -> Result<Vec<EntityType>, BufferError> {
        let mut types: Vec<_> = self
            .entities
            .read()
            .iter()
            .filter(|(_, items)| !items.is_empty())
            .map(|(entity_type, _)| entity_type.clone())
            .collect();
        types.sort();
        Ok(types)
    }

    async fn len(&self, entity_type: &EntityType) -> Result<usize, BufferError> {
        Ok(self
            .entities
            .read()
            .get(entity_type)
            .map(Vec::len)
            .unwrap_or_default())
    }
}
