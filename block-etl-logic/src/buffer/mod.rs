//! Type-indexed store of entities shared by the jobs of one pass.

mod memory;
mod redis;

pub use self::redis::RedisBuffer;
pub use memory::InMemoryBuffer;

use crate::{
    entity_type::EntityType,
    error::BufferError,
    types::{Entity, EntityRecord},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Append-only (within a pass) map of entity type to ordered entities.
///
/// Implementations must keep insertion order per type and must not lose
/// concurrent appends.
#[async_trait]
pub trait SharedBuffer: Send + Sync {
    /// Drop every stored entity of every type.
    async fn clear(&self) -> Result<(), BufferError>;

    /// All entities of the type in insertion order, empty when absent.
    async fn get(&self, entity_type: &EntityType) -> Result<Vec<Entity>, BufferError>;

    async fn append_many(
        &self,
        entity_type: &EntityType,
        items: Vec<Entity>,
    ) -> Result<(), BufferError>;

    /// Types with at least one stored entity.
    async fn entity_types(&self) -> Result<Vec<EntityType>, BufferError>;

    async fn len(&self, entity_type: &EntityType) -> Result<usize, BufferError>;
}

/// Typed accessors on top of [`SharedBuffer`].
#[async_trait]
pub trait SharedBufferExt: SharedBuffer {
    /// Records of `T`; entities of other variants stored under the same
    /// type are skipped.
    async fn get_records<T: EntityRecord + Send>(&self) -> Result<Vec<T>, BufferError> {
        let entities = self.get(&T::ENTITY_TYPE).await?;
        Ok(entities.into_iter().filter_map(T::from_entity).collect())
    }

    async fn append_records<T: EntityRecord + Send + 'static>(
        &self,
        records: Vec<T>,
    ) -> Result<(), BufferError> {
        if records.is_empty() {
            return Ok(());
        }
        let entities = records.into_iter().map(Into::into).collect();
        self.append_many(&T::ENTITY_TYPE, entities).await
    }
}

impl<B: SharedBuffer + ?Sized> SharedBufferExt for B {}

/// Backend selected by the `cache` setting: `memory` or a `redis://` url.
pub async fn build_buffer(cache: &str) -> Result<Arc<dyn SharedBuffer>, BufferError> {
    if cache == "memory" {
        return Ok(Arc::new(InMemoryBuffer::new()));
    }
    let buffer = RedisBuffer::connect(cache, "block_etl:buffer").await?;
    Ok(Arc::new(buffer))
}
