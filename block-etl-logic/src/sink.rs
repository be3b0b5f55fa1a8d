//! Destinations the buffered outputs of a pass are handed to.

use crate::{
    buffer::SharedBuffer,
    entity_type::{self, ConflictPolicy, EntityType},
    types::Entity,
};
use async_trait::async_trait;
use std::{collections::BTreeMap, path::PathBuf};
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait EntitySink: Send + Sync {
    /// Persist entities of one type; `policy` tells how rows already
    /// present in the destination must be treated.
    async fn write(
        &self,
        entity_type: &EntityType,
        policy: ConflictPolicy,
        entities: &[Entity],
    ) -> anyhow::Result<()>;
}

/// Hand every buffered entity of `entity_types` to the sink.
///
/// Returns the number of written entities per type.
pub async fn drain_buffer<'a>(
    buffer: &dyn SharedBuffer,
    entity_types: impl IntoIterator<Item = &'a EntityType>,
    sink: &dyn EntitySink,
) -> anyhow::Result<BTreeMap<EntityType, usize>> {
    let mut written = BTreeMap::new();
    for entity_type in entity_types {
        let entities = buffer.get(entity_type).await?;
        if !entities.is_empty() {
            sink.write(entity_type, entity_type::conflict_policy(entity_type), &entities)
                .await?;
        }
        written.insert(entity_type.clone(), entities.len());
    }
    Ok(written)
}

/// Appends entities as json lines to `<dir>/<entity_type>.jsonl`.
///
/// Files are append-only, so conflict policies are left to whoever loads them.
#[derive(Debug, Clone)]
pub struct JsonLinesSink {
    dir: PathBuf,
}

impl JsonLinesSink {
    pub async fn new(dir: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn path(&self, entity_type: &EntityType) -> PathBuf {
        self.dir.join(format!("{entity_type}.jsonl"))
    }
}

#[async_trait]
impl EntitySink for JsonLinesSink {
    async fn write(
        &self,
        entity_type: &EntityType,
        policy: ConflictPolicy,
        entities: &[Entity],
    ) -> anyhow::Result<()> {
        let mut lines = Vec::new();
        for entity in entities {
            serde_json::to_writer(&mut lines, entity)?;
            lines.push(b'\n');
        }
        let path = self.path(entity_type);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&lines).await?;
        file.flush().await?;
        tracing::debug!(
            entity_type = %entity_type,
            count = entities.len(),
            policy = ?policy,
            path = %path.display(),
            "entities written"
        );
        Ok(())
    }
}
