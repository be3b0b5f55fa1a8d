use crate::{
    entity_type::EntityType,
    error::{JobError, SourceError},
    job::{BlockRange, ExecutionPass, Job, JobContext},
    types::Entity,
};
use async_trait::async_trait;
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

/// Supplies entity types from `<dir>/<entity_type>.csv` files.
pub struct CsvSourceJob {
    cx: JobContext,
    dir: PathBuf,
    entity_types: BTreeSet<EntityType>,
    rows: Vec<(EntityType, Vec<Entity>)>,
}

impl CsvSourceJob {
    pub fn new(cx: &JobContext, dir: PathBuf, entity_types: BTreeSet<EntityType>) -> Self {
        Self {
            cx: cx.clone(),
            dir,
            entity_types,
            rows: vec![],
        }
    }
}

fn read_entities(
    path: &Path,
    entity_type: &EntityType,
    range: BlockRange,
) -> Result<Vec<Entity>, SourceError> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut entities = Vec::new();
    for record in reader.records() {
        let record = record?;
        let entity = Entity::from_csv_record(entity_type, &record, &headers)
            .ok_or_else(|| {
                SourceError::InvalidRow(format!(
                    "entity type '{entity_type}' can not be read from csv"
                ))
            })??;
        if range.contains(entity.block_number()) {
            entities.push(entity);
        }
    }
    Ok(entities)
}

#[async_trait]
impl Job for CsvSourceJob {
    fn name(&self) -> &'static str {
        super::CSV_SOURCE_JOB
    }

    async fn collect(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        self.rows.clear();
        for entity_type in &self.entity_types {
            let path = self.dir.join(format!("{entity_type}.csv"));
            if !path.exists() {
                return Err(JobError::fatal(anyhow::anyhow!(
                    "source file {} for '{entity_type}' does not exist",
                    path.display()
                )));
            }
            let range = pass.range;
            let task_type = entity_type.clone();
            let entities =
                tokio::task::spawn_blocking(move || read_entities(&path, &task_type, range))
                    .await
                    .map_err(JobError::crash)??;
            tracing::debug!(entity_type = %entity_type, count = entities.len(), "read csv source");
            self.rows.push((entity_type.clone(), entities));
        }
        Ok(())
    }

    async fn process(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        for (entity_type, entities) in std::mem::take(&mut self.rows) {
            self.cx.buffer.append_many(&entity_type, entities).await?;
        }
        Ok(())
    }
}
