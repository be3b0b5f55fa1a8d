use crate::{
    entity_type::{self, EntityType},
    error::{JobError, SourceError},
    job::{ExecutionPass, Job, JobContext},
    types::Entity,
};
use async_trait::async_trait;
use futures::TryStreamExt;
use sea_orm::{Database, DatabaseConnection, DbBackend, FromQueryResult, JsonValue, Statement};
use std::collections::BTreeSet;

/// Supplies entity types from tables of an existing database, one table
/// per entity type named after it.
pub struct PostgresSourceJob {
    cx: JobContext,
    url: String,
    entity_types: BTreeSet<EntityType>,
    db: Option<DatabaseConnection>,
    rows: Vec<(EntityType, Vec<Entity>)>,
}

#[derive(FromQueryResult)]
struct JsonRow {
    row: JsonValue,
}

impl PostgresSourceJob {
    pub fn new(cx: &JobContext, url: String, entity_types: BTreeSet<EntityType>) -> Self {
        Self {
            cx: cx.clone(),
            url,
            entity_types,
            db: None,
            rows: vec![],
        }
    }

    async fn connection(&mut self) -> Result<DatabaseConnection, SourceError> {
        if let Some(db) = &self.db {
            return Ok(db.clone());
        }
        let db = Database::connect(&self.url).await?;
        self.db = Some(db.clone());
        Ok(db)
    }
}

/// Column holding the block a row belongs to.
fn block_column(entity_type: &EntityType) -> &'static str {
    if *entity_type == entity_type::BLOCK {
        "number"
    } else if *entity_type == entity_type::ADDRESS_STATS {
        "last_block_number"
    } else {
        "block_number"
    }
}

pub(super) fn select_statement(
    entity_type: &EntityType,
    start: u64,
    end: u64,
) -> Result<Statement, SourceError> {
    let table = entity_type.name();
    if table.is_empty() || !table.chars().all(|c| c.is_ascii_lowercase() || c == '_') {
        return Err(SourceError::InvalidRow(format!(
            "'{table}' is not a valid table name"
        )));
    }
    let column = block_column(entity_type);
    let sql = format!(
        "SELECT to_jsonb(t) AS row FROM \"{table}\" t \
         WHERE t.{column} BETWEEN $1 AND $2 ORDER BY t.{column}"
    );
    let bound = |block: u64| {
        i64::try_from(block).map_err(|_| {
            SourceError::InvalidRow(format!("block number {block} does not fit a bigint column"))
        })
    };
    Ok(Statement::from_sql_and_values(
        DbBackend::Postgres,
        sql,
        [bound(start)?.into(), bound(end)?.into()],
    ))
}

async fn read_entities(
    db: &DatabaseConnection,
    entity_type: &EntityType,
    statement: Statement,
) -> Result<Vec<Entity>, SourceError> {
    let mut stream = JsonRow::find_by_statement(statement).stream(db).await?;
    let mut entities = Vec::new();
    while let Some(JsonRow { row }) = stream.try_next().await? {
        let JsonValue::Object(row) = row else {
            return Err(SourceError::InvalidRow(format!(
                "row of '{entity_type}' is not an object"
            )));
        };
        entities.push(super::decode_row(entity_type, row)?);
    }
    Ok(entities)
}

#[async_trait]
impl Job for PostgresSourceJob {
    fn name(&self) -> &'static str {
        super::POSTGRES_SOURCE_JOB
    }

    async fn collect(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        self.rows.clear();
        let db = self.connection().await?;
        for entity_type in self.entity_types.clone() {
            let statement = select_statement(&entity_type, pass.range.start, pass.range.end)?;
            let entities = read_entities(&db, &entity_type, statement).await?;
            tracing::debug!(
                entity_type = %entity_type,
                count = entities.len(),
                "read postgres source"
            );
            self.rows.push((entity_type, entities));
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
