use crate::{
    buffer::SharedBuffer,
    entity_type::EntityType,
    error::JobError,
    job::{DataFilter, ExecutionPass, Filterable, Job, JobContext, JobDescriptor, Reorgable},
    types::Entity,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::{collections::VecDeque, sync::Arc};

#[derive(Debug, Clone)]
pub enum Outcome {
    Ok,
    Crash,
    Retriable,
    Fatal,
    Other,
}

/// Shared script and journal of a scripted job, cloned into every
/// instance the factory creates.
#[derive(Clone, Default)]
pub struct ScriptedJob {
    outcomes: Arc<Mutex<VecDeque<Outcome>>>,
    invocations: Arc<Mutex<Vec<ExecutionPass>>>,
    reverts: Arc<Mutex<Vec<u64>>>,
    output: Arc<Mutex<Vec<(EntityType, Entity)>>>,
    filter: Option<DataFilter>,
}

impl ScriptedJob {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outcomes of consecutive attempts; `Ok` once the script is exhausted.
    pub fn with_outcomes(self, outcomes: impl IntoIterator<Item = Outcome>) -> Self {
        self.outcomes.lock().extend(outcomes);
        self
    }

    pub fn with_filter(mut self, filter: DataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Entity appended to the buffer on every successful attempt.
    pub fn emitting(self, entity_type: EntityType, entity: impl Into<Entity>) -> Self {
        self.output.lock().push((entity_type, entity.into()));
        self
    }

    pub fn invocations(&self) -> usize {
        self.invocations.lock().len()
    }

    pub fn passes(&self) -> Vec<ExecutionPass> {
        self.invocations.lock().clone()
    }

    pub fn reverts(&self) -> Vec<u64> {
        self.reverts.lock().clone()
    }

    pub fn descriptor(
        &self,
        name: &'static str,
        deps: &[&str],
        outputs: &[&str],
    ) -> JobDescriptor {
        let script = self.clone();
        JobDescriptor::new(
            name,
            Arc::new(move |cx| {
                Ok(Box::new(ScriptedInstance {
                    name,
                    script: script.clone(),
                    cx: cx.clone(),
                }) as Box<dyn Job>)
            }),
        )
        .dependencies(deps.iter().map(|t| EntityType::new(*t)))
        .outputs(outputs.iter().map(|t| EntityType::new(*t)))
        .filter(self.filter.is_some())
    }
}

struct ScriptedInstance {
    name: &'static str,
    script: ScriptedJob,
    cx: JobContext,
}

#[async_trait]
impl Job for ScriptedInstance {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn collect(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        self.script.invocations.lock().push(pass.clone());
        let outcome = self.script.outcomes.lock().pop_front().unwrap_or(Outcome::Ok);
        match outcome {
            Outcome::Ok => Ok(()),
            Outcome::Crash => Err(JobError::crash(anyhow::anyhow!("scripted crash"))),
            Outcome::Retriable => Err(JobError::retriable(anyhow::anyhow!("scripted timeout"))),
            Outcome::Fatal => Err(JobError::fatal(anyhow::anyhow!("scripted bad input"))),
            Outcome::Other => Err(JobError::Other(anyhow::anyhow!("scripted surprise"))),
        }
    }

    async fn process(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        let output = self.script.output.lock().clone();
        for (entity_type, entity) in output {
            self.cx.buffer.append_many(&entity_type, vec![entity]).await?;
        }
        Ok(())
    }

    fn as_filterable(&self) -> Option<&dyn Filterable> {
        self.script.filter.as_ref().map(|_| self as &dyn Filterable)
    }

    fn as_reorgable(&mut self) -> Option<&mut dyn Reorgable> {
        Some(self)
    }
}

impl Filterable for ScriptedInstance {
    fn filter(&self) -> DataFilter {
        self.script.filter.clone().unwrap_or_default()
    }
}

impl Reorgable for ScriptedInstance {
    fn revert(&mut self, from_block: u64) {
        self.script.reverts.lock().push(from_block);
    }
}
