use super::{Job, JobContext};
use crate::entity_type::EntityType;
use std::{collections::BTreeSet, fmt, sync::Arc};

pub type JobFactory = Arc<dyn Fn(&JobContext) -> anyhow::Result<Box<dyn Job>> + Send + Sync>;

/// Compile-time description of a job implementation.
///
/// Implement it for a job and register it with [`JobDescriptor::of`].
pub trait StaticJob: Job + Sized + 'static {
    const NAME: &'static str;
    const IS_FILTER: bool = false;
    const IS_LOCKED: bool = false;
    const ABLE_TO_REORG: bool = false;

    fn output_types() -> Vec<EntityType>;

    fn dependency_types() -> Vec<EntityType> {
        vec![]
    }

    fn new(cx: &JobContext) -> anyhow::Result<Self>;
}

/// Static metadata of a job plus the way to instantiate it.
///
/// Identity of a descriptor is its name.
#[derive(Clone)]
pub struct JobDescriptor {
    pub name: &'static str,
    pub output_types: BTreeSet<EntityType>,
    pub dependency_types: BTreeSet<EntityType>,
    /// The job can narrow what upstream raw fetch jobs retrieve.
    pub is_filter: bool,
    /// Exclusive producer of its outputs within a pipeline.
    pub is_locked: bool,
    pub able_to_reorg: bool,
    factory: JobFactory,
}

impl JobDescriptor {
    pub fn new(name: &'static str, factory: JobFactory) -> Self {
        Self {
            name,
            output_types: BTreeSet::new(),
            dependency_types: BTreeSet::new(),
            is_filter: false,
            is_locked: false,
            able_to_reorg: false,
            factory,
        }
    }

    pub fn of<J: StaticJob>() -> Self {
        let factory: JobFactory = Arc::new(|cx| Ok(Box::new(J::new(cx)?) as Box<dyn Job>));
        Self::new(J::NAME, factory)
            .outputs(J::output_types())
            .dependencies(J::dependency_types())
            .filter(J::IS_FILTER)
            .locked(J::IS_LOCKED)
            .reorg(J::ABLE_TO_REORG)
    }

    pub fn outputs(mut self, types: impl IntoIterator<Item = EntityType>) -> Self {
        self.output_types.extend(types);
        self
    }

    pub fn dependencies(mut self, types: impl IntoIterator<Item = EntityType>) -> Self {
        self.dependency_types.extend(types);
        self
    }

    pub fn filter(mut self, is_filter: bool) -> Self {
        self.is_filter = is_filter;
        self
    }

    pub fn locked(mut self, is_locked: bool) -> Self {
        self.is_locked = is_locked;
        self
    }

    pub fn reorg(mut self, able_to_reorg: bool) -> Self {
        self.able_to_reorg = able_to_reorg;
        self
    }

    pub fn instantiate(&self, cx: &JobContext) -> anyhow::Result<Box<dyn Job>> {
        (self.factory)(cx)
            .map_err(|err| err.context(format!("failed to instantiate job '{}'", self.name)))
    }
}

impl fmt::Debug for JobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobDescriptor")
            .field("name", &self.name)
            .field("output_types", &self.output_types)
            .field("dependency_types", &self.dependency_types)
            .field("is_filter", &self.is_filter)
            .field("is_locked", &self.is_locked)
            .field("able_to_reorg", &self.able_to_reorg)
            .finish()
    }
}

impl PartialEq for JobDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for JobDescriptor {}
