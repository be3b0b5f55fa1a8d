use crate::{
    entity_type::{self, EntityType},
    error::PipelineError,
    job::JobDescriptor,
    jobs,
    source::SourcePath,
};
use std::collections::{BTreeSet, HashMap};

/// All jobs known to the process, indexed by the entity types they
/// produce and consume.
///
/// Jobs are kept in registration order; indices preserve that order,
/// which the resolver relies on for reproducible scheduling.
#[derive(Debug, Default, Clone)]
pub struct JobRegistry {
    jobs: Vec<JobDescriptor>,
    producers: HashMap<EntityType, Vec<usize>>,
    consumers: HashMap<EntityType, Vec<usize>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry of every job compiled into the crate.
    pub fn with_default_jobs() -> Result<Self, PipelineError> {
        Self::register_all(jobs::all_jobs())
    }

    pub fn register_all(
        descriptors: impl IntoIterator<Item = JobDescriptor>,
    ) -> Result<Self, PipelineError> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            registry.register(descriptor)?;
        }
        tracing::debug!(jobs = registry.jobs.len(), "job registry initialized");
        Ok(registry)
    }

    /// Register a job, rejecting a second producer of any entity type.
    ///
    /// Two locked jobs claiming the same type are a lock conflict.
    pub fn register(&mut self, descriptor: JobDescriptor) -> Result<(), PipelineError> {
        if self.get(descriptor.name).is_some() {
            return Err(PipelineError::DuplicateJob(descriptor.name.to_string()));
        }
        for output in &descriptor.output_types {
            if let Some(existing) = self.producers.get(output).and_then(|p| p.first()) {
                let existing = &self.jobs[*existing];
                if existing.is_locked && descriptor.is_locked {
                    return Err(PipelineError::LockConflict {
                        jobs: vec![existing.name.to_string(), descriptor.name.to_string()],
                    });
                }
                return Err(PipelineError::DuplicateProducer {
                    entity_type: output.clone(),
                    jobs: vec![existing.name.to_string(), descriptor.name.to_string()],
                });
            }
        }
        self.jobs.push(descriptor);
        self.rebuild_indices();
        Ok(())
    }

    /// Register the bulk data-source job of `source` supplying `entity_types`
    /// directly. See [`JobRegistry::apply_source_with`].
    pub fn apply_source(
        &mut self,
        source: &SourcePath,
        entity_types: BTreeSet<EntityType>,
        accuracy: bool,
    ) {
        self.apply_source_with(entity_types, accuracy, |types| source.descriptor(types));
    }

    /// Register a data-source job covering `covered`, built by `build` from
    /// the final set of types it has to supply.
    ///
    /// Without `accuracy`, jobs whose outputs are fully covered by the source
    /// are dropped and partially covered jobs lose the covered outputs.
    /// With `accuracy`, overlapping jobs are kept and the source additionally
    /// supplies their inputs, so they recompute the covered types. The
    /// widened source is not checked for duplicate producers.
    pub fn apply_source_with(
        &mut self,
        covered: BTreeSet<EntityType>,
        accuracy: bool,
        build: impl FnOnce(BTreeSet<EntityType>) -> JobDescriptor,
    ) {
        let mut supplied = covered.clone();
        if accuracy {
            let widened: BTreeSet<EntityType> = self
                .jobs
                .iter()
                .filter(|job| !job.output_types.is_disjoint(&covered))
                .flat_map(|job| job.dependency_types.iter().cloned())
                .collect();
            tracing::info!(
                widened = ?widened,
                "source accuracy mode: keeping overlapping jobs, widening source outputs"
            );
            supplied.extend(widened);
        }
        let source = build(supplied);

        if !accuracy {
            self.jobs.retain_mut(|job| {
                if job.output_types.is_subset(&covered) && !job.output_types.is_empty() {
                    tracing::info!(
                        job = job.name,
                        source = source.name,
                        "job is covered by source, removing"
                    );
                    return false;
                }
                if !job.output_types.is_disjoint(&covered) {
                    tracing::info!(
                        job = job.name,
                        source = source.name,
                        "job is partially covered by source, narrowing"
                    );
                    job.output_types.retain(|t| !covered.contains(t));
                }
                true
            });
        }

        self.jobs.retain(|job| job.name != source.name);
        self.jobs.push(source);
        self.rebuild_indices();
    }

    fn rebuild_indices(&mut self) {
        self.producers.clear();
        self.consumers.clear();
        for (idx, job) in self.jobs.iter().enumerate() {
            for output in &job.output_types {
                self.producers.entry(output.clone()).or_default().push(idx);
            }
            for dependency in &job.dependency_types {
                self.consumers.entry(dependency.clone()).or_default().push(idx);
            }
        }
    }

    pub fn jobs(&self) -> &[JobDescriptor] {
        &self.jobs
    }

    pub fn get(&self, name: &str) -> Option<&JobDescriptor> {
        self.jobs.iter().find(|job| job.name == name)
    }

    /// Position of the job in registration order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.jobs.iter().position(|job| job.name == name)
    }

    pub fn producers_of(&self, entity_type: &EntityType) -> Vec<&JobDescriptor> {
        self.lookup(&self.producers, entity_type)
    }

    pub fn consumers_of(&self, entity_type: &EntityType) -> Vec<&JobDescriptor> {
        self.lookup(&self.consumers, entity_type)
    }

    fn lookup(
        &self,
        index: &HashMap<EntityType, Vec<usize>>,
        entity_type: &EntityType,
    ) -> Vec<&JobDescriptor> {
        index
            .get(entity_type)
            .map(|ids| ids.iter().map(|idx| &self.jobs[*idx]).collect())
            .unwrap_or_default()
    }

    /// Resolve a configured name into an entity type known to the
    /// catalog or to any registered job.
    pub fn entity_type(&self, name: &str) -> Result<EntityType, PipelineError> {
        let name = name.trim();
        entity_type::known(name)
            .or_else(|| {
                self.producers
                    .keys()
                    .chain(self.consumers.keys())
                    .find(|t| t.name() == name)
                    .cloned()
            })
            .ok_or_else(|| PipelineError::UnknownEntityType(name.to_string()))
    }

    pub fn entity_types<'a>(
        &self,
        names: impl IntoIterator<Item = &'a String>,
    ) -> Result<BTreeSet<EntityType>, PipelineError> {
        names.into_iter().map(|name| self.entity_type(name)).collect()
    }
}
