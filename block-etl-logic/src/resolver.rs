use crate::{
    entity_type::EntityType, error::PipelineError, job::JobDescriptor, registry::JobRegistry,
};
use itertools::Itertools;
use std::{
    cmp::Reverse,
    collections::{BTreeSet, BinaryHeap, HashMap, HashSet, VecDeque},
};

/// Jobs needed to produce a set of output types, in registration order.
#[derive(Debug, Clone)]
pub struct RequiredJobs {
    pub jobs: Vec<JobDescriptor>,
    /// Every job producing a requested type can narrow upstream fetching.
    pub is_pipeline_filter: bool,
}

/// Jobs in execution order.
#[derive(Debug, Clone)]
pub struct ResolvedPipeline {
    pub output_types: BTreeSet<EntityType>,
    pub jobs: Vec<JobDescriptor>,
    pub is_pipeline_filter: bool,
}

impl ResolvedPipeline {
    pub fn job_names(&self) -> Vec<&'static str> {
        self.jobs.iter().map(|job| job.name).collect()
    }
}

pub struct DependencyResolver<'a> {
    registry: &'a JobRegistry,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(registry: &'a JobRegistry) -> Self {
        Self { registry }
    }

    /// Compute the required job set and order it.
    ///
    /// With `auto_reorg`, every resolved job must be able to reorg.
    pub fn resolve(
        &self,
        output_types: &BTreeSet<EntityType>,
        auto_reorg: bool,
    ) -> Result<ResolvedPipeline, PipelineError> {
        let required = self.required_jobs(output_types)?;
        let jobs = self.resolve_dependencies(&required.jobs)?;

        if auto_reorg {
            let unable = jobs
                .iter()
                .filter(|job| !job.able_to_reorg)
                .map(|job| job.name.to_string())
                .collect_vec();
            if !unable.is_empty() {
                return Err(PipelineError::ReorgUnsupported { jobs: unable });
            }
        }

        tracing::info!(
            output_types = ?output_types,
            jobs = ?jobs.iter().map(|job| job.name).collect_vec(),
            is_pipeline_filter = required.is_pipeline_filter,
            "resolved job pipeline"
        );
        Ok(ResolvedPipeline {
            output_types: output_types.clone(),
            jobs,
            is_pipeline_filter: required.is_pipeline_filter,
        })
    }

    pub fn required_jobs(
        &self,
        output_types: &BTreeSet<EntityType>,
    ) -> Result<RequiredJobs, PipelineError> {
        let candidates = self.dedup(
            output_types
                .iter()
                .flat_map(|t| self.registry.producers_of(t)),
        );
        let is_pipeline_filter =
            !candidates.is_empty() && candidates.iter().all(|job| job.is_filter);

        let locked = candidates.iter().filter(|job| job.is_locked).collect_vec();
        if locked.len() > 1 {
            return Err(PipelineError::LockConflict {
                jobs: locked.iter().map(|job| job.name.to_string()).collect(),
            });
        }
        if let Some(locked) = locked.first() {
            let outside = output_types
                .difference(&locked.output_types)
                .cloned()
                .collect_vec();
            if !outside.is_empty() {
                return Err(PipelineError::LockedScopeExceeded {
                    job: locked.name.to_string(),
                    outside,
                });
            }
        }

        let mut seen_types: HashSet<EntityType> = HashSet::new();
        let mut queue: VecDeque<EntityType> = output_types.iter().cloned().collect();
        let mut required: Vec<&JobDescriptor> = Vec::new();

        while let Some(entity_type) = queue.pop_front() {
            if !seen_types.insert(entity_type.clone()) {
                continue;
            }
            for producer in self.registry.producers_of(&entity_type) {
                if required.iter().any(|job| job.name == producer.name) {
                    continue;
                }
                queue.extend(producer.dependency_types.iter().cloned());
                required.push(producer);
            }
        }

        if required.is_empty() {
            return Err(PipelineError::NoJobsFound {
                requested: output_types.iter().cloned().collect(),
            });
        }
        let required = self.dedup(required);
        let unsatisfied = required
            .iter()
            .flat_map(|job| job.dependency_types.iter())
            .filter(|t| self.registry.producers_of(t).is_empty())
            .min();
        if let Some(entity_type) = unsatisfied {
            let consumers = required
                .iter()
                .filter(|job| job.dependency_types.contains(entity_type))
                .map(|job| job.name.to_string())
                .collect();
            return Err(PipelineError::UnsatisfiedDependency {
                entity_type: entity_type.clone(),
                consumers,
            });
        }

        Ok(RequiredJobs {
            jobs: required.into_iter().cloned().collect(),
            is_pipeline_filter,
        })
    }

    /// Order jobs so that every job runs after the producers of its
    /// dependency types (Kahn's algorithm). Ties are broken by
    /// registration order.
    pub fn resolve_dependencies(
        &self,
        jobs: &[JobDescriptor],
    ) -> Result<Vec<JobDescriptor>, PipelineError> {
        let rank = |job: &JobDescriptor| self.registry.position(job.name).unwrap_or(usize::MAX);
        let by_name: HashMap<&str, usize> = jobs
            .iter()
            .enumerate()
            .map(|(idx, job)| (job.name, idx))
            .collect();

        let mut edges: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); jobs.len()];
        let mut in_degree = vec![0usize; jobs.len()];
        for (consumer_idx, consumer) in jobs.iter().enumerate() {
            for dependency in &consumer.dependency_types {
                for producer in self.registry.producers_of(dependency) {
                    let Some(&producer_idx) = by_name.get(producer.name) else {
                        continue;
                    };
                    // a job reading its own output does not constrain the order
                    if producer_idx != consumer_idx && edges[producer_idx].insert(consumer_idx) {
                        in_degree[consumer_idx] += 1;
                    }
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse((rank(&jobs[idx]), idx)))
            .collect();
        let mut sorted = Vec::with_capacity(jobs.len());
        while let Some(Reverse((_, idx))) = ready.pop() {
            sorted.push(idx);
            for &next in &edges[idx] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.push(Reverse((rank(&jobs[next]), next)));
                }
            }
        }

        if sorted.len() != jobs.len() {
            return Err(PipelineError::DependencyCycle {
                jobs: cycle_members(&edges, &in_degree)
                    .into_iter()
                    .map(|idx| jobs[idx].name.to_string())
                    .collect(),
            });
        }

        Ok(sorted.into_iter().map(|idx| jobs[idx].clone()).collect())
    }

    /// Deduplicate by job name, keeping registration order.
    fn dedup<'j>(
        &self,
        jobs: impl IntoIterator<Item = &'j JobDescriptor>,
    ) -> Vec<&'j JobDescriptor> {
        jobs.into_iter()
            .unique_by(|job| job.name)
            .sorted_by_key(|job| self.registry.position(job.name))
            .collect()
    }
}

/// Jobs left unsorted that lie on a cycle.
///
/// Jobs only downstream of a cycle are peeled off: they are the ones left
/// without any unsorted successor.
fn cycle_members(edges: &[BTreeSet<usize>], in_degree: &[usize]) -> BTreeSet<usize> {
    let mut left: BTreeSet<usize> = in_degree
        .iter()
        .enumerate()
        .filter(|(_, degree)| **degree > 0)
        .map(|(idx, _)| idx)
        .collect();
    loop {
        let sinks = left
            .iter()
            .copied()
            .filter(|idx| edges[*idx].is_disjoint(&left))
            .collect_vec();
        if sinks.is_empty() {
            return left;
        }
        for idx in sinks {
            left.remove(&idx);
        }
    }
}
