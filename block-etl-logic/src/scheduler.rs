//! Wiring of the registry, resolver, backends and runner from settings.

use crate::{
    buffer,
    entity_type::EntityType,
    error::{PipelineError, RunError},
    executor::BatchExecutor,
    job::{JobContext, StaticJob},
    jobs::ExtractTokensJob,
    provider::ChainDataProvider,
    registry::JobRegistry,
    resolver::{DependencyResolver, ResolvedPipeline},
    runner::{JobRunner, RunnerSettings},
    settings::PipelineSettings,
    source::SourcePath,
    token_cache::{build_token_cache, TokenCacheLoader},
};
use std::{collections::BTreeSet, sync::Arc};

pub struct Scheduler {
    registry: JobRegistry,
    settings: PipelineSettings,
    source: Option<SourcePath>,
    output_types: BTreeSet<EntityType>,
}

impl Scheduler {
    /// Scheduler over every job compiled into the crate.
    pub fn new(settings: PipelineSettings) -> Result<Self, PipelineError> {
        Self::with_registry(JobRegistry::with_default_jobs()?, settings)
    }

    /// Apply the configured source to `registry` and validate the
    /// requested entity type names.
    pub fn with_registry(
        mut registry: JobRegistry,
        settings: PipelineSettings,
    ) -> Result<Self, PipelineError> {
        let source = settings
            .source_path
            .as_deref()
            .map(SourcePath::parse)
            .transpose()?;
        if let Some(source) = &source {
            let source_types = registry.entity_types(&settings.required_source_types)?;
            registry.apply_source(source, source_types, settings.source_accuracy);
        }
        let output_types = registry.entity_types(&settings.required_output_types)?;
        Ok(Self {
            registry,
            settings,
            source,
            output_types,
        })
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    pub fn output_types(&self) -> &BTreeSet<EntityType> {
        &self.output_types
    }

    pub fn resolve(&self) -> Result<ResolvedPipeline, PipelineError> {
        DependencyResolver::new(&self.registry)
            .resolve(&self.output_types, self.settings.auto_reorg)
    }

    /// Resolve the pipeline, connect its backends and bind the jobs to them.
    ///
    /// The token cache is only preloaded when a job of the pipeline reads it.
    pub async fn build_runner(
        &self,
        provider: Arc<dyn ChainDataProvider>,
    ) -> Result<JobRunner, RunError> {
        let pipeline = self.resolve()?;
        let buffer = buffer::build_buffer(&self.settings.cache).await?;

        let initial_tokens = if pipeline
            .jobs
            .iter()
            .any(|job| job.name == ExtractTokensJob::NAME)
        {
            TokenCacheLoader::load(self.source.as_ref()).await?
        } else {
            Default::default()
        };
        let token_cache = build_token_cache(&self.settings.cache, initial_tokens).await;

        let cx = JobContext {
            buffer,
            token_cache,
            provider,
            executor: Arc::new(BatchExecutor::new(self.settings.executor_settings())),
            settings: self.settings.job_settings(),
        };
        JobRunner::new(pipeline, cx, RunnerSettings::from(&self.settings))
    }
}
