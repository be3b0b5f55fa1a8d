use crate::{
    entity_type::EntityType,
    error::{JobError, PipelineError, RunError},
    job::{BlockRange, DataFilter, ExecutionPass, Job, JobContext},
    resolver::ResolvedPipeline,
    settings::{PipelineSettings, RetrySettings},
};
use std::collections::BTreeMap;
use tracing::instrument;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Reruns of a job after a retriable failure.
    pub job_retries: usize,
    pub retry: RetrySettings,
    pub force_filter_mode: bool,
    pub reuse_job_instances: bool,
}

impl From<&PipelineSettings> for RunnerSettings {
    fn from(settings: &PipelineSettings) -> Self {
        Self {
            job_retries: settings.job_retries,
            retry: settings.job_retry.clone(),
            force_filter_mode: settings.force_filter_mode,
            reuse_job_instances: settings.reuse_job_instances,
        }
    }
}

/// How a job ended after all its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed { attempts: usize },
    /// Every attempt failed with a retriable error.
    Exhausted { attempts: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub range: BlockRange,
    /// Buffered entities per requested output type.
    pub counts: BTreeMap<EntityType, usize>,
    pub exhausted_jobs: Vec<&'static str>,
}

impl RunReport {
    pub fn is_complete(&self) -> bool {
        self.exhausted_jobs.is_empty()
    }
}

/// Runs a resolved pipeline over block ranges, one pass at a time.
pub struct JobRunner {
    pipeline: ResolvedPipeline,
    cx: JobContext,
    settings: RunnerSettings,
    instances: Option<Vec<Box<dyn Job>>>,
}

impl JobRunner {
    pub fn new(
        pipeline: ResolvedPipeline,
        cx: JobContext,
        settings: RunnerSettings,
    ) -> Result<Self, RunError> {
        let mut runner = Self {
            pipeline,
            cx,
            settings,
            instances: None,
        };
        if runner.settings.reuse_job_instances {
            runner.instances = Some(runner.instantiate()?);
        }
        Ok(runner)
    }

    pub fn pipeline(&self) -> &ResolvedPipeline {
        &self.pipeline
    }

    pub fn context(&self) -> &JobContext {
        &self.cx
    }

    fn instantiate(&self) -> Result<Vec<Box<dyn Job>>, RunError> {
        self.pipeline
            .jobs
            .iter()
            .map(|descriptor| descriptor.instantiate(&self.cx))
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(RunError::Instantiation)
    }

    #[instrument(name = "pass", skip(self), level = "info")]
    pub async fn run(&mut self, start_block: u64, end_block: u64) -> Result<RunReport, RunError> {
        if start_block > end_block {
            return Err(PipelineError::InvalidRange {
                start: start_block,
                end: end_block,
            }
            .into());
        }
        let range = BlockRange::new(start_block, end_block);

        self.cx.buffer.clear().await?;

        let mut instances = match self.instances.take() {
            Some(instances) => instances,
            None => self.instantiate()?,
        };
        let result = self.run_jobs(&mut instances, range).await;
        if self.settings.reuse_job_instances {
            self.instances = Some(instances);
        }
        let exhausted_jobs = result?;

        let mut counts = BTreeMap::new();
        for entity_type in &self.pipeline.output_types {
            let count = self.cx.buffer.len(entity_type).await?;
            tracing::info!(entity_type = %entity_type, count, "entities produced");
            counts.insert(entity_type.clone(), count);
        }

        Ok(RunReport {
            range,
            counts,
            exhausted_jobs,
        })
    }

    async fn run_jobs(
        &self,
        instances: &mut [Box<dyn Job>],
        range: BlockRange,
    ) -> Result<Vec<&'static str>, RunError> {
        let pass = ExecutionPass {
            range,
            filter: self.pass_filter(instances),
        };
        if let Some(filter) = &pass.filter {
            tracing::debug!(?filter, "running in filter mode");
        }

        let mut exhausted = Vec::new();
        for job in instances.iter_mut() {
            let name = job.name();
            match self.job_with_retries(job.as_mut(), &pass).await {
                Ok(JobOutcome::Completed { .. }) => {}
                Ok(JobOutcome::Exhausted { .. }) => exhausted.push(name),
                Err(source) => {
                    return Err(RunError::Job {
                        job: name,
                        range,
                        source,
                    })
                }
            }
        }
        Ok(exhausted)
    }

    /// Union of the filters of all filter jobs, when the pipeline runs in
    /// filter mode.
    fn pass_filter(&self, instances: &[Box<dyn Job>]) -> Option<DataFilter> {
        if !(self.pipeline.is_pipeline_filter || self.settings.force_filter_mode) {
            return None;
        }
        instances
            .iter()
            .filter_map(|job| job.as_filterable())
            .map(|filterable| filterable.filter())
            .reduce(DataFilter::merge)
    }

    /// Run one job until it succeeds, with up to `job_retries` reruns
    /// after retriable failures.
    ///
    /// A crash or a non retriable failure is returned immediately; running
    /// out of retries is not an error and is reported as
    /// [`JobOutcome::Exhausted`].
    pub async fn job_with_retries(
        &self,
        job: &mut dyn Job,
        pass: &ExecutionPass,
    ) -> Result<JobOutcome, JobError> {
        let name = job.name();
        let max_attempts = self.settings.job_retries + 1;
        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(job = name, attempt, "running job");
            let err = match job.run(pass).await {
                Ok(()) => return Ok(JobOutcome::Completed { attempts: attempt }),
                Err(err) => err,
            };
            match err {
                JobError::Retriable(err) if attempt < max_attempts => {
                    let delay = self.settings.retry.delay(attempt as u32 - 1);
                    tracing::warn!(
                        job = name,
                        attempt,
                        ?delay,
                        error = ?err,
                        "job failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                JobError::Retriable(err) => {
                    tracing::error!(
                        job = name,
                        start_block = pass.range.start,
                        end_block = pass.range.end,
                        retries = self.settings.job_retries,
                        error = ?err,
                        "job exhausted retries, continuing with the next job"
                    );
                    return Ok(JobOutcome::Exhausted { attempts: attempt });
                }
                JobError::Crash(err) => {
                    tracing::error!(job = name, error = ?err, "job crashed, aborting run");
                    return Err(JobError::Crash(err));
                }
                err => {
                    tracing::error!(job = name, error = ?err, "job failed");
                    return Err(err);
                }
            }
        }
    }

    /// Roll back state of reorg-capable job instances.
    pub fn revert(&mut self, from_block: u64) {
        let Some(instances) = self.instances.as_mut() else {
            tracing::debug!(
                from_block,
                "job instances are not kept between passes, nothing to revert"
            );
            return;
        };
        for job in instances.iter_mut() {
            let name = job.name();
            if let Some(reorgable) = job.as_reorgable() {
                tracing::info!(job = name, from_block, "reverting job state");
                reorgable.revert(from_block);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        buffer::SharedBufferExt,
        entity_type,
        registry::JobRegistry,
        resolver::DependencyResolver,
        test_utils::{test_context, MockChainDataProvider, Outcome, ScriptedJob},
        types::{Block, TokenTransfer},
    };
    use alloy::primitives::B256;
    use pretty_assertions::assert_eq;
    use std::{collections::BTreeSet, time::Duration};

    fn settings(job_retries: usize) -> RunnerSettings {
        RunnerSettings {
            job_retries,
            retry: RetrySettings {
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
            force_filter_mode: false,
            reuse_job_instances: true,
        }
    }

    fn runner(
        registry: &JobRegistry,
        outputs: &[&str],
        settings: RunnerSettings,
    ) -> JobRunner {
        let outputs: BTreeSet<_> = outputs.iter().map(|t| EntityType::new(*t)).collect();
        let pipeline = DependencyResolver::new(registry)
            .resolve(&outputs, false)
            .unwrap();
        JobRunner::new(pipeline, test_context(MockChainDataProvider::new()), settings).unwrap()
    }

    #[tokio::test]
    async fn retriable_failures_are_retried_until_success() {
        let job = ScriptedJob::new().with_outcomes([Outcome::Retriable, Outcome::Retriable]);
        let registry = JobRegistry::register_all([job.descriptor("flaky", &[], &["a"])]).unwrap();
        let runner = runner(&registry, &["a"], settings(5));

        let mut instance = registry
            .get("flaky")
            .unwrap()
            .instantiate(runner.context())
            .unwrap();
        let outcome = runner
            .job_with_retries(
                instance.as_mut(),
                &ExecutionPass::new(BlockRange::new(1, 1)),
            )
            .await
            .unwrap();
        assert_eq!(outcome, JobOutcome::Completed { attempts: 3 });
        assert_eq!(job.invocations(), 3);
    }

    #[tokio::test]
    async fn exhausted_job_is_reported_and_next_job_runs() {
        let flaky = ScriptedJob::new().with_outcomes([
            Outcome::Retriable,
            Outcome::Retriable,
            Outcome::Retriable,
        ]);
        let next = ScriptedJob::new();
        let registry = JobRegistry::register_all([
            flaky.descriptor("flaky", &[], &["a"]),
            next.descriptor("next", &["a"], &["b"]),
        ])
        .unwrap();

        let report = runner(&registry, &["b"], settings(2)).run(1, 5).await.unwrap();
        assert_eq!(flaky.invocations(), 3);
        assert_eq!(next.invocations(), 1);
        assert_eq!(report.exhausted_jobs, vec!["flaky"]);
    }

    #[tokio::test]
    async fn crash_aborts_without_retry_or_later_jobs() {
        let crashing = ScriptedJob::new().with_outcomes([Outcome::Crash]);
        let later = ScriptedJob::new();
        let registry = JobRegistry::register_all([
            crashing.descriptor("crashing", &[], &["a"]),
            later.descriptor("later", &["a"], &["b"]),
        ])
        .unwrap();

        let err = runner(&registry, &["b"], settings(5)).run(1, 1).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::Job {
                job: "crashing",
                source: JobError::Crash(_),
                ..
            }
        ));
        assert_eq!(crashing.invocations(), 1);
        assert_eq!(later.invocations(), 0);
    }

    #[tokio::test]
    async fn fatal_and_unclassified_failures_propagate_immediately() {
        for outcome in [Outcome::Fatal, Outcome::Other] {
            let job = ScriptedJob::new().with_outcomes([outcome]);
            let registry =
                JobRegistry::register_all([job.descriptor("broken", &[], &["a"])]).unwrap();
            let err = runner(&registry, &["a"], settings(5)).run(1, 1).await.unwrap_err();
            assert!(matches!(err, RunError::Job { job: "broken", .. }));
            assert_eq!(job.invocations(), 1);
        }
    }

    #[tokio::test]
    async fn invalid_range_is_rejected() {
        let job = ScriptedJob::new();
        let registry = JobRegistry::register_all([job.descriptor("a", &[], &["a"])]).unwrap();
        let err = runner(&registry, &["a"], settings(0)).run(10, 9).await.unwrap_err();
        assert!(matches!(
            err,
            RunError::Pipeline(PipelineError::InvalidRange { start: 10, end: 9 })
        ));
        assert_eq!(job.invocations(), 0);
    }

    #[tokio::test]
    async fn buffer_is_cleared_between_passes() {
        let job = ScriptedJob::new().emitting(
            entity_type::BLOCK,
            Block {
                number: 1,
                ..Default::default()
            },
        );
        let registry =
            JobRegistry::register_all([job.descriptor("blocks", &[], &["block"])]).unwrap();
        let mut runner = runner(&registry, &["block"], settings(0));

        let first = runner.run(1, 1).await.unwrap();
        let second = runner.run(2, 2).await.unwrap();
        assert_eq!(first.counts[&entity_type::BLOCK], 1);
        assert_eq!(second.counts[&entity_type::BLOCK], 1);
        assert_eq!(
            runner.context().buffer.get_records::<Block>().await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn filter_pipeline_passes_merged_filter_to_every_job() {
        let topic = B256::repeat_byte(7);
        let logs = ScriptedJob::new();
        let transfers = ScriptedJob::new()
            .with_filter(crate::job::DataFilter::with_topics([topic]))
            .emitting(entity_type::TOKEN_TRANSFER, TokenTransfer::default());
        let registry = JobRegistry::register_all([
            logs.descriptor("logs", &[], &["log"]),
            transfers.descriptor("transfers", &["log"], &["token_transfer"]),
        ])
        .unwrap();

        runner(&registry, &["token_transfer"], settings(0))
            .run(3, 4)
            .await
            .unwrap();

        let pass = &logs.passes()[0];
        assert_eq!(pass.range, BlockRange::new(3, 4));
        assert_eq!(
            pass.filter,
            Some(crate::job::DataFilter::with_topics([topic]))
        );
    }

    #[tokio::test]
    async fn non_filter_pipeline_runs_unfiltered_unless_forced() {
        let logs = ScriptedJob::new();
        let stats =
            ScriptedJob::new().with_filter(crate::job::DataFilter::with_topics([B256::ZERO]));
        let plain = ScriptedJob::new();
        let registry = JobRegistry::register_all([
            logs.descriptor("logs", &[], &["log"]),
            stats.descriptor("stats", &["log"], &["stats"]),
            plain.descriptor("plain", &["log"], &["plain"]),
        ])
        .unwrap();

        runner(&registry, &["stats", "plain"], settings(0))
            .run(1, 1)
            .await
            .unwrap();
        assert_eq!(logs.passes()[0].filter, None);

        let forced = RunnerSettings {
            force_filter_mode: true,
            ..settings(0)
        };
        runner(&registry, &["stats", "plain"], forced)
            .run(1, 1)
            .await
            .unwrap();
        assert!(logs.passes()[1].filter.is_some());
    }

    #[tokio::test]
    async fn revert_reaches_kept_instances() {
        let job = ScriptedJob::new();
        let registry = JobRegistry::register_all([job.descriptor("a", &[], &["a"])]).unwrap();

        let mut kept = runner(&registry, &["a"], settings(0));
        kept.revert(42);
        assert_eq!(job.reverts(), vec![42]);

        let mut fresh = runner(
            &registry,
            &["a"],
            RunnerSettings {
                reuse_job_instances: false,
                ..settings(0)
            },
        );
        fresh.revert(43);
        assert_eq!(job.reverts(), vec![42]);
    }
}
