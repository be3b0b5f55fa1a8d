mod mock_provider;
mod scripted_job;

pub use mock_provider::MockChainDataProvider;
pub use scripted_job::{Outcome, ScriptedJob};

use crate::{
    buffer::InMemoryBuffer,
    entity_type::EntityType,
    error::JobError,
    executor::BatchExecutor,
    job::{ExecutionPass, Job, JobContext, JobDescriptor, JobSettings},
    settings::ExecutorSettings,
    token_cache::InMemoryTokenCache,
};
use async_trait::async_trait;
use std::{sync::Arc, time::Duration};

struct NoopJob(&'static str);

#[async_trait]
impl Job for NoopJob {
    fn name(&self) -> &'static str {
        self.0
    }

    async fn collect(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        Ok(())
    }

    async fn process(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        Ok(())
    }
}

/// Descriptor of a job doing nothing, for graph-only tests.
pub fn descriptor(name: &'static str, deps: &[&str], outputs: &[&str]) -> JobDescriptor {
    JobDescriptor::new(name, Arc::new(move |_| Ok(Box::new(NoopJob(name)) as Box<dyn Job>)))
        .dependencies(deps.iter().map(|t| EntityType::new(*t)))
        .outputs(outputs.iter().map(|t| EntityType::new(*t)))
}

pub fn test_executor() -> Arc<BatchExecutor> {
    Arc::new(BatchExecutor::new(ExecutorSettings {
        max_workers: 4,
        max_attempts: 2,
        min_wait: Duration::from_millis(1),
        max_wait: Duration::from_millis(5),
        call_timeout: Duration::from_secs(5),
    }))
}

/// Context over in-memory backends.
pub fn test_context(provider: MockChainDataProvider) -> JobContext {
    JobContext {
        buffer: Arc::new(InMemoryBuffer::new()),
        token_cache: Arc::new(InMemoryTokenCache::default()),
        provider: Arc::new(provider),
        executor: test_executor(),
        settings: JobSettings {
            batch_size: 2,
            debug_batch_size: 1,
        },
    }
}
