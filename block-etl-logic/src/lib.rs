pub mod buffer;
pub mod entity_type;
mod error;
pub mod executor;
pub mod job;
pub mod jobs;
pub mod provider;
mod redis_conn;
pub mod registry;
pub mod resolver;
pub mod runner;
mod scheduler;
pub mod settings;
pub mod sink;
pub mod source;
#[cfg(test)]
pub mod test_utils;
pub mod token_cache;
pub mod types;

pub use error::*;
pub use executor::BatchExecutor;
pub use job::{BlockRange, ExecutionPass, Job, JobContext, JobDescriptor, StaticJob};
pub use registry::JobRegistry;
pub use resolver::{DependencyResolver, ResolvedPipeline};
pub use runner::{JobOutcome, JobRunner, RunReport, RunnerSettings};
pub use scheduler::Scheduler;
pub use settings::PipelineSettings;
