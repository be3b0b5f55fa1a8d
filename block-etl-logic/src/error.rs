use crate::{entity_type::EntityType, job::BlockRange};
use thiserror::Error;

/// Construction-time failures of the registry, resolver and runner.
///
/// These are always fatal: there is no partial pipeline fallback.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("entity type '{entity_type}' is produced by more than one job: {jobs:?}")]
    DuplicateProducer {
        entity_type: EntityType,
        jobs: Vec<String>,
    },
    #[error("job '{0}' is registered twice")]
    DuplicateJob(String),
    #[error("more than one locked job is required at once: {jobs:?}")]
    LockConflict { jobs: Vec<String> },
    #[error(
        "requested outputs exceed locked job's scope: job '{job}' does not produce {outside:?}"
    )]
    LockedScopeExceeded {
        job: String,
        outside: Vec<EntityType>,
    },
    #[error(
        "no jobs found for requested output types {requested:?}; the producing job may be \
         unregistered, the entity type names may not match the job bindings, or the registry \
         failed to load"
    )]
    NoJobsFound { requested: Vec<EntityType> },
    #[error("entity type '{entity_type}' required by {consumers:?} has no producer")]
    UnsatisfiedDependency {
        entity_type: EntityType,
        consumers: Vec<String>,
    },
    #[error("dependency cycle detected between jobs: {jobs:?}")]
    DependencyCycle { jobs: Vec<String> },
    #[error("unknown entity type '{0}'")]
    UnknownEntityType(String),
    #[error("auto reorg is enabled, but jobs {jobs:?} are not able to reorg")]
    ReorgUnsupported { jobs: Vec<String> },
    #[error("invalid block range: start {start} is greater than end {end}")]
    InvalidRange { start: u64, end: u64 },
    #[error("invalid source path '{0}'")]
    InvalidSource(String),
}

/// Failure of a single job attempt.
///
/// The variant decides what the runner does next, see
/// [`crate::runner::JobRunner::job_with_retries`].
#[derive(Error, Debug)]
pub enum JobError {
    /// Unrecoverable misconfiguration or corrupted data. Aborts the whole run.
    #[error("unrecoverable job failure: {0:#}")]
    Crash(anyhow::Error),
    /// Transient failure (rpc timeout, rate limiting, node not synced).
    #[error("transient job failure: {0:#}")]
    Retriable(anyhow::Error),
    /// The input of the job is invalid in a way retrying can not fix.
    #[error("job failure: {0:#}")]
    Fatal(anyhow::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl JobError {
    pub fn crash(err: impl Into<anyhow::Error>) -> Self {
        Self::Crash(err.into())
    }

    pub fn retriable(err: impl Into<anyhow::Error>) -> Self {
        Self::Retriable(err.into())
    }

    pub fn fatal(err: impl Into<anyhow::Error>) -> Self {
        Self::Fatal(err.into())
    }
}

#[derive(Error, Debug)]
pub enum BufferError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to (de)serialize entity: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("could not acquire buffer lock '{0}'")]
    LockTimeout(String),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("failed to (de)serialize token entry: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("could not acquire cache lock '{0}'")]
    LockTimeout(String),
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("database error: {0}")]
    Db(#[from] sea_orm::DbErr),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid row: {0}")]
    InvalidRow(String),
    #[error("failed to decode row: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<BufferError> for JobError {
    fn from(err: BufferError) -> Self {
        match err {
            // a broken entity can not be fixed by running the job again
            BufferError::Serialization(_) => JobError::Crash(err.into()),
            BufferError::Redis(_) | BufferError::LockTimeout(_) => JobError::Retriable(err.into()),
        }
    }
}

impl From<CacheError> for JobError {
    fn from(err: CacheError) -> Self {
        match err {
            CacheError::Serialization(_) => JobError::Crash(err.into()),
            CacheError::Redis(_) | CacheError::LockTimeout(_) => JobError::Retriable(err.into()),
        }
    }
}

impl From<SourceError> for JobError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Db(_) | SourceError::Io(_) => JobError::Retriable(err.into()),
            SourceError::Csv(_) | SourceError::InvalidRow(_) | SourceError::Serialization(_) => {
                JobError::Fatal(err.into())
            }
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("batch items {indices:?} still failing after {attempts} waves without progress")]
    Exhausted { indices: Vec<usize>, attempts: u32 },
    #[error("batch executor is shut down")]
    Closed,
}

impl From<BatchError> for JobError {
    fn from(err: BatchError) -> Self {
        match err {
            BatchError::Exhausted { .. } => JobError::Retriable(err.into()),
            BatchError::Closed => JobError::Crash(err.into()),
        }
    }
}

/// Failure of a whole pass.
#[derive(Error, Debug)]
pub enum RunError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("job '{job}' failed on blocks {range}: {source}")]
    Job {
        job: &'static str,
        range: BlockRange,
        source: JobError,
    },
    #[error("shared buffer failure: {0}")]
    Buffer(#[from] BufferError),
    #[error("failed to read source: {0}")]
    Source(#[from] SourceError),
    #[error("failed to instantiate jobs: {0:#}")]
    Instantiation(anyhow::Error),
}
