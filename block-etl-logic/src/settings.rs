use crate::job::JobSettings;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use serde_with::{formats::CommaSeparator, serde_as, StringWithSeparator};
use std::time::Duration;

lazy_static! {
    static ref DEFAULT_JOB_RETRIES: usize = env_or("JOB_RETRIES", 5, |v| v.parse().ok());
    static ref DEFAULT_SOURCE_ACCURACY: bool =
        env_or("PGSOURCE_ACCURACY", false, parse_bool);
}

fn env_or<T: Copy>(name: &str, default: T, parse: impl Fn(&str) -> Option<T>) -> T {
    match std::env::var(name) {
        Ok(value) => parse(value.trim()).unwrap_or_else(|| {
            tracing::warn!(
                env = name,
                value = %value,
                "failed to parse environment value, using default"
            );
            default
        }),
        Err(_) => default,
    }
}

pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "1" | "yes" => Some(true),
        "false" | "f" | "0" | "no" | "" => Some(false),
        _ => None,
    }
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PipelineSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_debug_batch_size")]
    pub debug_batch_size: usize,
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// `memory` or a `redis://` url; selects the backend of both the
    /// shared buffer and the token cache.
    #[serde(default = "default_cache")]
    pub cache: String,
    /// `csvfile://<dir>` or `postgresql://...`.
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde_as(as = "StringWithSeparator<CommaSeparator, String>")]
    #[serde(default)]
    pub required_output_types: Vec<String>,
    #[serde_as(as = "StringWithSeparator<CommaSeparator, String>")]
    #[serde(default)]
    pub required_source_types: Vec<String>,
    #[serde(default)]
    pub auto_reorg: bool,
    #[serde(default)]
    pub force_filter_mode: bool,
    #[serde(default = "default_job_retries")]
    pub job_retries: usize,
    #[serde(default = "default_source_accuracy")]
    pub source_accuracy: bool,
    /// Keep job instances across passes instead of creating them per pass.
    #[serde(default = "default_reuse_job_instances")]
    pub reuse_job_instances: bool,
    #[serde(default)]
    pub job_retry: RetrySettings,
    #[serde(default)]
    pub executor: ExecutorSettings,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            debug_batch_size: default_debug_batch_size(),
            max_workers: default_max_workers(),
            cache: default_cache(),
            source_path: None,
            required_output_types: vec![],
            required_source_types: vec![],
            auto_reorg: false,
            force_filter_mode: false,
            job_retries: default_job_retries(),
            source_accuracy: default_source_accuracy(),
            reuse_job_instances: default_reuse_job_instances(),
            job_retry: Default::default(),
            executor: Default::default(),
        }
    }
}

impl PipelineSettings {
    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            batch_size: self.batch_size,
            debug_batch_size: self.debug_batch_size,
        }
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            max_workers: self.max_workers,
            ..self.executor.clone()
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_debug_batch_size() -> usize {
    1
}

fn default_max_workers() -> usize {
    5
}

fn default_cache() -> String {
    "memory".to_string()
}

fn default_job_retries() -> usize {
    *DEFAULT_JOB_RETRIES
}

fn default_source_accuracy() -> bool {
    *DEFAULT_SOURCE_ACCURACY
}

fn default_reuse_job_instances() -> bool {
    true
}

/// Backoff between reruns of a failed job.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RetrySettings {
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    #[serde(default = "default_initial_delay")]
    pub initial_delay: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    #[serde(default = "default_max_delay")]
    pub max_delay: Duration,
}

impl RetrySettings {
    pub fn delay(&self, attempt: u32) -> Duration {
        exponential_delay(self.initial_delay, self.max_delay, attempt)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
        }
    }
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ExecutorSettings {
    /// Overridden by the pipeline level `max_workers`.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Waves without progress before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    #[serde(default = "default_min_wait")]
    pub min_wait: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    #[serde(default = "default_max_wait")]
    pub max_wait: Duration,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    #[serde(default = "default_call_timeout")]
    pub call_timeout: Duration,
}

impl ExecutorSettings {
    pub fn delay(&self, attempt: u32) -> Duration {
        exponential_delay(self.min_wait, self.max_wait, attempt)
    }
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_attempts: default_max_attempts(),
            min_wait: default_min_wait(),
            max_wait: default_max_wait(),
            call_timeout: default_call_timeout(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_min_wait() -> Duration {
    Duration::from_millis(100)
}

fn default_max_wait() -> Duration {
    Duration::from_secs(10)
}

fn default_call_timeout() -> Duration {
    Duration::from_secs(30)
}

fn exponential_delay(initial: Duration, max: Duration, attempt: u32) -> Duration {
    initial
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(max)
}
