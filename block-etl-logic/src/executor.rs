use crate::{error::BatchError, settings::ExecutorSettings};
use std::{future::Future, sync::Arc};
use tokio::{sync::Semaphore, task::JoinSet};

/// Bounded worker pool fanning a job's calls out over many items.
///
/// Items are processed in waves. Failed or timed out items are re-queued
/// for the next wave; results are returned in input order.
#[derive(Debug)]
pub struct BatchExecutor {
    permits: Arc<Semaphore>,
    settings: ExecutorSettings,
}

impl BatchExecutor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(settings.max_workers.max(1))),
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub async fn submit<T, R, F, Fut>(&self, items: Vec<T>, worker: F) -> Result<Vec<R>, BatchError>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let worker = Arc::new(worker);
        let mut results: Vec<Option<R>> = items.iter().map(|_| None).collect();
        let mut pending: Vec<usize> = (0..items.len()).collect();
        let mut attempt = 0u32;

        while !pending.is_empty() {
            if self.permits.is_closed() {
                return Err(BatchError::Closed);
            }

            // dropping the set on any early return aborts its tasks
            let mut wave = JoinSet::new();
            for &idx in &pending {
                let item = items[idx].clone();
                let worker = worker.clone();
                let permits = self.permits.clone();
                let call_timeout = self.settings.call_timeout;
                wave.spawn(async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return (idx, Err(anyhow::anyhow!("executor is shut down")));
                    };
                    let result = match tokio::time::timeout(call_timeout, worker(item)).await {
                        Ok(result) => result,
                        Err(_) => Err(anyhow::anyhow!("call timed out after {call_timeout:?}")),
                    };
                    (idx, result)
                });
            }

            while let Some(joined) = wave.join_next().await {
                match joined {
                    Ok((idx, Ok(value))) => results[idx] = Some(value),
                    Ok((idx, Err(err))) => {
                        tracing::debug!(item = idx, attempt, error = %err, "batch item failed");
                    }
                    Err(err) => {
                        tracing::warn!(error = ?err, "batch worker task failed");
                    }
                }
            }

            let previous = pending.len();
            pending.retain(|idx| results[*idx].is_none());
            if pending.is_empty() {
                break;
            }
            if self.permits.is_closed() {
                return Err(BatchError::Closed);
            }

            if pending.len() < previous {
                attempt = 0;
            } else {
                attempt += 1;
            }
            if attempt >= self.settings.max_attempts {
                tracing::error!(
                    items = ?pending,
                    attempts = attempt,
                    "batch items exhausted retries"
                );
                return Err(BatchError::Exhausted {
                    indices: pending,
                    attempts: attempt,
                });
            }

            let delay = self.settings.delay(attempt);
            tracing::warn!(
                failed = pending.len(),
                total = items.len(),
                attempt,
                ?delay,
                "retrying failed batch items"
            );
            tokio::time::sleep(delay).await;
        }

        Ok(results.into_iter().flatten().collect())
    }

    /// Stop accepting work. In-flight submits fail with [`BatchError::Closed`].
    pub fn shutdown(&self) {
        if !self.permits.is_closed() {
            tracing::debug!("shutting down batch executor");
            self.permits.close();
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.permits.is_closed()
    }
}
