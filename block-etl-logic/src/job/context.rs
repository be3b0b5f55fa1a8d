use super::DataFilter;
use crate::{
    buffer::SharedBuffer, executor::BatchExecutor, provider::ChainDataProvider,
    token_cache::TokenCache,
};
use std::{fmt, ops::RangeInclusive, sync::Arc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobSettings {
    /// Items per rpc batch inside a job.
    pub batch_size: usize,
    /// Blocks per debug/trace request.
    pub debug_batch_size: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            debug_batch_size: 1,
        }
    }
}

/// Everything a job instance is bound to for its whole lifetime.
///
/// The shared buffer is the only mutable structure visible across jobs.
#[derive(Clone)]
pub struct JobContext {
    pub buffer: Arc<dyn SharedBuffer>,
    pub token_cache: Arc<dyn TokenCache>,
    pub provider: Arc<dyn ChainDataProvider>,
    pub executor: Arc<BatchExecutor>,
    pub settings: JobSettings,
}

impl fmt::Debug for JobContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobContext")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, block_number: u64) -> bool {
        self.start <= block_number && block_number <= self.end
    }

    pub fn blocks(&self) -> RangeInclusive<u64> {
        self.start..=self.end
    }

    /// Split into consecutive sub-ranges of at most `size` blocks.
    pub fn chunks(&self, size: usize) -> Vec<BlockRange> {
        let size = size.max(1) as u64;
        let mut chunks = Vec::new();
        let mut start = self.start;
        while start <= self.end {
            let end = start.saturating_add(size - 1).min(self.end);
            chunks.push(BlockRange { start, end });
            if end == u64::MAX {
                break;
            }
            start = end + 1;
        }
        chunks
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Per-run input of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPass {
    pub range: BlockRange,
    /// Set when every requested output comes from filter jobs
    /// (or filter mode is forced); raw fetch jobs narrow their output by it.
    pub filter: Option<DataFilter>,
}

impl ExecutionPass {
    pub fn new(range: BlockRange) -> Self {
        Self {
            range,
            filter: None,
        }
    }
}
