use crate::{
    buffer::SharedBufferExt,
    entity_type::{self, EntityType},
    error::JobError,
    job::{DataFilter, ExecutionPass, Job, JobContext, Reorgable, StaticJob},
    types::Log,
};
use async_trait::async_trait;
use std::sync::Arc;

pub struct ExportLogsJob {
    cx: JobContext,
    logs: Vec<Log>,
}

impl StaticJob for ExportLogsJob {
    const NAME: &'static str = "export_logs";
    const ABLE_TO_REORG: bool = true;

    fn output_types() -> Vec<EntityType> {
        vec![entity_type::LOG]
    }

    fn new(cx: &JobContext) -> anyhow::Result<Self> {
        Ok(Self {
            cx: cx.clone(),
            logs: vec![],
        })
    }
}

#[async_trait]
impl Job for ExportLogsJob {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn collect(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        let provider = self.cx.provider.clone();
        let filter = Arc::new(pass.filter.clone().unwrap_or_default());
        let batches = self
            .cx
            .executor
            .submit(
                pass.range.chunks(self.cx.settings.batch_size),
                move |chunk| {
                    let provider = provider.clone();
                    let filter = filter.clone();
                    async move { provider.logs(chunk, &filter).await }
                },
            )
            .await?;
        self.logs = batches.into_iter().flatten().collect();
        Ok(())
    }

    async fn process(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        let mut logs = std::mem::take(&mut self.logs);
        // nodes may ignore part of the filter
        let filter = pass.filter.clone().unwrap_or_else(DataFilter::everything);
        logs.retain(|log| {
            pass.range.contains(log.block_number) && filter.matches_log(&log.address, log.topic0())
        });
        logs.sort_by_key(|log| (log.block_number, log.log_index));
        logs.dedup_by_key(|log| (log.block_number, log.log_index));

        tracing::debug!(logs = logs.len(), "exporting logs");
        self.cx.buffer.append_records(logs).await?;
        Ok(())
    }

    fn as_reorgable(&mut self) -> Option<&mut dyn Reorgable> {
        Some(self)
    }
}

impl Reorgable for ExportLogsJob {
    fn revert(&mut self, from_block: u64) {
        self.logs.retain(|log| log.block_number < from_block);
    }
}
