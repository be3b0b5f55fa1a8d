use crate::{
    buffer::SharedBufferExt,
    entity_type::{self, EntityType},
    error::JobError,
    job::{ExecutionPass, Job, JobContext, Reorgable, StaticJob},
    types::Trace,
};
use async_trait::async_trait;

pub struct ExportTracesJob {
    cx: JobContext,
    traces: Vec<Trace>,
}

impl StaticJob for ExportTracesJob {
    const NAME: &'static str = "export_traces";
    const ABLE_TO_REORG: bool = true;

    fn output_types() -> Vec<EntityType> {
        vec![entity_type::TRACE]
    }

    fn new(cx: &JobContext) -> anyhow::Result<Self> {
        Ok(Self {
            cx: cx.clone(),
            traces: vec![],
        })
    }
}

#[async_trait]
impl Job for ExportTracesJob {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn collect(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        let provider = self.cx.provider.clone();
        let batches = self
            .cx
            .executor
            .submit(
                pass.range.chunks(self.cx.settings.debug_batch_size),
                move |chunk| {
                    let provider = provider.clone();
                    async move {
                        let mut traces = Vec::new();
                        for number in chunk.blocks() {
                            traces.extend(provider.trace_block(number).await?);
                        }
                        Ok(traces)
                    }
                },
            )
            .await?;
        self.traces = batches.into_iter().flatten().collect();
        Ok(())
    }

    async fn process(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        let mut traces = std::mem::take(&mut self.traces);
        if let Some(filter) = &pass.filter {
            traces.retain(|trace| {
                trace.from.is_some_and(|from| filter.matches_address(&from))
                    || trace.to.is_some_and(|to| filter.matches_address(&to))
            });
        }
        traces.sort_by(|a, b| {
            (a.block_number, a.transaction_index, &a.trace_address).cmp(&(
                b.block_number,
                b.transaction_index,
                &b.trace_address,
            ))
        });

        tracing::debug!(traces = traces.len(), "exporting traces");
        self.cx.buffer.append_records(traces).await?;
        Ok(())
    }

    fn as_reorgable(&mut self) -> Option<&mut dyn Reorgable> {
        Some(self)
    }
}

impl Reorgable for ExportTracesJob {
    fn revert(&mut self, from_block: u64) {
        self.traces.retain(|trace| trace.block_number < from_block);
    }
}
