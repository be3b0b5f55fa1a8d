use crate::{
    buffer::SharedBufferExt,
    entity_type::{self, EntityType},
    error::JobError,
    job::{DataFilter, ExecutionPass, Filterable, Job, JobContext, StaticJob},
    types::{Log, TokenTransfer, TRANSFER_EVENT_TOPIC},
};
use async_trait::async_trait;

/// ERC-20 and ERC-721 transfers decoded from `Transfer` logs.
pub struct ExtractTokenTransfersJob {
    cx: JobContext,
    logs: Vec<Log>,
}

impl StaticJob for ExtractTokenTransfersJob {
    const NAME: &'static str = "extract_token_transfers";
    const IS_FILTER: bool = true;
    const ABLE_TO_REORG: bool = true;

    fn output_types() -> Vec<EntityType> {
        vec![entity_type::TOKEN_TRANSFER]
    }

    fn dependency_types() -> Vec<EntityType> {
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
impl Job for ExtractTokenTransfersJob {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn collect(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        self.logs = self
            .cx
            .buffer
            .get_records::<Log>()
            .await?
            .into_iter()
            .filter(|log| pass.range.contains(log.block_number))
            .filter(|log| log.topic0() == Some(&TRANSFER_EVENT_TOPIC))
            .collect();
        Ok(())
    }

    async fn process(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        let logs = std::mem::take(&mut self.logs);
        let total = logs.len();
        let mut transfers: Vec<_> = logs.iter().filter_map(TokenTransfer::from_log).collect();
        transfers.sort_by_key(|transfer| (transfer.block_number, transfer.log_index));

        if transfers.len() < total {
            tracing::debug!(
                skipped = total - transfers.len(),
                "skipped transfer logs with unexpected layout"
            );
        }
        self.cx.buffer.append_records(transfers).await?;
        Ok(())
    }

    fn as_filterable(&self) -> Option<&dyn Filterable> {
        Some(self)
    }
}

impl Filterable for ExtractTokenTransfersJob {
    fn filter(&self) -> DataFilter {
        DataFilter::with_topics([TRANSFER_EVENT_TOPIC])
    }
}
