use crate::{
    buffer::SharedBufferExt,
    entity_type::{self, EntityType},
    error::JobError,
    job::{ExecutionPass, Job, JobContext, StaticJob},
    types::{Contract, Trace},
};
use async_trait::async_trait;
use itertools::Itertools;

/// Contracts created by successful `create` traces.
pub struct ExtractContractsJob {
    cx: JobContext,
    creations: Vec<Trace>,
}

impl StaticJob for ExtractContractsJob {
    const NAME: &'static str = "extract_contracts";
    const ABLE_TO_REORG: bool = true;

    fn output_types() -> Vec<EntityType> {
        vec![entity_type::CONTRACT]
    }

    fn dependency_types() -> Vec<EntityType> {
        vec![entity_type::TRACE]
    }

    fn new(cx: &JobContext) -> anyhow::Result<Self> {
        Ok(Self {
            cx: cx.clone(),
            creations: vec![],
        })
    }
}

#[async_trait]
impl Job for ExtractContractsJob {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn collect(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        self.creations = self
            .cx
            .buffer
            .get_records::<Trace>()
            .await?
            .into_iter()
            .filter(|trace| pass.range.contains(trace.block_number))
            .filter(Trace::is_successful_create)
            .collect();
        Ok(())
    }

    async fn process(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        let creations = std::mem::take(&mut self.creations);
        let contracts = creations
            .into_iter()
            .filter_map(|trace| {
                Some(Contract {
                    address: trace.to?,
                    bytecode: trace.output,
                    block_number: trace.block_number,
                    transaction_hash: trace.transaction_hash,
                    creator: trace.from,
                    is_erc20: false,
                    is_erc721: false,
                })
            })
            .collect_vec();

        // some nodes do not return the deployed code in create traces
        let provider = self.cx.provider.clone();
        let contracts = self
            .cx
            .executor
            .submit(contracts, move |mut contract| {
                let provider = provider.clone();
                async move {
                    if contract.bytecode.is_empty() {
                        contract.bytecode = provider.code_at(contract.address).await?;
                    }
                    Ok(contract.classify())
                }
            })
            .await?
            .into_iter()
            .sorted_by_key(|contract| (contract.block_number, contract.address))
            .dedup_by(|a, b| a.address == b.address)
            .collect_vec();

        tracing::debug!(contracts = contracts.len(), "extracted contracts");
        self.cx.buffer.append_records(contracts).await?;
        Ok(())
    }
}
