use alloy::primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use block_etl_logic::{
    buffer::{InMemoryBuffer, SharedBufferExt},
    entity_type::{self, EntityType},
    job::{DataFilter, JobSettings},
    provider::{ChainDataProvider, TokenMetadata},
    settings::{ExecutorSettings, RetrySettings},
    token_cache::InMemoryTokenCache,
    types::{Block, Contract, Log, Trace, Transaction},
    BatchExecutor, BlockRange, DependencyResolver, ExecutionPass, Job, JobContext, JobDescriptor,
    JobError, JobRegistry, JobRunner, RunnerSettings, StaticJob,
};
use pretty_assertions::assert_eq;
use std::{collections::BTreeSet, sync::Arc, time::Duration};

/// Chain where block `n` holds a single contract deployment.
struct DeploymentsChain;

fn address_of(block_number: u64) -> Address {
    Address::left_padding_from(&block_number.to_be_bytes())
}

#[async_trait]
impl ChainDataProvider for DeploymentsChain {
    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> anyhow::Result<(Block, Vec<Transaction>)> {
        let block = Block {
            number,
            hash: B256::with_last_byte(number as u8),
            transaction_count: 1,
            ..Default::default()
        };
        let transaction = Transaction {
            block_number: number,
            hash: B256::with_last_byte(number as u8),
            to: None,
            ..Default::default()
        };
        Ok((block, vec![transaction]))
    }

    async fn logs(&self, _range: BlockRange, _filter: &DataFilter) -> anyhow::Result<Vec<Log>> {
        Ok(vec![])
    }

    async fn trace_block(&self, _number: u64) -> anyhow::Result<Vec<Trace>> {
        Ok(vec![])
    }

    async fn code_at(&self, _address: Address) -> anyhow::Result<Bytes> {
        Ok(Bytes::from_static(&[0x60, 0x80]))
    }

    async fn token_metadata(&self, _address: Address) -> anyhow::Result<TokenMetadata> {
        Ok(TokenMetadata::default())
    }
}

/// Fetches blocks of the pass.
struct Source {
    cx: JobContext,
    blocks: Vec<Block>,
}

impl StaticJob for Source {
    const NAME: &'static str = "source";

    fn output_types() -> Vec<EntityType> {
        vec![entity_type::BLOCK]
    }

    fn new(cx: &JobContext) -> anyhow::Result<Self> {
        Ok(Self {
            cx: cx.clone(),
            blocks: vec![],
        })
    }
}

#[async_trait]
impl Job for Source {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn collect(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        for number in pass.range.blocks() {
            let (block, _) = self.cx.provider.block_with_transactions(number).await?;
            self.blocks.push(block);
        }
        Ok(())
    }

    async fn process(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        self.cx
            .buffer
            .append_records(std::mem::take(&mut self.blocks))
            .await?;
        Ok(())
    }
}

/// Refetches the transactions of buffered blocks.
struct JobX {
    cx: JobContext,
}

impl StaticJob for JobX {
    const NAME: &'static str = "job_x";

    fn output_types() -> Vec<EntityType> {
        vec![entity_type::TRANSACTION]
    }

    fn dependency_types() -> Vec<EntityType> {
        vec![entity_type::BLOCK]
    }

    fn new(cx: &JobContext) -> anyhow::Result<Self> {
        Ok(Self { cx: cx.clone() })
    }
}

#[async_trait]
impl Job for JobX {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn collect(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        Ok(())
    }

    async fn process(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        let mut blocks = self.cx.buffer.get_records::<Block>().await?;
        blocks.sort_by_key(|block| block.number);
        let mut transactions = Vec::new();
        for block in blocks {
            let (_, txs) = self
                .cx
                .provider
                .block_with_transactions(block.number)
                .await?;
            transactions.extend(txs);
        }
        self.cx.buffer.append_records(transactions).await?;
        Ok(())
    }
}

/// Turns contract creating transactions into contracts.
struct JobY {
    cx: JobContext,
}

impl StaticJob for JobY {
    const NAME: &'static str = "job_y";

    fn output_types() -> Vec<EntityType> {
        vec![entity_type::CONTRACT]
    }

    fn dependency_types() -> Vec<EntityType> {
        vec![entity_type::TRANSACTION]
    }

    fn new(cx: &JobContext) -> anyhow::Result<Self> {
        Ok(Self { cx: cx.clone() })
    }
}

#[async_trait]
impl Job for JobY {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn collect(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        Ok(())
    }

    async fn process(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        let mut contracts = Vec::new();
        for tx in self.cx.buffer.get_records::<Transaction>().await? {
            if tx.to.is_some() {
                continue;
            }
            let address = address_of(tx.block_number);
            contracts.push(Contract {
                address,
                bytecode: self.cx.provider.code_at(address).await?,
                block_number: tx.block_number,
                transaction_hash: Some(tx.hash),
                ..Default::default()
            });
        }
        self.cx.buffer.append_records(contracts).await?;
        Ok(())
    }
}

fn context() -> JobContext {
    JobContext {
        buffer: Arc::new(InMemoryBuffer::new()),
        token_cache: Arc::new(InMemoryTokenCache::default()),
        provider: Arc::new(DeploymentsChain),
        executor: Arc::new(BatchExecutor::new(ExecutorSettings {
            max_workers: 2,
            ..Default::default()
        })),
        settings: JobSettings::default(),
    }
}

fn runner_settings() -> RunnerSettings {
    RunnerSettings {
        job_retries: 0,
        retry: RetrySettings {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        },
        force_filter_mode: false,
        reuse_job_instances: true,
    }
}

#[tokio::test]
async fn source_feeds_dependent_jobs_in_order() {
    // registered out of order on purpose
    let registry = JobRegistry::register_all([
        JobDescriptor::of::<JobY>(),
        JobDescriptor::of::<Source>(),
        JobDescriptor::of::<JobX>(),
    ])
    .unwrap();
    let pipeline = DependencyResolver::new(&registry)
        .resolve(&BTreeSet::from([entity_type::CONTRACT]), false)
        .unwrap();
    assert_eq!(pipeline.job_names(), vec!["source", "job_x", "job_y"]);

    let cx = context();
    let mut runner = JobRunner::new(pipeline, cx.clone(), runner_settings()).unwrap();

    let report = runner.run(1, 3).await.unwrap();
    assert!(report.is_complete());
    assert_eq!(report.counts.get(&entity_type::CONTRACT), Some(&3));
    let contracts = cx.buffer.get_records::<Contract>().await.unwrap();
    assert_eq!(
        contracts.iter().map(|c| c.block_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    // every pass starts from an empty buffer
    let report = runner.run(4, 4).await.unwrap();
    assert_eq!(report.counts.get(&entity_type::CONTRACT), Some(&1));
    let contracts = cx.buffer.get_records::<Contract>().await.unwrap();
    assert_eq!(contracts[0].address, address_of(4));

    cx.executor.shutdown();
    assert!(cx.executor.is_shut_down());
}

#[tokio::test]
async fn requesting_intermediate_type_skips_downstream_jobs() {
    let registry = JobRegistry::register_all([
        JobDescriptor::of::<Source>(),
        JobDescriptor::of::<JobX>(),
        JobDescriptor::of::<JobY>(),
    ])
    .unwrap();
    let pipeline = DependencyResolver::new(&registry)
        .resolve(&BTreeSet::from([entity_type::TRANSACTION]), false)
        .unwrap();
    assert_eq!(pipeline.job_names(), vec!["source", "job_x"]);
}
