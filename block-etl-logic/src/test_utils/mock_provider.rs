use crate::{
    job::{BlockRange, DataFilter},
    provider::{ChainDataProvider, TokenMetadata},
    types::{Block, Log, Trace, Transaction},
};
use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

#[derive(Default)]
struct ChainState {
    blocks: BTreeMap<u64, (Block, Vec<Transaction>)>,
    logs: Vec<Log>,
    traces: BTreeMap<u64, Vec<Trace>>,
    code: HashMap<Address, Bytes>,
    metadata: HashMap<Address, TokenMetadata>,
}

/// In-memory chain for job tests.
#[derive(Clone, Default)]
pub struct MockChainDataProvider {
    state: Arc<RwLock<ChainState>>,
    should_fail: Arc<RwLock<bool>>,
    metadata_calls: Arc<AtomicUsize>,
}

impl MockChainDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_block(&self, block: Block, transactions: Vec<Transaction>) {
        self.state
            .write()
            .blocks
            .insert(block.number, (block, transactions));
    }

    pub fn add_logs(&self, logs: impl IntoIterator<Item = Log>) {
        self.state.write().logs.extend(logs);
    }

    pub fn add_traces(&self, block_number: u64, traces: Vec<Trace>) {
        self.state.write().traces.insert(block_number, traces);
    }

    pub fn set_code(&self, address: Address, code: Bytes) {
        self.state.write().code.insert(address, code);
    }

    pub fn set_metadata(&self, address: Address, metadata: TokenMetadata) {
        self.state.write().metadata.insert(address, metadata);
    }

    pub fn set_should_fail(&self, fail: bool) {
        *self.should_fail.write() = fail;
    }

    pub fn metadata_calls(&self) -> usize {
        self.metadata_calls.load(Ordering::SeqCst)
    }

    fn check(&self) -> anyhow::Result<()> {
        if *self.should_fail.read() {
            anyhow::bail!("mock provider configured to fail");
        }
        Ok(())
    }
}

#[async_trait]
impl ChainDataProvider for MockChainDataProvider {
    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> anyhow::Result<(Block, Vec<Transaction>)> {
        self.check()?;
        self.state
            .read()
            .blocks
            .get(&number)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("block {number} not found"))
    }

    async fn logs(&self, range: BlockRange, filter: &DataFilter) -> anyhow::Result<Vec<Log>> {
        self.check()?;
        Ok(self
            .state
            .read()
            .logs
            .iter()
            .filter(|log| range.contains(log.block_number))
            .filter(|log| filter.matches_log(&log.address, log.topic0()))
            .cloned()
            .collect())
    }

    async fn trace_block(&self, number: u64) -> anyhow::Result<Vec<Trace>> {
        self.check()?;
        Ok(self
            .state
            .read()
            .traces
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    async fn code_at(&self, address: Address) -> anyhow::Result<Bytes> {
        self.check()?;
        Ok(self
            .state
            .read()
            .code
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    async fn token_metadata(&self, address: Address) -> anyhow::Result<TokenMetadata> {
        self.check()?;
        self.metadata_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .state
            .read()
            .metadata
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }
}
