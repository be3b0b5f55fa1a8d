//! Access to raw chain data.

mod rpc;

pub use rpc::RpcChainDataProvider;

use crate::{
    job::{BlockRange, DataFilter},
    types::{Block, Log, Trace, Transaction},
};
use alloy::primitives::{Address, Bytes, U256};
use async_trait::async_trait;

/// Result of the ERC-20 metadata getters. A getter that reverted or
/// failed leaves its field empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenMetadata {
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub total_supply: Option<U256>,
}

#[async_trait]
pub trait ChainDataProvider: Send + Sync {
    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> anyhow::Result<(Block, Vec<Transaction>)>;

    async fn logs(&self, range: BlockRange, filter: &DataFilter) -> anyhow::Result<Vec<Log>>;

    async fn trace_block(&self, number: u64) -> anyhow::Result<Vec<Trace>>;

    async fn code_at(&self, address: Address) -> anyhow::Result<Bytes>;

    async fn token_metadata(&self, address: Address) -> anyhow::Result<TokenMetadata>;
}
