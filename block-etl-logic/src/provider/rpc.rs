use super::{ChainDataProvider, TokenMetadata};
use crate::{
    job::{BlockRange, DataFilter},
    types::{Block, Log, Trace, TraceType, Transaction},
};
use alloy::{
    network::Ethereum,
    primitives::{Address, Bytes, B256, U256, U64},
    providers::{DynProvider, Provider, ProviderBuilder},
    sol,
};
use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use url::Url;

sol! {
    #[allow(missing_docs)]
    #[sol(rpc)]
    interface IERC20Metadata {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
        function totalSupply() external view returns (uint256);
    }
}

/// Json-rpc backed provider. Responses are decoded into minimal local
/// shapes, so nodes returning extra or chain specific fields are accepted.
#[derive(Clone)]
pub struct RpcChainDataProvider {
    provider: DynProvider<Ethereum>,
}

impl RpcChainDataProvider {
    pub fn new(url: Url) -> Self {
        let provider = ProviderBuilder::new().connect_http(url).erased();
        Self { provider }
    }

    pub fn from_provider(provider: DynProvider<Ethereum>) -> Self {
        Self { provider }
    }

    async fn request<P, R>(&self, method: &'static str, params: P) -> anyhow::Result<R>
    where
        P: Serialize + Clone + std::fmt::Debug + Send + Sync + Unpin,
        R: serde::de::DeserializeOwned + std::fmt::Debug + Send + Sync + Unpin + 'static,
    {
        self.provider
            .raw_request::<P, R>(Cow::Borrowed(method), params)
            .await
            .with_context(|| format!("{method} request failed"))
    }
}

fn quantity(number: u64) -> String {
    format!("0x{number:x}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: U64,
    hash: B256,
    parent_hash: B256,
    timestamp: U64,
    #[serde(default)]
    miner: Address,
    gas_used: U64,
    #[serde(default)]
    transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    hash: B256,
    transaction_index: U64,
    from: Address,
    to: Option<Address>,
    #[serde(default)]
    value: U256,
    #[serde(default)]
    input: Bytes,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    block_number: U64,
    transaction_hash: B256,
    transaction_index: U64,
    log_index: U64,
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    #[serde(default)]
    removed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct LogsRequest {
    from_block: String,
    to_block: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    address: Option<Vec<Address>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    topics: Option<Vec<Vec<B256>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTraceAction {
    from: Option<Address>,
    to: Option<Address>,
    value: Option<U256>,
    input: Option<Bytes>,
    init: Option<Bytes>,
    address: Option<Address>,
    refund_address: Option<Address>,
    balance: Option<U256>,
    author: Option<Address>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTraceResult {
    output: Option<Bytes>,
    code: Option<Bytes>,
    address: Option<Address>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTrace {
    #[serde(default)]
    action: RpcTraceAction,
    result: Option<RpcTraceResult>,
    error: Option<String>,
    #[serde(default)]
    trace_address: Vec<u64>,
    transaction_hash: Option<B256>,
    transaction_position: Option<u64>,
    block_number: u64,
    #[serde(rename = "type")]
    trace_type: TraceType,
}

impl From<RpcTrace> for Trace {
    fn from(trace: RpcTrace) -> Self {
        let RpcTrace {
            action,
            result,
            error,
            trace_address,
            transaction_hash,
            transaction_position,
            block_number,
            trace_type,
        } = trace;
        let result = result.unwrap_or_default();
        let (from, to, value, input, output) = match trace_type {
            TraceType::Call => (
                action.from,
                action.to,
                action.value,
                action.input,
                result.output,
            ),
            TraceType::Create => (
                action.from,
                result.address,
                action.value,
                action.init,
                result.code,
            ),
            TraceType::Suicide => (
                action.address,
                action.refund_address,
                action.balance,
                None,
                None,
            ),
            TraceType::Reward => (None, action.author, action.value, None, None),
        };
        Trace {
            block_number,
            transaction_hash,
            transaction_index: transaction_position,
            trace_address,
            trace_type,
            from,
            to,
            value: value.unwrap_or_default(),
            input: input.unwrap_or_default(),
            output: output.unwrap_or_default(),
            error,
        }
    }
}

#[async_trait]
impl ChainDataProvider for RpcChainDataProvider {
    async fn block_with_transactions(
        &self,
        number: u64,
    ) -> anyhow::Result<(Block, Vec<Transaction>)> {
        let block: Option<RpcBlock> = self
            .request("eth_getBlockByNumber", (quantity(number), true))
            .await?;
        let block = block.with_context(|| format!("block {number} not found"))?;

        let block_number = block.number.to::<u64>();
        let transactions = block
            .transactions
            .into_iter()
            .map(|tx| Transaction {
                hash: tx.hash,
                block_number,
                transaction_index: tx.transaction_index.to(),
                from: tx.from,
                to: tx.to,
                value: tx.value,
                input: tx.input,
            })
            .collect::<Vec<_>>();
        let block = Block {
            number: block_number,
            hash: block.hash,
            parent_hash: block.parent_hash,
            timestamp: block.timestamp.to(),
            miner: block.miner,
            gas_used: block.gas_used.to(),
            transaction_count: transactions.len() as u64,
        };
        Ok((block, transactions))
    }

    async fn logs(&self, range: BlockRange, filter: &DataFilter) -> anyhow::Result<Vec<Log>> {
        let request = LogsRequest {
            from_block: quantity(range.start),
            to_block: quantity(range.end),
            address: filter
                .addresses
                .as_ref()
                .map(|addresses| addresses.iter().copied().collect()),
            topics: filter
                .topics
                .as_ref()
                .map(|topics| vec![topics.iter().copied().collect()]),
        };
        let logs: Vec<RpcLog> = self.request("eth_getLogs", (request,)).await?;
        Ok(logs
            .into_iter()
            .filter(|log| !log.removed)
            .map(|log| Log {
                block_number: log.block_number.to(),
                transaction_hash: log.transaction_hash,
                transaction_index: log.transaction_index.to(),
                log_index: log.log_index.to(),
                address: log.address,
                topics: log.topics,
                data: log.data,
            })
            .collect())
    }

    async fn trace_block(&self, number: u64) -> anyhow::Result<Vec<Trace>> {
        let traces: Option<Vec<RpcTrace>> =
            self.request("trace_block", (quantity(number),)).await?;
        Ok(traces
            .unwrap_or_default()
            .into_iter()
            .map(Trace::from)
            .collect())
    }

    async fn code_at(&self, address: Address) -> anyhow::Result<Bytes> {
        self.request("eth_getCode", (address, "latest")).await
    }

    async fn token_metadata(&self, address: Address) -> anyhow::Result<TokenMetadata> {
        let contract = IERC20Metadata::new(address, self.provider.clone());
        let name_call = contract.name();
        let symbol_call = contract.symbol();
        let decimals_call = contract.decimals();
        let total_supply_call = contract.totalSupply();
        let (name, symbol, decimals, total_supply) = tokio::join!(
            name_call.call(),
            symbol_call.call(),
            decimals_call.call(),
            total_supply_call.call()
        );
        Ok(TokenMetadata {
            name: name.ok(),
            symbol: symbol.ok(),
            decimals: decimals.ok(),
            total_supply: total_supply.ok(),
        })
    }
}
