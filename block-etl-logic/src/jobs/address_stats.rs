use crate::{
    buffer::SharedBufferExt,
    entity_type::{self, EntityType},
    error::JobError,
    job::{ExecutionPass, Job, JobContext, StaticJob},
    types::{AddressStats, TokenTransfer, Transaction},
};
use alloy::primitives::Address;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Per-address activity counters over the transactions and token
/// transfers of a pass.
pub struct AddressStatsJob {
    cx: JobContext,
    transactions: Vec<Transaction>,
    transfers: Vec<TokenTransfer>,
}

impl StaticJob for AddressStatsJob {
    const NAME: &'static str = "address_stats";

    fn output_types() -> Vec<EntityType> {
        vec![entity_type::ADDRESS_STATS]
    }

    fn dependency_types() -> Vec<EntityType> {
        vec![entity_type::TRANSACTION, entity_type::TOKEN_TRANSFER]
    }

    fn new(cx: &JobContext) -> anyhow::Result<Self> {
        Ok(Self {
            cx: cx.clone(),
            transactions: vec![],
            transfers: vec![],
        })
    }
}

fn touch(
    stats: &mut BTreeMap<Address, AddressStats>,
    address: Address,
    block_number: u64,
) -> &mut AddressStats {
    let stats = stats.entry(address).or_insert_with(|| AddressStats {
        address,
        ..Default::default()
    });
    stats.last_block_number = stats.last_block_number.max(block_number);
    stats
}

#[async_trait]
impl Job for AddressStatsJob {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn collect(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        let range = pass.range;
        self.transactions = self.cx.buffer.get_records::<Transaction>().await?;
        self.transactions
            .retain(|tx| range.contains(tx.block_number));
        self.transfers = self.cx.buffer.get_records::<TokenTransfer>().await?;
        self.transfers
            .retain(|transfer| range.contains(transfer.block_number));
        Ok(())
    }

    async fn process(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        let mut stats: BTreeMap<Address, AddressStats> = BTreeMap::new();
        for tx in std::mem::take(&mut self.transactions) {
            touch(&mut stats, tx.from, tx.block_number).transactions_sent += 1;
            if let Some(to) = tx.to {
                touch(&mut stats, to, tx.block_number).transactions_received += 1;
            }
        }
        for transfer in std::mem::take(&mut self.transfers) {
            touch(&mut stats, transfer.from, transfer.block_number).token_transfers_out += 1;
            touch(&mut stats, transfer.to, transfer.block_number).token_transfers_in += 1;
        }

        let stats: Vec<_> = stats.into_values().collect();
        tracing::debug!(addresses = stats.len(), "computed address stats");
        self.cx.buffer.append_records(stats).await?;
        Ok(())
    }
}
