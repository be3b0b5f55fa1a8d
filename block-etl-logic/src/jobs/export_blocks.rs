use crate::{
    buffer::SharedBufferExt,
    entity_type::{self, EntityType},
    error::JobError,
    job::{ExecutionPass, Job, JobContext, Reorgable, StaticJob},
    types::{Block, Transaction},
};
use alloy::primitives::B256;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Hashes kept to detect a parent hash mismatch across passes.
const TRACKED_BLOCKS: usize = 256;

pub struct ExportBlocksJob {
    cx: JobContext,
    blocks: Vec<Block>,
    transactions: Vec<Transaction>,
    known_hashes: BTreeMap<u64, B256>,
}

impl StaticJob for ExportBlocksJob {
    const NAME: &'static str = "export_blocks";
    const ABLE_TO_REORG: bool = true;

    fn output_types() -> Vec<EntityType> {
        vec![entity_type::BLOCK, entity_type::TRANSACTION]
    }

    fn new(cx: &JobContext) -> anyhow::Result<Self> {
        Ok(Self {
            cx: cx.clone(),
            blocks: vec![],
            transactions: vec![],
            known_hashes: BTreeMap::new(),
        })
    }
}

impl ExportBlocksJob {
    fn track(&mut self, block: &Block) {
        if let Some(known) = block
            .number
            .checked_sub(1)
            .and_then(|parent| self.known_hashes.get(&parent))
        {
            if *known != block.parent_hash {
                tracing::warn!(
                    block_number = block.number,
                    expected_parent = %known,
                    parent_hash = %block.parent_hash,
                    "parent hash mismatch, chain was reorganized"
                );
            }
        }
        self.known_hashes.insert(block.number, block.hash);
        while self.known_hashes.len() > TRACKED_BLOCKS {
            self.known_hashes.pop_first();
        }
    }
}

#[async_trait]
impl Job for ExportBlocksJob {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn collect(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        self.blocks.clear();
        self.transactions.clear();

        let provider = self.cx.provider.clone();
        let batches = self
            .cx
            .executor
            .submit(
                pass.range.chunks(self.cx.settings.batch_size),
                move |chunk| {
                    let provider = provider.clone();
                    async move {
                        let mut fetched = Vec::with_capacity(chunk.blocks().count());
                        for number in chunk.blocks() {
                            fetched.push(provider.block_with_transactions(number).await?);
                        }
                        Ok(fetched)
                    }
                },
            )
            .await?;

        for (block, transactions) in batches.into_iter().flatten() {
            self.track(&block);
            self.blocks.push(block);
            self.transactions.extend(transactions);
        }
        Ok(())
    }

    async fn process(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        let mut transactions = std::mem::take(&mut self.transactions);
        if let Some(filter) = &pass.filter {
            transactions.retain(|tx| {
                filter.matches_address(&tx.from)
                    || tx.to.is_some_and(|to| filter.matches_address(&to))
            });
        }
        transactions.sort_by_key(|tx| (tx.block_number, tx.transaction_index));
        let mut blocks = std::mem::take(&mut self.blocks);
        blocks.sort_by_key(|block| block.number);

        tracing::debug!(
            blocks = blocks.len(),
            transactions = transactions.len(),
            "exporting blocks"
        );
        self.cx.buffer.append_records(blocks).await?;
        self.cx.buffer.append_records(transactions).await?;
        Ok(())
    }

    fn as_reorgable(&mut self) -> Option<&mut dyn Reorgable> {
        Some(self)
    }
}

impl Reorgable for ExportBlocksJob {
    fn revert(&mut self, from_block: u64) {
        self.known_hashes.retain(|number, _| *number < from_block);
        self.blocks.retain(|block| block.number < from_block);
        self.transactions.retain(|tx| tx.block_number < from_block);
    }
}
