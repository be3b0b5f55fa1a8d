use crate::{
    buffer::SharedBufferExt,
    entity_type::{self, EntityType},
    error::JobError,
    job::{DataFilter, ExecutionPass, Filterable, Job, JobContext, StaticJob},
    provider::TokenMetadata,
    token_cache::{FailureField, TokenCacheEntry},
    types::{Token, TokenTransfer, TRANSFER_EVENT_TOPIC},
};
use alloy::primitives::Address;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Getter failures after which a field is no longer requested.
const MAX_FIELD_FAILURES: u32 = 3;

/// Tokens seen in the transfers of a pass, with metadata from the token
/// cache or from the chain.
pub struct ExtractTokensJob {
    cx: JobContext,
    /// Token address to (first transfer seen, cached entry).
    seen: BTreeMap<Address, (TokenTransfer, Option<TokenCacheEntry>)>,
}

impl StaticJob for ExtractTokensJob {
    const NAME: &'static str = "extract_tokens";
    const IS_FILTER: bool = true;

    fn output_types() -> Vec<EntityType> {
        vec![entity_type::TOKEN]
    }

    fn dependency_types() -> Vec<EntityType> {
        vec![entity_type::TOKEN_TRANSFER]
    }

    fn new(cx: &JobContext) -> anyhow::Result<Self> {
        Ok(Self {
            cx: cx.clone(),
            seen: BTreeMap::new(),
        })
    }
}

fn needs_fetch(entry: &TokenCacheEntry) -> bool {
    if entry.skip_metadata == Some(true) {
        return false;
    }
    [
        (FailureField::Name, entry.name.is_none()),
        (FailureField::Symbol, entry.symbol.is_none()),
        (FailureField::Decimals, entry.decimals.is_none()),
        (FailureField::TotalSupply, entry.total_supply.is_none()),
    ]
    .into_iter()
    .any(|(field, missing)| missing && entry.failures(field) < MAX_FIELD_FAILURES)
}

#[async_trait]
impl Job for ExtractTokensJob {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn collect(&mut self, pass: &ExecutionPass) -> Result<(), JobError> {
        self.seen.clear();
        let mut transfers = self.cx.buffer.get_records::<TokenTransfer>().await?;
        transfers.retain(|transfer| pass.range.contains(transfer.block_number));
        transfers.sort_by_key(|transfer| (transfer.block_number, transfer.log_index));

        for transfer in transfers {
            if self.seen.contains_key(&transfer.token_address) {
                continue;
            }
            let cached = self.cx.token_cache.get(&transfer.token_address).await?;
            self.seen
                .insert(transfer.token_address, (transfer, cached));
        }
        Ok(())
    }

    async fn process(&mut self, _pass: &ExecutionPass) -> Result<(), JobError> {
        let seen = std::mem::take(&mut self.seen);
        let to_fetch: Vec<Address> = seen
            .iter()
            .filter(|(_, (_, cached))| cached.as_ref().is_none_or(needs_fetch))
            .map(|(address, _)| *address)
            .collect();

        let provider = self.cx.provider.clone();
        let fetched: BTreeMap<Address, TokenMetadata> = self
            .cx
            .executor
            .submit(to_fetch.clone(), move |address| {
                let provider = provider.clone();
                async move { Ok((address, provider.token_metadata(address).await?)) }
            })
            .await?
            .into_iter()
            .collect();
        tracing::debug!(
            tokens = seen.len(),
            fetched = fetched.len(),
            "resolving token metadata"
        );

        let mut tokens = Vec::with_capacity(seen.len());
        for (address, (transfer, cached)) in seen {
            let mut entry = cached.unwrap_or_else(|| TokenCacheEntry {
                token_type: transfer.token_type,
                ..Default::default()
            });
            if let Some(metadata) = fetched.get(&address) {
                self.merge_metadata(address, &mut entry, metadata).await?;
            }
            tokens.push(Token {
                address,
                token_type: entry.token_type,
                name: entry.name.clone(),
                symbol: entry.symbol.clone(),
                decimals: entry.decimals,
                total_supply: entry.total_supply,
                block_number: transfer.block_number,
            });
        }

        self.cx.buffer.append_records(tokens).await?;
        Ok(())
    }

    fn as_filterable(&self) -> Option<&dyn Filterable> {
        Some(self)
    }
}

impl ExtractTokensJob {
    /// Fill the missing fields of `entry`, counting the getters that failed,
    /// and store the result in the token cache.
    async fn merge_metadata(
        &self,
        address: Address,
        entry: &mut TokenCacheEntry,
        metadata: &TokenMetadata,
    ) -> Result<(), JobError> {
        let mut failed = Vec::new();
        macro_rules! fill {
            ($field:ident, $failure:expr) => {
                if entry.$field.is_none() {
                    match &metadata.$field {
                        Some(value) => entry.$field = Some(value.clone()),
                        None => failed.push($failure),
                    }
                }
            };
        }
        fill!(name, FailureField::Name);
        fill!(symbol, FailureField::Symbol);
        fill!(decimals, FailureField::Decimals);
        fill!(total_supply, FailureField::TotalSupply);

        // ERC-721 contracts have no decimals
        if entry.token_type == crate::types::TokenType::Erc721 {
            failed.retain(|field| *field != FailureField::Decimals);
        }

        self.cx.token_cache.insert(address, entry.clone()).await?;
        for field in failed {
            let count = self.cx.token_cache.increment_failure(address, field).await?;
            entry.failures.insert(field, count);
            tracing::debug!(token = %address, field = field.as_str(), count, "token getter failed");
        }
        Ok(())
    }
}

impl Filterable for ExtractTokensJob {
    fn filter(&self) -> DataFilter {
        DataFilter::with_topics([TRANSFER_EVENT_TOPIC])
    }
}
