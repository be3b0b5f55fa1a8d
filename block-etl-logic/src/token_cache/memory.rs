use super::{FailureField, TokenCache, TokenCacheEntry};
use crate::error::CacheError;
use alloy::primitives::Address;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct InMemoryTokenCache {
    entries: DashMap<Address, TokenCacheEntry>,
}

impl InMemoryTokenCache {
    pub fn new(initial: HashMap<Address, TokenCacheEntry>) -> Self {
        Self {
            entries: initial.into_iter().collect(),
        }
    }
}

#[async_trait]
impl TokenCache for InMemoryTokenCache {
    async fn get(&self, address: &Address) -> Result<Option<TokenCacheEntry>, CacheError> {
        Ok(self.entries.get(address).map(|entry| entry.clone()))
    }

    async fn insert(&self, address: Address, entry: TokenCacheEntry) -> Result<(), CacheError> {
        self.entries.insert(address, entry);
        Ok(())
    }

    async fn increment_failure(
        &self,
        address: Address,
        field: FailureField,
    ) -> Result<u32, CacheError> {
        let mut entry = self.entries.entry(address).or_default();
        let counter = entry.failures.entry(field).or_default();
        *counter += 1;
        Ok(*counter)
    }

    async fn len(&self) -> Result<usize, CacheError> {
        Ok(self.entries.len())
    }
}
