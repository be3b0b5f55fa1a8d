//! Token metadata known to the process, shared by the token jobs.

mod loader;
mod memory;
mod redis;

pub use self::redis::RedisTokenCache;
pub use loader::{build_token_cache, TokenCacheLoader};
pub use memory::InMemoryTokenCache;

use crate::{error::CacheError, types::TokenType};
use alloy::primitives::{Address, U256};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata getter whose on-chain call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureField {
    Name,
    Symbol,
    Decimals,
    TotalSupply,
}

impl FailureField {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureField::Name => "name",
            FailureField::Symbol => "symbol",
            FailureField::Decimals => "decimals",
            FailureField::TotalSupply => "total_supply",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "name" => Some(FailureField::Name),
            "symbol" => Some(FailureField::Symbol),
            "decimals" => Some(FailureField::Decimals),
            "total_supply" => Some(FailureField::TotalSupply),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenCacheEntry {
    pub token_type: TokenType,
    pub name: Option<String>,
    pub symbol: Option<String>,
    pub decimals: Option<u8>,
    pub total_supply: Option<U256>,
    /// Metadata is known to be unavailable, do not call the getters.
    pub skip_metadata: Option<bool>,
    #[serde(default)]
    pub failures: BTreeMap<FailureField, u32>,
}

impl TokenCacheEntry {
    pub fn failures(&self, field: FailureField) -> u32 {
        self.failures.get(&field).copied().unwrap_or_default()
    }

    pub fn has_metadata(&self) -> bool {
        self.skip_metadata == Some(true)
            || (self.name.is_some() && self.symbol.is_some() && self.decimals.is_some())
    }
}

/// Concurrent map of token address to its metadata.
///
/// Not durable. Concurrent writers of the same entry resolve last-writer-wins.
#[async_trait]
pub trait TokenCache: Send + Sync {
    async fn get(&self, address: &Address) -> Result<Option<TokenCacheEntry>, CacheError>;

    async fn insert(&self, address: Address, entry: TokenCacheEntry) -> Result<(), CacheError>;

    /// Bump the failure counter of the field, creating an empty entry for
    /// an unknown address. Returns the new counter value.
    async fn increment_failure(
        &self,
        address: Address,
        field: FailureField,
    ) -> Result<u32, CacheError>;

    async fn len(&self) -> Result<usize, CacheError>;
}
