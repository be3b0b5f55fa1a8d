use super::{FailureField, TokenCache, TokenCacheEntry};
use crate::error::CacheError;
use alloy::primitives::Address;
use async_trait::async_trait;
use itertools::Itertools;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::{BTreeMap, HashMap};

const SEED_CHUNK_SIZE: usize = 500;

/// Token cache shared between processes.
///
/// Metadata is kept as json in one hash keyed by address; failure counters
/// live in a hash per address and are bumped with `HINCRBY`.
#[derive(Clone)]
pub struct RedisTokenCache {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisTokenCache {
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, CacheError> {
        let conn = crate::redis_conn::connect(url).await?;
        Ok(Self {
            conn,
            prefix: prefix.into(),
        })
    }

    fn tokens_key(&self) -> String {
        format!("{}:tokens", self.prefix)
    }

    fn failures_key(&self, address: &Address) -> String {
        format!("{}:failures:{}", self.prefix, address)
    }

    fn metadata_json(entry: &TokenCacheEntry) -> Result<String, CacheError> {
        let metadata = TokenCacheEntry {
            failures: BTreeMap::new(),
            ..entry.clone()
        };
        Ok(serde_json::to_string(&metadata)?)
    }

    pub async fn seed(&self, initial: HashMap<Address, TokenCacheEntry>) -> Result<(), CacheError> {
        let total = initial.len();
        let fields = initial
            .iter()
            .map(|(address, entry)| Ok((address.to_string(), Self::metadata_json(entry)?)))
            .collect::<Result<Vec<_>, CacheError>>()?;
        for chunk in fields.chunks(SEED_CHUNK_SIZE) {
            let mut conn = self.conn.clone();
            let () = conn.hset_multiple(self.tokens_key(), chunk).await?;
        }
        tracing::info!(tokens = total, "redis token cache seeded");
        Ok(())
    }
}

#[async_trait]
impl TokenCache for RedisTokenCache {
    async fn get(&self, address: &Address) -> Result<Option<TokenCacheEntry>, CacheError> {
        let mut conn = self.conn.clone();
        let (metadata, failures): (Option<String>, HashMap<String, u32>) = redis::pipe()
            .hget(self.tokens_key(), address.to_string())
            .hgetall(self.failures_key(address))
            .query_async(&mut conn)
            .await?;

        let Some(metadata) = metadata else {
            return Ok(None);
        };
        let mut entry: TokenCacheEntry = serde_json::from_str(&metadata)?;
        entry.failures = failures
            .into_iter()
            .filter_map(|(field, count)| FailureField::parse(&field).map(|field| (field, count)))
            .collect();
        Ok(Some(entry))
    }

    async fn insert(&self, address: Address, entry: TokenCacheEntry) -> Result<(), CacheError> {
        let metadata = Self::metadata_json(&entry)?;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .hset(self.tokens_key(), address.to_string(), metadata)
            .ignore();
        if !entry.failures.is_empty() {
            let counters = entry
                .failures
                .iter()
                .map(|(field, count)| (field.as_str(), *count))
                .collect_vec();
            pipe.hset_multiple(self.failures_key(&address), &counters)
                .ignore();
        }
        let mut conn = self.conn.clone();
        let () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn increment_failure(
        &self,
        address: Address,
        field: FailureField,
    ) -> Result<u32, CacheError> {
        let empty = Self::metadata_json(&TokenCacheEntry::default())?;
        let mut conn = self.conn.clone();
        let (count,): (u32,) = redis::pipe()
            .atomic()
            .hset_nx(self.tokens_key(), address.to_string(), empty)
            .ignore()
            .hincr(self.failures_key(&address), field.as_str(), 1)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn len(&self) -> Result<usize, CacheError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.hlen(self.tokens_key()).await?;
        Ok(len)
    }
}
