use super::{InMemoryTokenCache, RedisTokenCache, TokenCache, TokenCacheEntry};
use crate::{
    error::SourceError,
    settings::parse_bool,
    source::SourcePath,
    types::TokenType,
};
use alloy::primitives::{Address, U256};
use futures::TryStreamExt;
use sea_orm::{Database, DbBackend, FromQueryResult, Statement};
use serde::Deserialize;
use std::{collections::HashMap, path::Path, str::FromStr, sync::Arc};

const TOKENS_QUERY: &str = r#"
SELECT
    address::text AS address,
    token_type::text AS token_type,
    name::text AS name,
    symbol::text AS symbol,
    decimals::text AS decimals,
    total_supply::text AS total_supply,
    skip_metadata::text AS skip_metadata
FROM tokens
"#;

/// Raw token row. Every column is read as text and coerced afterwards,
/// so database and csv rows share the same rules.
#[derive(Debug, Default, Deserialize, FromQueryResult)]
struct TokenRow {
    address: Option<String>,
    token_type: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
    decimals: Option<String>,
    total_supply: Option<String>,
    skip_metadata: Option<String>,
}

/// Loads the initial token cache from the configured source.
pub struct TokenCacheLoader;

impl TokenCacheLoader {
    pub async fn load(
        source: Option<&SourcePath>,
    ) -> Result<HashMap<Address, TokenCacheEntry>, SourceError> {
        let tokens = match source {
            None => HashMap::new(),
            Some(SourcePath::Csv(dir)) => Self::load_csv(&dir.join("token.csv"))?,
            Some(SourcePath::Postgres(url)) => Self::load_postgres(url).await?,
        };
        tracing::info!(tokens = tokens.len(), "token cache loaded");
        Ok(tokens)
    }

    async fn load_postgres(url: &str) -> Result<HashMap<Address, TokenCacheEntry>, SourceError> {
        let db = Database::connect(url).await?;
        let mut stream = TokenRow::find_by_statement(Statement::from_string(
            DbBackend::Postgres,
            TOKENS_QUERY,
        ))
        .stream(&db)
        .await?;

        let mut tokens = HashMap::new();
        while let Some(row) = stream.try_next().await? {
            insert_row(&mut tokens, row)?;
        }
        Ok(tokens)
    }

    fn load_csv(path: &Path) -> Result<HashMap<Address, TokenCacheEntry>, SourceError> {
        if !path.exists() {
            tracing::warn!(
                path = %path.display(),
                "token csv not found, starting with empty cache"
            );
            return Ok(HashMap::new());
        }
        let mut reader = csv::Reader::from_path(path)?;
        let mut tokens = HashMap::new();
        for row in reader.deserialize::<TokenRow>() {
            insert_row(&mut tokens, row?)?;
        }
        Ok(tokens)
    }
}

fn insert_row(
    tokens: &mut HashMap<Address, TokenCacheEntry>,
    row: TokenRow,
) -> Result<(), SourceError> {
    let address = coerce(row.address)
        .ok_or_else(|| SourceError::InvalidRow("token row without address".into()))?;
    let address = Address::from_str(&address).map_err(|err| {
        SourceError::InvalidRow(format!("invalid token address '{address}': {err}"))
    })?;
    let token_type = match coerce(row.token_type) {
        None => TokenType::default(),
        Some(value) => match parse_token_type(&value) {
            Some(token_type) => token_type,
            None => {
                tracing::warn!(
                    address = %address,
                    token_type = %value,
                    "unsupported token type, token is not cached"
                );
                return Ok(());
            }
        },
    };
    let entry = TokenCacheEntry {
        token_type,
        name: coerce(row.name),
        symbol: coerce(row.symbol),
        decimals: coerce(row.decimals).and_then(|value| parse_decimals(&value)),
        total_supply: coerce(row.total_supply).and_then(|value| parse_amount(&value)),
        skip_metadata: coerce(row.skip_metadata).and_then(|value| parse_bool(&value)),
        failures: Default::default(),
    };
    tokens.insert(address, entry);
    Ok(())
}

/// Missing-value markers become `None`, never an empty string or zero.
fn coerce(value: Option<String>) -> Option<String> {
    let value = value?;
    let trimmed = value.trim();
    match trimmed {
        "" | "NA" | "NaN" | "nan" | "NULL" | "null" | "None" => None,
        _ => Some(trimmed.to_string()),
    }
}

fn parse_token_type(value: &str) -> Option<TokenType> {
    match value.to_ascii_uppercase().replace('_', "-").as_str() {
        "ERC-20" | "ERC20" => Some(TokenType::Erc20),
        "ERC-721" | "ERC721" => Some(TokenType::Erc721),
        _ => None,
    }
}

/// Numeric columns may arrive as `18` or `18.0`.
fn parse_decimals(value: &str) -> Option<u8> {
    value
        .parse()
        .ok()
        .or_else(|| integral_part(value).and_then(|value| value.parse().ok()))
}

fn parse_amount(value: &str) -> Option<U256> {
    U256::from_str(value)
        .ok()
        .or_else(|| integral_part(value).and_then(|value| U256::from_str(value).ok()))
}

fn integral_part(value: &str) -> Option<&str> {
    let (integral, fraction) = value.split_once('.')?;
    fraction.chars().all(|c| c == '0').then_some(integral)
}

/// Backend selected by the `cache` setting, seeded with `initial`.
///
/// An unreachable Redis is not fatal: the cache falls back to memory.
pub async fn build_token_cache(
    cache: &str,
    initial: HashMap<Address, TokenCacheEntry>,
) -> Arc<dyn TokenCache> {
    if cache == "memory" {
        return Arc::new(InMemoryTokenCache::new(initial));
    }
    let redis = match RedisTokenCache::connect(cache, "block_etl:token_cache").await {
        Ok(redis) => redis,
        Err(err) => {
            tracing::warn!(error = ?err, "redis token cache unavailable, falling back to memory");
            return Arc::new(InMemoryTokenCache::new(initial));
        }
    };
    if let Err(err) = redis.seed(initial.clone()).await {
        tracing::warn!(error = ?err, "failed to seed redis token cache, falling back to memory");
        return Arc::new(InMemoryTokenCache::new(initial));
    }
    Arc::new(redis)
}
