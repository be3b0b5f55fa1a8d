use super::SharedBuffer;
use crate::{entity_type::EntityType, error::BufferError, types::Entity};
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Script};
use std::time::Duration;

const LOCK_TTL: Duration = Duration::from_secs(10);
const LOCK_WAIT: Duration = Duration::from_secs(30);
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Reads the type index and drops every indexed list in one step, so an
/// append of a new type can not slip between the two.
const CLEAR_SCRIPT: &str = r#"
local types = redis.call("SMEMBERS", KEYS[1])
for _, entity_type in ipairs(types) do
    redis.call("DEL", ARGV[1] .. entity_type)
end
redis.call("DEL", KEYS[1])
return #types
"#;

/// Buffer shared between processes: one Redis list per entity type plus a
/// set indexing the types in use.
#[derive(Clone)]
pub struct RedisBuffer {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisBuffer {
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, BufferError> {
        let conn = crate::redis_conn::connect(url).await?;
        Ok(Self::new(conn, prefix))
    }

    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    fn types_key(&self) -> String {
        format!("{}:types", self.prefix)
    }

    fn list_key(&self, entity_type: &str) -> String {
        format!("{}:entities:{}", self.prefix, entity_type)
    }

    fn lock(&self) -> RedisLock {
        RedisLock::new(self.conn.clone(), format!("{}:lock", self.prefix))
    }
}

#[async_trait]
impl SharedBuffer for RedisBuffer {
    async fn clear(&self) -> Result<(), BufferError> {
        let lock = self.lock();
        let token = lock.acquire(LOCK_WAIT).await?;

        let result = async {
            let mut conn = self.conn.clone();
            let cleared: usize = Script::new(CLEAR_SCRIPT)
                .key(self.types_key())
                .arg(self.list_key(""))
                .invoke_async(&mut conn)
                .await?;
            tracing::debug!(types = cleared, "redis buffer cleared");
            Ok::<_, BufferError>(())
        }
        .await;

        lock.release(&token).await?;
        result
    }

    async fn get(&self, entity_type: &EntityType) -> Result<Vec<Entity>, BufferError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(self.list_key(entity_type.name()), 0, -1).await?;
        raw.iter()
            .map(|item| serde_json::from_str(item).map_err(BufferError::from))
            .collect()
    }

    async fn append_many(
        &self,
        entity_type: &EntityType,
        items: Vec<Entity>,
    ) -> Result<(), BufferError> {
        if items.is_empty() {
            return Ok(());
        }
        let serialized = items
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;

        let mut conn = self.conn.clone();
        let () = redis::pipe()
            .atomic()
            .sadd(self.types_key(), entity_type.name())
            .ignore()
            .rpush(self.list_key(entity_type.name()), serialized)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn entity_types(&self) -> Result<Vec<EntityType>, BufferError> {
        let mut conn = self.conn.clone();
        let mut names: Vec<String> = conn.smembers(self.types_key()).await?;
        names.sort();
        Ok(names.into_iter().map(EntityType::new).collect())
    }

    async fn len(&self, entity_type: &EntityType) -> Result<usize, BufferError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(self.list_key(entity_type.name())).await?;
        Ok(len)
    }
}

/// Keyed mutex stored in Redis.
///
/// Acquired with `SET NX PX` and a random token; released only by the
/// holder of the token.
pub(crate) struct RedisLock {
    conn: ConnectionManager,
    key: String,
}

const RELEASE_SCRIPT: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

impl RedisLock {
    pub(crate) fn new(conn: ConnectionManager, key: String) -> Self {
        Self { conn, key }
    }

    pub(crate) async fn acquire(&self, wait: Duration) -> Result<String, BufferError> {
        let token = uuid::Uuid::new_v4().to_string();
        let deadline = tokio::time::Instant::now() + wait;
        let mut conn = self.conn.clone();
        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&self.key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(LOCK_TTL.as_millis() as u64)
                .query_async(&mut conn)
                .await?;
            if acquired.is_some() {
                return Ok(token);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(BufferError::LockTimeout(self.key.clone()));
            }
            tokio::time::sleep(LOCK_POLL_INTERVAL).await;
        }
    }

    pub(crate) async fn release(&self, token: &str) -> Result<(), BufferError> {
        let mut conn = self.conn.clone();
        let released: i64 = Script::new(RELEASE_SCRIPT)
            .key(&self.key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        if released == 0 {
            tracing::warn!(key = %self.key, "redis lock expired before release");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{buffer::SharedBufferExt, entity_type, types::Block};
    use pretty_assertions::assert_eq;

    async fn buffer(prefix: &str) -> RedisBuffer {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let buffer = RedisBuffer::connect(&url, format!("block_etl_test:{prefix}"))
            .await
            .expect("redis must be reachable");
        buffer.clear().await.unwrap();
        buffer
    }

    #[tokio::test]
    #[ignore = "needs redis"]
    async fn redis_buffer_matches_memory_semantics() {
        let buffer = buffer("semantics").await;
        let blocks: Vec<_> = (1..=3)
            .map(|number| Block {
                number,
                ..Default::default()
            })
            .collect();
        buffer.append_records(blocks.clone()).await.unwrap();

        assert_eq!(buffer.get_records::<Block>().await.unwrap(), blocks);
        assert_eq!(buffer.entity_types().await.unwrap(), vec![entity_type::BLOCK]);
        assert_eq!(buffer.len(&entity_type::BLOCK).await.unwrap(), 3);

        buffer.clear().await.unwrap();
        assert!(buffer.get(&entity_type::BLOCK).await.unwrap().is_empty());
        assert!(buffer.entity_types().await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "needs redis"]
    async fn concurrent_appends_from_clones_are_kept() {
        let buffer = buffer("concurrent").await;
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let buffer = buffer.clone();
                tokio::spawn(async move {
                    for i in 0..10 {
                        let block = Block {
                            number: worker * 100 + i,
                            ..Default::default()
                        };
                        buffer.append_records(vec![block]).await.unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(buffer.len(&entity_type::BLOCK).await.unwrap(), 40);
    }

    #[tokio::test]
    #[ignore = "needs redis"]
    async fn clear_racing_new_types_leaves_no_unindexed_lists() {
        let buffer = buffer("clear_race").await;
        let types: Vec<EntityType> = (0..20)
            .map(|i| EntityType::new(format!("race_{i}")))
            .collect();
        let appends = {
            let buffer = buffer.clone();
            let types = types.clone();
            tokio::spawn(async move {
                for entity_type in &types {
                    let block = Block::default();
                    buffer
                        .append_many(entity_type, vec![block.into()])
                        .await
                        .unwrap();
                }
            })
        };
        for _ in 0..20 {
            buffer.clear().await.unwrap();
        }
        appends.await.unwrap();
        buffer.clear().await.unwrap();

        for entity_type in &types {
            assert_eq!(buffer.len(entity_type).await.unwrap(), 0, "{entity_type}");
        }
        assert!(buffer.entity_types().await.unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore = "needs redis"]
    async fn lock_is_exclusive_until_released() {
        let buffer = buffer("lock").await;
        let lock = buffer.lock();
        let token = lock.acquire(Duration::from_secs(1)).await.unwrap();

        let err = buffer
            .lock()
            .acquire(Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, BufferError::LockTimeout(_)));

        lock.release(&token).await.unwrap();
        let token = buffer.lock().acquire(Duration::from_secs(1)).await.unwrap();
        buffer.lock().release(&token).await.unwrap();
    }
}
