//! Connections to Redis shared by the buffer and the token cache.

use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    ErrorKind, RedisError,
};
use std::time::Duration;

const CONNECTION_TIMEOUT: Duration = Duration::from_secs(2);
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
const CONNECT_RETRIES: usize = 2;
/// Upper bound of the whole initial connect, retries included.
const CONNECT_DEADLINE: Duration = Duration::from_secs(10);

/// Open a connection manager that gives up on an unreachable server
/// instead of reconnecting forever.
pub(crate) async fn connect(url: &str) -> Result<ConnectionManager, RedisError> {
    let client = redis::Client::open(url)?;
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(CONNECT_RETRIES)
        .set_connection_timeout(CONNECTION_TIMEOUT)
        .set_response_timeout(RESPONSE_TIMEOUT);
    match tokio::time::timeout(
        CONNECT_DEADLINE,
        ConnectionManager::new_with_config(client, config),
    )
    .await
    {
        Ok(conn) => conn,
        Err(_) => Err(RedisError::from((
            ErrorKind::IoError,
            "redis connection timed out",
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_server_fails_in_bounded_time() {
        let started = std::time::Instant::now();
        let result = tokio::time::timeout(
            CONNECT_DEADLINE + Duration::from_secs(5),
            connect("redis://127.0.0.1:1"),
        )
        .await
        .expect("connect must give up before the deadline");
        assert!(result.is_err());
        assert!(started.elapsed() <= CONNECT_DEADLINE + Duration::from_secs(1));
    }
}
