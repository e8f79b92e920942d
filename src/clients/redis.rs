use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::info;

use crate::{config::Config, stores::CacheStore};

/// Rate-limit sentinels and notification history.
#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(config: &Config) -> Result<Self, Error> {
        info!("Connecting to Redis");

        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| anyhow!("Failed to create redis client: {}", e))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| anyhow!("Failed to connect to redis: {}", e))?;

        info!("Redis connection established");

        Ok(Self { connection })
    }

    pub async fn ping(&self) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        conn.ping::<String>()
            .await
            .map_err(|e| anyhow!("Redis ping failed: {}", e))?;
        Ok(())
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn exists(&self, key: &str) -> Result<bool, Error> {
        let mut conn = self.connection.clone();

        conn.exists(key)
            .await
            .map_err(|e| anyhow!("Failed to check key: {}", e))
    }

    async fn set_with_ttl(&self, key: &str, ttl: Duration) -> Result<(), Error> {
        let mut conn = self.connection.clone();

        conn.set_ex::<_, _, ()>(key, 1, ttl.as_secs().max(1))
            .await
            .map_err(|e| anyhow!("Failed to set key: {}", e))?;

        Ok(())
    }

    async fn push_and_trim(&self, key: &str, value: String, cap: usize) -> Result<(), Error> {
        let mut conn = self.connection.clone();
        let last = cap.max(1) as isize - 1;

        redis::pipe()
            .atomic()
            .lpush(key, value)
            .ignore()
            .ltrim(key, 0, last)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| anyhow!("Failed to append to list: {}", e))?;

        Ok(())
    }

    async fn range(&self, key: &str) -> Result<Vec<String>, Error> {
        let mut conn = self.connection.clone();

        conn.lrange(key, 0, -1)
            .await
            .map_err(|e| anyhow!("Failed to read list: {}", e))
    }
}
