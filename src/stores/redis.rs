//! Redis-backed recommendation cache. Every operation surfaces its error to
//! the caller; the engine treats any of them as a miss (fail-open).

use super::RecommendationCache;
use anyhow::Result;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;

pub struct RedisCache {
    client: Arc<redis::Client>,
}

impl RedisCache {
    pub fn new(client: Arc<redis::Client>) -> Self {
        Self { client }
    }

    pub fn from_url(url: &str) -> Result<Self> {
        Ok(Self {
            client: Arc::new(redis::Client::open(url)?),
        })
    }
}

#[async_trait::async_trait]
impl RecommendationCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.client.get_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs()).await?;
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let mut conn = self.client.get_async_connection().await?;
        let keys: Vec<String> = conn.keys(format!("{}*", prefix)).await?;
        if !keys.is_empty() {
            let _: () = conn.del(keys).await?;
        }
        Ok(())
    }
}
