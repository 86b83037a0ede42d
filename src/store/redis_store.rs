use async_trait::async_trait;
use deadpool_redis::redis::{cmd, pipe, AsyncCommands};
use tracing::{debug, error};

use crate::redis::pool::RedisPool;
use crate::store::traits::{StateStore, StoreError};

/// Redis 鍵值存儲
///
/// 遞增使用 MULTI 包裹的 INCR + TTL，計數器沒有存活時間時再補上 EXPIRE，
/// 因此多個行程同時遞增同一鍵不會遺失更新。
pub struct RedisStateStore<P: RedisPool> {
    pool: P,
}

impl<P: RedisPool> RedisStateStore<P> {
    /// 創建新的 Redis 存儲
    pub fn new(pool: P) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl<P: RedisPool> StateStore for RedisStateStore<P> {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.pool.get_conn().await?;
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => Ok(value),
            Err(e) => {
                error!("讀取限流狀態失敗 [{}]: {}", key, e);
                Err(StoreError::Redis(e))
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), StoreError> {
        let mut conn = self.pool.get_conn().await?;

        let result = match ttl_secs {
            Some(ttl) => {
                cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("EX")
                    .arg(ttl)
                    .query_async::<()>(&mut conn)
                    .await
            }
            None => conn.set::<_, _, ()>(key, value).await,
        };

        result.map_err(|e| {
            error!("寫入限流狀態失敗 [{}]: {}", key, e);
            StoreError::Redis(e)
        })?;
        debug!("限流狀態已寫入: {}", key);
        Ok(())
    }

    async fn incr(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError> {
        let mut conn = self.pool.get_conn().await?;

        let (count, ttl): (i64, i64) = pipe()
            .atomic()
            .incr(key, 1)
            .ttl(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                error!("遞增計數器失敗 [{}]: {}", key, e);
                StoreError::Redis(e)
            })?;

        // -1 表示鍵存在但沒有存活時間：剛建立的計數器
        if ttl < 0 {
            conn.expire::<_, bool>(key, ttl_secs as i64)
                .await
                .map_err(StoreError::Redis)?;
            debug!("計數器 {} 初始化存活時間 {} 秒", key, ttl_secs);
        }

        Ok(count)
    }

    async fn incr_many(&self, keys: &[(&str, u64)]) -> Result<Vec<i64>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.pool.get_conn().await?;

        let mut transaction = pipe();
        transaction.atomic();
        for (key, _) in keys {
            transaction.incr(*key, 1).ttl(*key);
        }
        let replies: Vec<i64> = transaction.query_async(&mut conn).await.map_err(|e| {
            error!("批次遞增計數器失敗 ({} 個鍵): {}", keys.len(), e);
            StoreError::Redis(e)
        })?;

        let mut counts = Vec::with_capacity(keys.len());
        let mut expiries = pipe();
        let mut pending = 0;
        for ((key, ttl_secs), reply) in keys.iter().zip(replies.chunks_exact(2)) {
            counts.push(reply[0]);
            if reply[1] < 0 {
                expiries.expire(*key, *ttl_secs as i64).ignore();
                pending += 1;
            }
        }

        if pending > 0 {
            expiries
                .query_async::<()>(&mut conn)
                .await
                .map_err(StoreError::Redis)?;
            debug!("批次遞增初始化 {} 個計數器存活時間", pending);
        }

        Ok(counts)
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.pool.get_conn().await?;
        conn.del::<_, bool>(key).await.map_err(StoreError::Redis)
    }
}
