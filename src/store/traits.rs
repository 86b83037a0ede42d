use async_trait::async_trait;
use deadpool_redis::redis::RedisError;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::redis::pool::RedisPoolError;

/// 存儲操作錯誤
#[derive(Error, Debug)]
pub enum StoreError {
    /// 連接池錯誤
    #[error("存儲連接錯誤: {0}")]
    Connection(#[from] RedisPoolError),

    /// Redis命令錯誤
    #[error("Redis命令錯誤: {0}")]
    Redis(#[from] RedisError),

    /// 序列化錯誤
    #[error("狀態序列化錯誤: {0}")]
    Serialization(String),

    /// 值類型錯誤
    #[error("存儲值類型錯誤: {0}")]
    TypeError(String),
}

/// 鍵值存儲接口
///
/// 所有鍵都是完整鍵（已含前綴），實現不再額外加前綴。
#[async_trait]
pub trait StateStore: Send + Sync + 'static {
    /// 獲取鍵對應的值
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// 設置鍵值對，可選存活時間（秒）
    async fn set(&self, key: &str, value: &str, ttl_secs: Option<u64>) -> Result<(), StoreError>;

    /// 原子遞增計數器並返回新值；計數器剛建立（或尚無存活時間）時設定 ttl
    async fn incr(&self, key: &str, ttl_secs: u64) -> Result<i64, StoreError>;

    /// 一次遞增多個計數器（鍵, ttl 秒），依序返回新值
    ///
    /// 預設逐一呼叫 `incr`；能以單一交易完成的實現應覆寫。
    async fn incr_many(&self, keys: &[(&str, u64)]) -> Result<Vec<i64>, StoreError> {
        let mut counts = Vec::with_capacity(keys.len());
        for (key, ttl_secs) in keys {
            counts.push(self.incr(key, *ttl_secs).await?);
        }
        Ok(counts)
    }

    /// 刪除鍵
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;
}

/// 讀取計數器，不存在時為 0
pub async fn load_count(store: &dyn StateStore, key: &str) -> Result<i64, StoreError> {
    match store.get(key).await? {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|e| StoreError::TypeError(format!("{}: {}", key, e))),
        None => Ok(0),
    }
}

/// 讀取 JSON 記錄；內容損壞時視為不存在並記錄警告
pub async fn load_json<V>(store: &dyn StateStore, key: &str) -> Result<Option<V>, StoreError>
where
    V: DeserializeOwned,
{
    let Some(raw) = store.get(key).await? else {
        return Ok(None);
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("狀態記錄反序列化失敗，視為新記錄 [{}]: {}", key, e);
            Ok(None)
        }
    }
}

/// 寫入 JSON 記錄
pub async fn save_json<V>(
    store: &dyn StateStore,
    key: &str,
    value: &V,
    ttl_secs: Option<u64>,
) -> Result<(), StoreError>
where
    V: Serialize + Sync,
{
    let serialized =
        serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))?;
    store.set(key, &serialized, ttl_secs).await
}
