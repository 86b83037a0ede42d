use crate::config::types::RedisConfig;
use async_trait::async_trait;
use deadpool::managed::QueueMode;
use deadpool_redis::{
    redis::{cmd, RedisError},
    Config, Connection, CreatePoolError, Pool, PoolConfig, PoolError, Runtime, Timeouts,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// 限流存儲連接錯誤
#[derive(Error, Debug)]
pub enum RedisPoolError {
    #[error("無法建立 Redis 連接池: {0}")]
    Create(String),

    #[error("無法取得 Redis 連接: {0}")]
    Checkout(String),

    /// 重試用盡仍無法 PING 通
    #[error("Redis 無法連線 ({url})，已嘗試 {attempts} 次")]
    Unreachable { url: String, attempts: u32 },

    #[error("Redis 命令錯誤: {0}")]
    Command(#[from] RedisError),
}

impl From<PoolError> for RedisPoolError {
    fn from(error: PoolError) -> Self {
        RedisPoolError::Checkout(error.to_string())
    }
}

impl From<CreatePoolError> for RedisPoolError {
    fn from(error: CreatePoolError) -> Self {
        RedisPoolError::Create(error.to_string())
    }
}

/// 限流存儲使用的連接來源
#[async_trait]
pub trait RedisPool: Send + Sync + 'static {
    async fn get_conn(&self) -> Result<Connection, RedisPoolError>;

    /// PING 是否在讀取逾時內回應
    async fn check_health(&self) -> bool;
}

/// deadpool-redis 連接池
///
/// 建立時不連線；`connect` 會額外以 PING 確認可用，失敗依 `reconnect_attempts` 重試。
pub struct ConnectionPool {
    pool: Pool,
    config: RedisConfig,
}

impl ConnectionPool {
    /// 建立連接池
    pub async fn new(config: RedisConfig) -> Result<Self, RedisPoolError> {
        let mut cfg = Config::from_url(&config.url);
        let connect_timeout = Duration::from_secs(config.connection_timeout_secs);

        cfg.pool = Some(PoolConfig {
            max_size: config.pool_size as usize,
            timeouts: Timeouts {
                wait: Some(connect_timeout),
                create: Some(connect_timeout),
                recycle: Some(Duration::from_secs(config.read_timeout_secs)),
            },
            queue_mode: QueueMode::Fifo,
        });

        let pool = cfg.create_pool(Some(Runtime::Tokio1))?;
        debug!("限流存儲連接池已建立，上限 {} 個連接", config.pool_size);

        Ok(Self { pool, config })
    }

    /// 建立連接池並確認 Redis 可用
    pub async fn connect(config: RedisConfig) -> Result<Self, RedisPoolError> {
        let pool = Self::new(config).await?;
        let attempts = pool.config.reconnect_attempts + 1;

        for attempt in 1..=attempts {
            if pool.check_health().await {
                info!("已連線限流存儲 Redis: {}", pool.config.url);
                return Ok(pool);
            }
            if attempt < attempts {
                warn!(
                    "Redis 第 {}/{} 次連線失敗，{} 秒後重試",
                    attempt, attempts, pool.config.reconnect_delay_secs
                );
                tokio::time::sleep(Duration::from_secs(pool.config.reconnect_delay_secs)).await;
            }
        }

        Err(RedisPoolError::Unreachable {
            url: pool.config.url.clone(),
            attempts,
        })
    }

    /// 目前持有的連接數與閒置數
    pub fn usage(&self) -> (usize, usize) {
        let status = self.pool.status();
        (status.size, status.available)
    }
}

#[async_trait]
impl RedisPool for ConnectionPool {
    async fn get_conn(&self) -> Result<Connection, RedisPoolError> {
        Ok(self.pool.get().await?)
    }

    async fn check_health(&self) -> bool {
        let ping = async {
            let mut conn = self.get_conn().await?;
            let pong: String = cmd("PING").query_async(&mut conn).await?;
            Ok::<_, RedisPoolError>(pong == "PONG")
        };

        match tokio::time::timeout(Duration::from_secs(self.config.read_timeout_secs.max(1)), ping).await {
            Ok(Ok(healthy)) => healthy,
            Ok(Err(e)) => {
                warn!("Redis 健康檢查失敗: {}", e);
                false
            }
            Err(_) => {
                warn!("Redis 健康檢查逾時");
                false
            }
        }
    }
}

#[async_trait]
impl RedisPool for Arc<ConnectionPool> {
    async fn get_conn(&self) -> Result<Connection, RedisPoolError> {
        (**self).get_conn().await
    }

    async fn check_health(&self) -> bool {
        (**self).check_health().await
    }
}
