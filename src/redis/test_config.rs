//! Redis 測試環境
//!
//! Redis 不可用時相關測試直接略過，記憶體存儲的測試涵蓋同一套限流邏輯。

use crate::config::types::RedisConfig;
use crate::redis::pool::ConnectionPool;
use std::sync::Arc;
use tracing::warn;

pub struct RedisTestConfig;

impl RedisTestConfig {
    /// 測試用 Redis URL：`REDIS_TEST_URL` 優先，容器內用服務名 redis
    pub fn get_test_url() -> String {
        std::env::var("REDIS_TEST_URL").unwrap_or_else(|_| {
            let in_container =
                std::env::var("DOCKER_CONTAINER").is_ok() || std::path::Path::new("/.dockerenv").exists();
            let host = if in_container { "redis" } else { "localhost" };
            format!("redis://{}:6379", host)
        })
    }

    /// 小連接池、短逾時、不重試
    pub fn create_test_config() -> RedisConfig {
        RedisConfig {
            url: Self::get_test_url(),
            pool_size: 3,
            connection_timeout_secs: 1,
            read_timeout_secs: 1,
            reconnect_attempts: 0,
            reconnect_delay_secs: 0,
        }
    }

    /// 可用時返回連接池，否則記錄略過的測試名稱
    pub async fn available_pool(test_name: &str) -> Option<Arc<ConnectionPool>> {
        match ConnectionPool::connect(Self::create_test_config()).await {
            Ok(pool) => Some(Arc::new(pool)),
            Err(e) => {
                warn!("略過 Redis 測試 '{}': {}", test_name, e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_url_from_environment() {
        std::env::set_var("REDIS_TEST_URL", "redis://limits-store:6380");
        assert_eq!(RedisTestConfig::get_test_url(), "redis://limits-store:6380");
        std::env::remove_var("REDIS_TEST_URL");
    }

    #[test]
    #[serial]
    fn test_config_disables_reconnect() {
        let config = RedisTestConfig::create_test_config();
        assert!(config.url.starts_with("redis://"));
        assert_eq!(config.reconnect_attempts, 0);
    }
}
