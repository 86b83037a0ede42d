use crate::config::validation::{ValidationError, ValidationUtils, Validator};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 應用程序配置結構
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    pub log: LogConfig,
    pub redis: RedisConfig,
    pub confirmation: ConfirmationConfig,
    pub maintenance: MaintenanceConfig,
    pub rate_limit: RateLimitConfig,
}

impl Validator for ApplicationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        self.log.validate()?;
        self.redis.validate()?;
        self.confirmation.validate()?;
        self.maintenance.validate()?;
        self.rate_limit.validate()?;

        Ok(())
    }
}

/// 日誌配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Validator for LogConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::one_of(
            &self.level.to_lowercase().as_str(),
            &["trace", "debug", "info", "warn", "error"],
            "log.level",
        )?;
        ValidationUtils::one_of(
            &self.format.to_lowercase().as_str(),
            &["pretty", "json"],
            "log.format",
        )?;

        Ok(())
    }
}

/// Redis配置，限流狀態的共享存儲
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
    pub pool_size: u32,
    pub connection_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub reconnect_attempts: u32,
    pub reconnect_delay_secs: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 8,
            connection_timeout_secs: 5,
            read_timeout_secs: 5,
            reconnect_attempts: 1,
            reconnect_delay_secs: 1,
        }
    }
}

impl Validator for RedisConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::not_empty(&self.url, "redis.url")?;
        ValidationUtils::in_range(self.pool_size, 1, 100, "redis.pool_size")?;
        ValidationUtils::in_range(
            self.connection_timeout_secs,
            1,
            60,
            "redis.connection_timeout_secs",
        )?;
        ValidationUtils::in_range(self.read_timeout_secs, 1, 60, "redis.read_timeout_secs")?;
        ValidationUtils::in_range(self.reconnect_attempts, 0, 10, "redis.reconnect_attempts")?;

        Ok(())
    }
}

/// 確認探測配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfirmationConfig {
    /// 探測請求使用的 User-Agent
    pub user_agent: String,
    /// 監控項未指定逾時時使用的逾時（秒）
    pub default_timeout_secs: u64,
    /// HTTP 重導向上限
    pub max_redirects: usize,
    /// 是否在確認前等待預設檔的確認延遲
    pub honor_confirmation_delay: bool,
}

impl Default for ConfirmationConfig {
    fn default() -> Self {
        Self {
            user_agent: concat!("uptime-guard/", env!("CARGO_PKG_VERSION")).to_string(),
            default_timeout_secs: 10,
            max_redirects: 5,
            honor_confirmation_delay: false,
        }
    }
}

impl ConfirmationConfig {
    /// 預設探測逾時
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl Validator for ConfirmationConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::not_empty(&self.user_agent, "confirmation.user_agent")?;
        ValidationUtils::in_range(
            self.default_timeout_secs,
            1,
            300,
            "confirmation.default_timeout_secs",
        )?;
        ValidationUtils::in_range(self.max_redirects, 0, 5, "confirmation.max_redirects")?;

        Ok(())
    }
}

/// 維護窗口配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// 系統參考時區，下一個窗口的起點以此時區表示
    pub reference_timezone: String,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            reference_timezone: "UTC".to_string(),
        }
    }
}

impl MaintenanceConfig {
    /// 解析參考時區，無效時退回 UTC
    pub fn reference_tz(&self) -> chrono_tz::Tz {
        self.reference_timezone.parse().unwrap_or(chrono_tz::UTC)
    }
}

impl Validator for MaintenanceConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::valid_timezone(&self.reference_timezone, "maintenance.reference_timezone")
    }
}

/// 通知頻道限流配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// 存儲鍵前綴
    pub key_prefix: String,
    /// 複合狀態記錄的存活時間（秒）
    pub state_ttl_secs: u64,
    pub email_daily_cap: u32,
    /// 接近上限的比例門檻
    pub email_warning_ratio: f64,
    pub twitter_hourly_cap: u32,
    pub twitter_daily_cap: u32,
    pub telegram_minute_cap: u32,
    pub telegram_hourly_cap: u32,
    /// 退避指數上限
    pub telegram_max_backoff_exponent: u32,
    /// 單次退避時長上限（分鐘）
    pub telegram_max_backoff_minutes: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            key_prefix: "uptime_guard:rate_limit".to_string(),
            state_ttl_secs: 7200,
            email_daily_cap: 10,
            email_warning_ratio: 0.8,
            twitter_hourly_cap: 30,
            twitter_daily_cap: 200,
            telegram_minute_cap: 20,
            telegram_hourly_cap: 100,
            telegram_max_backoff_exponent: 6,
            telegram_max_backoff_minutes: 60,
        }
    }
}

impl Validator for RateLimitConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        ValidationUtils::not_empty(&self.key_prefix, "rate_limit.key_prefix")?;
        // 狀態必須比小時窗口與最長退避存活更久
        ValidationUtils::in_range(self.state_ttl_secs, 3600, 172_800, "rate_limit.state_ttl_secs")?;
        ValidationUtils::in_range(self.email_daily_cap, 1, 10_000, "rate_limit.email_daily_cap")?;
        ValidationUtils::in_range(
            self.email_warning_ratio,
            0.0,
            1.0,
            "rate_limit.email_warning_ratio",
        )?;
        ValidationUtils::in_range(self.twitter_hourly_cap, 1, 10_000, "rate_limit.twitter_hourly_cap")?;
        ValidationUtils::in_range(
            self.twitter_daily_cap,
            self.twitter_hourly_cap,
            100_000,
            "rate_limit.twitter_daily_cap",
        )?;
        ValidationUtils::in_range(self.telegram_minute_cap, 1, 10_000, "rate_limit.telegram_minute_cap")?;
        ValidationUtils::in_range(
            self.telegram_hourly_cap,
            self.telegram_minute_cap,
            100_000,
            "rate_limit.telegram_hourly_cap",
        )?;
        ValidationUtils::in_range(
            self.telegram_max_backoff_exponent,
            1,
            16,
            "rate_limit.telegram_max_backoff_exponent",
        )?;
        ValidationUtils::in_range(
            self.telegram_max_backoff_minutes,
            1,
            1440,
            "rate_limit.telegram_max_backoff_minutes",
        )?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_validation() {
        let mut log = LogConfig::default();
        assert!(log.validate().is_ok());

        log.level = "verbose".to_string();
        assert!(log.validate().is_err());

        log.level = "WARN".to_string();
        log.format = "json".to_string();
        assert!(log.validate().is_ok());
    }

    #[test]
    fn test_rate_limit_caps_must_nest() {
        let config = RateLimitConfig {
            twitter_hourly_cap: 300,
            twitter_daily_cap: 200,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_state_ttl_must_cover_hour_window() {
        let config = RateLimitConfig {
            state_ttl_secs: 60,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reference_tz_falls_back_to_utc() {
        let config = MaintenanceConfig {
            reference_timezone: "Not/AZone".to_string(),
        };
        assert_eq!(config.reference_tz(), chrono_tz::UTC);

        let config = MaintenanceConfig {
            reference_timezone: "Asia/Taipei".to_string(),
        };
        assert_eq!(config.reference_tz(), chrono_tz::Asia::Taipei);
    }
}
