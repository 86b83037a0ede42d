use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

use crate::config::RateLimitConfig;
use crate::metrics::GuardMetrics;
use crate::models::{ChannelKind, NotificationChannel};
use crate::rate_limit::stats::{clamp_count, DualWindowStats, RateLimitStats};
use crate::rate_limit::traits::{allow_on_store_error, log_tracking_error, ChannelRateLimiter};
use crate::store::{load_count, StateStore, StoreError};

const HOUR_SECS: u64 = 3600;
const DAY_SECS: u64 = 86_400;

/// Twitter 小時與每日雙窗口限流器
///
/// 兩個計數器在同一次批次遞增中累計，存活時間在第一次遞增時設定，
/// 窗口因此從第一次發送開始計算。
pub struct TwitterRateLimiter {
    store: Arc<dyn StateStore>,
    key_prefix: String,
    hourly_cap: u32,
    daily_cap: u32,
}

impl TwitterRateLimiter {
    pub fn new(store: Arc<dyn StateStore>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            key_prefix: config.key_prefix.clone(),
            hourly_cap: config.twitter_hourly_cap,
            daily_cap: config.twitter_daily_cap,
        }
    }

    fn keys(&self, identity: &str, channel: &NotificationChannel) -> (String, String) {
        let base = channel.rate_limit_key(&self.key_prefix, identity);
        (format!("{}:hourly", base), format!("{}:daily", base))
    }

    async fn usage(&self, identity: &str, channel: &NotificationChannel) -> Result<(u32, u32), StoreError> {
        let (hourly_key, daily_key) = self.keys(identity, channel);
        let hourly = clamp_count(load_count(self.store.as_ref(), &hourly_key).await?);
        let daily = clamp_count(load_count(self.store.as_ref(), &daily_key).await?);
        Ok((hourly, daily))
    }
}

#[async_trait]
impl ChannelRateLimiter for TwitterRateLimiter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Twitter
    }

    async fn should_send(&self, identity: &str, channel: &NotificationChannel) -> bool {
        let allowed = match self.usage(identity, channel).await {
            Ok((hourly, daily)) => {
                let allowed = hourly < self.hourly_cap && daily < self.daily_cap;
                if !allowed {
                    info!(
                        "Twitter {} 已達上限（本小時 {}/{}，今日 {}/{}）",
                        channel.destination, hourly, self.hourly_cap, daily, self.daily_cap
                    );
                }
                allowed
            }
            Err(e) => allow_on_store_error(self.kind(), "讀取", &e),
        };

        GuardMetrics::record_rate_limit_decision(self.kind(), allowed);
        allowed
    }

    async fn track_success(&self, identity: &str, channel: &NotificationChannel) {
        let (hourly_key, daily_key) = self.keys(identity, channel);
        let keys = [(hourly_key.as_str(), HOUR_SECS), (daily_key.as_str(), DAY_SECS)];
        if let Err(e) = self.store.incr_many(&keys).await {
            log_tracking_error(self.kind(), "遞增", &e);
        }
    }

    async fn stats(
        &self,
        identity: &str,
        channel: &NotificationChannel,
    ) -> Result<RateLimitStats, StoreError> {
        let (hourly_used, daily_used) = self.usage(identity, channel).await?;
        Ok(RateLimitStats::DualWindow(DualWindowStats {
            hourly_used,
            hourly_limit: self.hourly_cap,
            hourly_remaining: self.hourly_cap.saturating_sub(hourly_used),
            daily_used,
            daily_limit: self.daily_cap,
            daily_remaining: self.daily_cap.saturating_sub(daily_used),
        }))
    }
}
