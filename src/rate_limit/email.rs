use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::metrics::GuardMetrics;
use crate::models::{ChannelKind, NotificationChannel};
use crate::rate_limit::stats::{clamp_count, EmailLimitStats, RateLimitStats};
use crate::rate_limit::traits::{allow_on_store_error, log_tracking_error, ChannelRateLimiter};
use crate::store::{load_count, StateStore, StoreError};

/// 隔日計數器多保留的秒數
const DAY_KEY_GRACE_SECS: i64 = 3600;

/// 郵件每日固定上限限流器
///
/// 計數器鍵含 UTC 日期，換日即自動使用新鍵。
pub struct EmailRateLimiter {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    key_prefix: String,
    daily_cap: u32,
    warning_ratio: f64,
}

impl EmailRateLimiter {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            clock,
            key_prefix: config.key_prefix.clone(),
            daily_cap: config.email_daily_cap,
            warning_ratio: config.email_warning_ratio,
        }
    }

    fn day_key(&self, identity: &str, channel: &NotificationChannel, now: DateTime<Utc>) -> String {
        format!(
            "{}:{}",
            channel.rate_limit_key(&self.key_prefix, identity),
            now.format("%Y-%m-%d")
        )
    }

    /// 到下一個 UTC 午夜的秒數再加緩衝
    fn ttl_until_next_day(now: DateTime<Utc>) -> u64 {
        let next_midnight = now
            .date_naive()
            .succ_opt()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
            .unwrap_or(now + Duration::days(1));
        let secs = (next_midnight - now).num_seconds().max(1) + DAY_KEY_GRACE_SECS;
        secs as u64
    }

    fn build_stats(&self, used: u32) -> EmailLimitStats {
        EmailLimitStats {
            used,
            limit: self.daily_cap,
            remaining: self.daily_cap.saturating_sub(used),
            is_approaching_limit: f64::from(used) >= f64::from(self.daily_cap) * self.warning_ratio,
        }
    }
}

#[async_trait]
impl ChannelRateLimiter for EmailRateLimiter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Email
    }

    async fn should_send(&self, identity: &str, channel: &NotificationChannel) -> bool {
        let key = self.day_key(identity, channel, self.clock.now());
        let allowed = match load_count(self.store.as_ref(), &key).await {
            Ok(count) => clamp_count(count) < self.daily_cap,
            Err(e) => allow_on_store_error(self.kind(), "讀取", &e),
        };

        GuardMetrics::record_rate_limit_decision(self.kind(), allowed);
        if !allowed {
            info!("郵件 {} 已達每日上限 {}", channel.destination, self.daily_cap);
        }
        allowed
    }

    async fn track_success(&self, identity: &str, channel: &NotificationChannel) {
        let now = self.clock.now();
        let key = self.day_key(identity, channel, now);
        match self.store.incr(&key, Self::ttl_until_next_day(now)).await {
            Ok(count) => {
                let stats = self.build_stats(clamp_count(count));
                if stats.is_approaching_limit {
                    debug!(
                        "郵件 {} 今日已發送 {}/{}，接近上限",
                        channel.destination, stats.used, stats.limit
                    );
                }
            }
            Err(e) => log_tracking_error(self.kind(), "遞增", &e),
        }
    }

    async fn stats(
        &self,
        identity: &str,
        channel: &NotificationChannel,
    ) -> Result<RateLimitStats, StoreError> {
        let key = self.day_key(identity, channel, self.clock.now());
        let used = clamp_count(load_count(self.store.as_ref(), &key).await?);
        Ok(RateLimitStats::FixedDaily(self.build_stats(used)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStateStore;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn limiter() -> (EmailRateLimiter, Arc<ManualClock>) {
        let clock = ManualClock::shared(Utc.with_ymd_and_hms(2025, 12, 15, 9, 0, 0).unwrap());
        let store = Arc::new(MemoryStateStore::new(clock.clone()));
        let limiter = EmailRateLimiter::new(store, clock.clone(), &RateLimitConfig::default());
        (limiter, clock)
    }

    async fn email_stats(limiter: &EmailRateLimiter, channel: &NotificationChannel) -> EmailLimitStats {
        match limiter.stats("user-1", channel).await.unwrap() {
            RateLimitStats::FixedDaily(stats) => stats,
            other => panic!("unexpected stats: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_daily_cap_and_warning_threshold() {
        let (limiter, _clock) = limiter();
        let channel = NotificationChannel::new(ChannelKind::Email, "ops@example.com");

        for _ in 0..7 {
            limiter.track_success("user-1", &channel).await;
        }
        assert!(!email_stats(&limiter, &channel).await.is_approaching_limit);

        limiter.track_success("user-1", &channel).await;
        let stats = email_stats(&limiter, &channel).await;
        assert_eq!(stats.used, 8);
        assert!(stats.is_approaching_limit);
        assert!(limiter.should_send("user-1", &channel).await);

        limiter.track_success("user-1", &channel).await;
        limiter.track_success("user-1", &channel).await;
        let stats = email_stats(&limiter, &channel).await;
        assert_eq!(stats.remaining, 0);
        assert!(!limiter.should_send("user-1", &channel).await);
    }

    #[tokio::test]
    async fn test_counter_resets_next_day() {
        let (limiter, clock) = limiter();
        let channel = NotificationChannel::new(ChannelKind::Email, "ops@example.com");
        for _ in 0..10 {
            limiter.track_success("user-1", &channel).await;
        }
        assert!(!limiter.should_send("user-1", &channel).await);

        clock.advance(Duration::hours(16));
        assert!(limiter.should_send("user-1", &channel).await);
        assert_matches!(
            limiter.stats("user-1", &channel).await.unwrap(),
            RateLimitStats::FixedDaily(EmailLimitStats { used: 0, .. })
        );
    }

    #[tokio::test]
    async fn test_destinations_are_counted_separately() {
        let (limiter, _clock) = limiter();
        let first = NotificationChannel::new(ChannelKind::Email, "a@example.com");
        let second = NotificationChannel::new(ChannelKind::Email, "b@example.com");
        for _ in 0..10 {
            limiter.track_success("user-1", &first).await;
        }
        assert!(!limiter.should_send("user-1", &first).await);
        assert!(limiter.should_send("user-1", &second).await);
        assert!(limiter.should_send("user-2", &first).await);
    }

    #[test]
    fn test_ttl_covers_rest_of_day() {
        let now = Utc.with_ymd_and_hms(2025, 12, 15, 23, 0, 0).unwrap();
        assert_eq!(EmailRateLimiter::ttl_until_next_day(now), 3600 + 3600);
    }
}
