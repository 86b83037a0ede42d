use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::metrics::GuardMetrics;
use crate::models::{ChannelKind, NotificationChannel};
use crate::rate_limit::stats::{BackoffWindowStats, RateLimitStats};
use crate::rate_limit::traits::{allow_on_store_error, log_tracking_error, ChannelRateLimiter};
use crate::store::{load_json, save_json, KeyedLock, StateStore, StoreError};

/// 存儲中的 Telegram 限流狀態
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelegramState {
    pub minute_count: u32,
    pub minute_window_start: Option<DateTime<Utc>>,
    pub hour_count: u32,
    pub hour_window_start: Option<DateTime<Utc>>,
    pub backoff_until: Option<DateTime<Utc>>,
    pub backoff_count: u32,
}

impl TelegramState {
    /// 窗口開始超過長度後歸零重新計算
    fn refresh_windows(&mut self, now: DateTime<Utc>) {
        if self
            .minute_window_start
            .map_or(true, |start| now - start >= Duration::seconds(60))
        {
            self.minute_count = 0;
            self.minute_window_start = Some(now);
        }
        if self
            .hour_window_start
            .map_or(true, |start| now - start >= Duration::seconds(3600))
        {
            self.hour_count = 0;
            self.hour_window_start = Some(now);
        }
    }

    pub fn in_backoff(&self, now: DateTime<Utc>) -> bool {
        self.backoff_until.is_some_and(|until| now < until)
    }
}

/// Telegram 分鐘/小時滑動窗口加指數退避的限流器
///
/// 狀態是一筆 JSON 記錄，讀-改-寫以 `KeyedLock` 依鍵序列化。
/// 鎖只在同一行程內有效，多行程部署需讓同一頻道固定由一個工作者處理。
pub struct TelegramRateLimiter {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    locks: KeyedLock,
    key_prefix: String,
    state_ttl_secs: u64,
    minute_cap: u32,
    hourly_cap: u32,
    max_backoff_exponent: u32,
    max_backoff_minutes: i64,
}

impl TelegramRateLimiter {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, config: &RateLimitConfig) -> Self {
        Self {
            store,
            clock,
            locks: KeyedLock::new(),
            key_prefix: config.key_prefix.clone(),
            state_ttl_secs: config.state_ttl_secs,
            minute_cap: config.telegram_minute_cap,
            hourly_cap: config.telegram_hourly_cap,
            max_backoff_exponent: config.telegram_max_backoff_exponent,
            max_backoff_minutes: config.telegram_max_backoff_minutes,
        }
    }

    fn state_key(&self, identity: &str, channel: &NotificationChannel) -> String {
        format!("{}:state", channel.rate_limit_key(&self.key_prefix, identity))
    }

    /// 第 `count` 次連續失敗的退避分鐘數
    pub fn backoff_minutes(&self, count: u32) -> i64 {
        let exponent = count.min(self.max_backoff_exponent).min(62);
        (1i64 << exponent).min(self.max_backoff_minutes)
    }

    async fn load(&self, key: &str) -> Result<TelegramState, StoreError> {
        Ok(load_json::<TelegramState>(self.store.as_ref(), key)
            .await?
            .unwrap_or_default())
    }

    async fn save(&self, key: &str, state: &TelegramState) -> Result<(), StoreError> {
        save_json(self.store.as_ref(), key, state, Some(self.state_ttl_secs)).await
    }

    async fn decide(&self, key: &str, destination: &str) -> Result<bool, StoreError> {
        let now = self.clock.now();
        let mut state = self.load(key).await?;
        state.refresh_windows(now);

        let allowed = if state.in_backoff(now) {
            info!(
                "Telegram {} 退避中，直到 {}",
                destination,
                state.backoff_until.map(|t| t.to_rfc3339()).unwrap_or_default()
            );
            false
        } else if state.minute_count >= self.minute_cap || state.hour_count >= self.hourly_cap {
            info!(
                "Telegram {} 已達上限（本分鐘 {}/{}，本小時 {}/{}）",
                destination, state.minute_count, self.minute_cap, state.hour_count, self.hourly_cap
            );
            false
        } else {
            true
        };

        self.save(key, &state).await?;
        Ok(allowed)
    }
}

#[async_trait]
impl ChannelRateLimiter for TelegramRateLimiter {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    async fn should_send(&self, identity: &str, channel: &NotificationChannel) -> bool {
        let key = self.state_key(identity, channel);
        let _guard = self.locks.lock(&key).await;

        let allowed = match self.decide(&key, &channel.destination).await {
            Ok(allowed) => allowed,
            Err(e) => allow_on_store_error(self.kind(), "讀寫", &e),
        };
        GuardMetrics::record_rate_limit_decision(self.kind(), allowed);
        allowed
    }

    async fn track_success(&self, identity: &str, channel: &NotificationChannel) {
        let key = self.state_key(identity, channel);
        let _guard = self.locks.lock(&key).await;
        let now = self.clock.now();

        let result = async {
            let mut state = self.load(&key).await?;
            state.refresh_windows(now);
            state.minute_count = state.minute_count.saturating_add(1);
            state.hour_count = state.hour_count.saturating_add(1);
            state.backoff_until = None;
            state.backoff_count = 0;
            self.save(&key, &state).await
        }
        .await;

        if let Err(e) = result {
            log_tracking_error(self.kind(), "寫入", &e);
        }
    }

    async fn track_failure(&self, identity: &str, channel: &NotificationChannel) {
        let key = self.state_key(identity, channel);
        let _guard = self.locks.lock(&key).await;
        let now = self.clock.now();

        let result = async {
            let mut state = self.load(&key).await?;
            state.refresh_windows(now);
            state.backoff_count = (state.backoff_count + 1).min(self.max_backoff_exponent);
            let minutes = self.backoff_minutes(state.backoff_count);
            state.backoff_until = Some(now + Duration::minutes(minutes));
            self.save(&key, &state).await?;
            Ok::<_, StoreError>(state)
        }
        .await;

        match result {
            Ok(state) => {
                warn!(
                    "Telegram {} 回報限流，第 {} 次退避，暫停 {} 分鐘",
                    channel.destination,
                    state.backoff_count,
                    self.backoff_minutes(state.backoff_count)
                );
                GuardMetrics::record_backoff(self.kind(), state.backoff_count);
            }
            Err(e) => log_tracking_error(self.kind(), "寫入", &e),
        }
    }

    async fn stats(
        &self,
        identity: &str,
        channel: &NotificationChannel,
    ) -> Result<RateLimitStats, StoreError> {
        let key = self.state_key(identity, channel);
        let now = self.clock.now();
        let mut state = self.load(&key).await?;
        state.refresh_windows(now);

        Ok(RateLimitStats::BackoffWindow(BackoffWindowStats {
            minute_used: state.minute_count,
            minute_limit: self.minute_cap,
            hourly_used: state.hour_count,
            hourly_limit: self.hourly_cap,
            backoff_until: state.backoff_until,
            backoff_count: state.backoff_count,
            in_backoff: state.in_backoff(now),
        }))
    }
}
