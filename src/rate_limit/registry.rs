use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::clock::Clock;
use crate::config::RateLimitConfig;
use crate::models::{ChannelKind, NotificationChannel};
use crate::rate_limit::email::EmailRateLimiter;
use crate::rate_limit::stats::RateLimitStats;
use crate::rate_limit::telegram::TelegramRateLimiter;
use crate::rate_limit::traits::ChannelRateLimiter;
use crate::rate_limit::twitter::TwitterRateLimiter;
use crate::store::{StateStore, StoreError};

/// 頻道類型到限流器的對應表
///
/// 沒有註冊限流器的頻道類型一律放行。
#[derive(Default)]
pub struct RateLimiterRegistry {
    limiters: HashMap<ChannelKind, Arc<dyn ChannelRateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 註冊郵件、Twitter 與 Telegram 三種內建限流器
    pub fn with_defaults(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, config: &RateLimitConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(EmailRateLimiter::new(store.clone(), clock.clone(), config)));
        registry.register(Arc::new(TwitterRateLimiter::new(store.clone(), config)));
        registry.register(Arc::new(TelegramRateLimiter::new(store, clock, config)));
        registry
    }

    /// 註冊限流器，同類型的舊限流器會被取代
    pub fn register(&mut self, limiter: Arc<dyn ChannelRateLimiter>) {
        debug!("註冊 {} 限流器", limiter.kind());
        self.limiters.insert(limiter.kind(), limiter);
    }

    pub fn get(&self, kind: ChannelKind) -> Option<Arc<dyn ChannelRateLimiter>> {
        self.limiters.get(&kind).cloned()
    }

    pub async fn should_send(&self, identity: &str, channel: &NotificationChannel) -> bool {
        match self.limiters.get(&channel.kind) {
            Some(limiter) => limiter.should_send(identity, channel).await,
            None => true,
        }
    }

    pub async fn track_success(&self, identity: &str, channel: &NotificationChannel) {
        if let Some(limiter) = self.limiters.get(&channel.kind) {
            limiter.track_success(identity, channel).await;
        }
    }

    pub async fn track_failure(&self, identity: &str, channel: &NotificationChannel) {
        if let Some(limiter) = self.limiters.get(&channel.kind) {
            limiter.track_failure(identity, channel).await;
        }
    }

    /// 未限流的頻道返回 None
    pub async fn stats(
        &self,
        identity: &str,
        channel: &NotificationChannel,
    ) -> Result<Option<RateLimitStats>, StoreError> {
        match self.limiters.get(&channel.kind) {
            Some(limiter) => limiter.stats(identity, channel).await.map(Some),
            None => Ok(None),
        }
    }
}
