use async_trait::async_trait;
use tracing::warn;

use crate::metrics::GuardMetrics;
use crate::models::{ChannelKind, NotificationChannel};
use crate::rate_limit::stats::RateLimitStats;
use crate::store::StoreError;

/// 通知頻道限流器
///
/// 決策方法永不失敗：存儲不可用時放行並記錄警告，通知送達優先於限流精確度。
#[async_trait]
pub trait ChannelRateLimiter: Send + Sync {
    /// 限流器負責的頻道類型
    fn kind(&self) -> ChannelKind;

    /// 是否允許向該頻道目的地再發送一次
    async fn should_send(&self, identity: &str, channel: &NotificationChannel) -> bool;

    /// 記錄一次成功發送
    async fn track_success(&self, identity: &str, channel: &NotificationChannel);

    /// 記錄服務商回報的限流失敗；不支援退避的限流器忽略
    async fn track_failure(&self, _identity: &str, _channel: &NotificationChannel) {}

    /// 當前使用量統計
    async fn stats(
        &self,
        identity: &str,
        channel: &NotificationChannel,
    ) -> Result<RateLimitStats, StoreError>;
}

/// 存儲失敗時的放行處理
pub(crate) fn allow_on_store_error(kind: ChannelKind, operation: &'static str, err: &StoreError) -> bool {
    warn!("{} 限流狀態{}失敗，放行發送: {}", kind, operation, err);
    GuardMetrics::record_store_error(operation);
    true
}

/// 記錄失敗的寫入，不影響發送結果
pub(crate) fn log_tracking_error(kind: ChannelKind, operation: &'static str, err: &StoreError) {
    warn!("{} 限流狀態{}失敗: {}", kind, operation, err);
    GuardMetrics::record_store_error(operation);
}
