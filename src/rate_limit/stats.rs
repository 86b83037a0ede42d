use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 每日固定上限的使用量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailLimitStats {
    pub used: u32,
    pub limit: u32,
    pub remaining: u32,
    pub is_approaching_limit: bool,
}

/// 小時與每日雙窗口的使用量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DualWindowStats {
    pub hourly_used: u32,
    pub hourly_limit: u32,
    pub hourly_remaining: u32,
    pub daily_used: u32,
    pub daily_limit: u32,
    pub daily_remaining: u32,
}

/// 分鐘/小時窗口加退避的使用量
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackoffWindowStats {
    pub minute_used: u32,
    pub minute_limit: u32,
    pub hourly_used: u32,
    pub hourly_limit: u32,
    pub backoff_until: Option<DateTime<Utc>>,
    pub backoff_count: u32,
    pub in_backoff: bool,
}

/// 各限流器的統計
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RateLimitStats {
    FixedDaily(EmailLimitStats),
    DualWindow(DualWindowStats),
    BackoffWindow(BackoffWindowStats),
}

/// 存儲中的計數轉成使用量，負值或過大值夾到 u32 範圍
pub(crate) fn clamp_count(raw: i64) -> u32 {
    u32::try_from(raw.max(0)).unwrap_or(u32::MAX)
}
