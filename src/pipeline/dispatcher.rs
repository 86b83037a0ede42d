use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::NotificationChannel;
use crate::probe::RetryResult;

/// 通知類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Down,
    Recovery,
}

/// 要送出的通知內容
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub monitor_id: i64,
    pub url: String,
    pub message: String,
    pub failure_count: u32,
    /// 故障通知附帶確認週期的結果
    pub result: Option<RetryResult>,
}

/// 通知發送錯誤
#[derive(Error, Debug)]
pub enum DispatchError {
    /// 服務商回報限流
    #[error("服務商限流: {0}")]
    RateLimited(String),

    /// 其他發送失敗
    #[error("通知發送失敗: {0}")]
    Delivery(String),
}

/// 通知發送接口，實際的各頻道發送由外部實作
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        channel: &NotificationChannel,
        notification: &Notification,
    ) -> Result<(), DispatchError>;
}
