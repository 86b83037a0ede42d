use serde::{Deserialize, Serialize};
use std::fmt;

/// 通知頻道類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Email,
    Telegram,
    Twitter,
    Slack,
    Discord,
    Webhook,
}

impl ChannelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Email => "email",
            ChannelKind::Telegram => "telegram",
            ChannelKind::Twitter => "twitter",
            ChannelKind::Slack => "slack",
            ChannelKind::Discord => "discord",
            ChannelKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 通知頻道配置
///
/// 這裡只把類型與目的地當作限流鍵的組成部分，不解讀其內容。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    pub kind: ChannelKind,
    pub destination: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl NotificationChannel {
    pub fn new(kind: ChannelKind, destination: impl Into<String>) -> Self {
        Self {
            kind,
            destination: destination.into(),
            enabled: true,
        }
    }

    /// 限流狀態的鍵：前綴:類型:身分:目的地
    pub fn rate_limit_key(&self, prefix: &str, identity: &str) -> String {
        format!(
            "{}:{}:{}:{}",
            prefix,
            self.kind.as_str(),
            identity,
            self.destination.trim().to_lowercase()
        )
    }
}
