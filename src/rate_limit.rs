//! 通知頻道限流模組
//!
//! 三種策略共用 `ChannelRateLimiter` 接口：
//! - 郵件：每日固定上限
//! - Twitter：小時與每日雙窗口，計數器原子遞增
//! - Telegram：分鐘/小時窗口加服務商回報限流時的指數退避

pub mod email;
pub mod registry;
pub mod stats;
pub mod telegram;
pub mod traits;
pub mod twitter;

pub use email::EmailRateLimiter;
pub use registry::RateLimiterRegistry;
pub use stats::{BackoffWindowStats, DualWindowStats, EmailLimitStats, RateLimitStats};
pub use telegram::{TelegramRateLimiter, TelegramState};
pub use traits::ChannelRateLimiter;
pub use twitter::TwitterRateLimiter;
