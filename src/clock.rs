// clock.rs - 可注入的時鐘
//
// 所有與時間窗口、退避相關的元件都透過 Clock 取得「現在」，
// 測試中以 ManualClock 固定或推進時間。

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::sync::Arc;

/// 時鐘特質
pub trait Clock: Send + Sync + 'static {
    /// 當前 UTC 時間
    fn now(&self) -> DateTime<Utc>;
}

/// 系統時鐘
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 手動時鐘，時間只在呼叫 set/advance 時改變
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// 建立共享的手動時鐘
    pub fn shared(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self::new(start))
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.current.lock() = instant;
    }

    pub fn advance(&self, delta: Duration) {
        let mut current = self.current.lock();
        *current += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock()
    }
}

/// 預設的共享系統時鐘
pub fn system_clock() -> Arc<dyn Clock> {
    Arc::new(SystemClock)
}
