use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// 靈敏度預設檔
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensitivityPreset {
    pub name: String,
    /// HTTP 探測輪數
    pub retries: u32,
    pub initial_delay_ms: u64,
    pub backoff_multiplier: f64,
    /// 確認前的等待時間
    pub confirmation_delay_seconds: u64,
}

impl SensitivityPreset {
    pub fn low() -> Self {
        Self {
            name: "low".to_string(),
            retries: 5,
            initial_delay_ms: 200,
            backoff_multiplier: 2.0,
            confirmation_delay_seconds: 60,
        }
    }

    pub fn medium() -> Self {
        Self {
            name: "medium".to_string(),
            retries: 3,
            initial_delay_ms: 100,
            backoff_multiplier: 2.0,
            confirmation_delay_seconds: 30,
        }
    }

    pub fn high() -> Self {
        Self {
            name: "high".to_string(),
            retries: 2,
            initial_delay_ms: 50,
            backoff_multiplier: 1.5,
            confirmation_delay_seconds: 15,
        }
    }

    /// 依名稱取得內建預設檔，未知或缺少時為 medium
    pub fn from_key(key: Option<&str>) -> Self {
        match key.map(|k| k.trim().to_lowercase()).as_deref() {
            Some("low") => Self::low(),
            Some("high") => Self::high(),
            Some("medium") | None | Some("") => Self::medium(),
            Some(other) => {
                debug!("未知的靈敏度預設檔 '{}'，使用 medium", other);
                Self::medium()
            }
        }
    }

    /// 至少一輪
    pub fn rounds(&self) -> u32 {
        self.retries.max(1)
    }

    /// 下一輪的等待時間（毫秒）
    ///
    /// 乘數不小於 1 時結果不會降到 0 以下或原地歸零。
    pub fn next_delay_ms(&self, current_ms: u64) -> u64 {
        let multiplier = if self.backoff_multiplier.is_finite() && self.backoff_multiplier > 0.0 {
            self.backoff_multiplier
        } else {
            1.0
        };
        let next = (current_ms as f64 * multiplier) as u64;
        if multiplier >= 1.0 {
            next.max(current_ms).max(1)
        } else {
            next
        }
    }

    pub fn confirmation_delay(&self) -> Duration {
        Duration::from_secs(self.confirmation_delay_seconds)
    }
}

impl Default for SensitivityPreset {
    fn default() -> Self {
        Self::medium()
    }
}
