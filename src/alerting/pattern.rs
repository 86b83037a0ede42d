use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::models::Monitor;

/// 通知設定中的警報模式鍵
pub const ALERT_PATTERN_SETTING: &str = "alert_pattern";

/// 費氏數列查表上限內的值
const FIBONACCI_TABLE: [u64; 15] = [1, 2, 3, 5, 8, 13, 21, 34, 55, 89, 144, 233, 377, 610, 987];

/// 警報模式：決定哪些連續失敗次數會真正發出通知
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPattern {
    /// 每次失敗都通知
    #[default]
    Every,
    /// 只在失敗次數為費氏數時通知
    Fibonacci,
}

impl AlertPattern {
    /// 解析模式名稱；缺少、空白或未知的值一律為 `Every`
    pub fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()).as_deref() {
            Some("fibonacci") => AlertPattern::Fibonacci,
            Some("every") | Some("") | None => AlertPattern::Every,
            Some(other) => {
                debug!("未知的警報模式 '{}'，使用 every", other);
                AlertPattern::Every
            }
        }
    }

    /// 監控項目前使用的模式
    pub fn for_monitor(monitor: &Monitor) -> Self {
        Self::parse(monitor.notification_setting(ALERT_PATTERN_SETTING))
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AlertPattern::Every => "every",
            AlertPattern::Fibonacci => "fibonacci",
        }
    }

    /// 第 `failure_count` 次連續失敗是否發出通知
    pub fn fires_at(self, failure_count: u32) -> bool {
        match self {
            AlertPattern::Every => true,
            AlertPattern::Fibonacci => is_fibonacci_number(u64::from(failure_count)),
        }
    }
}

impl fmt::Display for AlertPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 判斷 `n` 是否為費氏數（數列從 1, 2 開始，0 不算）
///
/// 987 以內查表，以上用 5n²±4 是否為完全平方數判斷。
pub fn is_fibonacci_number(n: u64) -> bool {
    if n <= 987 {
        return FIBONACCI_TABLE.contains(&n);
    }
    // 5n² 超出 u128 時改為逐項推算
    if n >= CLOSED_FORM_LIMIT {
        return walk_sequence(n);
    }

    let square = 5 * u128::from(n) * u128::from(n);
    is_perfect_square(square + 4) || is_perfect_square(square - 4)
}

const CLOSED_FORM_LIMIT: u64 = 1 << 60;

fn walk_sequence(n: u64) -> bool {
    let (mut prev, mut current) = (1u64, 2u64);
    while current < n {
        match prev.checked_add(current) {
            Some(next) => {
                prev = current;
                current = next;
            }
            None => return false,
        }
    }
    current == n
}

fn is_perfect_square(value: u128) -> bool {
    let root = integer_sqrt(value);
    root * root == value
}

/// 整數平方根（向下取整），輸入需小於 2^124
fn integer_sqrt(value: u128) -> u128 {
    if value < 2 {
        return value;
    }

    // 先用浮點估算再修正誤差
    let mut root = (value as f64).sqrt() as u128;
    while root * root > value {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= value {
        root += 1;
    }
    root
}
