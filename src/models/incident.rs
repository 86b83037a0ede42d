use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 事故（由外部持久層擁有）
///
/// 引擎讀取 `down_alert_sent` 決定是否發送恢復通知，
/// 並在實際發出故障通知時寫回兩個警報欄位。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub monitor_id: i64,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub down_alert_sent: bool,
    #[serde(default)]
    pub last_alert_at_failure_count: Option<u32>,
}

impl Incident {
    pub fn open(id: i64, monitor_id: i64, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            monitor_id,
            started_at,
            resolved_at: None,
            down_alert_sent: false,
            last_alert_at_failure_count: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.resolved_at.is_none()
    }
}
