use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// 維護窗口解析錯誤
#[derive(Error, Debug, PartialEq)]
pub enum WindowParseError {
    #[error("無法解析維護窗口: {0}")]
    Malformed(String),

    #[error("星期值超出範圍 (0-6): {0}")]
    InvalidDayOfWeek(u8),

    #[error("維護窗口結束時間早於開始時間")]
    EndBeforeStart,
}

/// 維護窗口
///
/// JSON 以 `type` 欄位標籤：`one_time` 帶 `start`/`end` 時間戳，
/// `recurring` 帶 `day_of_week`（0 = 星期日）、`start_time`/`end_time`（HH:MM）與時區。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MaintenanceWindow {
    OneTime {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Recurring(RecurringWindow),
}

/// 每週重複的維護窗口
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurringWindow {
    pub day_of_week: u8,
    #[serde(with = "clock_time")]
    pub start_time: NaiveTime,
    #[serde(with = "clock_time")]
    pub end_time: NaiveTime,
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

fn default_timezone() -> Tz {
    Tz::UTC
}

mod clock_time {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        let raw = raw.trim();
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .map_err(|e| de::Error::custom(format!("無效的時間 '{}': {}", raw, e)))
    }
}

impl MaintenanceWindow {
    /// 從 JSON 值解析並驗證單一窗口
    pub fn from_value(value: Value) -> Result<Self, WindowParseError> {
        let window: MaintenanceWindow =
            serde_json::from_value(value).map_err(|e| WindowParseError::Malformed(e.to_string()))?;
        window.validate()?;
        Ok(window)
    }

    fn validate(&self) -> Result<(), WindowParseError> {
        match self {
            MaintenanceWindow::OneTime { start, end } if end < start => {
                Err(WindowParseError::EndBeforeStart)
            }
            MaintenanceWindow::Recurring(recurring) if recurring.day_of_week > 6 => {
                Err(WindowParseError::InvalidDayOfWeek(recurring.day_of_week))
            }
            _ => Ok(()),
        }
    }

    /// 窗口在 `now` 生效時返回該次的實際起訖時間
    pub fn active_span(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            MaintenanceWindow::OneTime { start, end } => {
                (*start <= now && now <= *end).then_some((*start, *end))
            }
            MaintenanceWindow::Recurring(recurring) => recurring.active_span(now),
        }
    }

    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.active_span(now).is_some()
    }

    /// `now` 之後最近一次開始的時間
    pub fn next_start_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            MaintenanceWindow::OneTime { start, .. } => (*start > now).then_some(*start),
            MaintenanceWindow::Recurring(recurring) => recurring.next_start_after(now),
        }
    }

    /// 一次性窗口已結束；重複窗口永不過期
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self {
            MaintenanceWindow::OneTime { end, .. } => *end < now,
            MaintenanceWindow::Recurring(_) => false,
        }
    }
}

impl RecurringWindow {
    pub fn new(day_of_week: u8, start_time: NaiveTime, end_time: NaiveTime, timezone: Tz) -> Self {
        Self {
            day_of_week,
            start_time,
            end_time,
            timezone,
        }
    }

    /// 結束時間不晚於開始時間即跨越午夜
    pub fn crosses_midnight(&self) -> bool {
        self.end_time <= self.start_time
    }

    /// 以 `date` 當天開窗的起訖時間
    fn span_opening_on(&self, date: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let start = resolve_local(self.timezone, date, self.start_time)?;
        let end_date = if self.crosses_midnight() {
            date.succ_opt()?
        } else {
            date
        };
        let end = resolve_local(self.timezone, end_date, self.end_time)?;
        Some((start, end))
    }

    fn opens_on(&self, date: NaiveDate) -> bool {
        date.weekday().num_days_from_sunday() == u32::from(self.day_of_week)
    }

    fn active_span(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let today = now.with_timezone(&self.timezone).date_naive();

        // 跨午夜的窗口可能是前一天開的
        [today.pred_opt(), Some(today)]
            .into_iter()
            .flatten()
            .filter(|date| self.opens_on(*date))
            .filter_map(|date| self.span_opening_on(date))
            .find(|(start, end)| *start <= now && now <= *end)
    }

    fn next_start_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.with_timezone(&self.timezone).date_naive();

        (0..=7)
            .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
            .filter(|date| self.opens_on(*date))
            .filter_map(|date| resolve_local(self.timezone, date, self.start_time))
            .find(|start| *start > now)
    }
}

/// 把時區內的日期與時刻轉成 UTC
///
/// 重複的本地時間取較早者；夏令時跳過的時間往後推一小時。
fn resolve_local(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let local = date.and_time(time);
    tz.from_local_datetime(&local)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(local + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// 從鬆散的 JSON 解析窗口列表，格式錯誤的項目記錄後丟棄
pub fn parse_windows(value: Value) -> Vec<MaintenanceWindow> {
    let items = match value {
        Value::Null => return Vec::new(),
        Value::Array(items) => items,
        // 部分資料來源把列表存成 JSON 字串
        Value::String(raw) if raw.trim().is_empty() => return Vec::new(),
        Value::String(raw) => match serde_json::from_str::<Vec<Value>>(&raw) {
            Ok(items) => items,
            Err(e) => {
                warn!("維護窗口列表不是有效的 JSON 陣列: {}", e);
                return Vec::new();
            }
        },
        other => {
            warn!("維護窗口列表格式錯誤，忽略: {}", other);
            return Vec::new();
        }
    };

    items
        .into_iter()
        .filter_map(|item| match MaintenanceWindow::from_value(item) {
            Ok(window) => Some(window),
            Err(e) => {
                warn!("忽略無效的維護窗口: {}", e);
                None
            }
        })
        .collect()
}

/// serde 反序列化輔助函數，供監控項的 `maintenance_windows` 欄位使用
pub fn deserialize_windows<'de, D>(deserializer: D) -> Result<Vec<MaintenanceWindow>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.map(parse_windows).unwrap_or_default())
}
