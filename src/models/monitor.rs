use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Duration;

use crate::maintenance::window::{deserialize_windows, MaintenanceWindow};
use crate::utils::serde_helpers::empty_string_as_none;

/// 監控項
///
/// 只包含確認引擎、維護窗口與警報模式需要的欄位；
/// `maintenance_windows` 在反序列化時即解析為標籤化枚舉，格式錯誤的項目被丟棄。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Monitor {
    pub id: i64,
    pub url: String,
    #[serde(default = "default_expected_status")]
    pub expected_status_code: u16,
    /// 額外視為成功的狀態碼
    #[serde(default)]
    pub extra_status_codes: Vec<u16>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// GET 探測時附帶的請求內容
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub request_payload: Option<String>,
    /// 回應內容必須包含的字串（不分大小寫）
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub required_string: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default)]
    pub consecutive_failures: u32,
    #[serde(default)]
    pub notification_settings: Option<Map<String, Value>>,
    /// 靈敏度預設檔名稱
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub sensitivity: Option<String>,
    #[serde(default, deserialize_with = "deserialize_windows")]
    pub maintenance_windows: Vec<MaintenanceWindow>,
    // 快取欄位，只是快速路徑，真正的依據永遠是窗口列表
    #[serde(default)]
    pub is_in_maintenance: bool,
    #[serde(default)]
    pub maintenance_starts_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub maintenance_ends_at: Option<DateTime<Utc>>,
}

fn default_expected_status() -> u16 {
    200
}

fn default_timeout_seconds() -> u64 {
    10
}

/// 維護快取欄位的快照，供安靜寫入使用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceState {
    pub is_in_maintenance: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

impl Monitor {
    /// 以預設值建立監控項
    pub fn new(id: i64, url: impl Into<String>) -> Self {
        Self {
            id,
            url: url.into(),
            expected_status_code: default_expected_status(),
            extra_status_codes: Vec::new(),
            headers: HashMap::new(),
            request_payload: None,
            required_string: None,
            timeout_seconds: default_timeout_seconds(),
            consecutive_failures: 0,
            notification_settings: None,
            sensitivity: None,
            maintenance_windows: Vec::new(),
            is_in_maintenance: false,
            maintenance_starts_at: None,
            maintenance_ends_at: None,
        }
    }

    /// 單次探測逾時，至少一秒
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.max(1))
    }

    /// 讀取通知設定中的字串值，空字串視為未設定
    pub fn notification_setting(&self, key: &str) -> Option<&str> {
        self.notification_settings
            .as_ref()
            .and_then(|settings| settings.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn apply_maintenance_state(&mut self, state: MaintenanceState) {
        self.is_in_maintenance = state.is_in_maintenance;
        self.maintenance_starts_at = state.starts_at;
        self.maintenance_ends_at = state.ends_at;
    }
}
