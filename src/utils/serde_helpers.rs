// utils/serde_helpers.rs - 序列化與反序列化輔助函數
use serde::{Deserialize, Deserializer};

/// 將空字符串或 null 反序列化為 None
///
/// 監控項設定常以空字串表示「未設定」（例如必需字串、請求內容），
/// 在邊界處統一轉為 None，引擎內部就只需判斷 Option。
///
/// # 使用範例
///
/// ```
/// use serde::Deserialize;
/// use uptime_guard::utils::serde_helpers::empty_string_as_none;
///
/// #[derive(Deserialize)]
/// struct Settings {
///     #[serde(default, deserialize_with = "empty_string_as_none")]
///     keyword: Option<String>,
/// }
///
/// let settings: Settings = serde_json::from_str(r#"{"keyword": "  "}"#).unwrap();
/// assert!(settings.keyword.is_none());
/// ```
pub fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.trim().is_empty()))
}
