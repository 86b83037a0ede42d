use serde::{Deserialize, Serialize};

use crate::probe::classifier::ErrorKind;

/// 探測類型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeType {
    Http,
    Tcp,
}

impl ProbeType {
    pub fn as_str(self) -> &'static str {
        match self {
            ProbeType::Http => "http",
            ProbeType::Tcp => "tcp",
        }
    }
}

/// 單次探測結果，建立後不可變
///
/// 序列化為扁平記錄，欄位與遙測消費端約定一致。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryAttempt {
    success: bool,
    probe_type: ProbeType,
    method: Option<String>,
    status_code: Option<u16>,
    response_time_ms: Option<f64>,
    error_kind: Option<ErrorKind>,
    error_message: Option<String>,
    attempt_number: u32,
}

impl RetryAttempt {
    /// 成功的 HTTP 探測
    pub fn http_success(attempt_number: u32, method: &str, status_code: u16, response_time_ms: f64) -> Self {
        Self {
            success: true,
            probe_type: ProbeType::Http,
            method: Some(method.to_string()),
            status_code: Some(status_code),
            response_time_ms: Some(response_time_ms),
            error_kind: None,
            error_message: None,
            attempt_number: attempt_number.max(1),
        }
    }

    /// 失敗的 HTTP 探測；狀態碼錯誤或缺少字串時仍帶有狀態碼
    pub fn http_failure(
        attempt_number: u32,
        method: &str,
        status_code: Option<u16>,
        response_time_ms: Option<f64>,
        error_kind: ErrorKind,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            probe_type: ProbeType::Http,
            method: Some(method.to_string()),
            status_code,
            response_time_ms,
            error_kind: Some(error_kind),
            error_message: Some(error_message.into()),
            attempt_number: attempt_number.max(1),
        }
    }

    /// 成功的 TCP 連線
    pub fn tcp_success(attempt_number: u32, response_time_ms: f64) -> Self {
        Self {
            success: true,
            probe_type: ProbeType::Tcp,
            method: None,
            status_code: None,
            response_time_ms: Some(response_time_ms),
            error_kind: None,
            error_message: None,
            attempt_number: attempt_number.max(1),
        }
    }

    /// 失敗的 TCP 連線
    pub fn tcp_failure(
        attempt_number: u32,
        response_time_ms: Option<f64>,
        error_kind: ErrorKind,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            probe_type: ProbeType::Tcp,
            method: None,
            status_code: None,
            response_time_ms,
            error_kind: Some(error_kind),
            error_message: Some(error_message.into()),
            attempt_number: attempt_number.max(1),
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn probe_type(&self) -> ProbeType {
        self.probe_type
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn response_time_ms(&self) -> Option<f64> {
        self.response_time_ms
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.error_kind
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn attempt_number(&self) -> u32 {
        self.attempt_number
    }
}

/// 完整確認週期的結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryResult {
    success: bool,
    attempts: Vec<RetryAttempt>,
    message: Option<String>,
    status_code: Option<u16>,
    response_time_ms: Option<f64>,
}

impl RetryResult {
    /// 以最後一次（成功的）探測建立成功結果
    ///
    /// 最後一次探測不是成功的探測時原樣退回探測列表，成功結果因此至少有一次成功探測。
    pub fn succeeded(attempts: Vec<RetryAttempt>) -> Result<Self, Vec<RetryAttempt>> {
        let (status_code, response_time_ms) = match attempts.last() {
            Some(last) if last.success => (last.status_code, last.response_time_ms),
            _ => return Err(attempts),
        };
        Ok(Self {
            success: true,
            attempts,
            message: None,
            status_code,
            response_time_ms,
        })
    }

    /// 建立失敗結果
    pub fn failed(attempts: Vec<RetryAttempt>, message: Option<String>, status_code: Option<u16>) -> Self {
        let response_time_ms = attempts
            .iter()
            .rev()
            .find(|a| a.probe_type == ProbeType::Http)
            .and_then(|a| a.response_time_ms);
        Self {
            success: false,
            attempts,
            message,
            status_code,
            response_time_ms,
        }
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn attempts(&self) -> &[RetryAttempt] {
        &self.attempts
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn response_time_ms(&self) -> Option<f64> {
        self.response_time_ms
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn first_successful_attempt(&self) -> Option<&RetryAttempt> {
        self.attempts.iter().find(|a| a.success)
    }

    pub fn last_attempt(&self) -> Option<&RetryAttempt> {
        self.attempts.last()
    }
}
