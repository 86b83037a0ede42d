use metrics::{counter, histogram};
use std::time::Duration;

use crate::models::ChannelKind;
use crate::probe::{ErrorKind, ProbeType};

/// 監控指標命名空間
pub const METRIC_NAMESPACE: &str = "uptime_guard";

/// 引擎監控指標記錄器
///
/// 未安裝 recorder 時所有呼叫都是空操作。
pub struct GuardMetrics;

impl GuardMetrics {
    /// 記錄單次探測
    pub fn record_attempt(probe: ProbeType, error_kind: Option<ErrorKind>, elapsed: Duration) {
        counter!(
            format!("{}.probe.attempts", METRIC_NAMESPACE),
            "probe" => probe.as_str(),
            "outcome" => error_kind.map(ErrorKind::as_str).unwrap_or("success")
        )
        .increment(1);

        histogram!(
            format!("{}.probe.latency_ms", METRIC_NAMESPACE),
            "probe" => probe.as_str()
        )
        .record(elapsed.as_secs_f64() * 1000.0);
    }

    /// 記錄整個確認週期的結果
    pub fn record_confirmation(success: bool, tcp_responsive: bool, attempts: usize, elapsed: Duration) {
        let outcome = match (success, tcp_responsive) {
            (true, _) => "recovered",
            (false, true) => "application_failure",
            (false, false) => "down",
        };

        counter!(
            format!("{}.confirmation.cycles", METRIC_NAMESPACE),
            "outcome" => outcome
        )
        .increment(1);
        histogram!(format!("{}.confirmation.attempts", METRIC_NAMESPACE)).record(attempts as f64);
        histogram!(format!("{}.confirmation.duration_ms", METRIC_NAMESPACE))
            .record(elapsed.as_secs_f64() * 1000.0);
    }

    /// 記錄限流決策
    pub fn record_rate_limit_decision(channel: ChannelKind, allowed: bool) {
        counter!(
            format!("{}.rate_limit.decisions", METRIC_NAMESPACE),
            "channel" => channel.as_str(),
            "verdict" => if allowed { "allowed" } else { "throttled" }
        )
        .increment(1);
    }

    /// 記錄限流器進入退避
    pub fn record_backoff(channel: ChannelKind, backoff_count: u32) {
        counter!(
            format!("{}.rate_limit.backoff", METRIC_NAMESPACE),
            "channel" => channel.as_str()
        )
        .increment(1);
        histogram!(
            format!("{}.rate_limit.backoff_level", METRIC_NAMESPACE),
            "channel" => channel.as_str()
        )
        .record(backoff_count as f64);
    }

    /// 記錄存儲錯誤
    pub fn record_store_error(operation: &'static str) {
        counter!(
            format!("{}.store.error", METRIC_NAMESPACE),
            "operation" => operation
        )
        .increment(1);
    }

    /// 記錄因維護窗口而略過的失敗
    pub fn record_maintenance_suppression() {
        counter!(format!("{}.maintenance.suppressed", METRIC_NAMESPACE)).increment(1);
    }

    /// 記錄警報模式抑制
    pub fn record_alert_decision(pattern: &'static str, sent: bool) {
        counter!(
            format!("{}.alert.decisions", METRIC_NAMESPACE),
            "pattern" => pattern,
            "verdict" => if sent { "sent" } else { "suppressed" }
        )
        .increment(1);
    }
}
