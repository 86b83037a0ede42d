use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::alerting::pattern::AlertPattern;
use crate::metrics::GuardMetrics;
use crate::models::{Incident, Monitor};
use crate::storage::{IncidentRepository, RepositoryError};

/// 警報模式評估器
///
/// 故障通知依監控項的警報模式與連續失敗次數決定；
/// 恢復通知只在未解決事故確實發過故障通知時發送。
pub struct AlertEvaluator {
    incidents: Arc<dyn IncidentRepository>,
}

impl AlertEvaluator {
    pub fn new(incidents: Arc<dyn IncidentRepository>) -> Self {
        Self { incidents }
    }

    /// 目前的連續失敗次數是否應發出故障通知
    pub fn should_send_down_alert(&self, monitor: &Monitor) -> bool {
        let pattern = AlertPattern::for_monitor(monitor);
        let send = pattern.fires_at(monitor.consecutive_failures);
        GuardMetrics::record_alert_decision(pattern.as_str(), send);
        debug!(
            "監控項 {} 第 {} 次失敗，模式 {}: {}",
            monitor.id,
            monitor.consecutive_failures,
            pattern,
            if send { "發送" } else { "抑制" }
        );
        send
    }

    /// 依未解決事故判斷是否發送恢復通知
    pub fn should_send_recovery_alert(incident: Option<&Incident>) -> bool {
        incident.is_some_and(|incident| incident.is_open() && incident.down_alert_sent)
    }

    /// 查詢監控項的未解決事故並判斷是否發送恢復通知
    ///
    /// 查詢失敗時不發送。
    pub async fn recovery_due(&self, monitor_id: i64) -> bool {
        match self.incidents.open_incident(monitor_id).await {
            Ok(incident) => Self::should_send_recovery_alert(incident.as_ref()),
            Err(e) => {
                warn!("查詢監控項 {} 的事故失敗，略過恢復通知: {}", monitor_id, e);
                false
            }
        }
    }

    pub async fn open_incident(&self, monitor_id: i64) -> Result<Option<Incident>, RepositoryError> {
        self.incidents.open_incident(monitor_id).await
    }

    /// 記錄已發出故障通知
    ///
    /// 只有在警報模式於目前失敗次數觸發時才寫入，返回更新後的事故；
    /// 未觸發時不寫入並返回 None。
    pub async fn record_down_alert(
        &self,
        monitor: &Monitor,
        incident: &Incident,
    ) -> Result<Option<Incident>, RepositoryError> {
        let pattern = AlertPattern::for_monitor(monitor);
        if !pattern.fires_at(monitor.consecutive_failures) {
            debug!(
                "模式 {} 在第 {} 次失敗不觸發，不記錄故障通知",
                pattern, monitor.consecutive_failures
            );
            return Ok(None);
        }

        let updated = self
            .incidents
            .record_down_alert(incident.id, monitor.consecutive_failures)
            .await?;
        info!(
            "事故 {} 已記錄故障通知（第 {} 次失敗）",
            incident.id, monitor.consecutive_failures
        );
        Ok(Some(updated))
    }
}
